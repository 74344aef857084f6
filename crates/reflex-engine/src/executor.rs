//! Action executors and the executor registry
//!
//! The registry maps an action's [`ActionKind`] to an [`ActionExecutor`]
//! that knows how to turn the action into deferred work items on the queue
//! being built. New action variants plug in through
//! [`ExecutorRegistry::register`] without touching the queue builder;
//! resolving a kind nobody registered is a configuration error and fails
//! loudly.
//!
//! Repeat executors operate on the queue built so far, not on the action
//! list: a fixed-count repeat clones the last N *work items*, which lets a
//! delay+command pair replay as a unit.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reflex_automation::{Action, ActionBody, ActionKind, Command, RepeatPredicate};
use thiserror::Error;
use tracing::trace;

/// Configuration errors raised while building the work queue
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no executor registered for action kind `{0}`")]
    UnregisteredAction(ActionKind),

    #[error("repeat action at position {index} has no preceding work to replay")]
    NoPrecedingWork { index: usize },

    #[error("repeat action at position {index} has a zero repeat count")]
    ZeroRepeatCount { index: usize },
}

/// One deferred unit of work in a run's queue
///
/// The `action` field is the index of the originating action in the
/// automation's list, used to stamp execution bookkeeping after the item
/// completes. Repeat copies keep the index of the item they replay.
pub enum WorkItem<T> {
    /// Wait for a duration, observing cancellation
    Delay { duration: Duration, action: usize },

    /// Invoke a command against the candidate value
    Command { run: Command<T>, action: usize },

    /// Replay `item` until `predicate` holds against the current value,
    /// bounded by the `max_iterations` circuit breaker
    RepeatUntil {
        item: Box<WorkItem<T>>,
        predicate: RepeatPredicate<T>,
        max_iterations: usize,
        action: usize,
    },
}

impl<T> WorkItem<T> {
    /// Index of the action this item stamps on completion
    pub fn action_index(&self) -> usize {
        match self {
            WorkItem::Delay { action, .. }
            | WorkItem::Command { action, .. }
            | WorkItem::RepeatUntil { action, .. } => *action,
        }
    }
}

impl<T> Clone for WorkItem<T> {
    fn clone(&self) -> Self {
        match self {
            WorkItem::Delay { duration, action } => WorkItem::Delay {
                duration: *duration,
                action: *action,
            },
            WorkItem::Command { run, action } => WorkItem::Command {
                run: Arc::clone(run),
                action: *action,
            },
            WorkItem::RepeatUntil {
                item,
                predicate,
                max_iterations,
                action,
            } => WorkItem::RepeatUntil {
                item: item.clone(),
                predicate: Arc::clone(predicate),
                max_iterations: *max_iterations,
                action: *action,
            },
        }
    }
}

impl<T> fmt::Debug for WorkItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Delay { duration, action } => f
                .debug_struct("Delay")
                .field("duration", duration)
                .field("action", action)
                .finish(),
            WorkItem::Command { action, .. } => {
                f.debug_struct("Command").field("action", action).finish()
            }
            WorkItem::RepeatUntil {
                item,
                max_iterations,
                action,
                ..
            } => f
                .debug_struct("RepeatUntil")
                .field("item", item)
                .field("max_iterations", max_iterations)
                .field("action", action)
                .finish(),
        }
    }
}

/// Turns one action into its work items on the queue being built
///
/// Appending nothing is the "this action produces no work" case; executors
/// must never silently skip a misconfigured action - that is what
/// [`BuildError`] is for.
pub trait ActionExecutor<T>: Send + Sync {
    /// Append the work for `action` (at position `index` in the automation's
    /// action list) to `queue`
    fn enqueue(
        &self,
        action: &Action<T>,
        index: usize,
        queue: &mut VecDeque<WorkItem<T>>,
    ) -> Result<(), BuildError>;
}

impl<T> fmt::Debug for dyn ActionExecutor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionExecutor")
    }
}

/// Lookup from action kind to executor
pub struct ExecutorRegistry<T> {
    executors: HashMap<ActionKind, Arc<dyn ActionExecutor<T>>>,
}

impl<T> ExecutorRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Create a registry with executors for all built-in action kinds
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ActionKind::Delay, Arc::new(DelayExecutor));
        registry.register(ActionKind::Command, Arc::new(CommandExecutor));
        registry.register(ActionKind::RepeatPrevious, Arc::new(RepeatPreviousExecutor));
        registry.register(ActionKind::RepeatUntil, Arc::new(RepeatUntilExecutor));
        registry
    }

    /// Plug in an executor for an action kind
    pub fn register(&mut self, kind: ActionKind, executor: Arc<dyn ActionExecutor<T>>) {
        self.executors.insert(kind, executor);
    }

    /// Resolve the executor for `kind`
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnregisteredAction`] when no executor is
    /// registered - a configuration error, never skipped.
    pub fn resolve(&self, kind: ActionKind) -> Result<&Arc<dyn ActionExecutor<T>>, BuildError> {
        self.executors
            .get(&kind)
            .ok_or(BuildError::UnregisteredAction(kind))
    }
}

impl<T> Default for ExecutorRegistry<T> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Executor for [`ActionBody::Delay`]
pub struct DelayExecutor;

impl<T> ActionExecutor<T> for DelayExecutor {
    fn enqueue(
        &self,
        action: &Action<T>,
        index: usize,
        queue: &mut VecDeque<WorkItem<T>>,
    ) -> Result<(), BuildError> {
        if let ActionBody::Delay { duration } = &action.body {
            queue.push_back(WorkItem::Delay {
                duration: *duration,
                action: index,
            });
        } else {
            trace!(index, "delay executor given non-delay action; no work");
        }
        Ok(())
    }
}

/// Executor for [`ActionBody::Command`]
pub struct CommandExecutor;

impl<T> ActionExecutor<T> for CommandExecutor {
    fn enqueue(
        &self,
        action: &Action<T>,
        index: usize,
        queue: &mut VecDeque<WorkItem<T>>,
    ) -> Result<(), BuildError> {
        if let ActionBody::Command { run } = &action.body {
            queue.push_back(WorkItem::Command {
                run: Arc::clone(run),
                action: index,
            });
        } else {
            trace!(index, "command executor given non-command action; no work");
        }
        Ok(())
    }
}

/// Executor for [`ActionBody::RepeatPrevious`]
///
/// Clones the last `count` already-enqueued work items and appends them once,
/// preserving their original order.
pub struct RepeatPreviousExecutor;

impl<T> ActionExecutor<T> for RepeatPreviousExecutor {
    fn enqueue(
        &self,
        action: &Action<T>,
        index: usize,
        queue: &mut VecDeque<WorkItem<T>>,
    ) -> Result<(), BuildError> {
        let ActionBody::RepeatPrevious { count } = &action.body else {
            trace!(index, "repeat executor given non-repeat action; no work");
            return Ok(());
        };

        if *count == 0 {
            return Err(BuildError::ZeroRepeatCount { index });
        }
        if *count > queue.len() {
            return Err(BuildError::NoPrecedingWork { index });
        }

        let start = queue.len() - count;
        let copies: Vec<WorkItem<T>> = queue.iter().skip(start).cloned().collect();
        trace!(index, count, "replaying preceding work items");
        queue.extend(copies);
        Ok(())
    }
}

/// Executor for [`ActionBody::RepeatUntil`]
///
/// Wraps a fresh copy of the single immediately-preceding work item; the run
/// loop replays the copy until the predicate holds or the circuit breaker
/// count is reached.
pub struct RepeatUntilExecutor;

impl<T> ActionExecutor<T> for RepeatUntilExecutor {
    fn enqueue(
        &self,
        action: &Action<T>,
        index: usize,
        queue: &mut VecDeque<WorkItem<T>>,
    ) -> Result<(), BuildError> {
        let ActionBody::RepeatUntil {
            predicate,
            max_iterations,
        } = &action.body
        else {
            trace!(index, "repeat-until executor given other action; no work");
            return Ok(());
        };

        let previous = queue
            .back()
            .cloned()
            .ok_or(BuildError::NoPrecedingWork { index })?;

        queue.push_back(WorkItem::RepeatUntil {
            item: Box::new(previous),
            predicate: Arc::clone(predicate),
            max_iterations: *max_iterations,
            action: index,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(items: Vec<WorkItem<u32>>) -> VecDeque<WorkItem<u32>> {
        items.into_iter().collect()
    }

    #[test]
    fn test_registry_resolves_defaults() {
        let registry: ExecutorRegistry<u32> = ExecutorRegistry::with_defaults();
        for kind in [
            ActionKind::Delay,
            ActionKind::Command,
            ActionKind::RepeatPrevious,
            ActionKind::RepeatUntil,
        ] {
            assert!(registry.resolve(kind).is_ok());
        }
    }

    #[test]
    fn test_empty_registry_fails_loudly() {
        let registry: ExecutorRegistry<u32> = ExecutorRegistry::new();
        let err = registry.resolve(ActionKind::Delay).unwrap_err();
        assert!(matches!(err, BuildError::UnregisteredAction(ActionKind::Delay)));
    }

    #[test]
    fn test_delay_executor_enqueues_delay() {
        let mut queue = queue_of(vec![]);
        let action = Action::<u32>::delay(Duration::from_secs(3));

        DelayExecutor.enqueue(&action, 0, &mut queue).unwrap();

        assert_eq!(queue.len(), 1);
        assert!(matches!(
            queue[0],
            WorkItem::Delay { duration, action: 0 } if duration == Duration::from_secs(3)
        ));
    }

    #[test]
    fn test_repeat_previous_clones_last_items_in_order() {
        let mut queue = queue_of(vec![
            WorkItem::Command {
                run: Arc::new(|v: &mut u32| {
                    *v += 1;
                    Ok(())
                }),
                action: 0,
            },
            WorkItem::Delay {
                duration: Duration::from_secs(1),
                action: 1,
            },
        ]);
        let action = Action::<u32>::repeat_previous(2);

        RepeatPreviousExecutor.enqueue(&action, 2, &mut queue).unwrap();

        assert_eq!(queue.len(), 4);
        assert!(matches!(queue[2], WorkItem::Command { action: 0, .. }));
        assert!(matches!(queue[3], WorkItem::Delay { action: 1, .. }));
    }

    #[test]
    fn test_repeat_previous_without_enough_work_fails() {
        let mut queue = queue_of(vec![WorkItem::Delay {
            duration: Duration::from_secs(1),
            action: 0,
        }]);
        let action = Action::<u32>::repeat_previous(2);

        let err = RepeatPreviousExecutor
            .enqueue(&action, 1, &mut queue)
            .unwrap_err();
        assert!(matches!(err, BuildError::NoPrecedingWork { index: 1 }));
    }

    #[test]
    fn test_repeat_previous_zero_count_fails() {
        let mut queue = queue_of(vec![WorkItem::Delay {
            duration: Duration::from_secs(1),
            action: 0,
        }]);
        let action = Action::<u32>::repeat_previous(0);

        let err = RepeatPreviousExecutor
            .enqueue(&action, 1, &mut queue)
            .unwrap_err();
        assert!(matches!(err, BuildError::ZeroRepeatCount { index: 1 }));
    }

    #[test]
    fn test_repeat_until_wraps_preceding_item() {
        let mut queue = queue_of(vec![WorkItem::Command {
            run: Arc::new(|v: &mut u32| {
                *v += 1;
                Ok(())
            }),
            action: 0,
        }]);
        let action = Action::<u32>::repeat_until(|v| *v >= 10, 5);

        RepeatUntilExecutor.enqueue(&action, 1, &mut queue).unwrap();

        assert_eq!(queue.len(), 2);
        match &queue[1] {
            WorkItem::RepeatUntil {
                item,
                max_iterations,
                action,
                ..
            } => {
                assert_eq!(*max_iterations, 5);
                assert_eq!(*action, 1);
                assert!(matches!(**item, WorkItem::Command { action: 0, .. }));
            }
            other => panic!("expected repeat-until item, got {other:?}"),
        }
    }

    #[test]
    fn test_repeat_until_on_empty_queue_fails() {
        let mut queue: VecDeque<WorkItem<u32>> = VecDeque::new();
        let action = Action::<u32>::repeat_until(|v| *v >= 10, 5);

        let err = RepeatUntilExecutor.enqueue(&action, 0, &mut queue).unwrap_err();
        assert!(matches!(err, BuildError::NoPrecedingWork { index: 0 }));
    }
}
