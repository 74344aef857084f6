//! Action queue construction
//!
//! The builder walks an automation's actions in order and asks the executor
//! registry to turn each one into work items. Expansion happens once per
//! execution request, never ahead of time, because repeat-until termination
//! depends on live runtime values.

use std::collections::VecDeque;
use std::sync::Arc;

use reflex_automation::Automation;
use tracing::debug;

use crate::executor::{BuildError, ExecutorRegistry, WorkItem};

/// Expands an automation's action list into an ordered work-item queue
pub struct ActionQueueBuilder<T> {
    registry: Arc<ExecutorRegistry<T>>,
}

impl<T> ActionQueueBuilder<T> {
    /// Create a builder backed by `registry`
    pub fn new(registry: Arc<ExecutorRegistry<T>>) -> Self {
        Self { registry }
    }

    /// Build the work-item queue for one execution request
    ///
    /// # Errors
    ///
    /// Propagates [`BuildError`] for unregistered action kinds and repeat
    /// actions with nothing to replay - configuration errors surfaced at
    /// build time, never deferred into the run.
    pub fn build(&self, automation: &Automation<T>) -> Result<VecDeque<WorkItem<T>>, BuildError> {
        let mut queue = VecDeque::with_capacity(automation.actions.len());

        for (index, action) in automation.actions.iter().enumerate() {
            let executor = self.registry.resolve(action.kind())?;
            executor.enqueue(action, index, &mut queue)?;
        }

        debug!(
            automation = automation.display_name(),
            actions = automation.actions.len(),
            work_items = queue.len(),
            "built action queue"
        );
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_automation::{Action, ActionKind};
    use std::time::Duration;

    fn builder() -> ActionQueueBuilder<u32> {
        ActionQueueBuilder::new(Arc::new(ExecutorRegistry::with_defaults()))
    }

    #[test]
    fn test_build_preserves_action_order() {
        let automation = Automation::builder()
            .action(Action::command(|v: &mut u32| *v += 1))
            .action(Action::delay(Duration::from_secs(2)))
            .action(Action::command(|v: &mut u32| *v *= 2))
            .build();

        let queue = builder().build(&automation).unwrap();

        assert_eq!(queue.len(), 3);
        assert!(matches!(queue[0], WorkItem::Command { action: 0, .. }));
        assert!(matches!(queue[1], WorkItem::Delay { action: 1, .. }));
        assert!(matches!(queue[2], WorkItem::Command { action: 2, .. }));
    }

    #[test]
    fn test_build_expands_repeat_previous() {
        // delay + command replayed as a unit
        let automation = Automation::builder()
            .action(Action::delay(Duration::from_secs(1)))
            .action(Action::command(|v: &mut u32| *v += 1))
            .action(Action::repeat_previous(2))
            .build();

        let queue = builder().build(&automation).unwrap();

        assert_eq!(queue.len(), 4);
        assert!(matches!(queue[2], WorkItem::Delay { action: 0, .. }));
        assert!(matches!(queue[3], WorkItem::Command { action: 1, .. }));
    }

    #[test]
    fn test_build_rejects_leading_repeat() {
        let automation: Automation<u32> = Automation::builder()
            .action(Action::repeat_previous(1))
            .build();

        let err = builder().build(&automation).unwrap_err();
        assert!(matches!(err, BuildError::NoPrecedingWork { index: 0 }));
    }

    #[test]
    fn test_build_fails_on_unregistered_kind() {
        let mut registry: ExecutorRegistry<u32> = ExecutorRegistry::new();
        // Deliberately leave out the delay executor
        registry.register(
            ActionKind::Command,
            Arc::new(crate::executor::CommandExecutor),
        );
        let builder = ActionQueueBuilder::new(Arc::new(registry));

        let automation = Automation::builder()
            .action(Action::<u32>::delay(Duration::from_secs(1)))
            .build();

        let err = builder.build(&automation).unwrap_err();
        assert!(matches!(
            err,
            BuildError::UnregisteredAction(ActionKind::Delay)
        ));
    }

    #[test]
    fn test_queue_rebuilt_per_request() {
        let automation = Automation::builder()
            .action(Action::command(|v: &mut u32| *v += 1))
            .action(Action::repeat_until(|v: &u32| *v >= 3, 10))
            .build();

        let builder = builder();
        let first = builder.build(&automation).unwrap();
        let second = builder.build(&automation).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
    }
}
