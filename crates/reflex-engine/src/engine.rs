//! Automation execution
//!
//! One run walks five phases: gate on the active flag, evaluate conditions,
//! build the work queue, run the queue, settle the result. Cancellation -
//! external or raised by the run's own timeout - aborts the run with an
//! error; a failing command is an expected outcome and settles into the
//! returned [`ActionResult`] instead.

use std::sync::Arc;

use reflex_automation::{Automation, CommandError, ConditionEvaluator};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::executor::{BuildError, ExecutorRegistry, WorkItem};
use crate::queue::ActionQueueBuilder;

/// Errors that abort a run before it can settle
#[derive(Debug, Error)]
pub enum EngineError {
    /// The run was cancelled, externally or by its own timeout
    #[error("execution cancelled")]
    Cancelled,

    /// The automation's action list could not be turned into a work queue
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Settled outcome of one execution request
///
/// Owns the candidate value back, carrying whatever mutations the actions
/// applied before the run settled. A gated or condition-rejected request
/// settles with `succeeded: false` and the value untouched.
#[derive(Debug)]
pub struct ActionResult<T> {
    /// Whether the run got through every work item
    pub succeeded: bool,

    /// The candidate value after the run
    pub value: T,

    /// The command failure that stopped the run, if any
    pub error: Option<CommandError>,
}

impl<T> ActionResult<T> {
    fn succeeded(value: T) -> Self {
        Self {
            succeeded: true,
            value,
            error: None,
        }
    }

    fn skipped(value: T) -> Self {
        Self {
            succeeded: false,
            value,
            error: None,
        }
    }

    fn failed(value: T, error: CommandError) -> Self {
        Self {
            succeeded: false,
            value,
            error: Some(error),
        }
    }
}

/// Outcome of a single work item, internal to the run loop
enum RunError {
    Cancelled,
    Command(CommandError),
}

/// Cancels the run when the execution timeout elapses
///
/// Dropping the guard aborts the timer, so a run that settles in time never
/// gets a late cancellation.
struct TimeoutGuard {
    timer: JoinHandle<()>,
}

impl TimeoutGuard {
    fn arm(timeout: std::time::Duration, cancel: &CancellationToken) -> Self {
        let token = cancel.clone();
        let timer = tokio::spawn(async move {
            sleep(timeout).await;
            warn!(?timeout, "execution timeout elapsed; cancelling run");
            token.cancel();
        });
        Self { timer }
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// Runs automations against candidate values
pub struct AutomationService<T> {
    builder: ActionQueueBuilder<T>,
    conditions: ConditionEvaluator,
}

impl<T> AutomationService<T> {
    /// Create a service with the built-in action executors
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ExecutorRegistry::with_defaults()))
    }

    /// Create a service over a custom executor registry
    pub fn with_registry(registry: Arc<ExecutorRegistry<T>>) -> Self {
        Self {
            builder: ActionQueueBuilder::new(registry),
            conditions: ConditionEvaluator::new(),
        }
    }

    /// Evaluate an automation's conditions against a value without running it
    ///
    /// Pure with respect to both arguments; calling this any number of times
    /// leaves the automation and the value as they were.
    pub fn validate_conditions(&self, automation: &Automation<T>, value: &T) -> bool {
        self.conditions.evaluate(&automation.conditions, value)
    }

    /// Execute one request for `automation` against `value`
    ///
    /// An inactive automation or failing conditions settle immediately with
    /// `succeeded: false` and the value untouched. The automation's
    /// execution timeout, when set, arms a timer on `cancel`, so external
    /// cancellation and timeout abort the run the same way.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Build`] when the action list is misconfigured
    /// and [`EngineError::Cancelled`] when the run is cut short. Command
    /// failures do not error; they settle into the [`ActionResult`].
    pub async fn execute(
        &self,
        automation: &mut Automation<T>,
        value: T,
        cancel: &CancellationToken,
    ) -> Result<ActionResult<T>, EngineError> {
        if !automation.is_active {
            debug!(
                automation = automation.display_name(),
                "inactive; skipping execution"
            );
            return Ok(ActionResult::skipped(value));
        }

        if !self.validate_conditions(automation, &value) {
            debug!(
                automation = automation.display_name(),
                "conditions rejected execution request"
            );
            return Ok(ActionResult::skipped(value));
        }

        let mut queue = self.builder.build(automation)?;

        let _timeout = automation
            .execution_timeout
            .map(|timeout| TimeoutGuard::arm(timeout, cancel));

        info!(
            automation = automation.display_name(),
            work_items = queue.len(),
            "executing automation"
        );

        let mut value = value;
        while let Some(item) = queue.pop_front() {
            match self.run_item(&item, &mut value, cancel).await {
                Ok(()) => {
                    if let Some(action) = automation.actions.get_mut(item.action_index()) {
                        action.mark_executed();
                    }
                }
                Err(RunError::Cancelled) => {
                    warn!(
                        automation = automation.display_name(),
                        "run cancelled mid-queue"
                    );
                    return Err(EngineError::Cancelled);
                }
                Err(RunError::Command(error)) => {
                    warn!(
                        automation = automation.display_name(),
                        %error,
                        "command failed; settling run"
                    );
                    return Ok(ActionResult::failed(value, error));
                }
            }
        }

        debug!(automation = automation.display_name(), "run settled");
        Ok(ActionResult::succeeded(value))
    }

    async fn run_item(
        &self,
        item: &WorkItem<T>,
        value: &mut T,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        match item {
            WorkItem::Delay { duration, .. } => {
                trace!(?duration, "delaying");
                tokio::select! {
                    _ = cancel.cancelled() => Err(RunError::Cancelled),
                    _ = sleep(*duration) => Ok(()),
                }
            }
            WorkItem::Command { run, .. } => run(value).map_err(RunError::Command),
            WorkItem::RepeatUntil {
                item,
                predicate,
                max_iterations,
                ..
            } => {
                for iteration in 0..*max_iterations {
                    if predicate(value) {
                        trace!(iteration, "repeat predicate satisfied");
                        return Ok(());
                    }
                    Box::pin(self.run_item(item, value, cancel)).await?;
                }
                debug!(max_iterations, "repeat circuit breaker reached");
                Ok(())
            }
        }
    }
}

impl<T> Default for AutomationService<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_automation::{Action, Condition, Operator};
    use std::time::Duration;

    fn service() -> AutomationService<u32> {
        AutomationService::new()
    }

    #[tokio::test]
    async fn test_inactive_automation_returns_untouched_value() {
        let mut automation = Automation::builder()
            .action(Action::command(|v: &mut u32| *v += 100))
            .build();

        let result = service()
            .execute(&mut automation, 7, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.value, 7);
        assert!(!automation.actions[0].executed);
    }

    #[tokio::test]
    async fn test_failed_conditions_skip_actions() {
        let mut automation = Automation::builder()
            .id("auto")
            .active(true)
            .condition(Condition::new("auto", Operator::And, |v: &u32| *v > 100))
            .action(Action::command(|v: &mut u32| *v += 1))
            .build();

        let result = service()
            .execute(&mut automation, 7, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.value, 7);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_command_failure_settles_into_result() {
        let mut automation = Automation::builder()
            .active(true)
            .action(Action::command(|v: &mut u32| *v += 1))
            .action(Action::try_command(|_: &mut u32| {
                Err(CommandError::new("device unreachable"))
            }))
            .action(Action::command(|v: &mut u32| *v += 100))
            .build();

        let result = service()
            .execute(&mut automation, 0, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.value, 1);
        assert_eq!(
            result.error.unwrap().to_string(),
            "command failed: device unreachable"
        );
        assert!(automation.actions[0].executed);
        assert!(!automation.actions[1].executed);
        assert!(!automation.actions[2].executed);
    }

    #[tokio::test]
    async fn test_build_error_propagates() {
        let mut automation: Automation<u32> = Automation::builder()
            .active(true)
            .action(Action::repeat_previous(3))
            .build();

        let err = service()
            .execute(&mut automation, 0, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Build(BuildError::NoPrecedingWork { index: 0 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancel_aborts_mid_delay() {
        let mut automation = Automation::builder()
            .active(true)
            .action(Action::<u32>::delay(Duration::from_secs(60)))
            .build();

        let cancel = CancellationToken::new();
        let trip = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trip.cancel();
        });

        let err = service()
            .execute(&mut automation, 0, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        assert!(!automation.actions[0].executed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_guard_dropped_on_settle() {
        let mut automation = Automation::builder()
            .active(true)
            .execution_timeout(Duration::from_secs(5))
            .action(Action::command(|v: &mut u32| *v += 1))
            .build();

        let cancel = CancellationToken::new();
        let result = service()
            .execute(&mut automation, 0, &cancel)
            .await
            .unwrap();

        assert!(result.succeeded);
        // The timer was aborted with the guard; the token stays live
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!cancel.is_cancelled());
    }
}
