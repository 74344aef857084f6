//! Action types
//!
//! Actions are the ordered steps of an automation run. Four variants exist:
//! a pure wait ([`ActionBody::Delay`]), a caller-supplied command invoked
//! against the candidate value ([`ActionBody::Command`]), and two repeat
//! forms that replay previously built work - a fixed-count replay
//! ([`ActionBody::RepeatPrevious`]) and a predicate-terminated replay bounded
//! by a circuit-breaker count ([`ActionBody::RepeatUntil`]).
//!
//! Ordering is significant: a repeat action always refers to the work items
//! positioned immediately before it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure raised by a command closure, captured into the run result
#[derive(Debug, Clone, Error)]
#[error("command failed: {0}")]
pub struct CommandError(String);

impl CommandError {
    /// Create a command error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A command invoked against the candidate value
pub type Command<T> = Arc<dyn Fn(&mut T) -> Result<(), CommandError> + Send + Sync>;

/// Termination predicate for repeat-until actions
pub type RepeatPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Stable discriminator used by the executor registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Delay,
    Command,
    RepeatPrevious,
    RepeatUntil,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Delay => f.write_str("delay"),
            ActionKind::Command => f.write_str("command"),
            ActionKind::RepeatPrevious => f.write_str("repeat_previous"),
            ActionKind::RepeatUntil => f.write_str("repeat_until"),
        }
    }
}

/// One step of an automation, with its execution bookkeeping
pub struct Action<T> {
    /// Unique identifier
    pub id: String,

    /// Whether this action has run at least once
    pub executed: bool,

    /// When this action last ran
    pub executed_at: Option<DateTime<Utc>>,

    /// The work this action describes
    pub body: ActionBody<T>,
}

/// Tagged action variant
pub enum ActionBody<T> {
    /// Wait for a duration, observing cancellation
    Delay { duration: Duration },

    /// Invoke a command against the candidate value
    Command { run: Command<T> },

    /// Replay the immediately preceding `count` work items once
    RepeatPrevious { count: usize },

    /// Replay the single preceding work item until the predicate holds,
    /// or at most `max_iterations` times (the circuit breaker)
    RepeatUntil {
        predicate: RepeatPredicate<T>,
        max_iterations: usize,
    },
}

impl<T> Action<T> {
    fn with_body(body: ActionBody<T>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            executed: false,
            executed_at: None,
            body,
        }
    }

    /// A pure wait
    pub fn delay(duration: Duration) -> Self {
        Self::with_body(ActionBody::Delay { duration })
    }

    /// A command that cannot fail
    pub fn command(run: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        Self::with_body(ActionBody::Command {
            run: Arc::new(move |value| {
                run(value);
                Ok(())
            }),
        })
    }

    /// A command that may fail; the error is captured into the run result
    pub fn try_command(
        run: impl Fn(&mut T) -> Result<(), CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_body(ActionBody::Command { run: Arc::new(run) })
    }

    /// Replay the preceding `count` work items once
    pub fn repeat_previous(count: usize) -> Self {
        Self::with_body(ActionBody::RepeatPrevious { count })
    }

    /// Replay the preceding work item until `predicate` holds, bounded by
    /// the `max_iterations` circuit breaker
    pub fn repeat_until(
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
        max_iterations: usize,
    ) -> Self {
        Self::with_body(ActionBody::RepeatUntil {
            predicate: Arc::new(predicate),
            max_iterations,
        })
    }

    /// The registry discriminator for this action
    pub fn kind(&self) -> ActionKind {
        match &self.body {
            ActionBody::Delay { .. } => ActionKind::Delay,
            ActionBody::Command { .. } => ActionKind::Command,
            ActionBody::RepeatPrevious { .. } => ActionKind::RepeatPrevious,
            ActionBody::RepeatUntil { .. } => ActionKind::RepeatUntil,
        }
    }

    /// Stamp this action as executed now
    pub fn mark_executed(&mut self) {
        self.executed = true;
        self.executed_at = Some(Utc::now());
    }
}

impl<T> Clone for Action<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            executed: self.executed,
            executed_at: self.executed_at,
            body: self.body.clone(),
        }
    }
}

impl<T> Clone for ActionBody<T> {
    fn clone(&self) -> Self {
        match self {
            ActionBody::Delay { duration } => ActionBody::Delay {
                duration: *duration,
            },
            ActionBody::Command { run } => ActionBody::Command {
                run: Arc::clone(run),
            },
            ActionBody::RepeatPrevious { count } => ActionBody::RepeatPrevious { count: *count },
            ActionBody::RepeatUntil {
                predicate,
                max_iterations,
            } => ActionBody::RepeatUntil {
                predicate: Arc::clone(predicate),
                max_iterations: *max_iterations,
            },
        }
    }
}

impl<T> fmt::Debug for Action<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("executed", &self.executed)
            .field("executed_at", &self.executed_at)
            .finish_non_exhaustive()
    }
}
