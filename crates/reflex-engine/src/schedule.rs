//! Delay and schedule calculation
//!
//! The calculator is a pure function over pending scheduled actions; an
//! external host timer loop uses it to learn when to next invoke the engine.
//! No background scheduler runs in this crate.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A delayed action waiting to come due, as persisted by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAction {
    /// Unique identifier
    pub id: String,

    /// The automation this action belongs to
    pub automation_id: String,

    /// When this action is due
    pub due_at: DateTime<Utc>,

    /// Whether this action already ran
    pub executed: bool,

    /// When this action ran
    pub executed_at: Option<DateTime<Utc>>,
}

impl ScheduledAction {
    /// Create a pending scheduled action due at `due_at`
    pub fn new(automation_id: impl Into<String>, due_at: DateTime<Utc>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            automation_id: automation_id.into(),
            due_at,
            executed: false,
            executed_at: None,
        }
    }

    /// Stamp this action as executed now
    pub fn mark_executed(&mut self) {
        self.executed = true;
        self.executed_at = Some(Utc::now());
    }
}

/// The next scheduled action to fire and how long until it is due
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextDue {
    /// Id of the scheduled action due next
    pub action_id: String,

    /// Span until it is due; zero when already overdue
    pub wait: Duration,
}

/// Compute which pending action fires next and the wait until then
///
/// Executed actions are ignored. An overdue action yields a zero wait rather
/// than a negative one. Returns `None` when nothing is pending.
pub fn next_due(pending: &[ScheduledAction], now: DateTime<Utc>) -> Option<NextDue> {
    let next = pending
        .iter()
        .filter(|action| !action.executed)
        .min_by_key(|action| action.due_at)?;

    let wait = (next.due_at - now).to_std().unwrap_or(Duration::ZERO);
    trace!(action = %next.id, ?wait, "computed next due action");
    Some(NextDue {
        action_id: next.id.clone(),
        wait,
    })
}
