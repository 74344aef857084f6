//! Execution engine for reflex automations
//!
//! Turns an automation's action list into a work queue and runs it against a
//! candidate value under timeout and cancellation guarantees:
//!
//! ```text
//! GATE → EVALUATE → BUILD → RUN → SETTLE
//! ```
//!
//! - **Gate**: an inactive automation settles immediately, value untouched
//! - **Evaluate**: conditions are checked against the incoming value
//! - **Build**: the [`ActionQueueBuilder`] expands actions into work items
//!   via the [`ExecutorRegistry`]; misconfiguration fails here, loudly
//! - **Run**: items execute in order; delays observe the run's
//!   [`CancellationToken`](tokio_util::sync::CancellationToken), which the
//!   execution timeout shares
//! - **Settle**: the mutated value comes back in an [`ActionResult`];
//!   command failures settle, cancellation errors
//!
//! The [`ports`] module holds the trait boundary toward an external
//! persistence layer, and [`schedule`] the pure next-due calculator its host
//! timer loop uses.

pub mod engine;
pub mod executor;
pub mod ports;
pub mod queue;
pub mod schedule;

pub use engine::{ActionResult, AutomationService, EngineError};
pub use executor::{ActionExecutor, BuildError, ExecutorRegistry, WorkItem};
pub use ports::{AutomationStore, ScheduledActionStore, StoreError, StoreResult};
pub use queue::ActionQueueBuilder;
pub use schedule::{next_due, NextDue, ScheduledAction};
