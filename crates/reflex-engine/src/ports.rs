//! Persistence ports
//!
//! Trait boundaries for an external persistence layer. The engine consumes
//! these; it ships no storage backend of its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reflex_automation::Automation;
use thiserror::Error;

use crate::schedule::ScheduledAction;

/// Errors surfaced by a store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// CRUD over automations keyed by id
#[async_trait]
pub trait AutomationStore<T>: Send + Sync {
    /// Persist a new automation
    async fn insert(&self, automation: Automation<T>) -> StoreResult<()>;

    /// Load an automation by id
    async fn get(&self, id: &str) -> StoreResult<Automation<T>>;

    /// Replace an existing automation
    async fn update(&self, automation: Automation<T>) -> StoreResult<()>;

    /// Delete an automation by id
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

/// Queries over delayed actions waiting to come due
#[async_trait]
pub trait ScheduledActionStore: Send + Sync {
    /// All active, non-executed scheduled actions
    async fn pending(&self) -> StoreResult<Vec<ScheduledAction>>;

    /// The earliest-due pending action, if any
    async fn first_upcoming(&self) -> StoreResult<Option<ScheduledAction>>;

    /// Stamp an action as executed at `at`
    async fn mark_executed(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()>;

    /// When the previous completed action of `automation_id` finished,
    /// used to compute relative delays
    async fn last_completed_at(&self, automation_id: &str) -> StoreResult<Option<DateTime<Utc>>>;
}
