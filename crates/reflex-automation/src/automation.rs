//! Automation aggregate and lifecycle management
//!
//! An automation ties together triggers, conditions, and actions over one
//! candidate value type. The [`AutomationManager`] handles the in-memory
//! lifecycle of all automations: registration, enable/disable, and run-count
//! bookkeeping for the execution modes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::action::Action;
use crate::condition::Condition;
use crate::trigger::TriggerHandle;

/// Automation errors
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("automation not found: {0}")]
    NotFound(String),

    #[error("automation with id {0} already exists")]
    AlreadyExists(String),
}

/// Result type for automation operations
pub type AutomationResult<T> = Result<T, AutomationError>;

/// Execution mode for automations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Default - ignore new requests while a run is in flight
    #[default]
    Single,

    /// Restart from the beginning on a new request
    Restart,

    /// Queue requests (up to max)
    Queued { max: usize },

    /// Run simultaneously (up to max)
    Parallel { max: usize },
}

/// A unit of automated work: conditions gating an ordered action list,
/// kicked off by triggers
///
/// New automations start inactive; an inactive automation never executes
/// its actions regardless of conditions. Dropping an automation drops its
/// [`TriggerHandle`]s, unsubscribing any watchers still attached to live
/// sources.
pub struct Automation<T> {
    /// Unique identifier
    pub id: String,

    /// Human-readable name
    pub alias: Option<String>,

    /// Whether this automation may execute at all
    pub is_active: bool,

    /// How concurrent execution requests are gated
    pub mode: ExecutionMode,

    /// Wall-clock bound for a single run
    pub execution_timeout: Option<Duration>,

    /// Gating predicates, evaluated in order on every execution request
    pub conditions: Vec<Condition<T>>,

    /// Ordered steps of one run
    pub actions: Vec<Action<T>>,

    /// Live watcher subscriptions; dropped (and thereby unsubscribed)
    /// together with the automation
    pub triggers: Vec<TriggerHandle>,

    /// Last time a trigger kicked this automation off
    pub last_triggered: Option<DateTime<Utc>>,

    /// Number of runs currently in flight
    pub current_runs: usize,
}

impl<T> Automation<T> {
    /// Create a builder for constructing an [`Automation`]
    pub fn builder() -> AutomationBuilder<T> {
        AutomationBuilder::default()
    }

    /// Get the display name (alias or id)
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }

    /// Attach a live trigger subscription to this automation's lifetime
    pub fn attach_trigger(&mut self, handle: TriggerHandle) {
        self.triggers.push(handle);
    }

    /// Whether a new run may start under this automation's execution mode
    pub fn can_run(&self) -> bool {
        if !self.is_active {
            return false;
        }

        match self.mode {
            ExecutionMode::Single => self.current_runs == 0,
            ExecutionMode::Restart => true,
            ExecutionMode::Queued { max } => self.current_runs < max,
            ExecutionMode::Parallel { max } => self.current_runs < max,
        }
    }
}

impl<T> fmt::Debug for Automation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Automation")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("is_active", &self.is_active)
            .field("mode", &self.mode)
            .field("execution_timeout", &self.execution_timeout)
            .field("conditions", &self.conditions.len())
            .field("actions", &self.actions.len())
            .field("triggers", &self.triggers.len())
            .finish_non_exhaustive()
    }
}

/// Step-by-step builder for [`Automation`]
pub struct AutomationBuilder<T> {
    id: Option<String>,
    alias: Option<String>,
    is_active: bool,
    mode: ExecutionMode,
    execution_timeout: Option<Duration>,
    conditions: Vec<Condition<T>>,
    actions: Vec<Action<T>>,
}

impl<T> Default for AutomationBuilder<T> {
    fn default() -> Self {
        Self {
            id: None,
            alias: None,
            is_active: false,
            mode: ExecutionMode::default(),
            execution_timeout: None,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }
}

impl<T> AutomationBuilder<T> {
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition<T>) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn action(mut self, action: Action<T>) -> Self {
        self.actions.push(action);
        self
    }

    /// Consume the builder and return the automation
    pub fn build(self) -> Automation<T> {
        Automation {
            id: self.id.unwrap_or_else(|| ulid::Ulid::new().to_string()),
            alias: self.alias,
            is_active: self.is_active,
            mode: self.mode,
            execution_timeout: self.execution_timeout,
            conditions: self.conditions,
            actions: self.actions,
            triggers: Vec::new(),
            last_triggered: None,
            current_runs: 0,
        }
    }
}

/// Manages all automations for one candidate value type
pub struct AutomationManager<T> {
    automations: DashMap<String, Automation<T>>,
}

impl<T> AutomationManager<T> {
    /// Create a new automation manager
    pub fn new() -> Self {
        Self {
            automations: DashMap::new(),
        }
    }

    /// Register an automation
    pub fn add(&self, automation: Automation<T>) -> AutomationResult<String> {
        let id = automation.id.clone();

        if self.automations.contains_key(&id) {
            return Err(AutomationError::AlreadyExists(id));
        }

        info!(
            automation = automation.display_name(),
            id = %automation.id,
            "added automation"
        );
        self.automations.insert(id.clone(), automation);
        Ok(id)
    }

    /// Remove an automation, dropping its trigger subscriptions
    pub fn remove(&self, id: &str) -> AutomationResult<Automation<T>> {
        self.automations
            .remove(id)
            .map(|(_, automation)| automation)
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))
    }

    /// Number of registered automations
    pub fn count(&self) -> usize {
        self.automations.len()
    }

    /// Read access to an automation under the map guard
    pub fn with<R>(&self, id: &str, f: impl FnOnce(&Automation<T>) -> R) -> Option<R> {
        self.automations.get(id).map(|entry| f(entry.value()))
    }

    /// Write access to an automation under the map guard
    pub fn with_mut<R>(&self, id: &str, f: impl FnOnce(&mut Automation<T>) -> R) -> Option<R> {
        self.automations
            .get_mut(id)
            .map(|mut entry| f(entry.value_mut()))
    }

    /// Activate an automation
    pub fn enable(&self, id: &str) -> AutomationResult<()> {
        self.set_active(id, true)
    }

    /// Deactivate an automation
    pub fn disable(&self, id: &str) -> AutomationResult<()> {
        self.set_active(id, false)
    }

    /// Flip an automation's active flag, returning the new state
    pub fn toggle(&self, id: &str) -> AutomationResult<bool> {
        let mut automation = self
            .automations
            .get_mut(id)
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))?;

        automation.is_active = !automation.is_active;
        info!(
            automation = automation.display_name(),
            active = automation.is_active,
            "toggled automation"
        );
        Ok(automation.is_active)
    }

    /// Whether a new run may start, per the automation's execution mode
    pub fn can_run(&self, id: &str) -> AutomationResult<bool> {
        self.with(id, Automation::can_run)
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))
    }

    /// Record that a trigger kicked this automation off
    pub fn mark_triggered(&self, id: &str) {
        if let Some(mut automation) = self.automations.get_mut(id) {
            automation.last_triggered = Some(Utc::now());
            debug!(automation = automation.display_name(), "marked triggered");
        }
    }

    /// Record the start of a run
    pub fn increment_runs(&self, id: &str) {
        if let Some(mut automation) = self.automations.get_mut(id) {
            automation.current_runs += 1;
            debug!(
                automation = automation.display_name(),
                runs = automation.current_runs,
                "run started"
            );
        }
    }

    /// Record the end of a run
    pub fn decrement_runs(&self, id: &str) {
        if let Some(mut automation) = self.automations.get_mut(id) {
            automation.current_runs = automation.current_runs.saturating_sub(1);
            debug!(
                automation = automation.display_name(),
                runs = automation.current_runs,
                "run finished"
            );
        }
    }

    fn set_active(&self, id: &str, active: bool) -> AutomationResult<()> {
        let mut automation = self
            .automations
            .get_mut(id)
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))?;

        automation.is_active = active;
        info!(
            automation = automation.display_name(),
            active, "set automation active flag"
        );
        Ok(())
    }
}

impl<T> Default for AutomationManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;

    fn sample() -> Automation<u32> {
        Automation::builder()
            .id("test_automation")
            .alias("Test Automation")
            .active(true)
            .condition(Condition::new("test_automation", Operator::And, |v| *v > 0))
            .action(Action::command(|v| *v += 1))
            .build()
    }

    #[test]
    fn test_new_automation_defaults_to_inactive() {
        let automation: Automation<u32> = Automation::builder().build();
        assert!(!automation.is_active);
        assert_eq!(automation.mode, ExecutionMode::Single);
        assert!(automation.execution_timeout.is_none());
        assert!(automation.last_triggered.is_none());
    }

    #[test]
    fn test_builder_generates_id_when_missing() {
        let automation: Automation<u32> = Automation::builder().build();
        // ULID format
        assert_eq!(automation.id.len(), 26);
    }

    #[test]
    fn test_display_name_prefers_alias() {
        let automation = sample();
        assert_eq!(automation.display_name(), "Test Automation");

        let anonymous: Automation<u32> = Automation::builder().id("abc").build();
        assert_eq!(anonymous.display_name(), "abc");
    }

    #[test]
    fn test_manager_add_and_remove() {
        let manager = AutomationManager::new();
        manager.add(sample()).unwrap();
        assert_eq!(manager.count(), 1);

        let err = manager.add(sample()).unwrap_err();
        assert!(matches!(err, AutomationError::AlreadyExists(_)));

        manager.remove("test_automation").unwrap();
        assert_eq!(manager.count(), 0);
        assert!(matches!(
            manager.remove("test_automation"),
            Err(AutomationError::NotFound(_))
        ));
    }

    #[test]
    fn test_manager_enable_disable_toggle() {
        let manager = AutomationManager::new();
        manager.add(sample()).unwrap();

        manager.disable("test_automation").unwrap();
        assert_eq!(
            manager.with("test_automation", |a| a.is_active),
            Some(false)
        );

        manager.enable("test_automation").unwrap();
        assert_eq!(manager.with("test_automation", |a| a.is_active), Some(true));

        assert!(!manager.toggle("test_automation").unwrap());
        assert!(manager.toggle("test_automation").unwrap());
    }

    #[test]
    fn test_execution_mode_single_blocks_concurrent_runs() {
        let manager = AutomationManager::new();
        manager.add(sample()).unwrap();

        assert!(manager.can_run("test_automation").unwrap());
        manager.increment_runs("test_automation");
        assert!(!manager.can_run("test_automation").unwrap());
        manager.decrement_runs("test_automation");
        assert!(manager.can_run("test_automation").unwrap());
    }

    #[test]
    fn test_execution_mode_parallel_bounds_runs() {
        let mut automation = sample();
        automation.mode = ExecutionMode::Parallel { max: 2 };

        assert!(automation.can_run());
        automation.current_runs = 1;
        assert!(automation.can_run());
        automation.current_runs = 2;
        assert!(!automation.can_run());
    }

    #[test]
    fn test_execution_mode_restart_always_allows() {
        let mut automation = sample();
        automation.mode = ExecutionMode::Restart;
        automation.current_runs = 5;
        assert!(automation.can_run());
    }

    #[test]
    fn test_inactive_automation_cannot_run() {
        let mut automation = sample();
        automation.is_active = false;
        assert!(!automation.can_run());
    }

    #[test]
    fn test_mark_triggered_stamps_time() {
        let manager = AutomationManager::new();
        manager.add(sample()).unwrap();

        manager.mark_triggered("test_automation");
        assert!(manager
            .with("test_automation", |a| a.last_triggered)
            .unwrap()
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_automation_detaches_triggers() {
        use reflex_core::ObservableValue;
        use std::sync::Arc;

        let source = Arc::new(ObservableValue::new(false));
        let mut automation = sample();

        let trigger = crate::trigger::StateTrigger::exact(
            &source,
            false,
            true,
            Duration::ZERO,
            |_| {},
        )
        .unwrap();
        automation.attach_trigger(trigger.into_handle());
        assert_eq!(source.subscriber_count(), 1);

        drop(automation);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(source.subscriber_count(), 0);
    }
}
