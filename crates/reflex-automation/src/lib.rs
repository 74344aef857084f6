//! Automation model for the reflex engine
//!
//! An automation ties together triggers, conditions, and actions over a
//! caller-chosen candidate value `T`:
//!
//! ```text
//! AUTOMATION = TRIGGERS → CONDITIONS → ACTIONS
//! ```
//!
//! - **Triggers**: watchers that observe a value source and fire a callback
//!   on a qualifying transition ([`StateTrigger`], [`EventTrigger`])
//! - **Conditions**: pure predicates combined left-to-right with each
//!   condition's own AND/OR operator ([`Condition`], [`ConditionEvaluator`])
//! - **Actions**: the ordered steps a run executes - delays, commands, and
//!   repeat forms ([`Action`])
//!
//! Execution itself lives in `reflex-engine`; this crate owns the aggregate
//! and the trigger/condition subsystems.

pub mod action;
pub mod automation;
pub mod condition;
pub mod trigger;

pub use action::{Action, ActionBody, ActionKind, Command, CommandError, RepeatPredicate};
pub use automation::{
    Automation, AutomationBuilder, AutomationError, AutomationManager, AutomationResult,
    ExecutionMode,
};
pub use condition::{Condition, ConditionEvaluator, Operator, Predicate};
pub use trigger::{
    EventTrigger, StateTrigger, TriggerCallback, TriggerError, TriggerHandle, TriggerResult,
};
