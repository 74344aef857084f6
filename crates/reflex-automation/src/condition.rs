//! Condition types and evaluation
//!
//! Conditions are pure predicates over the candidate value, evaluated at
//! execution time. Each condition carries its own [`Operator`] describing
//! how its result combines with the running accumulator, so a list like
//! `[a, OR b, AND c]` evaluates left-to-right as `((a OR b) AND c)`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Predicate over the candidate value
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// How a condition's result merges with the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Both the accumulator and this condition must hold
    #[default]
    And,

    /// Either the accumulator or this condition must hold
    Or,
}

impl Operator {
    /// Combine the running accumulator with one predicate result
    pub fn apply(self, accumulator: bool, result: bool) -> bool {
        match self {
            Operator::And => accumulator && result,
            Operator::Or => accumulator || result,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => f.write_str("and"),
            Operator::Or => f.write_str("or"),
        }
    }
}

/// A single gating predicate attached to an automation
pub struct Condition<T> {
    /// Unique identifier
    pub id: String,

    /// Id of the owning automation
    pub automation_id: String,

    /// How this condition combines with the conditions before it
    pub operator: Operator,

    predicate: Predicate<T>,
}

impl<T> Condition<T> {
    /// Create a condition owned by `automation_id`
    pub fn new(
        automation_id: impl Into<String>,
        operator: Operator,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            automation_id: automation_id.into(),
            operator,
            predicate: Arc::new(predicate),
        }
    }

    /// Run the predicate against `value`
    pub fn validate(&self, value: &T) -> bool {
        (self.predicate)(value)
    }
}

impl<T> Clone for Condition<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            automation_id: self.automation_id.clone(),
            operator: self.operator,
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T> fmt::Debug for Condition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("id", &self.id)
            .field("automation_id", &self.automation_id)
            .field("operator", &self.operator)
            .finish_non_exhaustive()
    }
}

/// Evaluates a condition list against a candidate value
///
/// The accumulator starts `true`; each condition's result is merged via its
/// own operator, in order. An empty list always passes - automations with
/// no conditions run unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Create an evaluator
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `conditions` left-to-right against `value`
    ///
    /// Never mutates the candidate or any automation state.
    pub fn evaluate<T>(&self, conditions: &[Condition<T>], value: &T) -> bool {
        let mut accumulator = true;

        for condition in conditions {
            let result = condition.validate(value);
            accumulator = condition.operator.apply(accumulator, result);
            trace!(
                condition = %condition.id,
                operator = %condition.operator,
                result,
                accumulator,
                "condition evaluated"
            );
        }

        accumulator
    }
}
