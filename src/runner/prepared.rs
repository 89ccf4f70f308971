//! Load-time preparation of steps for execution.
//!
//! Preparing a step parses its argument map and condition into typed trees
//! exactly once; the scheduler and executor then work with [`PreparedStep`]
//! and never re-scan raw strings. Parse failures here are build-time
//! errors: the run aborts before any step is dispatched.

use crate::error::{EngineError, Result};
use crate::expr::{parse_args, ArgValue, CondExpr};
use crate::recipe::{Recipe, StepSpec};

/// A step with its argument and condition trees parsed.
#[derive(Debug, Clone)]
pub struct PreparedStep {
    /// The immutable definition.
    pub spec: StepSpec,

    /// Parsed argument values, in declaration order.
    pub args: Vec<(String, ArgValue)>,

    /// Parsed condition, when declared.
    pub condition: Option<CondExpr>,
}

impl PreparedStep {
    /// Prepare a single step.
    pub fn prepare(spec: &StepSpec) -> Result<Self> {
        let condition = spec
            .condition
            .as_deref()
            .map(CondExpr::parse)
            .transpose()
            .map_err(|e| match e {
                EngineError::Condition { message } => EngineError::Condition {
                    message: format!("step '{}': {}", spec.name, message),
                },
                other => other,
            })?;

        Ok(Self {
            spec: spec.clone(),
            args: parse_args(&spec.args),
            condition,
        })
    }

    /// Prepare every step of a recipe, in declaration order.
    pub fn prepare_all(recipe: &Recipe) -> Result<Vec<PreparedStep>> {
        recipe.steps.iter().map(Self::prepare).collect()
    }
}
