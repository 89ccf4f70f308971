//! Sub-recipe composition.
//!
//! A `sub_recipe` step runs a nested recipe through the same scheduler,
//! re-entrantly. The child gets a fresh context seeded with the resolved
//! parameter bindings; values are copied, never shared, so the child can
//! diverge without corrupting the parent. On success the child's final
//! context merges back into the parent under the step-name prefix; on
//! failure the whole nested run surfaces as this one step's failure and
//! never fires the parent's `on_error` handlers directly.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::context::ContextStore;
use crate::error::EngineError;
use crate::expr::{resolve_args, StaticScope};
use crate::runner::node::NodeStatus;

use super::executor::StepOutcome;
use super::options::RunOptions;
use super::prepared::PreparedStep;
use super::scheduler::Scheduler;

/// Upper bound on recipe nesting, to catch definitions that recurse into
/// themselves through the library.
const MAX_NESTING_DEPTH: usize = 32;

/// Run a nested recipe as a single step of the parent run.
pub fn invoke(
    scheduler: &Scheduler,
    step: &PreparedStep,
    parent: &Arc<ContextStore>,
    scope: &StaticScope,
    options: &RunOptions,
) -> StepOutcome {
    let name = step.spec.name.as_str();
    let recipe_ref = step.spec.reference().to_string();
    let started_at = Utc::now();

    let fail = |message: String| {
        warn!(step = name, recipe = %recipe_ref, "sub-recipe step failed: {}", message);
        parent.set(format!("{}.error", name), json!(message), name);
        StepOutcome {
            step: name.to_string(),
            success: false,
            result: None,
            error: Some(message),
            attempts: 1,
            started_at,
            finished_at: Utc::now(),
        }
    };

    if options.depth >= MAX_NESTING_DEPTH {
        return fail(
            EngineError::StepFailed {
                step: name.to_string(),
                message: format!(
                    "sub-recipe nesting deeper than {} levels; recursive definition?",
                    MAX_NESTING_DEPTH
                ),
            }
            .to_string(),
        );
    }

    // Parameter bindings resolve in the parent's scope and context.
    let bindings = match resolve_args(&step.args, scope, parent) {
        Ok(bindings) => bindings,
        Err(e) => return fail(e.to_string()),
    };

    let child_recipe = match scheduler.library().get(&recipe_ref) {
        Ok(recipe) => recipe,
        Err(e) => return fail(e.to_string()),
    };

    debug!(step = name, recipe = %recipe_ref, "entering sub-recipe");
    let child_context = Arc::new(ContextStore::new());
    let child_options = options.nested(bindings, name);

    let report = match scheduler.run(&child_recipe, Arc::clone(&child_context), &child_options) {
        Ok(report) => report,
        Err(e) => {
            return fail(
                EngineError::SubRecipeFailed {
                    step: name.to_string(),
                    recipe: recipe_ref.clone(),
                    message: e.to_string(),
                }
                .to_string(),
            )
        }
    };

    if !report.succeeded() {
        let failed: Vec<&str> = report
            .steps
            .iter()
            .filter(|s| s.status == NodeStatus::Failed)
            .map(|s| s.name.as_str())
            .collect();
        return fail(
            EngineError::SubRecipeFailed {
                step: name.to_string(),
                recipe: recipe_ref.clone(),
                message: if failed.is_empty() {
                    "nested run failed".to_string()
                } else {
                    format!("failed steps: {}", failed.join(", "))
                },
            }
            .to_string(),
        );
    }

    // Merge-back goes through the ordinary write path so the parent's
    // history records every copied key, attributed to this step.
    for (key, value) in child_context.snapshot() {
        parent.set(format!("{}.{}", name, key), value, name);
    }

    let result = json!({
        "recipe": child_recipe.name,
        "status": "completed",
        "steps": report.steps.len(),
    });
    parent.set(format!("{}.result", name), result.clone(), name);

    StepOutcome {
        step: name.to_string(),
        success: true,
        result: Some(result),
        error: None,
        attempts: 1,
        started_at,
        finished_at: Utc::now(),
    }
}
