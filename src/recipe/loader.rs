//! Recipe loading and load-time validation.
//!
//! Loading assigns declared indices and enforces the structural invariants
//! the rest of the engine relies on: unique step names, exactly one
//! capability/sub-recipe reference per step, dependency-free `on_error`
//! steps, and coherent parameter declarations. Dependency *resolution*
//! (unknown names, cycles) belongs to the graph builder.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{EngineError, Result};

use super::schema::{Recipe, Trigger};

/// Load a recipe from YAML text.
pub fn from_str(content: &str) -> Result<Recipe> {
    let mut recipe: Recipe =
        serde_yaml::from_str(content).map_err(|e| EngineError::RecipeParse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
    finalize(&mut recipe)?;
    Ok(recipe)
}

/// Load a recipe from a YAML file.
pub fn from_path(path: &Path) -> Result<Recipe> {
    if !path.exists() {
        return Err(EngineError::RecipeNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    let mut recipe: Recipe =
        serde_yaml::from_str(&content).map_err(|e| EngineError::RecipeParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    finalize(&mut recipe)?;
    Ok(recipe)
}

/// Assign declared indices and validate invariants.
fn finalize(recipe: &mut Recipe) -> Result<()> {
    for (index, step) in recipe.steps.iter_mut().enumerate() {
        step.index = index;
    }
    validate(recipe)
}

/// Check the structural invariants of a loaded recipe.
pub fn validate(recipe: &Recipe) -> Result<()> {
    if recipe.name.trim().is_empty() {
        return Err(invalid("recipe name must not be empty"));
    }

    let mut seen = HashSet::new();
    for step in &recipe.steps {
        if step.name.trim().is_empty() {
            return Err(invalid("step name must not be empty"));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(invalid(format!("duplicate step name '{}'", step.name)));
        }
        match (&step.capability, &step.sub_recipe) {
            (Some(_), Some(_)) => {
                return Err(invalid(format!(
                    "step '{}' declares both a capability and a sub_recipe",
                    step.name
                )));
            }
            (None, None) => {
                return Err(invalid(format!(
                    "step '{}' declares neither a capability nor a sub_recipe",
                    step.name
                )));
            }
            _ => {}
        }
        if step.trigger == Trigger::OnError && !step.depends_on.is_empty() {
            return Err(invalid(format!(
                "on_error step '{}' must not declare dependencies",
                step.name
            )));
        }
        if step.depends_on.iter().any(|d| d == &step.name) {
            return Err(invalid(format!(
                "step '{}' depends on itself",
                step.name
            )));
        }
    }

    let mut param_names = HashSet::new();
    for param in &recipe.params {
        if param.name.trim().is_empty() {
            return Err(invalid("parameter name must not be empty"));
        }
        if !param_names.insert(param.name.as_str()) {
            return Err(invalid(format!("duplicate parameter '{}'", param.name)));
        }
        if param.required && param.default.is_some() {
            return Err(invalid(format!(
                "parameter '{}' is required and cannot carry a default",
                param.name
            )));
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::RecipeValidation {
        message: message.into(),
    }
}
