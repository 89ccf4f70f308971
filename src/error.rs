//! Error types for engine operations.
//!
//! This module defines [`EngineError`], the primary error type used throughout
//! the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Build-time errors (recipe loading, graph construction) abort a run
//!   before any step executes and are returned directly to the caller
//! - Step-time errors (resolution, capability, timeout) are captured into
//!   node status and the context; they never unwind into the scheduler
//! - Use `anyhow::Error` (via `EngineError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Recipe file not found at the given location.
    #[error("Recipe not found: {path}")]
    RecipeNotFound { path: PathBuf },

    /// Failed to parse a recipe definition.
    #[error("Failed to parse recipe at {path}: {message}")]
    RecipeParse { path: PathBuf, message: String },

    /// Invalid recipe structure or values.
    #[error("Invalid recipe: {message}")]
    RecipeValidation { message: String },

    /// Referenced recipe is not registered in the library.
    #[error("Unknown recipe: {name}")]
    UnknownRecipe { name: String },

    /// Step dependency cycle detected.
    #[error("Cyclic dependency detected: {cycle}")]
    CyclicDependency { cycle: String },

    /// A step depends on a step that does not exist in the recipe.
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    /// Referenced capability is not registered.
    #[error("Unknown capability: {name}")]
    UnknownCapability { name: String },

    /// A `${...}` reference points at a path absent from both the static
    /// scope and the context.
    #[error("Unresolved reference: ${{{reference}}}")]
    UnresolvedReference { reference: String },

    /// Condition expression could not be parsed or evaluated.
    #[error("Condition error: {message}")]
    Condition { message: String },

    /// A capability implementation returned an error.
    #[error("Capability '{capability}' failed in step '{step}': {message}")]
    Capability {
        step: String,
        capability: String,
        message: String,
    },

    /// A step's capability did not finish within its timeout.
    #[error("Step '{step}' timed out after {timeout_ms}ms")]
    StepTimeout { step: String, timeout_ms: u64 },

    /// A nested recipe run failed; surfaces as the invoking step's failure.
    #[error("Sub-recipe '{recipe}' failed in step '{step}': {message}")]
    SubRecipeFailed {
        step: String,
        recipe: String,
        message: String,
    },

    /// Step execution failed for a reason outside the capability itself.
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// Context lookup without a default for an absent key.
    #[error("Key not found in context: {key}")]
    KeyNotFound { key: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
