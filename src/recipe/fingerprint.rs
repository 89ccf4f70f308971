//! Recipe fingerprints.
//!
//! A fingerprint is the SHA-256 digest of the recipe's canonical JSON
//! encoding, reported with every run so consumers can tell which revision
//! of a definition produced a result.

use sha2::{Digest, Sha256};

use crate::error::Result;

use super::schema::Recipe;

/// Hex digest identifying a recipe's content.
pub fn fingerprint(recipe: &Recipe) -> Result<String> {
    let canonical = serde_json::to_vec(recipe)
        .map_err(|e| crate::error::EngineError::RecipeValidation {
            message: format!("failed to encode recipe for fingerprinting: {}", e),
        })?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}
