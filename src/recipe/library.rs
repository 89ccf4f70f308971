//! Named recipe lookup.
//!
//! Sub-recipe steps reference other recipes by name; the [`RecipeLibrary`]
//! is the registry they resolve against. Recipes can be registered directly
//! or loaded in bulk from a directory of YAML files.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::{EngineError, Result};

use super::loader;
use super::schema::Recipe;

/// Registry mapping recipe names to loaded definitions.
#[derive(Debug, Default)]
pub struct RecipeLibrary {
    recipes: DashMap<String, Arc<Recipe>>,
}

impl RecipeLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recipe under its own name, replacing any previous entry.
    pub fn register(&self, recipe: Recipe) -> Arc<Recipe> {
        let recipe = Arc::new(recipe);
        self.recipes.insert(recipe.name.clone(), Arc::clone(&recipe));
        recipe
    }

    /// Look a recipe up by name.
    pub fn get(&self, name: &str) -> Result<Arc<Recipe>> {
        self.recipes
            .get(name)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| EngineError::UnknownRecipe { name: name.into() })
    }

    /// Whether a recipe is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.recipes.contains_key(name)
    }

    /// Registered recipe names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.recipes.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered recipes.
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Load every `*.yml` / `*.yaml` file in a directory.
    ///
    /// Returns the number of recipes registered. Subdirectories are not
    /// descended into.
    pub fn load_dir(&self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yml" || e == "yaml");
            if !path.is_file() || !is_yaml {
                continue;
            }
            let recipe = loader::from_path(&path)?;
            debug!("loaded recipe '{}' from {}", recipe.name, path.display());
            self.register(recipe);
            loaded += 1;
        }
        Ok(loaded)
    }
}
