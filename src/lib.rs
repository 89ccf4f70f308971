//! Simmer - recipe orchestration engine.
//!
//! Simmer executes declared workflows ("recipes") composed of named steps
//! with explicit dependencies, optional conditions, and nested
//! sub-recipes, while steps exchange data through a shared, attributed,
//! history-tracked context store.
//!
//! # Modules
//!
//! - [`capability`] - Capability trait, registry, and built-in stock
//! - [`cli`] - Command-line interface and dispatch
//! - [`context`] - Shared key/value state with attribution and history
//! - [`error`] - Error types and result aliases
//! - [`expr`] - Reference placeholders and condition evaluation
//! - [`graph`] - Dependency graph construction and level computation
//! - [`recipe`] - Recipe schema, loading, library, and fingerprints
//! - [`runner`] - Scheduler, step executor, sub-recipe composition, reports
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use simmer::capability::CapabilityRegistry;
//! use simmer::context::ContextStore;
//! use simmer::recipe::{loader, RecipeLibrary};
//! use simmer::runner::{RunOptions, Scheduler};
//!
//! let recipe = loader::from_str(r#"
//! name: hello
//! steps:
//!   - name: greet
//!     capability: core.echo
//!     args:
//!       message: hello from simmer
//! "#).unwrap();
//!
//! let scheduler = Scheduler::new(
//!     Arc::new(CapabilityRegistry::with_builtins()),
//!     Arc::new(RecipeLibrary::new()),
//! );
//! let report = scheduler
//!     .run(&recipe, Arc::new(ContextStore::new()), &RunOptions::default())
//!     .unwrap();
//! assert!(report.succeeded());
//! ```

pub mod capability;
pub mod cli;
pub mod context;
pub mod error;
pub mod expr;
pub mod graph;
pub mod recipe;
pub mod runner;

pub use error::{EngineError, Result};
