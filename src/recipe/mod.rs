//! Recipe definitions: schema, loading, lookup, and fingerprints.
//!
//! A [`Recipe`] is an immutable workflow definition: a named, versioned,
//! ordered list of [`StepSpec`]s plus declared parameters. Definitions are
//! loaded from YAML ([`loader`]), validated at load time, registered by
//! name in a [`RecipeLibrary`] for sub-recipe resolution, and identified
//! by a content [`fingerprint`](fingerprint::fingerprint).

pub mod fingerprint;
pub mod library;
pub mod loader;
pub mod schema;

pub use library::RecipeLibrary;
pub use schema::{Backoff, ParamSpec, Recipe, RetryConfig, StepKind, StepSpec, Trigger};
