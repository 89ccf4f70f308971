//! Reference resolution and condition evaluation.
//!
//! Step arguments and conditions may embed `${dotted.path}` references,
//! resolved against the static scope (recipe parameters) first and the
//! shared context second. Raw values are parsed once into typed trees
//! ([`ArgValue`], [`CondExpr`]) when a run is prepared; resolution is a
//! single pass with no nested expansion.

pub mod condition;
pub mod template;
pub mod value;

pub use condition::CondExpr;
pub use template::{has_references, parse_template, referenced_paths, Segment};
pub use value::{lookup, parse_args, resolve_args, ArgValue, StaticScope};
