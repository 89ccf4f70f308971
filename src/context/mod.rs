//! Shared, attributed, history-tracked state.
//!
//! Steps exchange data exclusively through a [`ContextStore`]: a thread-safe
//! key/value store where every write names its writer and lands in an
//! append-only [`HistoryRecord`] log. A store is created per recipe
//! invocation and discarded when the run completes; sub-recipes get a fresh
//! store of their own and merge results back explicitly.

pub mod history;
pub mod store;

pub use history::HistoryRecord;
pub use store::{ContextEntry, ContextStore};
