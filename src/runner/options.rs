//! Run configuration and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};

/// Cooperative run-level cancellation signal.
///
/// Raising it prevents the scheduler from dispatching any further level;
/// steps already dispatched run to completion (the token is also handed to
/// capabilities so long-running work can stop early). Cloning shares the
/// same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the signal has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Options for running a recipe.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker pool size; 0 means available parallelism.
    pub workers: usize,

    /// Caller bindings for the recipe's declared parameters.
    pub params: Map<String, Value>,

    /// Cancellation signal shared with every dispatched step.
    pub cancel: CancellationToken,

    /// Attribution label for writes the engine itself performs.
    pub who: String,

    /// Current sub-recipe nesting depth; bounded to catch definitions that
    /// recurse into themselves.
    pub(crate) depth: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 0,
            params: Map::new(),
            cancel: CancellationToken::new(),
            who: "engine".to_string(),
            depth: 0,
        }
    }
}

impl RunOptions {
    /// Set the worker pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set parameter bindings.
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Bind a single parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Share an externally held cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolved worker count.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    /// Options for a nested run: one level deeper, same cancel token and
    /// worker budget, fresh parameter bindings.
    pub(crate) fn nested(&self, params: Map<String, Value>, who: &str) -> Self {
        Self {
            workers: self.workers,
            params,
            cancel: self.cancel.clone(),
            who: who.to_string(),
            depth: self.depth + 1,
        }
    }
}
