//! Capability registration and dispatch.
//!
//! A capability is an opaque, host-registered callable a step invokes to
//! perform actual work. The engine knows nothing about what a capability
//! does: it resolves the step's arguments, hands them over together with
//! the shared context and the run's cancellation token, and captures the
//! returned value or error. Registration is by string reference, keeping
//! late binding by name behind a statically typed seam.

pub mod builtin;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::context::ContextStore;
use crate::error::{EngineError, Result};
use crate::runner::CancellationToken;

/// Everything a capability receives for one invocation.
///
/// Owned (not borrowed) so an invocation can move onto its own thread when
/// the step carries a timeout.
#[derive(Debug, Clone)]
pub struct CapabilityCall {
    /// Name of the invoking step.
    pub step: String,

    /// Fully resolved arguments.
    pub args: Map<String, Value>,

    /// The run's shared context.
    pub context: Arc<ContextStore>,

    /// Cooperative cancellation signal for long-running work.
    pub cancel: CancellationToken,
}

impl CapabilityCall {
    /// Fetch a required argument.
    pub fn arg(&self, name: &str) -> anyhow::Result<&Value> {
        self.args
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("missing required argument '{}'", name))
    }

    /// Fetch an optional argument.
    pub fn arg_opt(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }
}

/// A named, callable unit of work.
///
/// Errors are `anyhow` so host implementations can bubble anything up; the
/// executor converts them to step failure without unwinding the scheduler.
pub trait Capability: Send + Sync {
    /// Perform the work and return a result value.
    fn invoke(&self, call: CapabilityCall) -> anyhow::Result<Value>;
}

impl<F> Capability for F
where
    F: Fn(CapabilityCall) -> anyhow::Result<Value> + Send + Sync,
{
    fn invoke(&self, call: CapabilityCall) -> anyhow::Result<Value> {
        self(call)
    }
}

impl std::fmt::Debug for dyn Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<capability>")
    }
}

/// Registry mapping string references to capability implementations.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: DashMap<String, Arc<dyn Capability>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry preloaded with the built-in capabilities.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::register(&registry);
        registry
    }

    /// Register a capability, replacing any previous one under the name.
    pub fn register(&self, name: impl Into<String>, capability: impl Capability + 'static) {
        self.capabilities.insert(name.into(), Arc::new(capability));
    }

    /// Register an already shared capability.
    pub fn register_arc(&self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        self.capabilities.insert(name.into(), capability);
    }

    /// Look a capability up by reference.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Capability>> {
        self.capabilities
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| EngineError::UnknownCapability { name: name.into() })
    }

    /// Whether a capability is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Registered references, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }
}
