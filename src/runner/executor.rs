//! Single-step execution.
//!
//! The executor resolves a prepared step's arguments, invokes its
//! capability, and captures the outcome: the return value lands at
//! `<step>.result`, a final failure's message at `<step>.error`, both
//! attributed to the step. Retries and per-attempt timeouts happen here;
//! nothing a capability does (error, panic, or hang past its timeout)
//! unwinds into the scheduler.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::capability::{Capability, CapabilityCall, CapabilityRegistry};
use crate::context::ContextStore;
use crate::error::EngineError;
use crate::expr::{resolve_args, StaticScope};

use super::options::CancellationToken;
use super::prepared::PreparedStep;

/// What one step execution produced.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Step name.
    pub step: String,

    /// Whether the final attempt succeeded.
    pub success: bool,

    /// Capability return value, on success.
    pub result: Option<Value>,

    /// Failure message, on failure.
    pub error: Option<String>,

    /// Attempts performed.
    pub attempts: u32,

    /// When execution started.
    pub started_at: DateTime<Utc>,

    /// When execution finished.
    pub finished_at: DateTime<Utc>,
}

impl StepOutcome {
    fn success(step: &str, result: Value, attempts: u32, started_at: DateTime<Utc>) -> Self {
        Self {
            step: step.to_string(),
            success: true,
            result: Some(result),
            error: None,
            attempts,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn failure(step: &str, error: String, attempts: u32, started_at: DateTime<Utc>) -> Self {
        Self {
            step: step.to_string(),
            success: false,
            result: None,
            error: Some(error),
            attempts,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Execute one capability step to a terminal outcome.
pub fn execute(
    prepared: &PreparedStep,
    context: &Arc<ContextStore>,
    scope: &StaticScope,
    registry: &CapabilityRegistry,
    cancel: &CancellationToken,
) -> StepOutcome {
    let step = prepared.spec.name.as_str();
    let reference = prepared.spec.reference().to_string();
    let started_at = Utc::now();

    let capability = match registry.get(&reference) {
        Ok(capability) => capability,
        Err(e) => return fail(context, step, e.to_string(), 0, started_at),
    };

    let retry = prepared.spec.retry.clone().unwrap_or_default();
    let max_attempts = retry.attempts();
    let mut attempts = 0;

    loop {
        attempts += 1;

        // Arguments resolve fresh per attempt; a resolution failure is
        // deterministic within a level barrier, so it is never retried.
        let args = match resolve_args(&prepared.args, scope, context) {
            Ok(args) => args,
            Err(e) => return fail(context, step, e.to_string(), attempts, started_at),
        };

        let call = CapabilityCall {
            step: step.to_string(),
            args,
            context: Arc::clone(context),
            cancel: cancel.clone(),
        };

        debug!(step, capability = %reference, attempt = attempts, "invoking capability");
        match invoke(&capability, call, prepared.spec.timeout_ms, step, &reference) {
            Ok(value) => {
                context.set(format!("{}.result", step), value.clone(), step);
                return StepOutcome::success(step, value, attempts, started_at);
            }
            Err(e) => {
                let message = e.to_string();
                if attempts >= max_attempts {
                    return fail(context, step, message, attempts, started_at);
                }
                if cancel.is_cancelled() {
                    return fail(
                        context,
                        step,
                        format!("{} (run cancelled before retry)", message),
                        attempts,
                        started_at,
                    );
                }
                let delay = retry.delay_after(attempts);
                warn!(
                    step,
                    attempt = attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    "step attempt failed: {}",
                    message
                );
                std::thread::sleep(delay);
            }
        }
    }
}

/// Record a final failure into the context and build the outcome.
fn fail(
    context: &Arc<ContextStore>,
    step: &str,
    message: String,
    attempts: u32,
    started_at: DateTime<Utc>,
) -> StepOutcome {
    warn!(step, "step failed: {}", message);
    context.set(format!("{}.error", step), json!(message), step);
    StepOutcome::failure(step, message, attempts, started_at)
}

/// Run one attempt, converting errors, panics, and timeouts into
/// [`EngineError`] values.
fn invoke(
    capability: &Arc<dyn Capability>,
    call: CapabilityCall,
    timeout_ms: Option<u64>,
    step: &str,
    reference: &str,
) -> Result<Value, EngineError> {
    let Some(timeout_ms) = timeout_ms else {
        let outcome = catch_unwind(AssertUnwindSafe(|| capability.invoke(call)));
        return settle(outcome, step, reference);
    };

    // Timed attempt: run on a dedicated thread and wait on a channel. On
    // expiry the thread is left to finish on its own; cancellation of an
    // in-flight capability is cooperative only.
    let (tx, rx) = mpsc::channel();
    let capability = Arc::clone(capability);
    std::thread::spawn(move || {
        let outcome = catch_unwind(AssertUnwindSafe(|| capability.invoke(call)));
        let _ = tx.send(outcome);
    });

    match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
        Ok(outcome) => settle(outcome, step, reference),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(EngineError::StepTimeout {
            step: step.to_string(),
            timeout_ms,
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(EngineError::Capability {
            step: step.to_string(),
            capability: reference.to_string(),
            message: "capability thread terminated unexpectedly".to_string(),
        }),
    }
}

/// Convert an attempt result (possibly a caught panic) into engine terms.
fn settle(
    outcome: std::thread::Result<anyhow::Result<Value>>,
    step: &str,
    reference: &str,
) -> Result<Value, EngineError> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(EngineError::Capability {
            step: step.to_string(),
            capability: reference.to_string(),
            message: format!("{:#}", e),
        }),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(EngineError::Capability {
                step: step.to_string(),
                capability: reference.to_string(),
                message: format!("capability panicked: {}", message),
            })
        }
    }
}
