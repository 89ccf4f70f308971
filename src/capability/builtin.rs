//! Built-in capabilities.
//!
//! A small stock of generally useful capabilities registered by
//! [`CapabilityRegistry::with_builtins`](super::CapabilityRegistry::with_builtins),
//! so recipes run out of the box and failure paths can be exercised without
//! host code:
//!
//! - `core.set` - write every argument into the context
//! - `core.echo` - log a message and return it
//! - `core.sleep` - wait for `duration_ms`, honouring cancellation
//! - `core.fail` - always fail with the given message

use std::time::Duration;

use anyhow::anyhow;
use serde_json::Value;
use tracing::info;

use super::{CapabilityCall, CapabilityRegistry};

/// Granularity of the sleep loop's cancellation checks.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// Register the built-in stock into a registry.
pub fn register(registry: &CapabilityRegistry) {
    registry.register("core.set", set_values);
    registry.register("core.echo", echo);
    registry.register("core.sleep", sleep);
    registry.register("core.fail", fail);
}

/// Write every argument into the context, attributed to the step.
fn set_values(call: CapabilityCall) -> anyhow::Result<Value> {
    for (key, value) in &call.args {
        call.context.set(key.clone(), value.clone(), call.step.clone());
    }
    Ok(Value::from(call.args.len() as u64))
}

/// Log the `message` argument and return it.
fn echo(call: CapabilityCall) -> anyhow::Result<Value> {
    let message = call.arg("message")?.clone();
    match &message {
        Value::String(text) => info!(step = %call.step, "{}", text),
        other => info!(step = %call.step, "{}", other),
    }
    Ok(message)
}

/// Sleep for `duration_ms`, waking early on cancellation.
fn sleep(call: CapabilityCall) -> anyhow::Result<Value> {
    let millis = call
        .arg("duration_ms")?
        .as_u64()
        .ok_or_else(|| anyhow!("duration_ms must be a non-negative integer"))?;

    let mut remaining = Duration::from_millis(millis);
    while !remaining.is_zero() {
        if call.cancel.is_cancelled() {
            return Err(anyhow!("cancelled while sleeping"));
        }
        let slice = remaining.min(SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
    Ok(Value::Null)
}

/// Always fail, with an optional `message` argument.
fn fail(call: CapabilityCall) -> anyhow::Result<Value> {
    let message = call
        .arg_opt("message")
        .and_then(|m| m.as_str())
        .unwrap_or("core.fail invoked");
    Err(anyhow!("{}", message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextStore;
    use crate::runner::CancellationToken;
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn call(step: &str, args: Map<String, Value>) -> (CapabilityCall, Arc<ContextStore>) {
        let context = Arc::new(ContextStore::new());
        (
            CapabilityCall {
                step: step.into(),
                args,
                context: Arc::clone(&context),
                cancel: CancellationToken::new(),
            },
            context,
        )
    }

    #[test]
    fn set_writes_all_args_with_step_attribution() {
        let mut args = Map::new();
        args.insert("flags.fast".into(), json!(true));
        args.insert("limit".into(), json!(10));
        let (call, context) = call("configure", args);

        let written = set_values(call).unwrap();
        assert_eq!(written, json!(2));
        assert_eq!(context.get("flags.fast").unwrap(), json!(true));
        assert_eq!(context.entry("limit").unwrap().who, "configure");
    }

    #[test]
    fn echo_returns_its_message() {
        let mut args = Map::new();
        args.insert("message".into(), json!("hello"));
        let (call, _context) = call("greet", args);
        assert_eq!(echo(call).unwrap(), json!("hello"));
    }

    #[test]
    fn echo_requires_a_message() {
        let (call, _context) = call("greet", Map::new());
        assert!(echo(call).is_err());
    }

    #[test]
    fn sleep_rejects_bad_duration() {
        let mut args = Map::new();
        args.insert("duration_ms".into(), json!("soon"));
        let (call, _context) = call("nap", args);
        assert!(sleep(call).is_err());
    }

    #[test]
    fn sleep_aborts_on_cancellation() {
        let mut args = Map::new();
        args.insert("duration_ms".into(), json!(10_000));
        let (mut call, _context) = call("nap", args);
        let cancel = CancellationToken::new();
        cancel.cancel();
        call.cancel = cancel;

        let start = std::time::Instant::now();
        assert!(sleep(call).is_err());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn fail_uses_custom_message() {
        let mut args = Map::new();
        args.insert("message".into(), json!("disk on fire"));
        let (call, _context) = call("boom", args);
        let err = fail(call).unwrap_err();
        assert!(err.to_string().contains("disk on fire"));
    }
}
