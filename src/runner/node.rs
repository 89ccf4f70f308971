//! Per-step runtime state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a step in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Waiting for dependencies.
    Pending,

    /// Dependencies satisfied, not yet dispatched.
    Ready,

    /// Dispatched to a worker.
    Running,

    /// Finished successfully.
    Succeeded,

    /// Finished with an unrecovered error.
    Failed,

    /// Never dispatched: condition false or a predecessor skipped/failed.
    Skipped,
}

impl NodeStatus {
    /// Whether no further transitions are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Skipped
        )
    }

    /// Display glyph for report rendering.
    pub fn glyph(&self) -> char {
        match self {
            NodeStatus::Pending => '○',
            NodeStatus::Ready => '◌',
            NodeStatus::Running => '◉',
            NodeStatus::Succeeded => '✓',
            NodeStatus::Failed => '✗',
            NodeStatus::Skipped => '⊘',
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Ready => "ready",
            NodeStatus::Running => "running",
            NodeStatus::Succeeded => "succeeded",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Runtime wrapper around one step: status, result, error, and timing.
///
/// Created when the DAG is built, mutated only by the scheduler and the
/// step executor, and retained until the run completes for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionNode {
    /// Step name.
    pub name: String,

    /// Declared index (report ordering).
    pub index: usize,

    /// Current status.
    pub status: NodeStatus,

    /// Capability return value, when succeeded.
    pub result: Option<Value>,

    /// Failure message, when failed.
    pub error: Option<String>,

    /// Why the step was skipped, when skipped.
    pub skip_reason: Option<String>,

    /// Execution attempts performed (0 when never dispatched).
    pub attempts: u32,

    /// When the first attempt started.
    pub started_at: Option<DateTime<Utc>>,

    /// When the final attempt finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionNode {
    /// Create a pending node for a step.
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            status: NodeStatus::Pending,
            result: None,
            error: None,
            skip_reason: None,
            attempts: 0,
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark the node skipped with a reason.
    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = NodeStatus::Skipped;
        self.skip_reason = Some(reason.into());
    }

    /// Mark the node failed without dispatch (e.g. condition evaluation
    /// error).
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = NodeStatus::Failed;
        self.error = Some(error.into());
    }

    /// Wall-clock duration of the executed attempts.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds().max(0) as u64)
            }
            _ => None,
        }
    }
}
