//! Structured run results.
//!
//! A [`RunReport`] is produced for every run that gets past the build
//! phase: overall status, per-step summaries, the final context snapshot,
//! and the recipe fingerprint. Build-time failures (cycles, unknown
//! dependencies, invalid definitions) never produce a report: they are
//! returned as errors before anything executes, which is how callers tell
//! a build abort from a runtime failure with partial results.

use std::collections::BTreeMap;
use std::time::Duration;

use console::style;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node::{ExecutionNode, NodeStatus};

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step reached success or was legitimately skipped.
    Completed,
    /// At least one step failed, or the run was cancelled.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Report for one recipe run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Recipe name.
    pub recipe: String,

    /// Recipe version.
    pub version: String,

    /// Content fingerprint of the definition that ran.
    pub fingerprint: String,

    /// Overall status.
    pub status: RunStatus,

    /// Whether the run ended early due to cancellation.
    pub cancelled: bool,

    /// Per-step summaries, in declared order.
    pub steps: Vec<ExecutionNode>,

    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Final context values.
    pub context: BTreeMap<String, Value>,

    /// Number of context writes recorded during the run.
    pub history_len: usize,
}

impl RunReport {
    /// Whether the run completed without failure.
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Find a step summary by name.
    pub fn step(&self, name: &str) -> Option<&ExecutionNode> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Status of a step by name.
    pub fn step_status(&self, name: &str) -> Option<NodeStatus> {
        self.step(name).map(|s| s.status)
    }

    /// Count steps with a given status.
    pub fn count_with_status(&self, status: NodeStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Render a console summary of the run.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let header = format!(
            "{} v{} — {} in {}",
            self.recipe,
            self.version,
            self.status,
            format_duration(Duration::from_millis(self.duration_ms))
        );
        match self.status {
            RunStatus::Completed => out.push_str(&style(header).green().to_string()),
            RunStatus::Failed => out.push_str(&style(header).red().to_string()),
        }
        if self.cancelled {
            out.push_str(&style(" (cancelled)").yellow().to_string());
        }
        out.push('\n');

        for step in &self.steps {
            let line = match step.status {
                NodeStatus::Succeeded => format!(
                    "{} {} ({})",
                    step.status.glyph(),
                    step.name,
                    step.duration_ms()
                        .map(|ms| format_duration(Duration::from_millis(ms)))
                        .unwrap_or_else(|| "-".into())
                ),
                NodeStatus::Failed => format!(
                    "{} {} - {}",
                    step.status.glyph(),
                    step.name,
                    step.error.as_deref().unwrap_or("unknown error")
                ),
                NodeStatus::Skipped => format!(
                    "{} {} ({})",
                    step.status.glyph(),
                    step.name,
                    step.skip_reason.as_deref().unwrap_or("skipped")
                ),
                _ => format!("{} {} ({})", step.status.glyph(), step.name, step.status),
            };
            out.push_str("  ");
            out.push_str(&line);
            out.push('\n');
        }

        out
    }
}

/// Human-friendly duration formatting.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs == 0 {
        format!("{}ms", millis)
    } else if secs < 60 {
        format!("{}.{}s", secs, millis / 100)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
