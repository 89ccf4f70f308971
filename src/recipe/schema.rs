//! Recipe schema definitions.
//!
//! This module contains the struct definitions that map to the recipe
//! definition file format. A [`Recipe`] is immutable after load; the
//! runtime never mutates these types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named, versioned workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe name, used for library lookup and reporting.
    pub name: String,

    /// Recipe version (informational).
    #[serde(default = "default_version")]
    pub version: String,

    /// Declared parameters, bindable by the caller.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,

    /// Ordered step list. Declared order supplies each step's index.
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl Recipe {
    /// Find a step by name.
    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Steps scheduled as part of normal DAG execution.
    pub fn normal_steps(&self) -> impl Iterator<Item = &StepSpec> {
        self.steps.iter().filter(|s| s.trigger == Trigger::Normal)
    }

    /// Steps that fire only after an unrecovered failure.
    pub fn on_error_steps(&self) -> impl Iterator<Item = &StepSpec> {
        self.steps.iter().filter(|s| s.trigger == Trigger::OnError)
    }

    /// Find a declared parameter by name.
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// A declared recipe parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name, referenced as `${name}` inside the recipe.
    pub name: String,

    /// Whether the caller must supply a binding.
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,

    /// Value used when the caller supplies no binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// What a step invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// A host-registered capability.
    Capability,
    /// A nested recipe run.
    SubRecipe,
}

/// When a step is scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Ordinary DAG execution.
    #[default]
    Normal,
    /// Runs only after the DAG is exhausted with at least one failure.
    OnError,
}

/// A single unit of work inside a recipe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSpec {
    /// Step name, unique within the recipe.
    pub name: String,

    /// Declared position, assigned at load. Used only as a reporting and
    /// in-level ordering tie-break, never as a dependency.
    #[serde(skip)]
    pub index: usize,

    /// Capability reference (mutually exclusive with `sub_recipe`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,

    /// Nested recipe reference (mutually exclusive with `capability`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_recipe: Option<String>,

    /// Argument map; values may contain `${...}` references.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,

    /// Names of steps that must reach a terminal status first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Boolean expression gating dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Informational grouping label; never affects scheduling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,

    /// When this step is scheduled.
    #[serde(skip_serializing_if = "is_normal")]
    pub trigger: Trigger,

    /// Retry policy for capability failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Per-attempt timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl StepSpec {
    /// What this step invokes. Loader validation guarantees exactly one
    /// reference is present.
    pub fn kind(&self) -> StepKind {
        if self.sub_recipe.is_some() {
            StepKind::SubRecipe
        } else {
            StepKind::Capability
        }
    }

    /// The capability or sub-recipe reference.
    pub fn reference(&self) -> &str {
        self.sub_recipe
            .as_deref()
            .or(self.capability.as_deref())
            .unwrap_or_default()
    }
}

/// Retry policy for a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first (minimum 1).
    pub max_attempts: u32,

    /// Delay growth between attempts.
    pub backoff: Backoff,

    /// Base delay between attempts in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed,
            delay_ms: 100,
        }
    }
}

/// Backoff shape between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay doubles after each failed attempt.
    Exponential,
}

impl RetryConfig {
    /// Delay to wait after `failed_attempt` (1-based) before the next try.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let millis = match self.backoff {
            Backoff::Fixed => self.delay_ms,
            Backoff::Exponential => {
                let shift = failed_attempt.saturating_sub(1).min(16);
                self.delay_ms.saturating_mul(1u64 << shift)
            }
        };
        Duration::from_millis(millis)
    }

    /// Total attempts, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn is_false(v: &bool) -> bool {
    !v
}

fn is_normal(t: &Trigger) -> bool {
    *t == Trigger::Normal
}
