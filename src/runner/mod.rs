//! Run orchestration: scheduling, execution, composition, reporting.
//!
//! The [`Scheduler`] walks a recipe's dependency graph level by level over
//! a bounded worker pool; [`executor`] runs individual capability steps
//! with retry and timeout handling; [`compose`] re-enters the scheduler
//! for nested recipes; a [`RunReport`] captures the outcome.

pub mod compose;
pub mod executor;
pub mod node;
pub mod options;
pub mod prepared;
pub mod report;
pub mod scheduler;

pub use executor::StepOutcome;
pub use node::{ExecutionNode, NodeStatus};
pub use options::{CancellationToken, RunOptions};
pub use prepared::PreparedStep;
pub use report::{format_duration, RunReport, RunStatus};
pub use scheduler::Scheduler;
