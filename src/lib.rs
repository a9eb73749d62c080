//! system-inspector: a sequential task pipeline for desktop automation.
//!
//! A workflow file declares an ordered list of tasks. The orchestrator runs
//! them one after another, merging each task's output into a shared context
//! that later tasks read, and persists a JSON report of every run.

pub mod cli;
pub mod error;
pub mod external;
pub mod pipeline;
pub mod task;
pub mod tasks;

// Re-export commonly used types
pub use error::{ConfigError, LoadError, ReportError, ToolError};
pub use pipeline::{PipelineContext, PipelineOrchestrator, WorkflowConfig};
pub use task::{run_task, Task, TaskData, TaskRegistry, TaskResult, TaskStatus};
