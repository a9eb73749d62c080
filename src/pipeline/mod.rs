//! Pipeline orchestration for sequential task workflows.
//!
//! This module provides the orchestration core: workflow configuration, the
//! shared context, the orchestrator itself and report persistence.
//!
//! # Architecture
//!
//! - **Config**: the declarative workflow (settings and ordered task specs)
//! - **Context**: key/value data threaded from task to task
//! - **Orchestrator**: resolves, constructs and runs each selected task
//! - **Report**: timestamped JSON snapshots of finished runs
//!
//! # Pipeline Flow
//!
//! 1. **Load**: the workflow file is parsed; a parse failure aborts the run
//! 2. **Select**: enabled specs in declared order, or one spec picked by name
//! 3. **Resolve**: the spec's module/class pair is looked up in the registry
//! 4. **Execute**: the task runs against the current context
//! 5. **Record**: the result is appended and its data merged into the context
//! 6. **Report**: the results and final context are written to disk
//!
//! # Example
//!
//! ```rust,ignore
//! use system_inspector::pipeline::PipelineOrchestrator;
//! use system_inspector::tasks::builtin_registry;
//!
//! let mut orchestrator = PipelineOrchestrator::load("config/workflow.yaml", builtin_registry(tools))?;
//! orchestrator.load_context_from_reports();
//!
//! let success = orchestrator.run_pipeline(None).await;
//! println!("Pipeline finished, success = {}", success);
//! ```

pub mod config;
pub mod context;
pub mod orchestrator;
pub mod report;

// Re-export main types for convenience
pub use config::{ConfigFormat, DependsOn, TaskSpec, WorkflowConfig, WorkflowSettings};
pub use context::PipelineContext;
pub use orchestrator::{PipelineOrchestrator, PipelineState, PipelineSummary, PlannedStep};
pub use report::{PipelineReport, ReportStore};
