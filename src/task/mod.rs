//! Task units and their execution wrapper.
//!
//! A task unit is one pipeline step. Implementations only provide
//! [`Task::execute`]; timing, status assignment and failure capture are
//! applied uniformly by [`run_task`], which is the only way the orchestrator
//! runs a task.
//!
//! # Example
//!
//! ```rust,ignore
//! use system_inspector::task::{run_task, Task, TaskData};
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Task for Hello {
//!     fn name(&self) -> &str { "hello" }
//!     fn description(&self) -> &str { "Says hello" }
//!     async fn execute(&self, _ctx: &PipelineContext) -> anyhow::Result<TaskData> {
//!         let mut data = TaskData::new();
//!         data.insert("greeting".into(), "hello".into());
//!         Ok(data)
//!     }
//! }
//!
//! let result = run_task(&Hello, &PipelineContext::new()).await;
//! assert!(result.is_success());
//! ```

pub mod registry;

pub use registry::{TaskFactory, TaskRegistry};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::pipeline::PipelineContext;

/// Key/value output of a task, merged into the pipeline context.
pub type TaskData = Map<String, Value>;

/// Task-specific options from the workflow file, opaque to the orchestrator.
pub type TaskConfig = Map<String, Value>;

/// Status of a task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of one executed task. Only [`run_task`] produces these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    task_name: String,
    status: TaskStatus,
    #[serde(default)]
    data: TaskData,
    error: Option<String>,
    started_at: DateTime<Local>,
    completed_at: DateTime<Local>,
    duration_ms: f64,
}

impl TaskResult {
    /// Name of the task that produced this result.
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Final status, always `Success` or `Failed` for results from [`run_task`].
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Data produced by the task; empty for failed tasks.
    pub fn data(&self) -> &TaskData {
        &self.data
    }

    /// Failure message, present iff the task failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// When execution started.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// When execution finished.
    pub fn completed_at(&self) -> DateTime<Local> {
        self.completed_at
    }

    /// Wall-clock duration in milliseconds, rounded to two decimals.
    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Returns true if the task succeeded.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// A single pipeline step.
///
/// Implementations perform their work in `execute` and report failure by
/// returning `Err`. The context is only borrowed for the duration of the call.
#[async_trait]
pub trait Task: Send + Sync {
    /// Declared task name, used in results and logs.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Version of the task contract.
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Performs the task's work.
    async fn execute(&self, context: &PipelineContext) -> anyhow::Result<TaskData>;
}

/// Runs a task, capturing timing and converting any failure into a
/// `Failed` result.
///
/// This never returns an error and never unwinds: an `Err` or a panic from
/// `execute` becomes a failed [`TaskResult`] with empty data.
pub async fn run_task(task: &dyn Task, context: &PipelineContext) -> TaskResult {
    let started_at = Local::now();
    let clock = Instant::now();

    info!(
        task = task.name(),
        version = task.version(),
        "Starting task: {}",
        task.description()
    );

    let outcome = AssertUnwindSafe(task.execute(context)).catch_unwind().await;

    let (status, data, error) = match outcome {
        Ok(Ok(data)) => (TaskStatus::Success, data, None),
        Ok(Err(e)) => (TaskStatus::Failed, TaskData::new(), Some(format!("{e:#}"))),
        Err(panic) => (
            TaskStatus::Failed,
            TaskData::new(),
            Some(format!("task panicked: {}", panic_message(panic.as_ref()))),
        ),
    };

    let duration_ms = round_ms(clock.elapsed().as_secs_f64() * 1000.0);

    match &error {
        None => info!(task = task.name(), duration_ms, "Task completed"),
        Some(message) => error!(task = task.name(), duration_ms, "Task failed: {}", message),
    }

    TaskResult {
        task_name: task.name().to_string(),
        status,
        data,
        error,
        started_at,
        completed_at: Local::now(),
        duration_ms,
    }
}

/// Deserializes task settings from a task's config mapping.
///
/// Settings types are expected to use `#[serde(default)]` so that any option
/// missing from the workflow file falls back to its default.
pub fn parse_settings<T: DeserializeOwned>(config: &TaskConfig) -> anyhow::Result<T> {
    serde_json::from_value(Value::Object(config.clone())).context("invalid task config")
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use serde_json::json;

    struct EchoTask;

    #[async_trait]
    impl Task for EchoTask {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Copies 'input' to 'output'"
        }

        async fn execute(&self, context: &PipelineContext) -> anyhow::Result<TaskData> {
            let mut data = TaskData::new();
            data.insert(
                "output".to_string(),
                context.get("input").cloned().unwrap_or(Value::Null),
            );
            Ok(data)
        }
    }

    struct FailingTask;

    #[async_trait]
    impl Task for FailingTask {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn execute(&self, _context: &PipelineContext) -> anyhow::Result<TaskData> {
            Err(anyhow::anyhow!("disk on fire")).context("while inspecting")
        }
    }

    struct PanickingTask;

    #[async_trait]
    impl Task for PanickingTask {
        fn name(&self) -> &str {
            "panicking"
        }

        fn description(&self) -> &str {
            "Panics"
        }

        async fn execute(&self, _context: &PipelineContext) -> anyhow::Result<TaskData> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn test_run_task_success() {
        let mut context = PipelineContext::new();
        context.insert("input", json!(42));

        let result = run_task(&EchoTask, &context).await;

        assert_eq!(result.task_name(), "echo");
        assert_eq!(result.status(), TaskStatus::Success);
        assert_eq!(result.data().get("output"), Some(&json!(42)));
        assert!(result.error().is_none());
        assert!(result.duration_ms() >= 0.0);
        assert!(result.completed_at() >= result.started_at());
    }

    #[tokio::test]
    async fn test_run_task_failure_discards_data() {
        let result = run_task(&FailingTask, &PipelineContext::new()).await;

        assert_eq!(result.status(), TaskStatus::Failed);
        assert!(result.data().is_empty());
        let error = result.error().expect("failed result has an error");
        assert!(error.contains("while inspecting"));
        assert!(error.contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_run_task_catches_panic() {
        let result = run_task(&PanickingTask, &PipelineContext::new()).await;

        assert_eq!(result.status(), TaskStatus::Failed);
        assert_eq!(result.task_name(), "panicking");
        assert!(result.error().unwrap().contains("boom"));
    }

    #[test]
    fn test_round_ms() {
        assert_eq!(round_ms(12.3456), 12.35);
        assert_eq!(round_ms(0.0), 0.0);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&TaskStatus::Success).unwrap(), "\"success\"");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_parse_settings_defaults_and_errors() {
        #[derive(Deserialize)]
        #[serde(default)]
        struct Settings {
            count: u32,
        }

        impl Default for Settings {
            fn default() -> Self {
                Self { count: 3 }
            }
        }

        let settings: Settings = parse_settings(&TaskConfig::new()).unwrap();
        assert_eq!(settings.count, 3);

        let mut config = TaskConfig::new();
        config.insert("count".to_string(), json!("three"));
        assert!(parse_settings::<Settings>(&config).is_err());
    }
}
