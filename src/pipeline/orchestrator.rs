//! Pipeline orchestrator for running a workflow's tasks in order.
//!
//! The orchestrator walks the configured task list once, strictly
//! sequentially. For every selected spec it:
//! - Resolves the implementation through the [`TaskRegistry`]
//! - Constructs the task with the spec's `config`
//! - Runs it with [`run_task`] against the shared [`PipelineContext`]
//! - Records the result and merges its data into the context
//!
//! A failure halts the run only when `stop_on_error` is set. There is no
//! rollback: data merged by earlier tasks stays in the context and in the
//! report.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{error, info, warn};

use crate::error::ConfigError;
use crate::task::{run_task, TaskRegistry, TaskResult};

use super::config::{DependsOn, TaskSpec, WorkflowConfig};
use super::context::PipelineContext;
use super::report::{PipelineReport, ReportStore};

/// Lifecycle of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// The workflow file is being read.
    LoadingConfig,
    /// Configuration loaded, nothing executed yet.
    Ready,
    /// Tasks are executing.
    Running,
    /// The run ended early because a task failed and `stop_on_error` is set.
    StoppedOnError,
    /// Every selected task was attempted.
    Completed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::LoadingConfig => write!(f, "loading_config"),
            PipelineState::Ready => write!(f, "ready"),
            PipelineState::Running => write!(f, "running"),
            PipelineState::StoppedOnError => write!(f, "stopped_on_error"),
            PipelineState::Completed => write!(f, "completed"),
        }
    }
}

/// Outcome counters of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    /// Tasks that finished with `success`.
    pub success_count: usize,
    /// Failed tasks plus tasks that could not be resolved.
    pub fail_count: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Whether the run was cut short by `stop_on_error`.
    pub stopped_on_error: bool,
    /// Where the report was written, if one was saved.
    pub report_path: Option<PathBuf>,
}

impl PipelineSummary {
    /// A run succeeds when nothing failed.
    pub fn success(&self) -> bool {
        self.fail_count == 0
    }
}

/// One line of a dry-run plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    /// 1-based position in the declared task list.
    pub position: usize,
    /// Task name.
    pub name: String,
    /// Module identifier.
    pub module: String,
    /// Class identifier.
    pub class: String,
    /// Declared dependency hint.
    pub depends_on: Option<DependsOn>,
}

/// Runs a workflow's tasks and owns the shared context.
pub struct PipelineOrchestrator {
    config: WorkflowConfig,
    /// Directory relative paths in the workflow are resolved against.
    base_dir: PathBuf,
    registry: TaskRegistry,
    context: PipelineContext,
    results: Vec<TaskResult>,
    state: PipelineState,
    last_summary: Option<PipelineSummary>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator for an already loaded workflow.
    pub fn new(config: WorkflowConfig, base_dir: impl Into<PathBuf>, registry: TaskRegistry) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
            registry,
            context: PipelineContext::new(),
            results: Vec::new(),
            state: PipelineState::Ready,
            last_summary: None,
        }
    }

    /// Loads the workflow file and creates an orchestrator for it.
    ///
    /// Relative paths inside the workflow resolve against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing or cannot be parsed.
    pub fn load(config_path: impl AsRef<Path>, registry: TaskRegistry) -> Result<Self, ConfigError> {
        let config_path = config_path.as_ref();
        info!(state = %PipelineState::LoadingConfig, path = %config_path.display(), "Loading workflow");

        let config = WorkflowConfig::load(config_path)?;
        let base_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        info!(
            workflow = %config.name,
            tasks = config.tasks.len(),
            "Loaded workflow config"
        );
        Ok(Self::new(config, base_dir, registry))
    }

    /// The loaded workflow.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// The shared context.
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Results recorded by the most recent run, in execution order.
    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Summary of the most recent run.
    pub fn last_summary(&self) -> Option<&PipelineSummary> {
        self.last_summary.as_ref()
    }

    /// The report store configured by the workflow settings.
    pub fn report_store(&self) -> ReportStore {
        ReportStore::new(self.config.report_dir(&self.base_dir))
    }

    /// Replaces the context, e.g. with one recovered from an earlier report.
    pub fn seed_context(&mut self, context: PipelineContext) {
        self.context = context;
    }

    /// Seeds the context from the latest report in the report directory.
    ///
    /// Returns false and leaves the context untouched if no usable report exists.
    pub fn load_context_from_reports(&mut self) -> bool {
        match self.report_store().load_latest_context() {
            Some(context) => {
                self.seed_context(context);
                true
            }
            None => false,
        }
    }

    /// Configured task specs in declared order.
    pub fn list_tasks(&self) -> &[TaskSpec] {
        &self.config.tasks
    }

    /// The order enabled tasks would run in, with their declared dependencies.
    ///
    /// Nothing is resolved, constructed or executed.
    pub fn dry_run(&self) -> Vec<PlannedStep> {
        self.config
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.enabled)
            .map(|(i, spec)| PlannedStep {
                position: i + 1,
                name: spec.name.clone(),
                module: spec.module.clone(),
                class: spec.class.clone(),
                depends_on: spec.depends_on.clone(),
            })
            .collect()
    }

    /// Runs the pipeline and returns true if no task failed.
    ///
    /// With `specific_task`, only the first spec with that name runs, even if
    /// it is disabled. Otherwise every enabled spec runs in declared order.
    pub async fn run_pipeline(&mut self, specific_task: Option<&str>) -> bool {
        let started_at = Local::now();
        let clock = Instant::now();

        self.state = PipelineState::Running;
        self.results.clear();

        info!(
            workflow = %self.config.name,
            version = %self.config.version,
            started_at = %started_at.to_rfc3339(),
            "Pipeline started"
        );

        let stop_on_error = self.config.settings.stop_on_error;
        let mut success_count = 0;
        let mut fail_count = 0;
        let mut stopped_on_error = false;
        let mut matched = false;

        for spec in &self.config.tasks {
            match specific_task {
                Some(wanted) => {
                    if matched || spec.name != wanted {
                        continue;
                    }
                    matched = true;
                }
                None => {
                    if !spec.enabled {
                        info!(task = %spec.name, "Skipping disabled task");
                        continue;
                    }
                }
            }

            let factory = match self.registry.resolve(&spec.module, &spec.class) {
                Ok(factory) => factory,
                Err(e) => {
                    error!(task = %spec.name, error = %e, "Cannot load task");
                    fail_count += 1;
                    if stop_on_error {
                        stopped_on_error = true;
                        break;
                    }
                    continue;
                }
            };

            let task = factory(spec.config.clone());
            let result = run_task(task.as_ref(), &self.context).await;

            if !result.data().is_empty() {
                self.context.merge(result.data().clone());
            }

            let succeeded = result.is_success();
            self.results.push(result);

            if succeeded {
                success_count += 1;
            } else {
                fail_count += 1;
                if stop_on_error {
                    warn!(task = %spec.name, "Stopping pipeline due to task failure");
                    stopped_on_error = true;
                    break;
                }
            }
        }

        if let Some(wanted) = specific_task {
            if !matched {
                warn!(task = wanted, "No task with this name in the workflow");
            }
        }

        let duration = clock.elapsed();
        self.state = if stopped_on_error {
            PipelineState::StoppedOnError
        } else {
            PipelineState::Completed
        };

        info!(
            success_count,
            fail_count,
            duration_secs = duration.as_secs_f64(),
            state = %self.state,
            "Pipeline finished"
        );

        let report_path = if self.config.settings.save_report {
            self.save_report(started_at)
        } else {
            None
        };

        let summary = PipelineSummary {
            success_count,
            fail_count,
            duration,
            stopped_on_error,
            report_path,
        };
        let success = summary.success();
        self.last_summary = Some(summary);
        success
    }

    fn save_report(&self, started_at: chrono::DateTime<Local>) -> Option<PathBuf> {
        let report = PipelineReport {
            workflow: self.config.name.clone(),
            version: self.config.version.clone(),
            started_at,
            completed_at: Local::now(),
            tasks: self.results.clone(),
            final_context: self.context.clone(),
        };

        match self.report_store().save(&report) {
            Ok(path) => Some(path),
            Err(e) => {
                error!(error = %e, "Failed to save pipeline report");
                None
            }
        }
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("workflow", &self.config.name)
            .field("state", &self.state)
            .field("results", &self.results.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::WorkflowSettings;
    use crate::task::{Task, TaskData, TaskStatus};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    /// Emits the key/value pair given in its config.
    struct EmitTask {
        config: crate::task::TaskConfig,
    }

    #[async_trait]
    impl Task for EmitTask {
        fn name(&self) -> &str {
            "emit"
        }

        fn description(&self) -> &str {
            "Emits its config as data"
        }

        async fn execute(&self, _context: &PipelineContext) -> anyhow::Result<TaskData> {
            Ok(self.config.clone())
        }
    }

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry.register("test", "Emit", |config| Box::new(EmitTask { config }));
        registry
    }

    fn workflow(tasks: Vec<TaskSpec>, report_dir: &Path) -> WorkflowConfig {
        WorkflowConfig {
            name: "unit".to_string(),
            version: "1.0.0".to_string(),
            settings: WorkflowSettings {
                stop_on_error: false,
                save_report: true,
                report_dir: report_dir.to_path_buf(),
            },
            tasks,
        }
    }

    #[tokio::test]
    async fn test_disabled_tasks_are_skipped() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![
            TaskSpec::new("one", "test", "Emit").with_option("a", json!(1)),
            TaskSpec::new("two", "test", "Emit")
                .with_option("b", json!(2))
                .with_enabled(false),
        ];
        let mut orchestrator = PipelineOrchestrator::new(workflow(tasks, dir.path()), ".", registry());
        assert_eq!(orchestrator.state(), PipelineState::Ready);

        assert!(orchestrator.run_pipeline(None).await);
        assert_eq!(orchestrator.results().len(), 1);
        assert_eq!(orchestrator.context().get("a"), Some(&json!(1)));
        assert!(!orchestrator.context().contains_key("b"));
        assert_eq!(orchestrator.state(), PipelineState::Completed);

        let summary = orchestrator.last_summary().unwrap();
        assert_eq!(summary.success_count, 1);
        assert!(summary.report_path.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn test_specific_task_runs_first_match_even_if_disabled() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![
            TaskSpec::new("one", "test", "Emit").with_option("a", json!(1)),
            TaskSpec::new("two", "test", "Emit")
                .with_option("b", json!("first"))
                .with_enabled(false),
            TaskSpec::new("two", "test", "Emit").with_option("b", json!("second")),
        ];
        let mut orchestrator = PipelineOrchestrator::new(workflow(tasks, dir.path()), ".", registry());

        assert!(orchestrator.run_pipeline(Some("two")).await);
        assert_eq!(orchestrator.results().len(), 1);
        assert_eq!(orchestrator.results()[0].status(), TaskStatus::Success);
        assert_eq!(orchestrator.context().get("b"), Some(&json!("first")));
        assert!(!orchestrator.context().contains_key("a"));
    }

    #[tokio::test]
    async fn test_unresolvable_task_counts_as_failure_without_result() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![
            TaskSpec::new("missing", "test", "Nope"),
            TaskSpec::new("one", "test", "Emit").with_option("a", json!(1)),
        ];
        let mut config = workflow(tasks, dir.path());
        config.settings.save_report = false;
        let mut orchestrator = PipelineOrchestrator::new(config, ".", registry());

        assert!(!orchestrator.run_pipeline(None).await);
        assert_eq!(orchestrator.results().len(), 1);
        assert_eq!(orchestrator.last_summary().unwrap().fail_count, 1);
        assert!(orchestrator.last_summary().unwrap().report_path.is_none());
        assert!(orchestrator.report_store().report_files().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_task_stops_pipeline() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![
            TaskSpec::new("missing", "nowhere", "Emit"),
            TaskSpec::new("one", "test", "Emit").with_option("a", json!(1)),
        ];
        let mut config = workflow(tasks, dir.path());
        config.settings.stop_on_error = true;
        let mut orchestrator = PipelineOrchestrator::new(config, ".", registry());

        assert!(!orchestrator.run_pipeline(None).await);
        assert!(orchestrator.results().is_empty());
        assert!(orchestrator.context().is_empty());
        assert_eq!(orchestrator.state(), PipelineState::StoppedOnError);
    }

    #[test]
    fn test_dry_run_and_list_do_not_touch_registry() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![
            TaskSpec::new("one", "unregistered", "X"),
            TaskSpec::new("two", "unregistered", "Y").with_enabled(false),
            TaskSpec::new("three", "unregistered", "Z")
                .with_depends_on(DependsOn::One("one".to_string())),
        ];
        let orchestrator =
            PipelineOrchestrator::new(workflow(tasks, dir.path()), ".", TaskRegistry::new());

        let plan = orchestrator.dry_run();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].position, 1);
        assert_eq!(plan[1].position, 3);
        assert_eq!(plan[1].depends_on, Some(DependsOn::One("one".to_string())));

        assert_eq!(orchestrator.list_tasks().len(), 3);
        assert!(orchestrator.context().is_empty());
        assert_eq!(orchestrator.state(), PipelineState::Ready);
        assert!(orchestrator.report_store().report_files().is_empty());
    }

    #[tokio::test]
    async fn test_seeded_context_is_kept_in_report() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![TaskSpec::new("one", "test", "Emit").with_option("a", json!(1))];
        let mut orchestrator = PipelineOrchestrator::new(workflow(tasks, dir.path()), ".", registry());

        let mut seed = PipelineContext::new();
        seed.insert("window_id", Value::from(555));
        orchestrator.seed_context(seed);

        assert!(orchestrator.run_pipeline(None).await);
        let path = orchestrator.last_summary().unwrap().report_path.clone().unwrap();
        let report = ReportStore::load(path).unwrap();
        assert_eq!(report.final_context.get("window_id"), Some(&json!(555)));
        assert_eq!(report.final_context.get("a"), Some(&json!(1)));
        assert_eq!(report.tasks.len(), 1);
    }

    #[test]
    fn test_load_resolves_base_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("workflow.yaml");
        std::fs::write(&path, "name: wf\ntasks: []\n").unwrap();

        let orchestrator = PipelineOrchestrator::load(&path, TaskRegistry::new()).unwrap();
        assert_eq!(orchestrator.config().name, "wf");
        assert_eq!(orchestrator.report_store().dir(), dir.path().join("reports"));

        let missing = PipelineOrchestrator::load(dir.path().join("nope.yaml"), TaskRegistry::new());
        assert!(missing.is_err());
    }
}
