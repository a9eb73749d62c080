//! Workflow configuration for the orchestrator.
//!
//! A workflow file (YAML or JSON, same schema) declares run-wide settings and
//! the ordered list of tasks to execute:
//!
//! ```yaml
//! name: system-inspector
//! version: "1.0.0"
//! settings:
//!   stop_on_error: true
//!   save_report: true
//!   report_dir: reports
//! tasks:
//!   - name: display_inspector
//!     module: tasks.display_inspector
//!     class: DisplayInspectorTask
//!   - name: terminal_setup
//!     module: tasks.terminal_setup
//!     class: TerminalSetupTask
//!     depends_on: display_inspector
//!     config:
//!       terminal_count: 3
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ConfigError;
use crate::task::TaskConfig;

/// Default location of the workflow file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/workflow.yaml";

/// Default directory for pipeline reports.
const DEFAULT_REPORT_DIR: &str = "reports";

/// Serialization format of a workflow file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Picks the format from the file extension: `.yaml`/`.yml` are YAML,
    /// everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        let is_yaml = path
            .extension()
            .map(|ext| ext == "yaml" || ext == "yml")
            .unwrap_or(false);

        if is_yaml {
            ConfigFormat::Yaml
        } else {
            ConfigFormat::Json
        }
    }
}

/// A complete workflow: metadata, settings and the ordered task list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name, recorded in reports.
    #[serde(default = "default_name")]
    pub name: String,
    /// Workflow version, recorded in reports.
    #[serde(default = "default_version", deserialize_with = "string_or_number")]
    pub version: String,
    /// Run-wide settings.
    #[serde(default)]
    pub settings: WorkflowSettings,
    /// Tasks in declared execution order.
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

/// Run-wide pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Halt the pipeline at the first failed task.
    pub stop_on_error: bool,
    /// Persist a report at the end of the run.
    pub save_report: bool,
    /// Directory for reports; relative paths are resolved against the
    /// workflow file's directory.
    pub report_dir: PathBuf,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            save_report: true,
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
        }
    }
}

/// One declared pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name, expected to be unique within the workflow.
    pub name: String,
    /// Module identifier used for registry lookup.
    pub module: String,
    /// Class identifier used for registry lookup.
    pub class: String,
    /// Disabled tasks are skipped unless selected explicitly.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared dependencies. Informational only; never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOn>,
    /// Task-specific options passed to the task constructor.
    #[serde(default)]
    pub config: TaskConfig,
}

impl TaskSpec {
    /// Creates an enabled spec with an empty config.
    pub fn new(
        name: impl Into<String>,
        module: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            class: class.into(),
            enabled: true,
            description: None,
            depends_on: None,
            config: TaskConfig::new(),
        }
    }

    /// Builder method to set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder method to declare dependencies.
    pub fn with_depends_on(mut self, depends_on: DependsOn) -> Self {
        self.depends_on = Some(depends_on);
        self
    }

    /// Builder method to set a config option.
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// Declared dependency hint: a single task name or a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    One(String),
    Many(Vec<String>),
}

impl DependsOn {
    /// Returns the declared names.
    pub fn names(&self) -> Vec<&str> {
        match self {
            DependsOn::One(name) => vec![name.as_str()],
            DependsOn::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

impl std::fmt::Display for DependsOn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.names().join(", "))
    }
}

impl WorkflowConfig {
    /// Loads a workflow from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the file does not exist and
    /// `ConfigError::ParseError` if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content, ConfigFormat::from_path(path)).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;

        Ok(config)
    }

    /// Parses a workflow from a string in the given format.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let parsed: Result<Self, String> = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };

        let config = parsed.map_err(|message| ConfigError::ParseError {
            path: "<inline>".to_string(),
            message,
        })?;

        config.warn_duplicate_names();
        Ok(config)
    }

    /// Returns the first task spec with the given name.
    pub fn find_task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|spec| spec.name == name)
    }

    /// Returns the names that appear more than once, in first-seen order.
    pub fn duplicate_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();

        for spec in &self.tasks {
            if !seen.insert(spec.name.as_str()) && !duplicates.contains(&spec.name.as_str()) {
                duplicates.push(spec.name.as_str());
            }
        }

        duplicates
    }

    /// Resolves the report directory against `base_dir` when it is relative.
    pub fn report_dir(&self, base_dir: &Path) -> PathBuf {
        if self.settings.report_dir.is_absolute() {
            self.settings.report_dir.clone()
        } else {
            base_dir.join(&self.settings.report_dir)
        }
    }

    fn warn_duplicate_names(&self) {
        for name in self.duplicate_names() {
            warn!(task = name, "Duplicate task name; only the first is selectable by name");
        }
    }
}

fn default_name() -> String {
    "unnamed".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Accepts `version: 1.0` as well as `version: "1.0.0"`.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
