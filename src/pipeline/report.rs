//! Pipeline reports and the directory they are stored in.
//!
//! Every run can persist one JSON report named
//! `pipeline_report_<YYYYMMDD_HHMMSS>.json`. Reports are never rewritten; a
//! later process can read the newest one back to seed its context, which is
//! how a cleanup-only run recovers window ids produced by an earlier run.
//!
//! A report whose file name contains [`BASELINE_MARKER`] is a manually kept
//! known-good run. It is only used when no unmarked report exists.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ReportError;
use crate::task::TaskResult;

use super::context::PipelineContext;

/// File name prefix shared by all reports.
pub const REPORT_PREFIX: &str = "pipeline_report_";

/// Token marking a manually kept baseline report.
pub const BASELINE_MARKER: &str = "WORKED";

/// Timestamp format used in report file names.
const REPORT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Persisted record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Workflow name.
    pub workflow: String,
    /// Workflow version.
    pub version: String,
    /// When the run started.
    pub started_at: DateTime<Local>,
    /// When the report was produced.
    pub completed_at: DateTime<Local>,
    /// Results in execution order.
    pub tasks: Vec<TaskResult>,
    /// Context at the end of the run.
    pub final_context: PipelineContext,
}

/// Only the part of a report needed to seed a new run.
#[derive(Deserialize)]
struct ContextSnapshot {
    #[serde(default)]
    final_context: PipelineContext,
}

/// Append-only directory of pipeline reports.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the reports.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes a report to a new timestamped file and returns its path.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::AlreadyExists` if a report with the same
    /// timestamp already exists; existing reports are never overwritten.
    pub fn save(&self, report: &PipelineReport) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.dir)?;

        let timestamp = Local::now().format(REPORT_TIMESTAMP_FORMAT);
        let path = self.dir.join(format!("{REPORT_PREFIX}{timestamp}.json"));

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ReportError::AlreadyExists(path));
            }
            Err(e) => return Err(e.into()),
        };

        let contents = serde_json::to_string_pretty(report)?;
        file.write_all(contents.as_bytes())?;

        info!(path = %path.display(), "Report saved");
        Ok(path)
    }

    /// Reads a full report from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<PipelineReport, ReportError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Lists all files matching `pipeline_report_*.json`.
    ///
    /// A missing directory yields an empty list.
    pub fn report_files(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_report_file(path))
            .collect();

        files.sort();
        files
    }

    /// Picks the report to seed a new run from.
    ///
    /// The most recently modified unmarked report wins; the newest marked
    /// baseline is used only if no unmarked report exists.
    pub fn latest_report_path(&self) -> Option<PathBuf> {
        let files = self.report_files();
        let (marked, unmarked): (Vec<PathBuf>, Vec<PathBuf>) =
            files.into_iter().partition(|path| is_baseline(path));

        if !unmarked.is_empty() {
            newest(unmarked)
        } else {
            newest(marked)
        }
    }

    /// Returns the `final_context` of the latest report.
    ///
    /// Returns `None` when there is no report, the chosen report cannot be
    /// parsed, or its context is empty.
    pub fn load_latest_context(&self) -> Option<PipelineContext> {
        let path = self.latest_report_path()?;

        let snapshot: ContextSnapshot = match fs::read_to_string(&path)
            .map_err(ReportError::from)
            .and_then(|s| serde_json::from_str(&s).map_err(ReportError::from))
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read report");
                return None;
            }
        };

        if snapshot.final_context.is_empty() {
            debug!(path = %path.display(), "Latest report has an empty context");
            return None;
        }

        info!(
            path = %path.display(),
            keys = ?snapshot.final_context.keys().collect::<Vec<_>>(),
            "Loaded context from report"
        );
        Some(snapshot.final_context)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn is_report_file(path: &Path) -> bool {
    let name = file_name(path);
    name.starts_with(REPORT_PREFIX) && name.ends_with(".json")
}

fn is_baseline(path: &Path) -> bool {
    file_name(path).contains(BASELINE_MARKER)
}

fn newest(paths: Vec<PathBuf>) -> Option<PathBuf> {
    paths.into_iter().max_by_key(|path| {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        (modified, file_name(path))
    })
}
