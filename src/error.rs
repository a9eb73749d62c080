//! Error types for system-inspector operations.
//!
//! Defines error types for the subsystems that can fail outside of a task body:
//! - Workflow configuration loading
//! - Task resolution through the registry
//! - Report persistence
//! - External tool invocations (subprocesses, broker API)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while loading a workflow configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when resolving a task implementation.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Task module '{0}' is not registered")]
    ModuleNotFound(String),

    #[error("Task class '{class}' not found in module '{module}'")]
    ClassNotFound { module: String, class: String },
}

/// Errors that can occur while saving or reading pipeline reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by external collaborators (subprocesses, HTTP APIs).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to spawn '{program}': {message}")]
    SpawnFailed { program: String, message: String },

    #[error("'{program}' timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("'{program}' exited with code {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Unexpected output from '{program}': {message}")]
    UnexpectedOutput { program: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
