//! Subprocess execution with timeouts and captured output.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ToolError;

/// Captured result of an external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code, `-1` if terminated by a signal.
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl CommandOutput {
    /// Creates a new command output.
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration: Duration::ZERO,
        }
    }

    /// Checks if the command exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout with surrounding whitespace removed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Runs external programs.
///
/// Tasks talk to the operating system only through this trait, so their
/// logic can be exercised without the real tools installed.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`, giving up after `timeout`.
    ///
    /// A non-zero exit is not an error here; inspect [`CommandOutput::exit_code`].
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ToolError>;

    /// Like [`CommandRunner::run`] but turns a non-zero exit into
    /// `ToolError::NonZeroExit`.
    async fn run_checked(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ToolError> {
        let output = self.run(program, args, timeout).await?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(ToolError::NonZeroExit {
                program: program.to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    /// Creates a new runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ToolError> {
        let start = Instant::now();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program, ?args, "Running command");

        let child = cmd.spawn().map_err(|e| ToolError::SpawnFailed {
            program: program.to_string(),
            message: e.to_string(),
        })?;

        // Dropping the child on timeout kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ToolError::Io(e)),
            Err(_) => {
                return Err(ToolError::Timeout {
                    program: program.to_string(),
                    timeout,
                })
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(program, exit_code, "Command finished");

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
        })
    }
}

/// Builds an argument vector from string slices.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
