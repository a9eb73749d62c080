//! Shuts the agents down, cleans broker state and closes the terminals.
//!
//! Usually run on its own with `--task task_final --load-context`, seeded from
//! the report of the run that opened the terminals.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::external::{BrokerClient, BrokerConfig, Toolbox, WindowTarget};
use crate::pipeline::PipelineContext;
use crate::task::{parse_settings, Task, TaskConfig, TaskData};

use super::model::{terminals, TerminalWindow};
use super::{object, wait};

/// Text typed into each agent to make it quit.
const EXIT_COMMAND: &str = "/exit";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    pub wait_before_exit: f64,
    pub wait_after_exit: f64,
    pub wait_before_close: f64,
    pub wait_between_terminals: f64,
    pub close_terminal_after: bool,
    pub cleanup_broker: bool,
    pub broker: BrokerConfig,
    /// Exclusive queues owned by the agents.
    pub queues: Vec<String>,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            wait_before_exit: 2.0,
            wait_after_exit: 5.0,
            wait_before_close: 2.0,
            wait_between_terminals: 3.0,
            close_terminal_after: true,
            cleanup_broker: true,
            broker: BrokerConfig::default(),
            queues: [
                "brainstorm.team-leader-main",
                "brainstorm.results.team-leader-main",
                "status.team-leader-main",
                "brainstorm.worker-1",
                "brainstorm.results.worker-1",
                "brainstorm.worker-2",
                "brainstorm.results.worker-2",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Per-terminal shutdown outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStatus {
    /// Exit sent and window closed.
    Success,
    /// Exit sent, window close failed.
    Partial,
    /// Exit sent, window left open by configuration.
    ExitOnly,
    /// Exit could not be sent.
    Failed,
}

impl ShutdownStatus {
    /// Whether the agent in the terminal was stopped.
    pub fn is_closed(self) -> bool {
        matches!(self, ShutdownStatus::Success | ShutdownStatus::ExitOnly)
    }
}

#[derive(Debug, Clone, Serialize)]
struct TerminalShutdown {
    terminal: String,
    window_id: Option<u64>,
    exit_sent: bool,
    terminal_closed: bool,
    status: ShutdownStatus,
}

/// Stops every agent and tidies up after the workflow.
pub struct SafeShutdownTask {
    tools: Toolbox,
    config: TaskConfig,
}

impl SafeShutdownTask {
    pub fn new(tools: Toolbox, config: TaskConfig) -> Self {
        Self { tools, config }
    }

    async fn shutdown_terminal(
        &self,
        settings: &ShutdownSettings,
        terminal: &TerminalWindow,
    ) -> TerminalShutdown {
        let automation = self.tools.automation();
        let target = terminal.target_or(WindowTarget::XPosition(terminal.bounds.x));

        wait(settings.wait_before_exit, "before exit").await;

        let mut outcome = TerminalShutdown {
            terminal: terminal.title.clone(),
            window_id: terminal.window_id,
            exit_sent: false,
            terminal_closed: false,
            status: ShutdownStatus::Failed,
        };

        if let Err(e) = automation.type_text(target, EXIT_COMMAND).await {
            warn!(terminal = %terminal.title, window = %target, error = %e, "Failed to send exit");
            return outcome;
        }
        outcome.exit_sent = true;
        wait(settings.wait_after_exit, "agent exit").await;

        if !settings.close_terminal_after {
            outcome.status = ShutdownStatus::ExitOnly;
            return outcome;
        }

        wait(settings.wait_before_close, "before close").await;
        match automation.close_window(target).await {
            Ok(()) => {
                outcome.terminal_closed = true;
                outcome.status = ShutdownStatus::Success;
            }
            Err(e) => {
                warn!(terminal = %terminal.title, window = %target, error = %e, "Failed to close window");
                outcome.status = ShutdownStatus::Partial;
            }
        }
        outcome
    }
}

#[async_trait]
impl Task for SafeShutdownTask {
    fn name(&self) -> &str {
        "task_final"
    }

    fn description(&self) -> &str {
        "Stops the agents, cleans broker queues and closes the terminals"
    }

    fn version(&self) -> &str {
        "2.0.0"
    }

    async fn execute(&self, context: &PipelineContext) -> anyhow::Result<TaskData> {
        let settings: ShutdownSettings = parse_settings(&self.config)?;

        // Stale exclusive queues lock out the next run, so clean them even
        // when there is nothing else to shut down.
        let broker_cleanup = if settings.cleanup_broker {
            let client = BrokerClient::new(settings.broker.clone().with_env_password())?;
            Some(client.cleanup(&settings.queues).await)
        } else {
            None
        };

        let terminals = terminals(context);
        if terminals.is_empty() {
            anyhow::bail!("No terminal information from previous tasks");
        }

        let total = terminals.len();
        let mut results = Vec::with_capacity(total);
        for (i, terminal) in terminals.iter().enumerate() {
            let outcome = self.shutdown_terminal(&settings, terminal).await;
            info!(terminal = %outcome.terminal, status = ?outcome.status, "Terminal shut down");
            results.push(outcome);

            if i + 1 < total {
                wait(settings.wait_between_terminals, "next terminal").await;
            }
        }

        let closed_count = results.iter().filter(|r| r.status.is_closed()).count();
        if closed_count == 0 {
            warn!(total, "No terminal was shut down");
        }
        info!(closed_count, total, "Shutdown finished");

        Ok(object(json!({
            "closed_count": closed_count,
            "total_terminals": total,
            "results": results,
            "shutdown_complete": closed_count == total,
            "broker_cleanup": broker_cleanup,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::command::CommandOutput;
    use crate::external::testing::FakeRunner;
    use crate::task::run_task;
    use serde_json::Value;
    use std::sync::Arc;

    fn context() -> PipelineContext {
        let mut context = PipelineContext::new();
        context.insert(
            "terminals",
            json!([
                {"index": 1, "title": "LEADER", "x": 0, "y": 0, "width": 10, "height": 10, "window_id": 555},
                {"index": 2, "title": "WORKER-1", "x": 640, "y": 0, "width": 10, "height": 10}
            ]),
        );
        context
    }

    fn config(close: bool) -> TaskConfig {
        match json!({
            "wait_before_exit": 0,
            "wait_after_exit": 0,
            "wait_before_close": 0,
            "wait_between_terminals": 0,
            "close_terminal_after": close,
            "cleanup_broker": false,
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_value(ShutdownStatus::ExitOnly).unwrap(), "exit_only");
        assert!(ShutdownStatus::ExitOnly.is_closed());
        assert!(!ShutdownStatus::Partial.is_closed());
    }

    #[test]
    fn test_default_queues() {
        let settings = ShutdownSettings::default();
        assert_eq!(settings.queues.len(), 7);
        assert!(settings.queues.contains(&"status.team-leader-main".to_string()));
    }

    #[tokio::test]
    async fn test_exits_and_closes_every_terminal() {
        let runner = Arc::new(FakeRunner::desktop());
        let task = SafeShutdownTask::new(Toolbox::new(runner.clone(), "."), config(true));

        let data = task.execute(&context()).await.unwrap();
        assert_eq!(data["closed_count"], 2);
        assert_eq!(data["shutdown_complete"], true);
        assert_eq!(data["results"][0]["status"], "success");
        assert_eq!(data["results"][0]["window_id"], 555);
        assert!(data["broker_cleanup"].is_null());

        let scripts = runner.calls_to("osascript");
        assert_eq!(scripts.len(), 4);
        assert!(scripts[0][1].contains("window id 555"));
        assert!(scripts[0][1].contains("keystroke \"/exit\""));
        assert!(scripts[1][1].contains("close targetWindow"));
        assert!(scripts[2][1].contains("(640 - 50)"));
    }

    #[tokio::test]
    async fn test_exit_only_when_windows_stay_open() {
        let runner = Arc::new(FakeRunner::desktop());
        let task = SafeShutdownTask::new(Toolbox::new(runner.clone(), "."), config(false));

        let data = task.execute(&context()).await.unwrap();
        assert_eq!(data["closed_count"], 2);
        assert_eq!(data["results"][1]["status"], "exit_only");
        assert_eq!(runner.calls_to("osascript").len(), 2);
    }

    #[tokio::test]
    async fn test_partial_and_failed_outcomes() {
        let runner = Arc::new(FakeRunner::new(|_, args| {
            let script = &args[1];
            let reply = if script.contains("window id 555") && script.contains("close targetWindow") {
                "ERROR: busy"
            } else if script.contains("(640 - 50)") {
                "ERROR: window at x=640 not found"
            } else {
                "OK"
            };
            Ok(CommandOutput::new(0, reply, ""))
        }));
        let task = SafeShutdownTask::new(Toolbox::new(runner, "."), config(true));

        let data = task.execute(&context()).await.unwrap();
        assert_eq!(data["results"][0]["status"], "partial");
        assert_eq!(data["results"][1]["status"], "failed");
        assert_eq!(data["results"][1]["exit_sent"], false);
        assert_eq!(data["closed_count"], 0);
        assert_eq!(data["shutdown_complete"], false);
    }

    #[tokio::test]
    async fn test_requires_terminals() {
        let task = SafeShutdownTask::new(
            Toolbox::new(Arc::new(FakeRunner::desktop()), "."),
            config(true),
        );
        let result = run_task(&task, &PipelineContext::new()).await;
        assert_eq!(result.error(), Some("No terminal information from previous tasks"));
    }
}
