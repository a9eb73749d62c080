//! Starts the interactive agent command in every terminal.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::external::{Toolbox, WindowTarget};
use crate::pipeline::PipelineContext;
use crate::task::{parse_settings, Task, TaskConfig, TaskData};

use super::model::{external_region, terminals};
use super::{object, try_screenshot, wait};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentLauncherSettings {
    /// Shell command typed into each terminal.
    pub command: String,
    pub wait_between_launches: f64,
    pub wait_after_all: f64,
    pub screenshot_after: bool,
    pub screenshot_dir: PathBuf,
    pub jpeg_quality: u8,
    pub resize_factor: f64,
}

impl Default for AgentLauncherSettings {
    fn default() -> Self {
        Self {
            command: "claude --dangerously-skip-permissions".to_string(),
            wait_between_launches: 7.0,
            wait_after_all: 5.0,
            screenshot_after: true,
            screenshot_dir: PathBuf::from("screenshots"),
            jpeg_quality: 100,
            resize_factor: 0.5,
        }
    }
}

/// Launches one agent per terminal, in layout order.
pub struct AgentLauncherTask {
    tools: Toolbox,
    config: TaskConfig,
}

impl AgentLauncherTask {
    pub fn new(tools: Toolbox, config: TaskConfig) -> Self {
        Self { tools, config }
    }
}

#[async_trait]
impl Task for AgentLauncherTask {
    fn name(&self) -> &str {
        "agent_launcher"
    }

    fn description(&self) -> &str {
        "Starts the agent command in each terminal"
    }

    fn version(&self) -> &str {
        "2.0.0"
    }

    async fn execute(&self, context: &PipelineContext) -> anyhow::Result<TaskData> {
        let settings: AgentLauncherSettings = parse_settings(&self.config)?;

        let terminals = terminals(context);
        if terminals.is_empty() {
            anyhow::bail!("No terminal information from previous task");
        }

        let automation = self.tools.automation();
        let total = terminals.len();
        let mut launched = Vec::new();

        for (i, terminal) in terminals.iter().enumerate() {
            let target = terminal.target_or(WindowTarget::reversed_index(i + 1, total));

            match automation.run_command(target, &settings.command).await {
                Ok(()) => {
                    info!(terminal = %terminal.title, window = %target, "Agent started");
                    launched.push(terminal.title.clone());
                }
                Err(e) => warn!(terminal = %terminal.title, window = %target, error = %e, "Failed to start agent"),
            }

            if i + 1 < total {
                wait(settings.wait_between_launches, "next launch").await;
            }
        }

        wait(settings.wait_after_all, "agents initializing").await;

        let screenshot = if settings.screenshot_after {
            try_screenshot(
                &self.tools,
                &settings.screenshot_dir,
                "agent_verification",
                external_region(context),
                settings.resize_factor,
                settings.jpeg_quality,
            )
            .await
        } else {
            None
        };

        info!(launched = launched.len(), total, "Agent launch finished");

        let status = if launched.len() == total {
            "SUCCESS"
        } else {
            "PARTIAL"
        };

        Ok(object(json!({
            "launched_count": launched.len(),
            "total_terminals": total,
            "launched_in": launched,
            "agent_command": settings.command,
            "screenshot": screenshot.as_ref().map(|s| s.path.display().to_string()),
            "verification": {
                "status": status,
                "evidence": screenshot.as_ref().map(|s| s.filename()),
                "message": format!("{} agent instances running", launched.len()),
            },
        })))
    }
}
