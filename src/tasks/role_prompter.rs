//! Tells each running agent which role it plays.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::external::{Toolbox, WindowTarget};
use crate::pipeline::PipelineContext;
use crate::task::{parse_settings, Task, TaskConfig, TaskData};

use super::model::{external_region, terminals};
use super::{object, try_screenshot, wait};

/// Placeholder replaced by the resolved role documents directory.
const ROLES_DIR_PLACEHOLDER: &str = "{roles_dir}";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RolePrompterSettings {
    /// Prompt per terminal title. `{roles_dir}` expands to `roles_dir`.
    pub role_prompts: BTreeMap<String, String>,
    /// Prompt for titles without an entry in `role_prompts`.
    pub default_prompt: String,
    /// Directory holding the role documents.
    pub roles_dir: PathBuf,
    pub wait_before_typing: f64,
    pub wait_after_enter: f64,
    pub wait_between_terminals: f64,
    pub screenshot_after_each: bool,
    pub screenshot_dir: PathBuf,
    pub jpeg_quality: u8,
    pub resize_factor: f64,
}

impl Default for RolePrompterSettings {
    fn default() -> Self {
        let role_prompts = [
            ("LEADER", "TEAM LEADER"),
            ("WORKER-1", "WORKER-1 (Collaborator)"),
            ("WORKER-2", "WORKER-2"),
        ]
        .into_iter()
        .map(|(title, role)| {
            (
                title.to_string(),
                format!(
                    "Your role is {role}. Now read {ROLES_DIR_PLACEHOLDER}/{title}.md and follow its instructions."
                ),
            )
        })
        .collect();

        Self {
            role_prompts,
            default_prompt: "I will give you a task, are you ready?".to_string(),
            roles_dir: PathBuf::from("docs/roles"),
            wait_before_typing: 5.0,
            wait_after_enter: 10.0,
            wait_between_terminals: 7.0,
            screenshot_after_each: true,
            screenshot_dir: PathBuf::from("screenshots"),
            jpeg_quality: 100,
            resize_factor: 0.5,
        }
    }
}

impl RolePrompterSettings {
    /// Prompt for a terminal title with the roles directory expanded.
    pub fn prompt_for(&self, title: &str, roles_dir: &str) -> String {
        self.role_prompts
            .get(title)
            .unwrap_or(&self.default_prompt)
            .replace(ROLES_DIR_PLACEHOLDER, roles_dir)
    }
}

/// Types a role prompt into every agent terminal.
pub struct RolePrompterTask {
    tools: Toolbox,
    config: TaskConfig,
}

impl RolePrompterTask {
    pub fn new(tools: Toolbox, config: TaskConfig) -> Self {
        Self { tools, config }
    }
}

#[async_trait]
impl Task for RolePrompterTask {
    fn name(&self) -> &str {
        "role_prompter"
    }

    fn description(&self) -> &str {
        "Assigns a role to the agent in each terminal"
    }

    fn version(&self) -> &str {
        "3.0.0"
    }

    async fn execute(&self, context: &PipelineContext) -> anyhow::Result<TaskData> {
        let settings: RolePrompterSettings = parse_settings(&self.config)?;

        let terminals = terminals(context);
        let launched_in = context
            .get_as::<Vec<String>>("launched_in")
            .unwrap_or_default();
        if terminals.is_empty() || launched_in.is_empty() {
            anyhow::bail!("No terminal/launch information from previous tasks");
        }

        // Agents resolve the documents from their own working directory.
        let roles_dir = self.tools.resolve(&settings.roles_dir);
        let roles_dir = roles_dir.display().to_string();

        let automation = self.tools.automation();
        let region = external_region(context);
        let total = terminals.len();

        let mut results = Vec::new();
        let mut role_assignments = Map::new();
        let mut screenshots = Vec::new();

        wait(settings.wait_before_typing, "agents ready").await;

        for (i, terminal) in terminals.iter().enumerate() {
            let prompt = settings.prompt_for(&terminal.title, &roles_dir);
            let target = terminal.target_or(WindowTarget::XPosition(terminal.bounds.x));

            match automation.type_text(target, &prompt).await {
                Ok(()) => {
                    info!(terminal = %terminal.title, window = %target, "Role prompt sent");
                    wait(settings.wait_after_enter, "agent response").await;

                    if settings.screenshot_after_each {
                        let prefix = format!("response_{}", safe_title(&terminal.title));
                        if let Some(shot) = try_screenshot(
                            &self.tools,
                            &settings.screenshot_dir,
                            &prefix,
                            region,
                            settings.resize_factor,
                            settings.jpeg_quality,
                        )
                        .await
                        {
                            screenshots.push(shot.path.display().to_string());
                        }
                    }

                    role_assignments.insert(
                        terminal.title.clone(),
                        json!({
                            "window_id": terminal.window_id,
                            "role": terminal.title,
                            "prompt_sent": prompt,
                            "status": "assigned",
                        }),
                    );
                    results.push(json!({
                        "terminal": terminal.title,
                        "window_id": terminal.window_id,
                        "status": "success",
                        "prompt_sent": prompt,
                    }));
                }
                Err(e) => {
                    warn!(terminal = %terminal.title, window = %target, error = %e, "Failed to send role prompt");
                    results.push(json!({
                        "terminal": terminal.title,
                        "window_id": terminal.window_id,
                        "status": "failed",
                    }));
                }
            }

            if i + 1 < total {
                wait(settings.wait_between_terminals, "next terminal").await;
            }
        }

        let final_screenshot = try_screenshot(
            &self.tools,
            &settings.screenshot_dir,
            "roles_final",
            region,
            settings.resize_factor,
            settings.jpeg_quality,
        )
        .await;

        let prompts_sent = role_assignments.len();
        info!(prompts_sent, total, "Role assignment finished");

        Ok(object(json!({
            "prompts_sent": prompts_sent,
            "total_terminals": total,
            "results": results,
            "role_assignments": Value::Object(role_assignments),
            "screenshots": screenshots,
            "final_screenshot": final_screenshot.map(|s| s.path.display().to_string()),
        })))
    }
}

/// Lowercased title with spaces replaced, for file names.
fn safe_title(title: &str) -> String {
    title.replace(' ', "_").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::command::CommandOutput;
    use crate::external::testing::{touch_last_arg, FakeRunner};
    use crate::task::run_task;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context() -> PipelineContext {
        let mut context = PipelineContext::new();
        context.insert(
            "terminals",
            json!([
                {"index": 1, "title": "LEADER", "x": 1440, "y": 0, "width": 10, "height": 10, "window_id": 21},
                {"index": 2, "title": "SCOUT", "x": 2080, "y": 0, "width": 10, "height": 10}
            ]),
        );
        context.insert("launched_in", json!(["LEADER", "SCOUT"]));
        context
    }

    fn quick_config(screenshots: bool) -> TaskConfig {
        match json!({
            "wait_before_typing": 0,
            "wait_after_enter": 0,
            "wait_between_terminals": 0,
            "screenshot_after_each": screenshots,
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_prompt_for() {
        let settings = RolePrompterSettings::default();
        let prompt = settings.prompt_for("LEADER", "/work/docs/roles");
        assert!(prompt.contains("TEAM LEADER"));
        assert!(prompt.contains("/work/docs/roles/LEADER.md"));
        assert_eq!(settings.prompt_for("UNKNOWN", "/x"), settings.default_prompt);
    }

    #[test]
    fn test_safe_title() {
        assert_eq!(safe_title("Terminal 4"), "terminal_4");
    }

    #[tokio::test]
    async fn test_prompts_every_terminal() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::desktop());
        let task = RolePrompterTask::new(Toolbox::new(runner.clone(), dir.path()), quick_config(true));

        let data = task.execute(&context()).await.unwrap();

        assert_eq!(data["prompts_sent"], 2);
        assert_eq!(data["total_terminals"], 2);
        assert_eq!(data["role_assignments"]["LEADER"]["window_id"], 21);
        assert_eq!(data["role_assignments"]["SCOUT"]["role"], "SCOUT");
        assert_eq!(data["screenshots"].as_array().unwrap().len(), 2);
        assert!(data["final_screenshot"].is_string());

        let scripts = runner.calls_to("osascript");
        assert!(scripts[0][1].contains("window id 21"));
        assert!(scripts[0][1].contains("LEADER.md"));
        // No window id: located by x position instead.
        assert!(scripts[1][1].contains("(2080 - 50)"));
        assert!(scripts[1][1].contains("are you ready?"));
    }

    #[tokio::test]
    async fn test_failed_prompt_is_recorded() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(|program, args| match program {
            "osascript" => Ok(CommandOutput::new(0, "ERROR: not found", "")),
            _ => {
                touch_last_arg(args);
                Ok(CommandOutput::new(0, "", ""))
            }
        }));
        let task = RolePrompterTask::new(Toolbox::new(runner, dir.path()), quick_config(false));

        let data = task.execute(&context()).await.unwrap();
        assert_eq!(data["prompts_sent"], 0);
        assert_eq!(data["results"][0]["status"], "failed");
        assert!(data["role_assignments"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requires_launch_information() {
        let mut context = context();
        context.insert("launched_in", json!([]));
        let task = RolePrompterTask::new(
            Toolbox::new(Arc::new(FakeRunner::desktop()), "."),
            quick_config(false),
        );

        let result = run_task(&task, &context).await;
        assert_eq!(
            result.error(),
            Some("No terminal/launch information from previous tasks")
        );
    }
}
