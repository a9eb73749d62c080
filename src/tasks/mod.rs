//! Built-in tasks for the multi-agent terminal workflow.
//!
//! The tasks are meant to run in this order, each reading what the previous
//! ones left in the context:
//!
//! 1. `display_inspector`: displays and their resolutions
//! 2. `terminal_setup`: opens one terminal per agent on the external display
//! 3. `screenshot_validator`: captures the layout as evidence
//! 4. `agent_launcher`: starts the agent command in every terminal
//! 5. `role_prompter`: tells each agent which role it plays
//! 6. `task_final`: shuts agents down, cleans the broker, closes terminals
//!
//! Each is registered under `tasks.<name>` with its class name, which is what
//! workflow files refer to.
//!
//! # Example
//!
//! ```rust,ignore
//! use system_inspector::external::Toolbox;
//! use system_inspector::tasks::builtin_registry;
//!
//! let registry = builtin_registry(Toolbox::system("config"));
//! assert!(registry.contains("tasks.terminal_setup", "TerminalSetupTask"));
//! ```

pub mod agent_launcher;
pub mod display_inspector;
pub mod model;
pub mod role_prompter;
pub mod screenshot_validator;
pub mod task_final;
pub mod terminal_setup;

use std::path::Path;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::external::{CaptureRequest, Screenshot, Toolbox, WindowBounds};
use crate::task::{TaskData, TaskRegistry};

pub use agent_launcher::AgentLauncherTask;
pub use display_inspector::DisplayInspectorTask;
pub use model::{DisplayInfo, TerminalWindow};
pub use role_prompter::RolePrompterTask;
pub use screenshot_validator::ScreenshotValidatorTask;
pub use task_final::SafeShutdownTask;
pub use terminal_setup::TerminalSetupTask;

/// Registers every built-in task.
pub fn register_builtin_tasks(registry: &mut TaskRegistry, tools: &Toolbox) {
    let t = tools.clone();
    registry.register("tasks.display_inspector", "DisplayInspectorTask", move |_| {
        Box::new(DisplayInspectorTask::new(t.clone()))
    });

    let t = tools.clone();
    registry.register("tasks.terminal_setup", "TerminalSetupTask", move |config| {
        Box::new(TerminalSetupTask::new(t.clone(), config))
    });

    let t = tools.clone();
    registry.register(
        "tasks.screenshot_validator",
        "ScreenshotValidatorTask",
        move |config| Box::new(ScreenshotValidatorTask::new(t.clone(), config)),
    );

    let t = tools.clone();
    registry.register("tasks.agent_launcher", "AgentLauncherTask", move |config| {
        Box::new(AgentLauncherTask::new(t.clone(), config))
    });

    let t = tools.clone();
    registry.register("tasks.role_prompter", "RolePrompterTask", move |config| {
        Box::new(RolePrompterTask::new(t.clone(), config))
    });

    let t = tools.clone();
    registry.register("tasks.task_final", "SafeShutdownTask", move |config| {
        Box::new(SafeShutdownTask::new(t.clone(), config))
    });
}

/// Registry holding exactly the built-in tasks.
pub fn builtin_registry(tools: Toolbox) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    register_builtin_tasks(&mut registry, &tools);
    registry
}

/// Turns a JSON object literal into task data.
pub(crate) fn object(value: Value) -> TaskData {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Sleeps for a configured number of seconds; non-positive values skip.
pub(crate) async fn wait(seconds: f64, reason: &str) {
    if seconds > 0.0 && seconds.is_finite() {
        debug!(seconds, reason, "Waiting");
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    }
}

/// Takes a compressed screenshot, logging instead of failing.
pub(crate) async fn try_screenshot(
    tools: &Toolbox,
    dir: &Path,
    prefix: &str,
    region: WindowBounds,
    resize_factor: f64,
    jpeg_quality: u8,
) -> Option<Screenshot> {
    let request = CaptureRequest {
        dir: tools.resolve(dir),
        prefix: prefix.to_string(),
        region,
        resize_factor,
        jpeg_quality,
    };
    match tools.capture().capture(&request).await {
        Ok(shot) => {
            debug!(path = %shot.path.display(), size_kb = shot.size_kb, "Screenshot saved");
            Some(shot)
        }
        Err(e) => {
            warn!(error = %e, prefix, "Screenshot failed");
            None
        }
    }
}
