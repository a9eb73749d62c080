//! Opens the agent terminals side by side on the external display.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::external::{Toolbox, WindowBounds};
use crate::pipeline::PipelineContext;
use crate::task::{parse_settings, Task, TaskConfig, TaskData};

use super::model::{DisplayInfo, TerminalWindow};
use super::object;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TerminalSetupSettings {
    pub terminal_count: usize,
    pub terminal_titles: Vec<String>,
    pub use_dark_theme: bool,
    /// Horizontal gap between neighbouring windows.
    pub gap: i64,
    /// Reserved at the top of the main display.
    pub menu_bar_height: i64,
}

impl Default for TerminalSetupSettings {
    fn default() -> Self {
        Self {
            terminal_count: 3,
            terminal_titles: vec![
                "LEADER".to_string(),
                "WORKER-1".to_string(),
                "WORKER-2".to_string(),
            ],
            use_dark_theme: true,
            gap: 0,
            menu_bar_height: 25,
        }
    }
}

/// Computed window placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub x_offset: i64,
    pub terminal_width: i64,
    pub terminal_height: i64,
    pub terminals: Vec<TerminalWindow>,
}

/// Places `terminal_count` equal-width windows across `target`.
///
/// A non-main target is assumed to sit right of the main display, so its
/// origin is shifted by the main display's width. Only the main display has a
/// menu bar.
pub fn plan_layout(
    settings: &TerminalSetupSettings,
    main: Option<&DisplayInfo>,
    target: &DisplayInfo,
) -> Layout {
    let x_offset = match main {
        Some(main) if !target.is_main => main.width,
        _ => 0,
    };
    let y = if target.is_main {
        settings.menu_bar_height
    } else {
        0
    };

    let count = settings.terminal_count.max(1) as i64;
    let screen_width = target.effective_width();
    let terminal_width = (screen_width - settings.gap * (count - 1)) / count;
    let terminal_height = target.effective_height() - y;

    let terminals = (0..settings.terminal_count)
        .map(|i| TerminalWindow {
            index: i + 1,
            title: settings
                .terminal_titles
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("Terminal {}", i + 1)),
            bounds: WindowBounds::new(
                x_offset + i as i64 * (terminal_width + settings.gap),
                y,
                terminal_width,
                terminal_height,
            ),
            window_id: None,
        })
        .collect();

    Layout {
        x_offset,
        terminal_width,
        terminal_height,
        terminals,
    }
}

/// Picks the main and target displays from the context.
///
/// The target is the external display if one is known, otherwise the first
/// display of any kind.
pub fn select_displays(
    context: &PipelineContext,
) -> anyhow::Result<(Option<DisplayInfo>, DisplayInfo)> {
    let displays = context
        .get_as::<Vec<DisplayInfo>>("displays")
        .unwrap_or_default();

    let main = context
        .get_as::<DisplayInfo>("main_display")
        .or_else(|| displays.iter().find(|d| d.is_main).cloned());

    let target = context
        .get_as::<DisplayInfo>("external_display")
        .or_else(|| displays.iter().find(|d| !d.is_main).cloned());

    match target {
        Some(target) => Ok((main, target)),
        None => match displays.first() {
            Some(first) => {
                warn!(display = %first.name, "No external display, using the first display");
                Ok((main, first.clone()))
            }
            None => anyhow::bail!("No display information available"),
        },
    }
}

/// Opens the terminals and records their window ids.
pub struct TerminalSetupTask {
    tools: Toolbox,
    config: TaskConfig,
}

impl TerminalSetupTask {
    pub fn new(tools: Toolbox, config: TaskConfig) -> Self {
        Self { tools, config }
    }
}

#[async_trait]
impl Task for TerminalSetupTask {
    fn name(&self) -> &str {
        "terminal_setup"
    }

    fn description(&self) -> &str {
        "Opens terminal windows side by side on the external display"
    }

    fn version(&self) -> &str {
        "3.0.0"
    }

    async fn execute(&self, context: &PipelineContext) -> anyhow::Result<TaskData> {
        let settings: TerminalSetupSettings = parse_settings(&self.config)?;
        if settings.terminal_count == 0 {
            anyhow::bail!("terminal_count must be at least 1");
        }

        let (main, target) = select_displays(context)?;
        let mut layout = plan_layout(&settings, main.as_ref(), &target);

        info!(
            display = %target.name,
            x_offset = layout.x_offset,
            terminals = layout.terminals.len(),
            width = layout.terminal_width,
            height = layout.terminal_height,
            "Opening terminals"
        );

        let windows: Vec<(String, WindowBounds)> = layout
            .terminals
            .iter()
            .map(|t| (t.title.clone(), t.bounds))
            .collect();

        let window_ids = match self
            .tools
            .automation()
            .open_terminals(&windows, settings.use_dark_theme)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Terminals opened without window ids");
                Vec::new()
            }
        };

        if window_ids.len() != layout.terminals.len() {
            warn!(
                expected = layout.terminals.len(),
                captured = window_ids.len(),
                "Window id count mismatch"
            );
        }
        for (terminal, id) in layout.terminals.iter_mut().zip(&window_ids) {
            terminal.window_id = Some(*id);
            info!(title = %terminal.title, window_id = id, "Terminal opened");
        }

        Ok(object(json!({
            "terminals_opened": layout.terminals.len(),
            "terminal_width": layout.terminal_width,
            "terminal_height": layout.terminal_height,
            "x_offset": layout.x_offset,
            "target_display": target.name,
            "terminals": layout.terminals,
            "window_ids": window_ids,
        })))
    }
}
