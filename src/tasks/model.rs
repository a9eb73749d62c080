//! Context records shared between the built-in tasks.

use serde::{Deserialize, Serialize};

use crate::external::{WindowBounds, WindowTarget};
use crate::pipeline::PipelineContext;

/// Width assumed when a display record carries none.
pub const FALLBACK_WIDTH: i64 = 1920;

/// Height assumed when a display record carries none.
pub const FALLBACK_HEIGHT: i64 = 1080;

/// One attached display as reported by `system_profiler`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    #[serde(default)]
    pub display_id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub is_retina: bool,
    #[serde(default)]
    pub connection_type: String,
    #[serde(default)]
    pub gpu: String,
}

impl DisplayInfo {
    /// Width, or [`FALLBACK_WIDTH`] if unknown.
    pub fn effective_width(&self) -> i64 {
        if self.width > 0 {
            self.width
        } else {
            FALLBACK_WIDTH
        }
    }

    /// Height, or [`FALLBACK_HEIGHT`] if unknown.
    pub fn effective_height(&self) -> i64 {
        if self.height > 0 {
            self.height
        } else {
            FALLBACK_HEIGHT
        }
    }
}

/// A terminal window placed by the layout step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalWindow {
    /// 1-based position in the layout.
    pub index: usize,
    pub title: String,
    #[serde(flatten)]
    pub bounds: WindowBounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<u64>,
}

impl TerminalWindow {
    /// Targets the window by id, or by `fallback` when no id was captured.
    pub fn target_or(&self, fallback: WindowTarget) -> WindowTarget {
        match self.window_id {
            Some(id) => WindowTarget::Id(id),
            None => fallback,
        }
    }
}

/// Terminals recorded in the context, empty if absent or malformed.
pub fn terminals(context: &PipelineContext) -> Vec<TerminalWindow> {
    context
        .get_as::<Vec<TerminalWindow>>("terminals")
        .unwrap_or_default()
}

/// Screen region of the external display, shifted by the recorded x offset.
pub fn external_region(context: &PipelineContext) -> WindowBounds {
    let x_offset = context.get_as::<i64>("x_offset").unwrap_or(0);
    match context.get_as::<DisplayInfo>("external_display") {
        Some(display) => WindowBounds::new(
            x_offset,
            0,
            display.effective_width(),
            display.effective_height(),
        ),
        None => WindowBounds::new(x_offset, 0, FALLBACK_WIDTH, FALLBACK_HEIGHT),
    }
}
