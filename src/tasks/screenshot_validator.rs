//! Captures the external display as evidence that the layout is correct.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::external::{CaptureRequest, Toolbox};
use crate::pipeline::PipelineContext;
use crate::task::{parse_settings, Task, TaskConfig, TaskData};

use super::model::{external_region, terminals, DisplayInfo, TerminalWindow};
use super::{object, wait};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenshotValidatorSettings {
    pub output_dir: PathBuf,
    /// Size above which a warning is logged.
    pub max_size_kb: f64,
    pub jpeg_quality: u8,
    pub resize_factor: f64,
    pub filename_prefix: String,
    /// Seconds to let windows settle before capturing.
    pub wait_before_capture: f64,
}

impl Default for ScreenshotValidatorSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("screenshots"),
            max_size_kb: 500.0,
            jpeg_quality: 60,
            resize_factor: 0.5,
            filename_prefix: "external_display".to_string(),
            wait_before_capture: 1.0,
        }
    }
}

/// Takes one compressed screenshot of the external display.
pub struct ScreenshotValidatorTask {
    tools: Toolbox,
    config: TaskConfig,
}

impl ScreenshotValidatorTask {
    pub fn new(tools: Toolbox, config: TaskConfig) -> Self {
        Self { tools, config }
    }
}

#[async_trait]
impl Task for ScreenshotValidatorTask {
    fn name(&self) -> &str {
        "screenshot_validator"
    }

    fn description(&self) -> &str {
        "Captures the external display for cross-checking the layout"
    }

    async fn execute(&self, context: &PipelineContext) -> anyhow::Result<TaskData> {
        let settings: ScreenshotValidatorSettings = parse_settings(&self.config)?;

        let display = context
            .get_as::<DisplayInfo>("external_display")
            .ok_or_else(|| anyhow::anyhow!("No external display information from previous task"))?;
        let region = external_region(context);
        let terminals = terminals(context);

        wait(settings.wait_before_capture, "terminals settling").await;

        let request = CaptureRequest {
            dir: self.tools.resolve(&settings.output_dir),
            prefix: settings.filename_prefix.clone(),
            region,
            resize_factor: settings.resize_factor,
            jpeg_quality: settings.jpeg_quality,
        };
        let shot = self
            .tools
            .capture()
            .capture(&request)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to capture screenshot: {e}"))?;

        if shot.size_kb > settings.max_size_kb {
            warn!(
                size_kb = shot.size_kb,
                max_size_kb = settings.max_size_kb,
                "Screenshot exceeds size limit"
            );
        }

        let filename = shot.filename();
        info!(
            file = %filename,
            size_kb = shot.size_kb,
            compressed = shot.compressed,
            expected_terminals = terminals.len(),
            "Screenshot captured"
        );

        Ok(object(json!({
            "screenshot_path": shot.path.display().to_string(),
            "screenshot_filename": filename,
            "file_size_kb": shot.size_kb,
            "analysis": analysis(&display, region.x, &terminals, &filename),
            "cross_check": {
                "target_display": display.name,
                "expected_terminals": terminals.len(),
                "terminal_positions": terminals,
                "evidence_file": filename,
                "verification_status": "PENDING_REVIEW",
            },
        })))
    }
}

/// Describes what the screenshot is expected to show.
fn analysis(display: &DisplayInfo, x_offset: i64, terminals: &[TerminalWindow], file: &str) -> Value {
    let expected: Vec<Value> = terminals
        .iter()
        .map(|t| {
            json!({
                "title": t.title,
                "x": t.bounds.x,
                "y": t.bounds.y,
                "width": t.bounds.width,
                "height": t.bounds.height,
            })
        })
        .collect();

    json!({
        "display_info": {
            "name": display.name,
            "width": display.width,
            "height": display.height,
            "x_offset": x_offset,
        },
        "expected_layout": {
            "terminal_count": terminals.len(),
            "terminals": expected,
            "arrangement": "horizontal_side_by_side",
        },
        "evidence": {
            "file": file,
            "timestamp": Local::now().to_rfc3339(),
        },
    })
}
