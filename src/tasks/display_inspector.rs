//! Detects the host name, OS version and attached displays.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::external::command::args;
use crate::external::Toolbox;
use crate::pipeline::PipelineContext;
use crate::task::{Task, TaskData};

use super::model::DisplayInfo;
use super::object;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Collects display information for the layout steps.
pub struct DisplayInspectorTask {
    tools: Toolbox,
}

impl DisplayInspectorTask {
    pub fn new(tools: Toolbox) -> Self {
        Self { tools }
    }

    /// Trimmed stdout of a probe command, or `"unknown"` if it fails.
    async fn probe(&self, program: &str, argv: &[&str]) -> String {
        match self
            .tools
            .runner()
            .run(program, &args(argv.iter().copied()), PROBE_TIMEOUT)
            .await
        {
            Ok(output) if output.is_success() => output.stdout_trimmed().to_string(),
            Ok(output) => {
                warn!(program, exit_code = output.exit_code, "Probe failed");
                "unknown".to_string()
            }
            Err(e) => {
                warn!(program, error = %e, "Probe failed");
                "unknown".to_string()
            }
        }
    }
}

#[async_trait]
impl Task for DisplayInspectorTask {
    fn name(&self) -> &str {
        "display_inspector"
    }

    fn description(&self) -> &str {
        "Detects attached displays and their resolutions"
    }

    async fn execute(&self, _context: &PipelineContext) -> anyhow::Result<TaskData> {
        let hostname = self.probe("hostname", &[]).await;
        let macos_version = self.probe("sw_vers", &["-productVersion"]).await;
        let profile = self
            .probe("system_profiler", &["SPDisplaysDataType", "-json"])
            .await;

        let displays = parse_displays(&profile);
        let main_display = displays.iter().find(|d| d.is_main).cloned();
        // The last non-main display wins when several are attached.
        let external_display = displays.iter().rev().find(|d| !d.is_main).cloned();

        info!(
            hostname = %hostname,
            macos_version = %macos_version,
            displays = displays.len(),
            main = main_display.as_ref().map(|d| d.name.as_str()).unwrap_or("-"),
            external = external_display.as_ref().map(|d| d.name.as_str()).unwrap_or("-"),
            "Displays detected"
        );

        Ok(object(json!({
            "hostname": hostname,
            "macos_version": macos_version,
            "total_displays": displays.len(),
            "displays": displays,
            "main_display": main_display,
            "external_display": external_display,
            "timestamp": Local::now().to_rfc3339(),
        })))
    }
}

/// Extracts displays from `system_profiler SPDisplaysDataType -json` output.
///
/// Unparsable output yields no displays.
pub fn parse_displays(output: &str) -> Vec<DisplayInfo> {
    let root: Value = match serde_json::from_str(output) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to parse display profile");
            return Vec::new();
        }
    };

    let cards = root
        .get("SPDisplaysDataType")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut displays = Vec::new();
    for card in &cards {
        let gpu = str_field(card, "sppci_model").unwrap_or("Unknown GPU");
        let entries = card
            .get("spdisplays_ndrvs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for entry in &entries {
            let display_id = displays.len() as u32 + 1;
            let name = str_field(entry, "_name")
                .map(str::to_string)
                .unwrap_or_else(|| format!("Display {display_id}"));
            let resolution = str_field(entry, "_spdisplays_resolution")
                .unwrap_or("Unknown")
                .to_string();
            let (width, height) = parse_resolution(&resolution);
            let connection = str_field(entry, "spdisplays_connection_type").unwrap_or("");

            let connection_type = if connection.to_lowercase().contains("internal")
                || name.to_lowercase().contains("built-in")
            {
                "Built-in"
            } else {
                "External"
            };

            displays.push(DisplayInfo {
                display_id,
                is_main: str_field(entry, "spdisplays_main") == Some("spdisplays_yes"),
                is_retina: resolution.contains("Retina") || name.contains("Retina"),
                connection_type: connection_type.to_string(),
                gpu: gpu.to_string(),
                name,
                resolution,
                width,
                height,
            });
        }
    }
    displays
}

/// Reads `W x H` from a resolution string; `(0, 0)` if absent.
pub fn parse_resolution(resolution: &str) -> (i64, i64) {
    Regex::new(r"(\d+)\s*x\s*(\d+)")
        .ok()
        .and_then(|re| re.captures(resolution))
        .and_then(|caps| {
            let width = caps.get(1)?.as_str().parse().ok()?;
            let height = caps.get(2)?.as_str().parse().ok()?;
            Some((width, height))
        })
        .unwrap_or((0, 0))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::command::CommandOutput;
    use crate::external::testing::FakeRunner;
    use std::sync::Arc;

    const PROFILE: &str = r#"{
      "SPDisplaysDataType": [{
        "sppci_model": "Apple M2 Pro",
        "spdisplays_ndrvs": [
          {
            "_name": "Color LCD",
            "_spdisplays_resolution": "3024 x 1964 Retina",
            "spdisplays_main": "spdisplays_yes",
            "spdisplays_connection_type": "spdisplays_internal"
          },
          {
            "_name": "DELL U2720Q",
            "_spdisplays_resolution": "2560 x 1440 @ 60.00Hz"
          }
        ]
      }]
    }"#;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("2560 x 1440 @ 60.00Hz"), (2560, 1440));
        assert_eq!(parse_resolution("1920x1080"), (1920, 1080));
        assert_eq!(parse_resolution("Unknown"), (0, 0));
    }

    #[test]
    fn test_parse_displays() {
        let displays = parse_displays(PROFILE);
        assert_eq!(displays.len(), 2);

        let main = &displays[0];
        assert_eq!(main.display_id, 1);
        assert!(main.is_main);
        assert!(main.is_retina);
        assert_eq!(main.connection_type, "Built-in");
        assert_eq!(main.gpu, "Apple M2 Pro");
        assert_eq!((main.width, main.height), (3024, 1964));

        let external = &displays[1];
        assert_eq!(external.display_id, 2);
        assert!(!external.is_main);
        assert_eq!(external.connection_type, "External");
        assert_eq!(external.name, "DELL U2720Q");
    }

    #[test]
    fn test_parse_displays_bad_output() {
        assert!(parse_displays("not json").is_empty());
        assert!(parse_displays("{}").is_empty());
    }

    #[tokio::test]
    async fn test_execute_emits_display_keys() {
        let runner = Arc::new(FakeRunner::new(|program, _| {
            let stdout = match program {
                "hostname" => "studio.local\n",
                "sw_vers" => "14.5\n",
                "system_profiler" => PROFILE,
                _ => "",
            };
            Ok(CommandOutput::new(0, stdout, ""))
        }));
        let task = DisplayInspectorTask::new(Toolbox::new(runner, "."));

        let data = task.execute(&PipelineContext::new()).await.unwrap();
        assert_eq!(data["hostname"], "studio.local");
        assert_eq!(data["macos_version"], "14.5");
        assert_eq!(data["total_displays"], 2);
        assert_eq!(data["main_display"]["name"], "Color LCD");
        assert_eq!(data["external_display"]["width"], 2560);
        assert!(data.contains_key("timestamp"));
    }

    #[tokio::test]
    async fn test_execute_without_external_display() {
        let runner = Arc::new(FakeRunner::new(|_, _| Ok(CommandOutput::new(1, "", "boom"))));
        let task = DisplayInspectorTask::new(Toolbox::new(runner, "."));

        let data = task.execute(&PipelineContext::new()).await.unwrap();
        assert_eq!(data["hostname"], "unknown");
        assert_eq!(data["total_displays"], 0);
        assert!(data["external_display"].is_null());
    }
}
