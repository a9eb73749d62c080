//! Terminal window automation through AppleScript.
//!
//! Every operation builds a script, runs it with `osascript -e` and reads the
//! first word of stdout: scripts answer `OK: ...` or `ERROR: ...`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ToolError;

use super::command::CommandRunner;

const OSASCRIPT: &str = "osascript";

/// Timeout for opening the terminal set.
const OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for single-window scripts.
const WINDOW_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for keystroke scripts, which include short settle delays.
const TYPE_TIMEOUT: Duration = Duration::from_secs(15);

/// Horizontal tolerance when locating a window by its x position.
pub const X_TOLERANCE: i64 = 50;

/// Screen rectangle of a window, in points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl WindowBounds {
    /// Creates bounds from origin and size.
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// AppleScript `{left, top, right, bottom}` list.
    fn to_applescript(self) -> String {
        format!(
            "{{{}, {}, {}, {}}}",
            self.x,
            self.y,
            self.x + self.width,
            self.y + self.height
        )
    }
}

/// How a terminal window is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTarget {
    /// Stable window id captured when the window was opened.
    Id(u64),
    /// 1-based front-to-back index.
    Index(usize),
    /// Left edge within [`X_TOLERANCE`] of the given x.
    XPosition(i64),
}

impl WindowTarget {
    /// Index target for the `position`-th (1-based) of `total` windows opened
    /// in order. The most recently opened window is frontmost, so the order
    /// is reversed.
    pub fn reversed_index(position: usize, total: usize) -> Self {
        WindowTarget::Index(total.saturating_sub(position) + 1)
    }
}

impl fmt::Display for WindowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowTarget::Id(id) => write!(f, "window id {id}"),
            WindowTarget::Index(index) => write!(f, "window {index}"),
            WindowTarget::XPosition(x) => write!(f, "window at x={x}"),
        }
    }
}

/// Escapes text for use inside an AppleScript string literal.
pub fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Parses the comma-separated id list returned by the open script.
pub fn parse_window_ids(output: &str) -> Result<Vec<u64>, ToolError> {
    output
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>().map_err(|_| ToolError::UnexpectedOutput {
                program: OSASCRIPT.to_string(),
                message: format!("invalid window id '{s}'"),
            })
        })
        .collect()
}

/// Script that opens one terminal per entry and returns their ids.
pub fn open_terminals_script(windows: &[(String, WindowBounds)], dark_theme: bool) -> String {
    let mut script = String::from(
        "tell application \"Terminal\"\n    set windowIDs to {}\n    activate\n    delay 0.5\n    try\n        close every window\n    end try\n    delay 0.3\n",
    );

    for (title, bounds) in windows {
        script.push_str("    do script \"\"\n    delay 0.3\n");
        // Capture the id before anything running in the window renames it.
        script.push_str("    set end of windowIDs to id of window 1\n");
        script.push_str("    tell window 1\n");
        script.push_str(&format!(
            "        set bounds to {}\n",
            bounds.to_applescript()
        ));
        script.push_str(&format!(
            "        set custom title to \"{}\"\n        set title displays custom title to true\n",
            escape_applescript(title)
        ));
        if dark_theme {
            script.push_str("        set background color to {0, 0, 0}\n");
            script.push_str("        set normal text color to {65535, 65535, 65535}\n");
        }
        script.push_str("    end tell\n    delay 0.3\n");
    }

    script.push_str(
        "    set idString to \"\"\n    repeat with i from 1 to count of windowIDs\n        if i > 1 then set idString to idString & \",\"\n        set idString to idString & (item i of windowIDs as string)\n    end repeat\n    return idString\nend tell\n",
    );
    script
}

/// Lines binding `targetWindow`, returning `on_missing` if it does not exist.
fn locate_window(target: WindowTarget, on_missing: &str) -> String {
    match target {
        WindowTarget::Id(id) => format!(
            "    try\n        set targetWindow to window id {id}\n    on error errMsg\n        return \"{on_missing}: \" & errMsg\n    end try\n"
        ),
        WindowTarget::Index(index) => format!(
            "    if (count of windows) < {index} then\n        return \"{on_missing}: window {index} not found\"\n    end if\n    set targetWindow to window {index}\n"
        ),
        WindowTarget::XPosition(x) => format!(
            "    set targetWindow to missing value\n    repeat with w in windows\n        set windowX to item 1 of (bounds of w)\n        if windowX >= ({x} - {X_TOLERANCE}) and windowX <= ({x} + {X_TOLERANCE}) then\n            set targetWindow to contents of w\n            exit repeat\n        end if\n    end repeat\n    if targetWindow is missing value then\n        return \"{on_missing}: window at x={x} not found\"\n    end if\n"
        ),
    }
}

/// Script that runs a shell command in the target window.
pub fn run_command_script(target: WindowTarget, command: &str) -> String {
    format!(
        "tell application \"Terminal\"\n    activate\n    delay 0.3\n{}    do script \"{}\" in targetWindow\n    return \"OK: {target}\"\nend tell\n",
        locate_window(target, "ERROR"),
        escape_applescript(command),
    )
}

/// Script that brings the target window forward and types `text` + return.
pub fn type_text_script(target: WindowTarget, text: &str) -> String {
    format!(
        "tell application \"Terminal\"\n    activate\n    delay 0.3\n{}    set frontmost of targetWindow to true\n    set index of targetWindow to 1\n    delay 0.5\n    tell application \"System Events\"\n        tell process \"Terminal\"\n            keystroke \"{}\"\n            delay 0.3\n            keystroke return\n        end tell\n    end tell\n    return \"OK: {target}\"\nend tell\n",
        locate_window(target, "ERROR"),
        escape_applescript(text),
    )
}

/// Script that closes the target window.
///
/// A window id that no longer resolves counts as already closed.
pub fn close_window_script(target: WindowTarget) -> String {
    let on_missing = match target {
        WindowTarget::Id(_) => "OK: already closed",
        _ => "ERROR",
    };
    format!(
        "tell application \"Terminal\"\n{}    close targetWindow\n    return \"OK: {target} closed\"\nend tell\n",
        locate_window(target, on_missing),
    )
}

/// Drives Terminal.app windows.
#[derive(Clone)]
pub struct WindowAutomation {
    runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for WindowAutomation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowAutomation").finish_non_exhaustive()
    }
}

impl WindowAutomation {
    /// Creates an automation handle over the given runner.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Closes existing terminal windows, opens one per entry and returns
    /// their ids in the same order.
    pub async fn open_terminals(
        &self,
        windows: &[(String, WindowBounds)],
        dark_theme: bool,
    ) -> Result<Vec<u64>, ToolError> {
        let script = open_terminals_script(windows, dark_theme);
        let output = self
            .runner
            .run_checked(OSASCRIPT, &script_args(script), OPEN_TIMEOUT)
            .await?;
        parse_window_ids(&output.stdout)
    }

    /// Runs `command` as if typed at the shell prompt of the target window.
    pub async fn run_command(&self, target: WindowTarget, command: &str) -> Result<(), ToolError> {
        self.run_script(run_command_script(target, command), WINDOW_TIMEOUT)
            .await
    }

    /// Types `text` followed by return into the target window.
    pub async fn type_text(&self, target: WindowTarget, text: &str) -> Result<(), ToolError> {
        self.run_script(type_text_script(target, text), TYPE_TIMEOUT)
            .await
    }

    /// Closes the target window.
    pub async fn close_window(&self, target: WindowTarget) -> Result<(), ToolError> {
        self.run_script(close_window_script(target), WINDOW_TIMEOUT)
            .await
    }

    async fn run_script(&self, script: String, timeout: Duration) -> Result<(), ToolError> {
        let output = self
            .runner
            .run(OSASCRIPT, &script_args(script), timeout)
            .await?;

        let stdout = output.stdout_trimmed();
        debug!(stdout, exit_code = output.exit_code, "AppleScript finished");

        if stdout.starts_with("OK") {
            Ok(())
        } else if !output.is_success() {
            Err(ToolError::NonZeroExit {
                program: OSASCRIPT.to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        } else {
            Err(ToolError::UnexpectedOutput {
                program: OSASCRIPT.to_string(),
                message: stdout.to_string(),
            })
        }
    }
}

fn script_args(script: String) -> Vec<String> {
    vec!["-e".to_string(), script]
}
