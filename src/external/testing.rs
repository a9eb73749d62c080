//! Recording command runner for unit tests.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ToolError;

use super::command::{CommandOutput, CommandRunner};

type Handler = dyn Fn(&str, &[String]) -> Result<CommandOutput, ToolError> + Send + Sync;

/// Runner that records every call and answers through a closure.
pub(crate) struct FakeRunner {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    handler: Box<Handler>,
}

impl FakeRunner {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[String]) -> Result<CommandOutput, ToolError> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Answers every call with exit code 0 and the given stdout.
    pub(crate) fn replying(stdout: &str) -> Self {
        let stdout = stdout.to_string();
        Self::new(move |_, _| Ok(CommandOutput::new(0, stdout.clone(), "")))
    }

    /// Answers like a working macOS desktop: AppleScript replies `OK`, and
    /// `screencapture`/`sips` write their output file.
    pub(crate) fn desktop() -> Self {
        Self::new(|program, args| match program {
            "screencapture" | "sips" => {
                touch_last_arg(args);
                Ok(CommandOutput::new(0, "", ""))
            }
            "osascript" => Ok(CommandOutput::new(0, "OK\n", "")),
            _ => Ok(CommandOutput::new(0, "", "")),
        })
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Argument lists of all calls to `program`.
    pub(crate) fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|(p, _)| p == program)
            .map(|(_, args)| args)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<CommandOutput, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        (self.handler)(program, args)
    }
}

/// Creates the file named by the last argument, as image tools do.
pub(crate) fn touch_last_arg(args: &[String]) {
    if let Some(path) = args.last() {
        std::fs::write(Path::new(path), vec![0u8; 2048]).unwrap();
    }
}
