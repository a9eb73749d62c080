//! Collaborators outside the process: subprocesses, window automation,
//! screen capture and the message broker's management API.
//!
//! Tasks reach all of these through a [`Toolbox`], which carries the
//! [`CommandRunner`] in use and the directory relative paths resolve against.
//!
//! # Example
//!
//! ```rust,ignore
//! use system_inspector::external::Toolbox;
//!
//! let tools = Toolbox::system("config");
//! let ids = tools.automation().open_terminals(&windows, true).await?;
//! ```

pub mod automation;
pub mod broker;
pub mod capture;
pub mod command;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use automation::{escape_applescript, WindowAutomation, WindowBounds, WindowTarget};
pub use broker::{BrokerClient, BrokerConfig, CleanupReport};
pub use capture::{CaptureRequest, ScreenCapture, Screenshot};
pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};

/// Shared handles given to every built-in task.
#[derive(Clone)]
pub struct Toolbox {
    runner: Arc<dyn CommandRunner>,
    base_dir: PathBuf,
}

impl fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolbox")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

impl Toolbox {
    pub fn new(runner: Arc<dyn CommandRunner>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            base_dir: base_dir.into(),
        }
    }

    /// Toolbox running real processes.
    pub fn system(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(SystemCommandRunner::new()), base_dir)
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolves a relative path against the base directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn automation(&self) -> WindowAutomation {
        WindowAutomation::new(Arc::clone(&self.runner))
    }

    pub fn capture(&self) -> ScreenCapture {
        ScreenCapture::new(Arc::clone(&self.runner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let tools = Toolbox::system("/work/config");
        assert_eq!(tools.resolve("shots"), PathBuf::from("/work/config/shots"));
        assert_eq!(tools.resolve("/tmp/shots"), PathBuf::from("/tmp/shots"));
    }
}
