//! Command-line interface for system-inspector.
//!
//! Provides workflow listing, dry runs, single-task runs and full pipeline
//! runs with optional context recovery from earlier reports.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
