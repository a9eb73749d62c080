//! CLI definition and command handling for system-inspector.
//!
//! The binary runs one workflow file. Flags select what to do with it: list
//! its tasks, print the execution plan, run one task or run everything.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::external::Toolbox;
use crate::pipeline::{PipelineOrchestrator, PipelineSummary, PlannedStep, TaskSpec};
use crate::pipeline::config::DEFAULT_CONFIG_PATH;
use crate::task::TaskResult;
use crate::tasks::builtin_registry;

/// Sequential task pipeline for multi-agent terminal workflows.
#[derive(Parser, Debug)]
#[command(name = "system-inspector")]
#[command(about = "Run a declarative pipeline of desktop automation tasks")]
#[command(version)]
#[command(
    long_about = "system-inspector runs the tasks declared in a workflow file one after another, \
passing each task's output to the next through a shared context.\n\nExample usage:\n  \
system-inspector --config config/workflow.yaml\n  \
system-inspector --task task_final --load-context"
)]
pub struct Cli {
    /// Workflow file (YAML, or JSON for other extensions).
    #[arg(short, long, env = "SYSTEM_INSPECTOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Run only the task with this name, even if it is disabled.
    #[arg(short, long)]
    pub task: Option<String>,

    /// List the configured tasks and exit.
    #[arg(short, long)]
    pub list: bool,

    /// Print the execution plan without running anything.
    #[arg(short, long)]
    pub dry_run: bool,

    /// Seed the context from the latest saved report before running.
    #[arg(long)]
    pub load_context: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Parse CLI arguments without executing.
///
/// This allows the caller to access parsed arguments (like log_level)
/// before running the command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<ExitCode> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// Returns exit code 0 when every task succeeded (and always for `--list`
/// and `--dry-run`), 1 when any task failed. An unreadable workflow file is
/// an error.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    let base_dir = workflow_dir(&cli.config);
    let registry = builtin_registry(Toolbox::system(base_dir));

    let mut orchestrator = PipelineOrchestrator::load(&cli.config, registry)
        .with_context(|| format!("failed to load workflow '{}'", cli.config.display()))?;

    if cli.list {
        print_task_list(orchestrator.list_tasks());
        return Ok(ExitCode::SUCCESS);
    }

    if cli.dry_run {
        print_plan(&orchestrator.dry_run());
        return Ok(ExitCode::SUCCESS);
    }

    if cli.load_context {
        if orchestrator.load_context_from_reports() {
            info!(
                keys = orchestrator.context().len(),
                "Context seeded from previous report"
            );
        } else {
            warn!(
                dir = %orchestrator.report_store().dir().display(),
                "No previous context found, starting empty"
            );
        }
    }

    let success = orchestrator.run_pipeline(cli.task.as_deref()).await;

    print_results(orchestrator.results());
    if let Some(summary) = orchestrator.last_summary() {
        print_summary(summary);
    }

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Directory relative workflow paths resolve against.
fn workflow_dir(config: &Path) -> PathBuf {
    config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn print_task_list(specs: &[TaskSpec]) {
    println!("\n=== Configured Tasks ===");
    for (i, spec) in specs.iter().enumerate() {
        let marker = if spec.enabled { "✓" } else { "✗" };
        println!("{:>3}. {} {}", i + 1, marker, spec.name);
        println!("       {}.{}", spec.module, spec.class);
        if let Some(description) = &spec.description {
            println!("       {}", description);
        }
    }
    println!();
}

fn print_plan(steps: &[PlannedStep]) {
    println!("\n=== Execution Plan (dry run) ===");
    if steps.is_empty() {
        println!("  No enabled tasks.");
    }
    for step in steps {
        println!("{:>3}. {} ({}.{})", step.position, step.name, step.module, step.class);
        if let Some(depends_on) = &step.depends_on {
            println!("       depends on: {}", depends_on);
        }
    }
    println!();
}

fn print_results(results: &[TaskResult]) {
    if results.is_empty() {
        return;
    }
    println!("\n=== Task Results ===");
    for result in results {
        let marker = if result.is_success() { "✓" } else { "✗" };
        println!(
            "  {} {:<24} {:>10.0}ms",
            marker,
            result.task_name(),
            result.duration_ms()
        );
        if let Some(error) = result.error() {
            println!("      error: {error}");
        }
    }
}

fn print_summary(summary: &PipelineSummary) {
    println!("\n=== Pipeline Summary ===");
    println!("Succeeded:      {}", summary.success_count);
    println!("Failed:         {}", summary.fail_count);
    println!("Duration:       {:.2}s", summary.duration.as_secs_f64());
    if summary.stopped_on_error {
        println!("Stopped early:  yes (stop_on_error)");
    }
    match &summary.report_path {
        Some(path) => println!("Report:         {}", path.display()),
        None => println!("Report:         not saved"),
    }
    println!();
}
