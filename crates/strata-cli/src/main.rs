//! `strata`: run a configured simulation on a single process.
//!
//! Reads a JSON run configuration, applies command-line overrides, and
//! drives the lifecycle with the no-op solver. The process exits non-zero
//! if any lifecycle step fails.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use strata_core::SingleProcess;
use strata_engine::{LifecycleOrchestrator, NullSolver, RunConfig, RunReport};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "strata")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run, restart or dry-run a Strata simulation", long_about = None)]
struct Cli {
    /// JSON run configuration.
    #[arg(short, long)]
    config: PathBuf,

    /// Run mode, overriding the configuration: normal, restart, dry_run
    /// or save_grid.
    #[arg(short, long)]
    mode: Option<String>,

    /// Directory for checkpoints and partition files, overriding the
    /// configuration.
    #[arg(short, long)]
    run_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = RunConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(run_dir) = cli.run_dir {
        config.run_dir = run_dir;
    }

    let mut run = LifecycleOrchestrator::new(config, &SingleProcess, NullSolver);
    match run.run_configured() {
        Ok(report) => {
            summarize(&report);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(step = %e.step, kind = ?e.kind(), "{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn summarize(report: &RunReport) {
    info!(
        mode = %report.mode,
        state = %report.final_state,
        steps = report.steps_run,
        step = report.final_step,
        time = report.final_time,
        checkpoints = report.checkpoints_written,
        frames = report.frames_emitted,
        "run complete"
    );
    if let Some(norm) = report.residual_norm {
        info!(residual_norm = norm, "dry run residual");
    }
    if let Some(phases) = &report.phase_report {
        info!(relabelled = phases.total(), "initial phases assigned");
    }
    if let Some(path) = &report.partition_file {
        info!(path = %path.display(), "partition written");
    }
}
