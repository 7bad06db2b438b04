//! Top-level run state machine.
//!
//! ```text
//! Uninitialized ─┬─▶ SaveGridOnly
//!                ├─▶ Created  ─┬─▶ Solving ─▶ Destroyed
//!                └─▶ Restored ─┴─▶ DryRun  ─▶ Destroyed
//! ```
//!
//! [`LifecycleOrchestrator::run`] drives one run from configuration to
//! teardown. Every failure aborts the run with a [`RunError`] naming the
//! step that failed.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use strata_checkpoint::{
    CheckpointError, CheckpointStore, CheckpointWriter, SectionTag, PARTITION_LAYOUT,
};
use strata_core::{Communicator, ConfigError, Scaling, SubsystemId};
use strata_grid::GridPartition;
use strata_markers::PhaseInitReport;
use tracing::{debug, info};

use crate::checkpoint::CheckpointManager;
use crate::config::{RunConfig, RunMode};
use crate::context::SimulationContext;
use crate::error::{EngineError, LifecycleStep, RunError, SolverError};
use crate::linker::Linker;
use crate::solver::TimeStepSolver;

// ── LifecycleState ──────────────────────────────────────────────

/// States of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing built yet.
    Uninitialized,
    /// Partition persisted; terminal.
    SaveGridOnly,
    /// Subsystems built from configuration.
    Created,
    /// Subsystems rebuilt from a checkpoint.
    Restored,
    /// Time loop running.
    Solving,
    /// Initial residual evaluated.
    DryRun,
    /// Context torn down; terminal.
    Destroyed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::SaveGridOnly => "save_grid_only",
            Self::Created => "created",
            Self::Restored => "restored",
            Self::Solving => "solving",
            Self::DryRun => "dry_run",
            Self::Destroyed => "destroyed",
        })
    }
}

// ── RunReport ───────────────────────────────────────────────────

/// Summary of a completed run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    /// Mode the run executed.
    pub mode: RunMode,
    /// Terminal state.
    pub final_state: LifecycleState,
    /// Every state entered, in order, starting with `Uninitialized`.
    pub transitions: Vec<LifecycleState>,
    /// Time steps executed by this run.
    pub steps_run: u64,
    /// Checkpoints published by this run.
    pub checkpoints_written: u64,
    /// Output frames emitted by this run.
    pub frames_emitted: u64,
    /// Step counter at teardown.
    pub final_step: u64,
    /// Simulated time at teardown, physical units.
    pub final_time: f64,
    /// Initial residual norm of a dry run.
    pub residual_norm: Option<f64>,
    /// Marker relabel counts of a fresh start.
    pub phase_report: Option<PhaseInitReport>,
    /// Partition file written in save-grid mode.
    pub partition_file: Option<PathBuf>,
    /// Subsystems released explicitly at teardown, in order.
    pub torn_down: Vec<SubsystemId>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl RunReport {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            final_state: LifecycleState::Uninitialized,
            transitions: Vec::new(),
            steps_run: 0,
            checkpoints_written: 0,
            frames_emitted: 0,
            final_step: 0,
            final_time: 0.0,
            residual_norm: None,
            phase_report: None,
            partition_file: None,
            torn_down: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

// ── LifecycleOrchestrator ───────────────────────────────────────

/// Drives one run of one process.
///
/// # Example
///
/// ```ignore
/// let mut orchestrator = LifecycleOrchestrator::new(config, &SingleProcess, NullSolver);
/// let report = orchestrator.run(RunMode::DryRun)?;
/// assert_eq!(report.final_state, LifecycleState::Destroyed);
/// ```
pub struct LifecycleOrchestrator<'a, C: Communicator + ?Sized, S: TimeStepSolver> {
    config: RunConfig,
    comm: &'a C,
    solver: S,
    state: LifecycleState,
    transitions: Vec<LifecycleState>,
}

impl<'a, C: Communicator + ?Sized, S: TimeStepSolver> LifecycleOrchestrator<'a, C, S> {
    /// Orchestrator for `config` on this process.
    pub fn new(config: RunConfig, comm: &'a C, solver: S) -> Self {
        Self {
            config,
            comm,
            solver,
            state: LifecycleState::Uninitialized,
            transitions: vec![LifecycleState::Uninitialized],
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The solver.
    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Run in the mode named by the configuration.
    pub fn run_configured(&mut self) -> Result<RunReport, RunError> {
        let mode = self
            .config
            .run_mode()
            .map_err(RunError::at(LifecycleStep::Configure))?;
        self.run(mode)
    }

    /// Run in `mode`. An orchestrator runs at most once.
    pub fn run(&mut self, mode: RunMode) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let configure = RunError::at::<ConfigError>(LifecycleStep::Configure);
        if self.state != LifecycleState::Uninitialized {
            return Err(configure(ConfigError::Invalid {
                section: "lifecycle",
                reason: format!("orchestrator already ran (state {})", self.state),
            }));
        }
        info!(
            %mode,
            rank = %self.comm.rank(),
            size = self.comm.size(),
            run_dir = %self.config.run_dir.display(),
            "run starting"
        );

        if let Err(e) = self.config.validate(self.comm.size()) {
            return Err(configure(e));
        }
        let store = CheckpointStore::new(&self.config.run_dir);
        if mode == RunMode::Restart && !store.exists() {
            return Err(configure(ConfigError::MissingRestartDatabase {
                path: store.canonical_dir(),
            }));
        }

        let mut report = RunReport::new(mode);

        if mode == RunMode::SaveGridOnly {
            let path = self
                .save_grid()
                .map_err(RunError::at(LifecycleStep::SaveGrid))?;
            report.partition_file = Some(path);
            self.enter(LifecycleState::SaveGridOnly);
            return Ok(self.finish(report, started));
        }

        let manager = CheckpointManager::new(&self.config.run_dir, self.comm);
        let mut ctx = if mode == RunMode::Restart {
            let ctx = manager
                .read(&self.config)
                .map_err(RunError::at(LifecycleStep::Restore))?;
            self.enter(LifecycleState::Restored);
            ctx
        } else {
            let (ctx, phase_report) = SimulationContext::create(&self.config, self.comm)
                .map_err(RunError::at(LifecycleStep::Create))?;
            report.phase_report = Some(phase_report);
            self.enter(LifecycleState::Created);
            ctx
        };

        Linker::link(&mut ctx);
        Linker::verify(&ctx).map_err(RunError::at(LifecycleStep::Link))?;

        if mode == RunMode::DryRun {
            self.enter(LifecycleState::DryRun);
            let norm = self
                .dry_run(&mut ctx)
                .map_err(RunError::at(LifecycleStep::DryRun))?;
            report.residual_norm = Some(norm);
        } else {
            self.enter(LifecycleState::Solving);
            self.solve(&mut ctx, &manager, &mut report)?;
        }

        report.final_step = ctx.time.step();
        report.final_time = ctx.scaling.time_to_physical(ctx.time.time());
        report.torn_down = ctx.destroy();
        self.enter(LifecycleState::Destroyed);
        Ok(self.finish(report, started))
    }

    fn enter(&mut self, next: LifecycleState) {
        info!(from = %self.state, to = %next, "lifecycle transition");
        self.state = next;
        self.transitions.push(next);
    }

    fn finish(&self, mut report: RunReport, started: Instant) -> RunReport {
        report.final_state = self.state;
        report.transitions = self.transitions.clone();
        report.elapsed = started.elapsed();
        info!(
            mode = %report.mode,
            steps = report.steps_run,
            checkpoints = report.checkpoints_written,
            elapsed_s = report.elapsed.as_secs_f64(),
            "run finished"
        );
        report
    }

    /// Build the partition and have rank 0 persist its descriptor.
    fn save_grid(&self) -> Result<PathBuf, EngineError> {
        let rank = self.comm.rank();
        let scaling = Scaling::from_spec(&self.config.scaling)?;
        let grid = GridPartition::new(&self.config.grid, &scaling, rank, self.comm.size())?;
        let descriptor = grid.descriptor();
        let path = self.config.run_dir.join(descriptor.file_name());

        let written = if rank.is_root() {
            let dir = &self.config.run_dir;
            fs::create_dir_all(dir)
                .map_err(CheckpointError::fs("create", dir))
                .and_then(|()| {
                    CheckpointStore::write_atomic(&path, |w| {
                        let mut writer = CheckpointWriter::new(w, rank, PARTITION_LAYOUT)?;
                        writer.write_section(SectionTag::PartitionDescriptor, &descriptor)?;
                        writer.finish().map(drop)
                    })
                })
        } else {
            Ok(())
        };
        if !self.comm.all_agree(written.is_ok()) {
            written?;
            return Err(CheckpointError::CollectiveAbort { stage: "save grid" }.into());
        }
        info!(path = %path.display(), "saved processor partitioning");
        Ok(path)
    }

    fn dry_run(&mut self, ctx: &mut SimulationContext) -> Result<f64, EngineError> {
        ctx.apply_boundary_conditions()?;
        let norm = self.solver.dry_run(ctx)?;
        info!(residual_norm = norm, "initial residual evaluated");
        Ok(norm)
    }

    /// Step until the time stepping reports completion, checkpointing on
    /// schedule.
    fn solve(
        &mut self,
        ctx: &mut SimulationContext,
        manager: &CheckpointManager<'_, C>,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        let every = self.config.checkpoint.every_steps;
        let on_finish = self.config.checkpoint.on_finish;

        while !ctx.time.is_done() {
            let stepped = self.step_once(ctx);
            if !self.comm.all_agree(stepped.is_ok()) {
                let err = match stepped {
                    Err(e) => e,
                    Ok(_) => SolverError {
                        reason: "step failed on another rank".into(),
                    }
                    .into(),
                };
                return Err(RunError::at(LifecycleStep::Solve)(err));
            }
            report.frames_emitted += stepped.map_err(RunError::at(LifecycleStep::Solve))? as u64;
            report.steps_run += 1;

            let step = ctx.time.step();
            let periodic = every > 0 && step % every == 0;
            let finishing = on_finish && ctx.time.is_done();
            if periodic || finishing {
                manager
                    .write(ctx)
                    .map_err(RunError::at(LifecycleStep::Checkpoint))?;
                report.checkpoints_written += 1;
            }
        }
        Ok(())
    }

    /// One time step. Returns the number of output frames emitted.
    fn step_once(&mut self, ctx: &mut SimulationContext) -> Result<usize, EngineError> {
        ctx.apply_boundary_conditions()?;
        self.solver.solve_step(ctx)?;
        self.solver.advect(ctx)?;
        ctx.check_markers()?;
        ctx.time.advance();
        let frames = ctx.emit_outputs(ctx.time.step())?;
        debug!(step = ctx.time.step(), time = ctx.time.time(), "step complete");
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::NullSolver;
    use strata_core::SingleProcess;

    fn config(run_dir: &std::path::Path) -> RunConfig {
        let mut cfg = RunConfig::from_json(
            r#"{
                "time": {"dt": 0.25, "time_end": 1.0},
                "materials": [{"density": 1, "viscosity": 1}],
                "grid": {"domain_min": [0,0,0], "domain_max": [1,1,1], "cells": [2,2,2]},
                "checkpoint": {"every_steps": 2, "on_finish": true}
            }"#,
        )
        .unwrap();
        cfg.run_dir = run_dir.to_path_buf();
        cfg
    }

    #[test]
    fn normal_run_steps_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = LifecycleOrchestrator::new(config(dir.path()), &SingleProcess, NullSolver);
        let report = o.run(RunMode::Normal).unwrap();
        assert_eq!(report.steps_run, 4);
        // Steps 2 and 4; the finishing step is also periodic.
        assert_eq!(report.checkpoints_written, 2);
        assert_eq!(report.final_time, 1.0);
        assert_eq!(
            report.transitions,
            vec![
                LifecycleState::Uninitialized,
                LifecycleState::Created,
                LifecycleState::Solving,
                LifecycleState::Destroyed,
            ]
        );
        assert_eq!(o.state(), LifecycleState::Destroyed);
    }

    #[test]
    fn second_run_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = LifecycleOrchestrator::new(config(dir.path()), &SingleProcess, NullSolver);
        o.run(RunMode::DryRun).unwrap();
        let err = o.run(RunMode::DryRun).unwrap_err();
        assert_eq!(err.step, LifecycleStep::Configure);
    }

    #[test]
    fn states_display_lowercase() {
        assert_eq!(LifecycleState::SaveGridOnly.to_string(), "save_grid_only");
        assert_eq!(LifecycleState::DryRun.to_string(), "dry_run");
    }
}
