//! Reusable solver fixtures.
//!
//! - [`DriftSolver`]: deterministic state changes every step, so restarts
//!   can be compared against uninterrupted runs.
//! - [`FailingSolver`]: fails deterministically after N steps.

use strata_engine::{SimulationContext, SolverError, TimeStepSolver};

/// Accumulates `dt` into every marker's plastic strain and fills the
/// residual from the step counter.
#[derive(Clone, Debug, Default)]
pub struct DriftSolver {
    pub dry_runs: usize,
    pub solves: usize,
    pub advections: usize,
}

impl TimeStepSolver for DriftSolver {
    fn dry_run(&mut self, ctx: &mut SimulationContext) -> Result<f64, SolverError> {
        self.dry_runs += 1;
        for (i, r) in ctx.residual.residual.iter_mut().enumerate() {
            *r = if i % 2 == 0 { 3.0 } else { 4.0 };
        }
        Ok(ctx.residual.residual_norm())
    }

    fn solve_step(&mut self, ctx: &mut SimulationContext) -> Result<(), SolverError> {
        self.solves += 1;
        let step = ctx.time.step() as f64;
        for (i, r) in ctx.residual.residual.iter_mut().enumerate() {
            *r = step + i as f64;
        }
        Ok(())
    }

    fn advect(&mut self, ctx: &mut SimulationContext) -> Result<(), SolverError> {
        self.advections += 1;
        let dt = ctx.time.dt();
        for m in &mut ctx.advection.markers {
            m.plastic_strain += dt;
        }
        Ok(())
    }
}

/// Succeeds `succeed_count` solve steps, then fails.
#[derive(Clone, Debug)]
pub struct FailingSolver {
    pub succeed_count: usize,
    calls: usize,
}

impl FailingSolver {
    /// Create a solver that succeeds `succeed_count` times then fails.
    pub fn new(succeed_count: usize) -> Self {
        Self {
            succeed_count,
            calls: 0,
        }
    }

    /// How many times `solve_step()` has been called.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl TimeStepSolver for FailingSolver {
    fn dry_run(&mut self, ctx: &mut SimulationContext) -> Result<f64, SolverError> {
        Ok(ctx.residual.residual_norm())
    }

    fn solve_step(&mut self, _ctx: &mut SimulationContext) -> Result<(), SolverError> {
        let n = self.calls;
        self.calls += 1;
        if n >= self.succeed_count {
            return Err(SolverError {
                reason: format!(
                    "deliberate failure after {} successful steps",
                    self.succeed_count
                ),
            });
        }
        Ok(())
    }
}
