//! Contract of the external time-step solver.
//!
//! Residual assembly, nonlinear and linear solves, and marker advection
//! physics live outside this workspace. The lifecycle reaches them only
//! through [`TimeStepSolver`].

use crate::context::SimulationContext;
use crate::error::SolverError;

/// One nonlinear solve per time step, plus marker advection.
///
/// Implementations receive a linked context and may mutate any subsystem
/// in place. They must not advance the time stepping; the lifecycle does.
pub trait TimeStepSolver {
    /// Evaluate the initial residual without stepping. Returns its norm.
    fn dry_run(&mut self, ctx: &mut SimulationContext) -> Result<f64, SolverError>;

    /// Solve for the velocity of the current step.
    fn solve_step(&mut self, ctx: &mut SimulationContext) -> Result<(), SolverError>;

    /// Move markers with the current velocity. The default leaves them in
    /// place.
    fn advect(&mut self, ctx: &mut SimulationContext) -> Result<(), SolverError> {
        let _ = ctx;
        Ok(())
    }
}

/// Solver that does no physics: the residual is reported as is and every
/// step converges immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSolver;

impl TimeStepSolver for NullSolver {
    fn dry_run(&mut self, ctx: &mut SimulationContext) -> Result<f64, SolverError> {
        Ok(ctx.residual.residual_norm())
    }

    fn solve_step(&mut self, ctx: &mut SimulationContext) -> Result<(), SolverError> {
        ctx.residual.residual.fill(0.0);
        Ok(())
    }
}
