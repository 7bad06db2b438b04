//! The per-process simulation context.
//!
//! [`SimulationContext`] owns one value of every subsystem. Subsystems
//! refer to each other only through [`Link`]s, which the context resolves
//! after checking that each link was wired for this context and points at
//! the expected slot.
//!
//! # Ownership model
//!
//! The context is an explicit value threaded through the lifecycle and
//! consumed by [`destroy`](SimulationContext::destroy). Every subsystem
//! field is public so the solver can mutate state in place; links never
//! borrow, so there is no aliasing to manage.

use smallvec::{smallvec, SmallVec};
use strata_core::{Communicator, ContextId, Link, LinkError, LinkTarget, Scaling, SubsystemId};
use strata_grid::GridPartition;
use strata_markers::{check_marker_phases, PhaseInitReport};
use tracing::{debug, info};

use crate::advection::AdvectionContext;
use crate::boundary::BoundaryConditions;
use crate::config::RunConfig;
use crate::error::EngineError;
use crate::materials::MaterialDatabase;
use crate::output::{GridOutput, MarkerOutput, PhaseOutput, SurfaceOutput};
use crate::residual::ResidualContext;
use crate::surface::FreeSurface;
use crate::time::TimeStepping;

/// Order in which subsystems with an explicit teardown are released.
pub const TEARDOWN_ORDER: [SubsystemId; 7] = [
    SubsystemId::GridPartition,
    SubsystemId::FreeSurface,
    SubsystemId::BoundaryConditions,
    SubsystemId::ResidualContext,
    SubsystemId::AdvectionContext,
    SubsystemId::GridOutput,
    SubsystemId::SurfaceOutput,
];

// ── Subsystem ───────────────────────────────────────────────────

/// A type stored in exactly one slot of the context.
pub trait Subsystem {
    /// Slot identifier.
    const ID: SubsystemId;

    /// The slot's value inside `ctx`.
    fn locate(ctx: &SimulationContext) -> &Self;
}

macro_rules! subsystem {
    ($ty:ty, $id:ident, $field:ident) => {
        impl Subsystem for $ty {
            const ID: SubsystemId = SubsystemId::$id;

            fn locate(ctx: &SimulationContext) -> &Self {
                &ctx.$field
            }
        }
    };
}

subsystem!(Scaling, Scaling, scaling);
subsystem!(TimeStepping, TimeStepping, time);
subsystem!(MaterialDatabase, MaterialDatabase, materials);
subsystem!(GridPartition, GridPartition, grid);
subsystem!(FreeSurface, FreeSurface, surface);
subsystem!(BoundaryConditions, BoundaryConditions, boundary);
subsystem!(ResidualContext, ResidualContext, residual);
subsystem!(AdvectionContext, AdvectionContext, advection);
subsystem!(GridOutput, GridOutput, grid_output);
subsystem!(SurfaceOutput, SurfaceOutput, surface_output);
subsystem!(MarkerOutput, MarkerOutput, marker_output);
subsystem!(PhaseOutput, PhaseOutput, phase_output);

// ── ContextParts ────────────────────────────────────────────────

/// The persisted subsystems, as read back from a checkpoint.
///
/// Boundary conditions and output drivers are not part of it; they are
/// rebuilt from configuration.
#[derive(Debug)]
pub struct ContextParts {
    /// Scaling.
    pub scaling: Scaling,
    /// Time stepping.
    pub time: TimeStepping,
    /// Material database.
    pub materials: MaterialDatabase,
    /// Grid partition.
    pub grid: GridPartition,
    /// Free surface.
    pub surface: FreeSurface,
    /// Residual context.
    pub residual: ResidualContext,
    /// Advection context.
    pub advection: AdvectionContext,
}

// ── SimulationContext ───────────────────────────────────────────

/// One instance of every subsystem for one process of one run.
#[derive(Debug)]
pub struct SimulationContext {
    id: ContextId,
    /// Nondimensionalisation.
    pub scaling: Scaling,
    /// Time-step state.
    pub time: TimeStepping,
    /// Material properties.
    pub materials: MaterialDatabase,
    /// Local sub-domain.
    pub grid: GridPartition,
    /// Free-surface topography.
    pub surface: FreeSurface,
    /// Boundary conditions.
    pub boundary: BoundaryConditions,
    /// Solution and residual.
    pub residual: ResidualContext,
    /// Local markers.
    pub advection: AdvectionContext,
    /// Grid output driver.
    pub grid_output: GridOutput,
    /// Free-surface output driver.
    pub surface_output: SurfaceOutput,
    /// Marker output driver.
    pub marker_output: MarkerOutput,
    /// Phase-volume output driver.
    pub phase_output: PhaseOutput,
}

impl SimulationContext {
    /// Build every subsystem from configuration in dependency order,
    /// including the initial marker field.
    ///
    /// The returned context is unlinked.
    pub fn create<C: Communicator + ?Sized>(
        config: &RunConfig,
        comm: &C,
    ) -> Result<(Self, PhaseInitReport), EngineError> {
        let scaling = Scaling::from_spec(&config.scaling)?;
        debug!(units = ?scaling.units, "created scaling");

        let time = TimeStepping::from_spec(&config.time, &scaling);
        debug!(dt = time.dt(), time_end = time.time_end(), "created time stepping");

        let materials = MaterialDatabase::from_specs(&config.materials, &scaling);
        debug!(phases = materials.num_phases(), "created material database");

        let grid = GridPartition::new(&config.grid, &scaling, comm.rank(), comm.size())?;
        debug!(procs = ?grid.procs(), coords = ?grid.coords(), "created grid partition");

        let surface = FreeSurface::new(&config.free_surface, &scaling, &grid);
        debug!(enabled = surface.enabled(), "created free surface");

        let residual = ResidualContext::new(&grid);
        debug!(len = residual.solution.len(), "created residual context");

        let (markers, report) = config.markers.build(&scaling, &grid)?;
        check_marker_phases(&markers, materials.num_phases())?;
        debug!(
            markers = markers.len(),
            relabeled = report.total(),
            "created advection context"
        );
        let advection = AdvectionContext::new(markers);

        let ctx = Self::from_parts(
            config,
            ContextParts {
                scaling,
                time,
                materials,
                grid,
                surface,
                residual,
                advection,
            },
        );
        Ok((ctx, report))
    }

    /// Assemble a context from persisted subsystems, rebuilding boundary
    /// conditions and output drivers from `config`.
    ///
    /// The returned context has a fresh [`ContextId`] and is unlinked.
    pub fn from_parts(config: &RunConfig, parts: ContextParts) -> Self {
        let boundary = BoundaryConditions::new(&config.boundary, &parts.scaling);
        debug!(strain_rate = ?boundary.strain_rate(), "created boundary conditions");
        let out = &config.output;
        let ctx = Self {
            id: ContextId::next(),
            scaling: parts.scaling,
            time: parts.time,
            materials: parts.materials,
            grid: parts.grid,
            surface: parts.surface,
            boundary,
            residual: parts.residual,
            advection: parts.advection,
            grid_output: GridOutput::new(out.grid),
            surface_output: SurfaceOutput::new(out.surface),
            marker_output: MarkerOutput::new(out.markers),
            phase_output: PhaseOutput::new(out.phases),
        };
        debug!(context = %ctx.id, "created output drivers");
        ctx
    }

    /// Unique identifier of this context.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Follow `link` to its subsystem.
    ///
    /// Fails if the link is unassigned, was wired in another context, or
    /// points at a different slot.
    pub fn resolve<T: Subsystem>(&self, link: &Link<T>) -> Result<&T, LinkError> {
        link.check(self.id, T::ID)?;
        Ok(T::locate(self))
    }

    /// Current targets of `source`'s links, in the order of
    /// [`LINKS`](crate::linker::LINKS).
    pub fn link_targets(&self, source: SubsystemId) -> SmallVec<[Option<LinkTarget>; 6]> {
        match source {
            SubsystemId::Scaling => SmallVec::new(),
            SubsystemId::TimeStepping => smallvec![self.time.scaling.target()],
            SubsystemId::MaterialDatabase => smallvec![self.materials.scaling.target()],
            SubsystemId::GridPartition => smallvec![self.grid.scaling.target()],
            SubsystemId::FreeSurface => smallvec![self.surface.residual.target()],
            SubsystemId::BoundaryConditions => smallvec![
                self.boundary.scaling.target(),
                self.boundary.time.target(),
                self.boundary.grid.target(),
            ],
            SubsystemId::ResidualContext => smallvec![
                self.residual.scaling.target(),
                self.residual.time.target(),
                self.residual.grid.target(),
                self.residual.surface.target(),
                self.residual.boundary.target(),
                self.residual.materials.target(),
            ],
            SubsystemId::AdvectionContext => smallvec![
                self.advection.grid.target(),
                self.advection.residual.target(),
                self.advection.surface.target(),
                self.advection.materials.target(),
            ],
            SubsystemId::GridOutput => smallvec![self.grid_output.residual.target()],
            SubsystemId::SurfaceOutput => smallvec![self.surface_output.surface.target()],
            SubsystemId::MarkerOutput => smallvec![self.marker_output.advection.target()],
            SubsystemId::PhaseOutput => smallvec![self.phase_output.advection.target()],
        }
    }

    // ── Lifecycle helpers ───────────────────────────────────────

    /// Write the boundary values into the solution vector. Returns the
    /// number of constrained entries.
    pub fn apply_boundary_conditions(&mut self) -> Result<usize, LinkError> {
        let bc = &self.boundary;
        let constraints = bc.constraints(self.resolve(&bc.grid)?, self.resolve(&bc.time)?);
        self.resolve(&self.residual.boundary)?;
        self.residual.apply_constraints(&constraints);
        Ok(constraints.len())
    }

    /// Check every local marker's phase against the material database.
    pub fn check_markers(&self) -> Result<(), EngineError> {
        let materials = self.resolve(&self.advection.materials)?;
        check_marker_phases(&self.advection.markers, materials.num_phases())?;
        Ok(())
    }

    /// Emit every output frame due after `step` completed steps. Returns
    /// the number of frames emitted.
    pub fn emit_outputs(&mut self, step: u64) -> Result<usize, LinkError> {
        let mut emitted = 0;

        if self.grid_output.state.is_due(step) {
            let r = self.resolve(&self.grid_output.residual)?;
            let velocity = r.solution.iter().map(|v| v * v).sum::<f64>().sqrt();
            info!(
                step,
                frame = self.grid_output.state.frames(),
                velocity_norm = velocity,
                residual_norm = r.residual_norm(),
                "grid output"
            );
            self.grid_output.state.record_frame();
            emitted += 1;
        }

        if self.surface_output.state.is_due(step) {
            let s = self.resolve(&self.surface_output.surface)?;
            info!(
                step,
                frame = self.surface_output.state.frames(),
                columns = s.topography().len(),
                relief = s.relief(),
                "surface output"
            );
            self.surface_output.state.record_frame();
            emitted += 1;
        }

        if self.marker_output.state.is_due(step) {
            let a = self.resolve(&self.marker_output.advection)?;
            info!(
                step,
                frame = self.marker_output.state.frames(),
                markers = a.marker_count(),
                "marker output"
            );
            self.marker_output.state.record_frame();
            emitted += 1;
        }

        if self.phase_output.state.is_due(step) {
            let a = self.resolve(&self.phase_output.advection)?;
            info!(
                step,
                frame = self.phase_output.state.frames(),
                phases = ?a.phase_counts(),
                "phase output"
            );
            self.phase_output.state.record_frame();
            emitted += 1;
        }

        Ok(emitted)
    }

    /// Tear the context down, releasing subsystems in
    /// [`TEARDOWN_ORDER`]. The remaining subsystems have no explicit
    /// teardown and are released with the aggregate.
    pub fn destroy(self) -> Vec<SubsystemId> {
        let Self {
            id,
            grid,
            surface,
            boundary,
            residual,
            advection,
            grid_output,
            surface_output,
            ..
        } = self;
        release(id, SubsystemId::GridPartition, grid);
        release(id, SubsystemId::FreeSurface, surface);
        release(id, SubsystemId::BoundaryConditions, boundary);
        release(id, SubsystemId::ResidualContext, residual);
        release(id, SubsystemId::AdvectionContext, advection);
        release(id, SubsystemId::GridOutput, grid_output);
        release(id, SubsystemId::SurfaceOutput, surface_output);
        TEARDOWN_ORDER.to_vec()
    }
}

fn release<T>(context: ContextId, subsystem: SubsystemId, value: T) {
    drop(value);
    debug!(%context, %subsystem, "destroyed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::Linker;
    use strata_core::SingleProcess;

    fn config() -> RunConfig {
        RunConfig::from_json(
            r#"{
                "time": {"dt": 0.5, "time_end": 1.0},
                "materials": [{"density": 1, "viscosity": 1}, {"density": 2, "viscosity": 1}],
                "grid": {"domain_min": [0,0,0], "domain_max": [1,1,1], "cells": [2,2,2]},
                "free_surface": {"enabled": true, "level": 1.0},
                "boundary": {"strain_rate": [1.0, 0.0]},
                "markers": {"layers": [{"bottom": 0.0, "top": 0.5, "phase": 1}]},
                "output": {"grid": {"enabled": true, "every_steps": 2}}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn create_builds_every_subsystem() {
        let (ctx, report) = SimulationContext::create(&config(), &SingleProcess).unwrap();
        assert_eq!(ctx.advection.marker_count(), 64);
        assert_eq!(ctx.advection.count_phase(strata_core::PhaseId(1)), 32);
        assert_eq!(ctx.residual.solution.len(), 3 * 8);
        assert_eq!(ctx.surface.topography().len(), 4);
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn resolve_before_linking_is_unlinked() {
        let (ctx, _) = SimulationContext::create(&config(), &SingleProcess).unwrap();
        assert_eq!(
            ctx.resolve(&ctx.time.scaling).unwrap_err(),
            LinkError::Unlinked {
                target: SubsystemId::Scaling
            }
        );
    }

    #[test]
    fn resolve_through_another_context_fails() {
        let (mut a, _) = SimulationContext::create(&config(), &SingleProcess).unwrap();
        let (mut b, _) = SimulationContext::create(&config(), &SingleProcess).unwrap();
        Linker::link(&mut a);
        Linker::link(&mut b);
        assert_ne!(a.id(), b.id());

        b.residual.grid = a.residual.grid;
        match b.resolve(&b.residual.grid) {
            Err(LinkError::ForeignContext { target, .. }) => {
                assert_eq!(target, SubsystemId::GridPartition)
            }
            other => panic!("expected ForeignContext, got {other:?}"),
        }
    }

    #[test]
    fn boundary_conditions_write_solution() {
        let (mut ctx, _) = SimulationContext::create(&config(), &SingleProcess).unwrap();
        assert!(ctx.apply_boundary_conditions().is_err());
        Linker::link(&mut ctx);
        let constrained = ctx.apply_boundary_conditions().unwrap();
        assert!(constrained > 0);
        // Cell 0: x centre 0.25, domain centre 0.5.
        assert_eq!(ctx.residual.solution[0], -0.25);
    }

    #[test]
    fn outputs_follow_their_schedule() {
        let (mut ctx, _) = SimulationContext::create(&config(), &SingleProcess).unwrap();
        Linker::link(&mut ctx);
        assert_eq!(ctx.emit_outputs(1).unwrap(), 0);
        assert_eq!(ctx.emit_outputs(2).unwrap(), 1);
        assert_eq!(ctx.grid_output.state.frames(), 1);
    }

    #[test]
    fn destroy_follows_teardown_order() {
        let (ctx, _) = SimulationContext::create(&config(), &SingleProcess).unwrap();
        assert_eq!(ctx.destroy(), TEARDOWN_ORDER.to_vec());
    }
}
