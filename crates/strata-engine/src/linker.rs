//! Wiring of cross-references between subsystems.
//!
//! The dependency graph is fixed. [`LINKS`] lists every subsystem's
//! outgoing links in the order the subsystem declares them; [`Linker`]
//! assigns exactly those links and [`Linker::verify`] checks them.

use indexmap::IndexMap;
use smallvec::SmallVec;
use strata_core::{LinkError, SubsystemId};
use tracing::debug;

use crate::context::SimulationContext;

use SubsystemId::{
    AdvectionContext, BoundaryConditions, FreeSurface, GridOutput, GridPartition, MarkerOutput,
    MaterialDatabase, PhaseOutput, ResidualContext, Scaling, SurfaceOutput, TimeStepping,
};

/// Outgoing links per subsystem. Subsystems without links are omitted.
pub const LINKS: &[(SubsystemId, &[SubsystemId])] = &[
    (TimeStepping, &[Scaling]),
    (MaterialDatabase, &[Scaling]),
    (GridPartition, &[Scaling]),
    (FreeSurface, &[ResidualContext]),
    (BoundaryConditions, &[Scaling, TimeStepping, GridPartition]),
    (
        ResidualContext,
        &[
            Scaling,
            TimeStepping,
            GridPartition,
            FreeSurface,
            BoundaryConditions,
            MaterialDatabase,
        ],
    ),
    (
        AdvectionContext,
        &[GridPartition, ResidualContext, FreeSurface, MaterialDatabase],
    ),
    (GridOutput, &[ResidualContext]),
    (SurfaceOutput, &[FreeSurface]),
    (MarkerOutput, &[AdvectionContext]),
    (PhaseOutput, &[AdvectionContext]),
];

/// [`LINKS`] as an ordered map, for diagnostics.
pub fn link_table() -> IndexMap<SubsystemId, SmallVec<[SubsystemId; 6]>> {
    LINKS
        .iter()
        .map(|&(source, targets)| (source, targets.iter().copied().collect()))
        .collect()
}

/// Assigns and checks every cross-reference of a [`SimulationContext`].
pub struct Linker;

impl Linker {
    /// Assign every link in [`LINKS`] to its target in `ctx`. Linking an
    /// already linked context leaves it unchanged. Returns the number of
    /// links assigned.
    pub fn link(ctx: &mut SimulationContext) -> usize {
        let id = ctx.id();

        ctx.time.scaling.assign(id, Scaling);
        ctx.materials.scaling.assign(id, Scaling);
        ctx.grid.scaling.assign(id, Scaling);
        ctx.surface.residual.assign(id, ResidualContext);

        let bc = &mut ctx.boundary;
        bc.scaling.assign(id, Scaling);
        bc.time.assign(id, TimeStepping);
        bc.grid.assign(id, GridPartition);

        let r = &mut ctx.residual;
        r.scaling.assign(id, Scaling);
        r.time.assign(id, TimeStepping);
        r.grid.assign(id, GridPartition);
        r.surface.assign(id, FreeSurface);
        r.boundary.assign(id, BoundaryConditions);
        r.materials.assign(id, MaterialDatabase);

        let a = &mut ctx.advection;
        a.grid.assign(id, GridPartition);
        a.residual.assign(id, ResidualContext);
        a.surface.assign(id, FreeSurface);
        a.materials.assign(id, MaterialDatabase);

        ctx.grid_output.residual.assign(id, ResidualContext);
        ctx.surface_output.surface.assign(id, FreeSurface);
        ctx.marker_output.advection.assign(id, AdvectionContext);
        ctx.phase_output.advection.assign(id, AdvectionContext);

        let count = LINKS.iter().map(|(_, targets)| targets.len()).sum();
        debug!(context = %id, links = count, "linked subsystems");
        count
    }

    /// Check that every declared link of `ctx` is assigned, belongs to
    /// `ctx`, and points at its declared target.
    pub fn verify(ctx: &SimulationContext) -> Result<(), LinkError> {
        for &(source, targets) in LINKS {
            let found = ctx.link_targets(source);
            for (i, &expected) in targets.iter().enumerate() {
                let target = found
                    .get(i)
                    .copied()
                    .flatten()
                    .ok_or(LinkError::Unlinked { target: expected })?;
                if target.context != ctx.id() {
                    return Err(LinkError::ForeignContext {
                        target: expected,
                        expected: ctx.id(),
                        found: target.context,
                    });
                }
                if target.subsystem != expected {
                    return Err(LinkError::WrongTarget {
                        expected,
                        found: target.subsystem,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subsystem_links_to_itself() {
        for &(source, targets) in LINKS {
            assert!(!targets.contains(&source), "{source} links to itself");
        }
    }

    #[test]
    fn table_follows_creation_order() {
        // Every source appears once, in the order subsystems are created.
        let table = link_table();
        assert_eq!(table.len(), LINKS.len());
        let position = |id| SubsystemId::ALL.iter().position(|&s| s == id);
        let sources: Vec<_> = table.keys().map(|&s| position(s)).collect();
        assert!(sources.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(table[&ResidualContext].len(), 6);
        assert!(!table.contains_key(&Scaling));
    }
}
