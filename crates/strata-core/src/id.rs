//! Strongly-typed identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Rank of a process within the distributed run.
///
/// Rank 0 is the root: it performs the collective side effects that must
/// happen exactly once (partition files, checkpoint publish).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rank(pub u32);

impl Rank {
    /// The root process.
    pub const ROOT: Rank = Rank(0);

    /// Whether this is the root process.
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    /// The rank as a `usize` index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Rank {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Material phase carried by every marker.
///
/// `PhaseId(n)` refers to the n-th entry of the material database.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PhaseId(pub u32);

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PhaseId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Counter for unique [`ContextId`] allocation.
static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for a simulation context.
///
/// Allocated from a monotonic atomic counter. Links record the context they
/// were established in, so a reference wired for one context can never be
/// resolved through another (for example a context rebuilt from a
/// checkpoint).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a fresh, unique context ID. Thread-safe.
    pub fn next() -> Self {
        Self(CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one subsystem slot of the simulation context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubsystemId {
    /// Nondimensionalisation parameters.
    Scaling,
    /// Time-step state.
    TimeStepping,
    /// Material properties per phase.
    MaterialDatabase,
    /// Process-local sub-domain.
    GridPartition,
    /// Free-surface topography.
    FreeSurface,
    /// Boundary-condition context.
    BoundaryConditions,
    /// Residual / solution context.
    ResidualContext,
    /// Marker advection context.
    AdvectionContext,
    /// Grid output driver.
    GridOutput,
    /// Free-surface output driver.
    SurfaceOutput,
    /// Marker output driver.
    MarkerOutput,
    /// Phase-volume (AVD) output driver.
    PhaseOutput,
}

impl SubsystemId {
    /// Every subsystem in creation order.
    pub const ALL: [SubsystemId; 12] = [
        Self::Scaling,
        Self::TimeStepping,
        Self::MaterialDatabase,
        Self::GridPartition,
        Self::FreeSurface,
        Self::BoundaryConditions,
        Self::ResidualContext,
        Self::AdvectionContext,
        Self::GridOutput,
        Self::SurfaceOutput,
        Self::MarkerOutput,
        Self::PhaseOutput,
    ];

    /// Stable, human-readable name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Scaling => "scaling",
            Self::TimeStepping => "time_stepping",
            Self::MaterialDatabase => "material_database",
            Self::GridPartition => "grid_partition",
            Self::FreeSurface => "free_surface",
            Self::BoundaryConditions => "boundary_conditions",
            Self::ResidualContext => "residual_context",
            Self::AdvectionContext => "advection_context",
            Self::GridOutput => "grid_output",
            Self::SurfaceOutput => "surface_output",
            Self::MarkerOutput => "marker_output",
            Self::PhaseOutput => "phase_output",
        }
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
