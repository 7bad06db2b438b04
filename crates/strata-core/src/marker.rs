//! Lagrangian material markers.

use crate::axis::Axis;
use crate::id::PhaseId;

/// A Lagrangian particle owned by the advection context.
///
/// Position and phase are interpreted by this workspace; the remaining
/// fields are carried for the solver and only round-trip through
/// checkpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Marker {
    /// Position in nondimensional coordinates.
    pub position: [f64; 3],
    /// Material phase.
    pub phase: PhaseId,
    /// Temperature.
    pub temperature: f64,
    /// Accumulated plastic strain.
    pub plastic_strain: f64,
    /// Pressure history.
    pub pressure: f64,
}

impl Marker {
    /// A marker at `position` with zeroed auxiliary state.
    pub fn new(position: [f64; 3], phase: PhaseId) -> Self {
        Self {
            position,
            phase,
            temperature: 0.0,
            plastic_strain: 0.0,
            pressure: 0.0,
        }
    }

    /// Coordinate along `axis`.
    #[inline]
    pub fn coord(&self, axis: Axis) -> f64 {
        self.position[axis.index()]
    }
}
