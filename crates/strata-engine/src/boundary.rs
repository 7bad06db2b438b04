//! Boundary conditions on the velocity field.
//!
//! Rebuilt from configuration on every start and restart; nothing here is
//! checkpointed.

use strata_core::{Axis, Link, Scaling};
use strata_grid::GridPartition;

use crate::config::BoundarySpec;
use crate::residual::COMPONENTS;
use crate::time::TimeStepping;

/// Side walls moving apart (or together) at a background strain rate, and
/// a fixed base.
///
/// Wall velocity along x is `strain_rate[0] * (x - x_centre)`, likewise
/// along y. The vertical velocity on the base is zero. With a ramp time
/// the wall velocities grow linearly from zero.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryConditions {
    /// Link to the run's scaling, assigned by the linker.
    pub scaling: Link<Scaling>,
    /// Link to the time stepping, assigned by the linker.
    pub time: Link<TimeStepping>,
    /// Link to the grid partition, assigned by the linker.
    pub grid: Link<GridPartition>,
    strain_rate: [f64; 2],
    ramp_time: f64,
}

impl BoundaryConditions {
    /// Build from configuration.
    pub fn new(spec: &BoundarySpec, scaling: &Scaling) -> Self {
        Self {
            scaling: Link::unlinked(),
            time: Link::unlinked(),
            grid: Link::unlinked(),
            strain_rate: spec.strain_rate.map(|e| scaling.strain_rate_to_internal(e)),
            ramp_time: scaling.time_to_internal(spec.ramp_time),
        }
    }

    /// Background strain rates along x and y, internal units.
    pub fn strain_rate(&self) -> [f64; 2] {
        self.strain_rate
    }

    /// Fraction of the full wall velocity applied at the current time.
    pub fn ramp(&self, time: &TimeStepping) -> f64 {
        if self.ramp_time <= 0.0 {
            1.0
        } else {
            (time.time() / self.ramp_time).min(1.0)
        }
    }

    /// Constrained entries of the local solution vector as
    /// `(index, value)`, in ascending index order.
    pub fn constraints(&self, grid: &GridPartition, time: &TimeStepping) -> Vec<(usize, f64)> {
        let ramp = self.ramp(time);
        let cells = grid.cells();
        let ranges = Axis::ALL.map(|a| grid.local_cells(a));
        let (nx, ny) = (ranges[0].len(), ranges[1].len());
        let centre = [0, 1].map(|i| 0.5 * (grid.domain_min()[i] + grid.domain_max()[i]));
        let width = [Axis::X, Axis::Y].map(|a| grid.cell_width(a));

        let mut out = Vec::new();
        for (lk, k) in ranges[2].clone().enumerate() {
            for (lj, j) in ranges[1].clone().enumerate() {
                for (li, i) in ranges[0].clone().enumerate() {
                    let base = COMPONENTS * (li + nx * (lj + ny * lk));
                    for (d, g) in [i, j].into_iter().enumerate() {
                        if g == 0 || g + 1 == cells[d] {
                            let x = grid.domain_min()[d] + (g as f64 + 0.5) * width[d];
                            let v = ramp * self.strain_rate[d] * (x - centre[d]);
                            out.push((base + d, v));
                        }
                    }
                    if k == 0 {
                        out.push((base + 2, 0.0));
                    }
                }
            }
        }
        out
    }
}
