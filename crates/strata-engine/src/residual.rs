//! Residual and solution vectors of the velocity problem.

use std::io::{Read, Write};

use strata_checkpoint::codec::{read_f64_vec, write_f64_slice};
use strata_checkpoint::{CheckpointError, Persist, SectionTag};
use strata_core::{Axis, Link, Scaling};
use strata_grid::GridPartition;

use crate::boundary::BoundaryConditions;
use crate::materials::MaterialDatabase;
use crate::surface::FreeSurface;
use crate::time::TimeStepping;

/// Velocity components stored per cell.
pub const COMPONENTS: usize = 3;

/// Solution and residual of the local cells, `COMPONENTS` values per cell,
/// x fastest.
///
/// Assembly and solving belong to the external solver; this subsystem owns
/// the vectors and everything the solver reaches through its links.
#[derive(Clone, Debug, PartialEq)]
pub struct ResidualContext {
    /// Link to the run's scaling, assigned by the linker.
    pub scaling: Link<Scaling>,
    /// Link to the time stepping, assigned by the linker.
    pub time: Link<TimeStepping>,
    /// Link to the grid partition, assigned by the linker.
    pub grid: Link<GridPartition>,
    /// Link to the free surface, assigned by the linker.
    pub surface: Link<FreeSurface>,
    /// Link to the boundary conditions, assigned by the linker.
    pub boundary: Link<BoundaryConditions>,
    /// Link to the material database, assigned by the linker.
    pub materials: Link<MaterialDatabase>,
    /// Current velocity solution.
    pub solution: Vec<f64>,
    /// Residual of the current solution.
    pub residual: Vec<f64>,
}

impl ResidualContext {
    /// Zeroed vectors sized for the local cells.
    pub fn new(grid: &GridPartition) -> Self {
        let len = Self::local_len(grid);
        Self::from_vectors(vec![0.0; len], vec![0.0; len])
    }

    /// Vector length for `grid`'s local cells.
    pub fn local_len(grid: &GridPartition) -> usize {
        COMPONENTS
            * Axis::ALL
                .iter()
                .map(|&a| grid.local_cells(a).len())
                .product::<usize>()
    }

    fn from_vectors(solution: Vec<f64>, residual: Vec<f64>) -> Self {
        Self {
            scaling: Link::unlinked(),
            time: Link::unlinked(),
            grid: Link::unlinked(),
            surface: Link::unlinked(),
            boundary: Link::unlinked(),
            materials: Link::unlinked(),
            solution,
            residual,
        }
    }

    /// Euclidean norm of the residual.
    pub fn residual_norm(&self) -> f64 {
        self.residual.iter().map(|r| r * r).sum::<f64>().sqrt()
    }

    /// Overwrite constrained solution entries.
    pub fn apply_constraints(&mut self, constraints: &[(usize, f64)]) {
        for &(i, v) in constraints {
            if let Some(slot) = self.solution.get_mut(i) {
                *slot = v;
            }
        }
    }
}

impl Persist for ResidualContext {
    fn persist(&self, w: &mut dyn Write) -> Result<(), CheckpointError> {
        write_f64_slice(w, &self.solution)?;
        write_f64_slice(w, &self.residual)
    }

    fn restore(r: &mut dyn Read) -> Result<Self, CheckpointError> {
        let solution = read_f64_vec(r)?;
        let residual = read_f64_vec(r)?;
        if solution.len() != residual.len() {
            return Err(CheckpointError::Malformed {
                tag: SectionTag::ResidualContext,
                detail: format!(
                    "solution holds {} values, residual {}",
                    solution.len(),
                    residual.len()
                ),
            });
        }
        Ok(Self::from_vectors(solution, residual))
    }
}
