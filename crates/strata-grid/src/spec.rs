//! Grid section of the run configuration.

use serde::{Deserialize, Serialize};
use strata_core::{Axis, ConfigError};

fn default_markers_per_cell() -> [usize; 3] {
    [2, 2, 2]
}

/// Global grid description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridSpec {
    /// Lower corner of the domain, in physical length units.
    pub domain_min: [f64; 3],
    /// Upper corner of the domain, in physical length units.
    pub domain_max: [f64; 3],
    /// Global cell count per axis.
    pub cells: [usize; 3],
    /// Process grid; chosen automatically when absent.
    #[serde(default)]
    pub procs: Option<[usize; 3]>,
    /// Markers per cell per axis.
    #[serde(default = "default_markers_per_cell")]
    pub markers_per_cell: [usize; 3],
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::InvalidGrid { reason }
}

impl GridSpec {
    /// Check structural invariants that do not depend on the process count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for axis in Axis::ALL {
            let i = axis.index();
            let (lo, hi) = (self.domain_min[i], self.domain_max[i]);
            if !lo.is_finite() || !hi.is_finite() || lo >= hi {
                return Err(invalid(format!(
                    "domain along {axis} must be finite with min < max, got [{lo}, {hi}]"
                )));
            }
            if self.cells[i] == 0 {
                return Err(invalid(format!("cell count along {axis} must be at least 1")));
            }
            if self.markers_per_cell[i] == 0 {
                return Err(invalid(format!(
                    "markers per cell along {axis} must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Process grid for `size` processes.
    ///
    /// A configured grid must multiply to `size` and give every process at
    /// least one cell per axis. Otherwise the factorisation with the
    /// smallest per-process surface is chosen.
    pub fn process_grid(&self, size: usize) -> Result<[usize; 3], ConfigError> {
        if size == 0 {
            return Err(invalid("process count must be at least 1".into()));
        }
        if let Some(procs) = self.procs {
            let product: usize = procs.iter().product();
            if product != size {
                return Err(invalid(format!(
                    "process grid {}x{}x{} needs {product} processes, run has {size}",
                    procs[0], procs[1], procs[2]
                )));
            }
            for axis in Axis::ALL {
                let i = axis.index();
                if procs[i] == 0 || procs[i] > self.cells[i] {
                    return Err(invalid(format!(
                        "{} processes along {axis} for {} cells",
                        procs[i], self.cells[i]
                    )));
                }
            }
            return Ok(procs);
        }

        let mut best: Option<([usize; 3], f64)> = None;
        for px in (1..=size).filter(|p| size % p == 0) {
            let rest = size / px;
            for py in (1..=rest).filter(|p| rest % p == 0) {
                let procs = [px, py, rest / py];
                if (0..3).any(|i| procs[i] > self.cells[i]) {
                    continue;
                }
                let l: Vec<f64> = (0..3)
                    .map(|i| self.cells[i] as f64 / procs[i] as f64)
                    .collect();
                let surface = l[0] * l[1] + l[1] * l[2] + l[0] * l[2];
                if best.is_none_or(|(_, s)| surface < s) {
                    best = Some((procs, surface));
                }
            }
        }
        best.map(|(procs, _)| procs).ok_or_else(|| {
            invalid(format!(
                "cannot split {}x{}x{} cells over {size} processes",
                self.cells[0], self.cells[1], self.cells[2]
            ))
        })
    }
}
