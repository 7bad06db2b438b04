//! Marker section of the run configuration.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strata_core::{Axis, ConfigError, Marker, PhaseId, Scaling};
use strata_grid::GridPartition;
use tracing::debug;

use crate::initializer::{MarkerPhaseInitializer, PhaseInitReport};
use crate::lattice::MarkerLattice;
use crate::polygon::{PolygonMode, PolygonSpec};

fn vertical() -> Axis {
    Axis::Z
}

/// A horizontal layer `[bottom, top)` along `axis` with its own phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    /// Axis the layer bounds refer to.
    #[serde(default = "vertical")]
    pub axis: Axis,
    /// Lower bound, physical length units.
    pub bottom: f64,
    /// Upper bound, physical length units.
    pub top: f64,
    /// Phase of markers inside the layer.
    pub phase: PhaseId,
}

/// How the initial marker field is built: lattice, background, layers,
/// then polygon volumes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkerSetup {
    /// Phase of every marker before layers and polygons.
    pub background_phase: PhaseId,
    /// Layers, applied in order; later layers win.
    pub layers: Vec<LayerSpec>,
    /// Polygon volumes, applied in order after the layers.
    pub polygons: Vec<PolygonSpec>,
    /// Seed of the lattice jitter.
    pub seed: u64,
    /// Lattice jitter as a fraction of the sub-cell width.
    pub jitter: f64,
}

impl MarkerSetup {
    /// Check every configured phase against the material count and every
    /// layer for a non-empty interval.
    pub fn validate(&self, num_phases: u32) -> Result<(), ConfigError> {
        let out_of_range = |what: String, phase: PhaseId| ConfigError::Invalid {
            section: "markers",
            reason: format!("{what} uses phase {phase}, only {num_phases} defined"),
        };
        if self.background_phase.0 >= num_phases {
            return Err(out_of_range("background".into(), self.background_phase));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.phase.0 >= num_phases {
                return Err(out_of_range(format!("layer {i}"), layer.phase));
            }
            if layer.bottom.partial_cmp(&layer.top) != Some(Ordering::Less) {
                return Err(ConfigError::Invalid {
                    section: "markers",
                    reason: format!(
                        "layer {i} needs bottom < top, got [{}, {})",
                        layer.bottom, layer.top
                    ),
                });
            }
        }
        for (i, polygon) in self.polygons.iter().enumerate() {
            if polygon.target_phase.0 >= num_phases {
                return Err(out_of_range(format!("polygon {i}"), polygon.target_phase));
            }
            if polygon.mode == PolygonMode::Additive {
                if let Some(&p) = polygon.source_phases.iter().find(|p| p.0 >= num_phases) {
                    return Err(out_of_range(format!("polygon {i} source set"), p));
                }
            }
        }
        MarkerLattice::new(self.seed, self.jitter)?;
        Ok(())
    }

    /// Generate and label the local markers.
    pub fn build(
        &self,
        scaling: &Scaling,
        grid: &GridPartition,
    ) -> Result<(Vec<Marker>, PhaseInitReport), ConfigError> {
        let initializer = MarkerPhaseInitializer::new(&self.polygons, scaling, grid)?;
        let mut markers =
            MarkerLattice::new(self.seed, self.jitter)?.generate(grid, self.background_phase);

        for layer in &self.layers {
            let bottom = scaling.length_to_internal(layer.bottom);
            let top = scaling.length_to_internal(layer.top);
            let mut count = 0usize;
            for m in markers.iter_mut() {
                let x = m.coord(layer.axis);
                if x >= bottom && x < top {
                    m.phase = layer.phase;
                    count += 1;
                }
            }
            debug!(phase = %layer.phase, relabeled = count, "applied layer");
        }

        let report = initializer.apply(&mut markers, grid);
        Ok((markers, report))
    }
}
