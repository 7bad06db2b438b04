//! Ordered application of polygon volumes to local markers.

use strata_core::{ConfigError, Marker, Scaling};
use strata_grid::GridPartition;
use tracing::debug;

use crate::polygon::{Polygon2D, PolygonSpec};

/// Per-polygon outcome of [`MarkerPhaseInitializer::apply`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhaseInitReport {
    /// Markers relabeled by each polygon, in configured order. A marker
    /// relabeled by several polygons is counted by each of them.
    pub relabeled: Vec<usize>,
}

impl PhaseInitReport {
    /// Sum of all per-polygon counts.
    pub fn total(&self) -> usize {
        self.relabeled.iter().sum()
    }
}

/// Applies polygon volumes in configured order; later polygons win.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerPhaseInitializer {
    polygons: Vec<Polygon2D>,
}

impl MarkerPhaseInitializer {
    /// Validate and localise every polygon. The first malformed polygon
    /// fails the whole set.
    pub fn new(
        specs: &[PolygonSpec],
        scaling: &Scaling,
        grid: &GridPartition,
    ) -> Result<Self, ConfigError> {
        let polygons = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| Polygon2D::from_spec(i, spec, scaling, grid))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { polygons })
    }

    /// Localised polygons in application order.
    pub fn polygons(&self) -> &[Polygon2D] {
        &self.polygons
    }

    /// Relabel `markers` in place. Marker count and order never change.
    pub fn apply(&self, markers: &mut [Marker], grid: &GridPartition) -> PhaseInitReport {
        let mut report = PhaseInitReport {
            relabeled: Vec::with_capacity(self.polygons.len()),
        };
        for (index, polygon) in self.polygons.iter().enumerate() {
            let mut count = 0;
            if polygon.local_slice().is_some() {
                for marker in markers.iter_mut() {
                    if polygon.accepts(marker.phase) && polygon.contains(marker.position, grid) {
                        marker.phase = polygon.phase();
                        count += 1;
                    }
                }
            }
            debug!(
                polygon = index,
                phase = %polygon.phase(),
                mode = ?polygon.mode(),
                relabeled = count,
                "applied polygon volume"
            );
            report.relabeled.push(count);
        }
        report
    }
}
