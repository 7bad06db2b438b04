//! Extruded polygon volumes.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strata_core::{Axis, ConfigError, PhaseId, Scaling};
use strata_grid::GridPartition;

/// How a polygon changes the phase of markers inside it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonMode {
    /// Relabel every marker inside the volume.
    #[default]
    Assign,
    /// Relabel only markers whose current phase is in the source set.
    Additive,
}

fn one() -> usize {
    1
}

/// Polygon-volume record of the run configuration.
///
/// Vertices are in physical length units along the two in-plane axes;
/// `first_slice` is the global marker slab index along the normal axis
/// where the volume starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolygonSpec {
    /// Axis normal to the polygon plane.
    pub normal_axis: Axis,
    /// Axes spanning the plane; the complement of the normal when absent.
    #[serde(default)]
    pub in_plane_axes: Option<[Axis; 2]>,
    /// Phase written into the volume.
    pub target_phase: PhaseId,
    /// Combination mode.
    #[serde(default)]
    pub mode: PolygonMode,
    /// Number of slabs the volume spans along the normal axis.
    #[serde(default = "one")]
    pub slice_count: usize,
    /// Vertices in the two in-plane coordinates.
    pub vertices: Vec<[f64; 2]>,
    /// Global slab index of the first slice.
    pub first_slice: usize,
    /// Phases an additive polygon may relabel.
    #[serde(default)]
    pub source_phases: SmallVec<[PhaseId; 4]>,
}

/// A validated polygon volume localised to one process.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon2D {
    normal: Axis,
    axes: [Axis; 2],
    phase: PhaseId,
    mode: PolygonMode,
    slice_count: usize,
    vertices: Vec<[f64; 2]>,
    bbox_min: [f64; 2],
    bbox_max: [f64; 2],
    global_slice: usize,
    local_slabs: Option<Range<usize>>,
    local_start: usize,
    sources: SmallVec<[PhaseId; 4]>,
}

impl Polygon2D {
    /// Validate `spec` (the `index`-th polygon) and localise it to `grid`.
    pub fn from_spec(
        index: usize,
        spec: &PolygonSpec,
        scaling: &Scaling,
        grid: &GridPartition,
    ) -> Result<Self, ConfigError> {
        let bad = |reason: String| ConfigError::MalformedPolygon { index, reason };

        if spec.vertices.len() < 3 {
            return Err(bad(format!(
                "needs at least 3 vertices, got {}",
                spec.vertices.len()
            )));
        }
        if spec.vertices.iter().flatten().any(|c| !c.is_finite()) {
            return Err(bad("vertex coordinates must be finite".into()));
        }
        let axes = spec
            .in_plane_axes
            .unwrap_or_else(|| spec.normal_axis.complement());
        if axes[0] == axes[1] || axes.contains(&spec.normal_axis) {
            return Err(bad(format!(
                "in-plane axes {}/{} must differ from each other and from normal {}",
                axes[0], axes[1], spec.normal_axis
            )));
        }
        if spec.slice_count == 0 {
            return Err(bad("slice count must be at least 1".into()));
        }
        let slab_count = grid.global_slab_count(spec.normal_axis);
        let end = spec.first_slice.saturating_add(spec.slice_count);
        if end > slab_count {
            return Err(bad(format!(
                "slices {}..{end} extend past the {slab_count} slabs along {}",
                spec.first_slice, spec.normal_axis
            )));
        }
        match spec.mode {
            PolygonMode::Additive if spec.source_phases.is_empty() => {
                return Err(bad("additive polygon needs at least one source phase".into()));
            }
            PolygonMode::Assign if !spec.source_phases.is_empty() => {
                return Err(bad("source phases only apply to additive polygons".into()));
            }
            _ => {}
        }

        let vertices: Vec<[f64; 2]> = spec
            .vertices
            .iter()
            .map(|v| v.map(|c| scaling.length_to_internal(c)))
            .collect();
        let mut bbox_min = [f64::INFINITY; 2];
        let mut bbox_max = [f64::NEG_INFINITY; 2];
        for v in &vertices {
            for k in 0..2 {
                bbox_min[k] = bbox_min[k].min(v[k]);
                bbox_max[k] = bbox_max[k].max(v[k]);
            }
        }

        let local = grid.local_slabs(spec.normal_axis);
        let lo = spec.first_slice.max(local.start);
        let hi = end.min(local.end);
        let local_slabs = (lo < hi).then_some(lo..hi);

        Ok(Self {
            normal: spec.normal_axis,
            axes,
            phase: spec.target_phase,
            mode: spec.mode,
            slice_count: spec.slice_count,
            vertices,
            bbox_min,
            bbox_max,
            global_slice: spec.first_slice,
            local_slabs,
            local_start: local.start,
            sources: spec.source_phases.clone(),
        })
    }

    /// Axis normal to the polygon plane.
    pub fn normal(&self) -> Axis {
        self.normal
    }

    /// Axes spanning the polygon plane.
    pub fn in_plane_axes(&self) -> [Axis; 2] {
        self.axes
    }

    /// Target phase.
    pub fn phase(&self) -> PhaseId {
        self.phase
    }

    /// Combination mode.
    pub fn mode(&self) -> PolygonMode {
        self.mode
    }

    /// Number of slices in the whole volume.
    pub fn slice_count(&self) -> usize {
        self.slice_count
    }

    /// Vertices in nondimensional in-plane coordinates.
    pub fn vertices(&self) -> &[[f64; 2]] {
        &self.vertices
    }

    /// Source phases of an additive polygon.
    pub fn source_phases(&self) -> &[PhaseId] {
        &self.sources
    }

    /// Global slab index of the first slice.
    pub fn global_slice(&self) -> usize {
        self.global_slice
    }

    /// Index of the first locally owned slice relative to the local slab
    /// range, or `None` if the volume misses this sub-domain.
    pub fn local_slice(&self) -> Option<usize> {
        self.local_slabs.as_ref().map(|r| r.start - self.local_start)
    }

    /// Global slab range of the volume inside this sub-domain.
    pub fn local_slabs(&self) -> Option<Range<usize>> {
        self.local_slabs.clone()
    }

    /// Whether `phase` may be relabeled by this polygon.
    pub fn accepts(&self, phase: PhaseId) -> bool {
        match self.mode {
            PolygonMode::Assign => true,
            PolygonMode::Additive => self.sources.contains(&phase),
        }
    }

    /// Even-odd rule for a point in in-plane coordinates.
    pub fn contains_point(&self, u: f64, v: f64) -> bool {
        let ([u0, v0], [u1, v1]) = (self.bbox_min, self.bbox_max);
        if u < u0 || u > u1 || v < v0 || v > v1 {
            return false;
        }
        let mut inside = false;
        let mut j = self.vertices.len() - 1;
        for (i, &[xi, yi]) in self.vertices.iter().enumerate() {
            let [xj, yj] = self.vertices[j];
            if (yi > v) != (yj > v) && u < (xj - xi) * (v - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Whether `position` lies inside the local part of the volume.
    pub fn contains(&self, position: [f64; 3], grid: &GridPartition) -> bool {
        let Some(slabs) = &self.local_slabs else {
            return false;
        };
        let slab = grid.slab_index(self.normal, position[self.normal.index()]);
        if slab < 0 || !slabs.contains(&(slab as usize)) {
            return false;
        }
        self.contains_point(
            position[self.axes[0].index()],
            position[self.axes[1].index()],
        )
    }
}
