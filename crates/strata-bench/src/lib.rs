//! Benchmark profiles for Strata.
//!
//! - [`reference_config`]: 32x32x16 cells, 8 markers per cell, a layered
//!   background and [`reference_polygons`]
//! - [`reference_polygons`]: a staircase of assign and additive volumes

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use smallvec::smallvec;
use strata_core::{Axis, PhaseId, ScalingSpec};
use strata_engine::config::{
    BoundarySpec, CheckpointSpec, FreeSurfaceSpec, MaterialSpec, OutputSpec, TimeSpec,
};
use strata_engine::RunConfig;
use strata_grid::GridSpec;
use strata_markers::{LayerSpec, MarkerSetup, PolygonMode, PolygonSpec};

/// Number of phases in the reference profile.
pub const PHASES: u32 = 4;

/// Build the reference run configuration rooted at `run_dir`.
///
/// 16K cells and ~131K markers on a single process, dt=0.1 up to t=1.
pub fn reference_config(run_dir: &Path) -> RunConfig {
    RunConfig {
        mode: "normal".into(),
        run_dir: run_dir.to_path_buf(),
        scaling: ScalingSpec::default(),
        time: TimeSpec {
            dt: 0.1,
            time_end: 1.0,
            max_steps: u64::MAX,
        },
        materials: (0..PHASES)
            .map(|i| MaterialSpec {
                density: 2700.0 + 200.0 * f64::from(i),
                viscosity: 10f64.powi(i as i32),
            })
            .collect(),
        grid: GridSpec {
            domain_min: [0.0; 3],
            domain_max: [2.0, 2.0, 1.0],
            cells: [32, 32, 16],
            procs: None,
            markers_per_cell: [2, 2, 2],
        },
        free_surface: FreeSurfaceSpec {
            enabled: true,
            level: 0.9,
        },
        boundary: BoundarySpec {
            strain_rate: [1.0, -0.5],
            ramp_time: 0.5,
        },
        markers: MarkerSetup {
            background_phase: PhaseId(0),
            layers: vec![LayerSpec {
                axis: Axis::Z,
                bottom: 0.0,
                top: 0.3,
                phase: PhaseId(1),
            }],
            polygons: reference_polygons(),
            seed: 7,
            jitter: 0.5,
        },
        output: OutputSpec::default(),
        checkpoint: CheckpointSpec::default(),
    }
}

/// Eight polygon volumes across the reference grid: alternating assign
/// boxes and additive triangles normal to y, then one octagon normal
/// to z that only relabels the lower layer.
pub fn reference_polygons() -> Vec<PolygonSpec> {
    let mut polygons: Vec<PolygonSpec> = (0..7)
        .map(|i| {
            let x0 = 0.2 * i as f64;
            let (mode, vertices, sources) = if i % 2 == 0 {
                (
                    PolygonMode::Assign,
                    vec![[x0, 0.1], [x0 + 0.4, 0.1], [x0 + 0.4, 0.6], [x0, 0.6]],
                    smallvec![],
                )
            } else {
                (
                    PolygonMode::Additive,
                    vec![[x0, 0.0], [x0 + 0.5, 0.0], [x0 + 0.25, 0.8]],
                    smallvec![PhaseId(0), PhaseId(2)],
                )
            };
            PolygonSpec {
                normal_axis: Axis::Y,
                in_plane_axes: Some([Axis::X, Axis::Z]),
                target_phase: PhaseId(2 + (i % 2) as u32),
                mode,
                slice_count: 4,
                vertices,
                first_slice: 4 * i,
                source_phases: sources,
            }
        })
        .collect();

    let octagon = (0..8)
        .map(|k| {
            let a = std::f64::consts::FRAC_PI_4 * k as f64;
            [1.0 + 0.6 * a.cos(), 1.0 + 0.6 * a.sin()]
        })
        .collect();
    polygons.push(PolygonSpec {
        normal_axis: Axis::Z,
        in_plane_axes: None,
        target_phase: PhaseId(3),
        mode: PolygonMode::Additive,
        slice_count: 3,
        vertices: octagon,
        first_slice: 1,
        source_phases: smallvec![PhaseId(1)],
    });
    polygons
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_config_is_valid() {
        let cfg = reference_config(Path::new("."));
        cfg.validate(1).unwrap();
        assert_eq!(cfg.markers.polygons.len(), 8);
    }
}
