//! Test fixtures for Strata development.
//!
//! Provides a [`TestRunBuilder`] for small run configurations, scripted
//! solvers in [`fixtures`], and [`run_ranks`] for driving a thread-group
//! of ranks.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::path::Path;
use std::thread;

use smallvec::smallvec;
use strata_core::{Axis, PhaseId, ScalingSpec, ThreadGroup};
use strata_engine::config::{
    BoundarySpec, CheckpointSpec, FreeSurfaceSpec, MaterialSpec, OutputSpec, TimeSpec,
};
use strata_engine::RunConfig;
use strata_grid::GridSpec;
use strata_markers::{LayerSpec, MarkerSetup, PolygonMode, PolygonSpec};

pub use fixtures::{DriftSolver, FailingSolver};

/// Builder for small, valid run configurations.
///
/// Defaults: unit cube split into 4x4x4 cells with 2 markers per cell per
/// axis, `dt = 0.25` up to `time_end = 1.0`, two phases, a lower layer of
/// phase 1, no checkpoints.
pub struct TestRunBuilder {
    config: RunConfig,
}

impl TestRunBuilder {
    pub fn new(run_dir: &Path) -> Self {
        Self {
            config: RunConfig {
                mode: "normal".into(),
                run_dir: run_dir.to_path_buf(),
                scaling: ScalingSpec::default(),
                time: TimeSpec {
                    dt: 0.25,
                    time_end: 1.0,
                    max_steps: u64::MAX,
                },
                materials: vec![
                    MaterialSpec {
                        density: 3300.0,
                        viscosity: 1.0,
                    },
                    MaterialSpec {
                        density: 2700.0,
                        viscosity: 10.0,
                    },
                ],
                grid: GridSpec {
                    domain_min: [0.0; 3],
                    domain_max: [1.0; 3],
                    cells: [4, 4, 4],
                    procs: None,
                    markers_per_cell: [2, 2, 2],
                },
                free_surface: FreeSurfaceSpec {
                    enabled: true,
                    level: 1.0,
                },
                boundary: BoundarySpec {
                    strain_rate: [1.0, 0.0],
                    ramp_time: 0.0,
                },
                markers: MarkerSetup {
                    background_phase: PhaseId(0),
                    layers: vec![LayerSpec {
                        axis: Axis::Z,
                        bottom: 0.0,
                        top: 0.5,
                        phase: PhaseId(1),
                    }],
                    polygons: Vec::new(),
                    seed: 42,
                    jitter: 0.5,
                },
                output: OutputSpec::default(),
                checkpoint: CheckpointSpec::default(),
            },
        }
    }

    pub fn mode(mut self, mode: &str) -> Self {
        self.config.mode = mode.into();
        self
    }

    pub fn time(mut self, dt: f64, time_end: f64) -> Self {
        self.config.time.dt = dt;
        self.config.time.time_end = time_end;
        self
    }

    pub fn cells(mut self, cells: [usize; 3]) -> Self {
        self.config.grid.cells = cells;
        self
    }

    pub fn procs(mut self, procs: [usize; 3]) -> Self {
        self.config.grid.procs = Some(procs);
        self
    }

    pub fn checkpoint_every(mut self, steps: u64) -> Self {
        self.config.checkpoint.every_steps = steps;
        self
    }

    pub fn checkpoint_on_finish(mut self) -> Self {
        self.config.checkpoint.on_finish = true;
        self
    }

    pub fn phases(mut self, count: usize) -> Self {
        self.config.materials = (0..count)
            .map(|i| MaterialSpec {
                density: 3000.0 + i as f64,
                viscosity: 1.0,
            })
            .collect();
        self
    }

    /// Append an assign-mode box of `target` spanning `slices` slabs along
    /// z from `first_slice`, over `[x0, x1) x [y0, y1)`.
    pub fn box_volume(
        mut self,
        [x0, y0, x1, y1]: [f64; 4],
        first_slice: usize,
        slices: usize,
        target: u32,
    ) -> Self {
        self.config.markers.polygons.push(PolygonSpec {
            normal_axis: Axis::Z,
            in_plane_axes: Some([Axis::X, Axis::Y]),
            target_phase: PhaseId(target),
            mode: PolygonMode::Assign,
            slice_count: slices,
            vertices: vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
            first_slice,
            source_phases: smallvec![],
        });
        self
    }

    /// Mutate the configuration directly.
    pub fn with(mut self, f: impl FnOnce(&mut RunConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> RunConfig {
        self.config
    }
}

/// Run `f` once per rank of a `size`-rank thread group and collect the
/// results in rank order.
pub fn run_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadGroup) -> T + Sync,
{
    let f = &f;
    thread::scope(|s| {
        let handles: Vec<_> = ThreadGroup::group(size)
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}
