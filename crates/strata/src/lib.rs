//! Strata: the run lifecycle of a particle-in-cell geodynamics code.
//!
//! This is the top-level facade crate that re-exports the public API from
//! every Strata sub-crate. For most users, adding `strata` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use strata::prelude::*;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut config = RunConfig::from_json(r#"{
//!     "time": {"dt": 0.5, "time_end": 1.0},
//!     "materials": [{"density": 3300, "viscosity": 1e21}],
//!     "grid": {"domain_min": [0,0,0], "domain_max": [1,1,1], "cells": [2,2,2]},
//!     "checkpoint": {"on_finish": true}
//! }"#).unwrap();
//! config.run_dir = dir.path().to_path_buf();
//!
//! let mut run = LifecycleOrchestrator::new(config, &SingleProcess, NullSolver);
//! let report = run.run(RunMode::Normal).unwrap();
//! assert_eq!(report.steps_run, 2);
//! assert_eq!(report.final_state, LifecycleState::Destroyed);
//! assert!(dir.path().join("restart").join("rdb.00000000.dat").is_file());
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `strata-core` | IDs, links, markers, scaling, communicators, errors |
//! | [`checkpoint`] | `strata-checkpoint` | Section framing and the restart directory store |
//! | [`grid`] | `strata-grid` | Grid specification and per-rank partitions |
//! | [`markers`] | `strata-markers` | Marker lattices and phase initialisation |
//! | [`engine`] | `strata-engine` | Subsystems, linking, checkpoint manager, run lifecycle |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types shared by every crate (`strata-core`).
///
/// Identifiers, [`types::Link`] cross-references, [`types::Marker`],
/// nondimensional [`types::Scaling`] and the [`types::Communicator`]
/// abstraction over process groups.
pub use strata_core as types;

/// Checkpoint file format and restart directories (`strata-checkpoint`).
pub use strata_checkpoint as checkpoint;

/// Grid specification and domain decomposition (`strata-grid`).
pub use strata_grid as grid;

/// Marker generation and phase assignment (`strata-markers`).
///
/// [`markers::MarkerPhaseInitializer`] applies layered and polygonal volumes
/// to a freshly generated [`markers::MarkerLattice`].
pub use strata_markers as markers;

/// Run lifecycle (`strata-engine`).
///
/// [`engine::LifecycleOrchestrator`] drives a run through create or
/// restore, linking, solving and teardown.
pub use strata_engine as engine;

/// Common imports for typical Strata usage.
///
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use strata_core::{
        Axis, Communicator, Marker, PhaseId, Rank, ScalingSpec, SingleProcess, ThreadGroup,
        UnitSystem,
    };

    // Errors
    pub use strata_checkpoint::CheckpointError;
    pub use strata_core::{ConfigError, LinkError};
    pub use strata_engine::{EngineError, ErrorKind, RunError, SolverError};

    // Configuration
    pub use strata_grid::GridSpec;
    pub use strata_markers::{LayerSpec, MarkerSetup, PolygonMode, PolygonSpec};

    // Engine
    pub use strata_engine::{
        CheckpointManager, LifecycleOrchestrator, LifecycleState, Linker, NullSolver, RunConfig,
        RunMode, RunReport, SimulationContext, TimeStepSolver,
    };
}
