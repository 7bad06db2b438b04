//! Simulation lifecycle for Strata runs.
//!
//! Creates, cross-links and tears down the per-process subsystems of a
//! particle-in-cell run, drives the time loop through an external
//! [`TimeStepSolver`], and writes and restores crash-safe checkpoints.
//!
//! # Architecture
//!
//! - [`RunConfig`]: the JSON run description and its validation
//! - [`SimulationContext`]: owns one value of every subsystem
//! - [`Linker`]: wires the fixed cross-reference graph
//! - [`CheckpointManager`]: collective write, publish and restore
//! - [`LifecycleOrchestrator`]: the run state machine

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod advection;
pub mod boundary;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod linker;
pub mod materials;
pub mod output;
pub mod residual;
pub mod solver;
pub mod surface;
pub mod time;

pub use advection::AdvectionContext;
pub use boundary::BoundaryConditions;
pub use checkpoint::{CheckpointHeader, CheckpointManager, CheckpointRecord, HEADER_LEN};
pub use config::{RunConfig, RunMode};
pub use context::{ContextParts, SimulationContext, Subsystem, TEARDOWN_ORDER};
pub use error::{EngineError, ErrorKind, LifecycleStep, RunError, SolverError};
pub use lifecycle::{LifecycleOrchestrator, LifecycleState, RunReport};
pub use linker::{link_table, Linker, LINKS};
pub use materials::{Material, MaterialDatabase, MAX_PHASES};
pub use output::{GridOutput, MarkerOutput, OutputState, PhaseOutput, SurfaceOutput};
pub use residual::ResidualContext;
pub use solver::{NullSolver, TimeStepSolver};
pub use surface::FreeSurface;
pub use time::TimeStepping;
