//! Marker generation and polygon-volume phase initialisation.
//!
//! A run starts by filling the local sub-domain with markers
//! ([`MarkerLattice`]), giving them a background phase and optional
//! horizontal layers, and then applying an ordered list of extruded
//! polygon volumes ([`MarkerPhaseInitializer`]). [`MarkerSetup`] bundles
//! the three steps as configured.
//!
//! Phase validity is not checked during initialisation; the engine runs
//! [`check_marker_phases`] before every solve step and checkpoint.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod initializer;
pub mod lattice;
pub mod polygon;
pub mod setup;
pub mod validate;

pub use initializer::{MarkerPhaseInitializer, PhaseInitReport};
pub use lattice::MarkerLattice;
pub use polygon::{Polygon2D, PolygonMode, PolygonSpec};
pub use setup::{LayerSpec, MarkerSetup};
pub use validate::check_marker_phases;
