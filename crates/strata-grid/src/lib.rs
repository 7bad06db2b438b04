//! Grid geometry and domain decomposition for Strata simulations.
//!
//! A [`GridSpec`] describes the global box, its cell counts and the marker
//! density; a [`GridPartition`] is one process's block of that box. The
//! partition also defines the *marker slabs* used by polygon volumes: along
//! each axis a cell holds `markers_per_cell` slabs, and every global slab
//! is owned by exactly one process coordinate.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod descriptor;
pub mod partition;
pub mod spec;

pub use descriptor::PartitionDescriptor;
pub use partition::GridPartition;
pub use spec::GridSpec;
