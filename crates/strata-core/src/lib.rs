//! Core types and traits for the Strata simulation framework.
//!
//! This is the leaf crate of the workspace. It defines the vocabulary every
//! other crate shares: identifiers, axes, markers, physical scaling, the
//! non-owning [`Link`] handle used between subsystems, the error taxonomy,
//! and the [`Communicator`] contract of the distributed-execution layer.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod axis;
pub mod comm;
pub mod error;
pub mod id;
pub mod link;
pub mod marker;
pub mod scaling;

pub use axis::Axis;
pub use comm::{Communicator, SingleProcess, ThreadGroup};
pub use error::{ConfigError, LinkError};
pub use id::{ContextId, PhaseId, Rank, SubsystemId};
pub use link::{Link, LinkTarget};
pub use marker::Marker;
pub use scaling::{Scaling, ScalingSpec, UnitSystem};
