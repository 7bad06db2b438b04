//! Crash-safe checkpoint/restart files for Strata simulations.
//!
//! Every process writes one file describing its share of the simulation
//! state. Files are first written into a staging directory and become
//! visible only when the whole directory is renamed onto the canonical
//! path, so a reader never observes a half-written database.
//!
//! # Architecture
//!
//! - [`CheckpointWriter`] frames sections onto any `Write` sink
//! - [`CheckpointReader`] validates and decodes them from any `Read` source
//! - [`CheckpointStore`] owns the on-disk layout and the atomic publish
//! - [`Persist`] is implemented by every type stored in a section
//!
//! # Format
//!
//! ```text
//! [MAGIC "STRA"] [VERSION u8] [rank u32] [section count u32]
//! [tag u8] [length u64] [payload] [crc32 u32]   (repeated per section)
//! ```
//!
//! All integers are little-endian. Sections appear in the order of the
//! record layout the file was written with (see [`CHECKPOINT_LAYOUT`]).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod reader;
pub mod section;
pub mod store;
pub mod writer;

pub use error::CheckpointError;
pub use reader::CheckpointReader;
pub use section::{Persist, SectionTag};
pub use store::CheckpointStore;
pub use writer::CheckpointWriter;

/// Magic bytes at the start of every checkpoint file.
pub const MAGIC: [u8; 4] = *b"STRA";

/// Current binary format version.
///
/// History:
/// - v1: tagged, length-prefixed, CRC32-protected sections
pub const FORMAT_VERSION: u8 = 1;

/// Section order of a per-process restart file.
pub const CHECKPOINT_LAYOUT: &[SectionTag] = &[
    SectionTag::Header,
    SectionTag::GridPartition,
    SectionTag::FreeSurface,
    SectionTag::ResidualContext,
    SectionTag::AdvectionContext,
];

/// Section order of a saved processor partitioning file.
pub const PARTITION_LAYOUT: &[SectionTag] = &[SectionTag::PartitionDescriptor];
