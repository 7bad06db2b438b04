//! Section tags and the [`Persist`] trait.

use std::fmt;
use std::io::{Read, Write};

use crate::error::CheckpointError;

/// Identifies the payload of one section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionTag {
    /// Aggregate scalars: scaling, time stepping, material database.
    Header,
    /// Process-local grid partition.
    GridPartition,
    /// Free-surface topography.
    FreeSurface,
    /// Residual / solution vectors.
    ResidualContext,
    /// Markers.
    AdvectionContext,
    /// Global processor partitioning (save-grid mode).
    PartitionDescriptor,
}

impl SectionTag {
    /// Stable on-disk tag.
    pub fn code(self) -> u8 {
        match self {
            Self::Header => 1,
            Self::GridPartition => 2,
            Self::FreeSurface => 3,
            Self::ResidualContext => 4,
            Self::AdvectionContext => 5,
            Self::PartitionDescriptor => 6,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Header),
            2 => Some(Self::GridPartition),
            3 => Some(Self::FreeSurface),
            4 => Some(Self::ResidualContext),
            5 => Some(Self::AdvectionContext),
            6 => Some(Self::PartitionDescriptor),
            _ => None,
        }
    }
}

impl fmt::Display for SectionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Header => "header",
            Self::GridPartition => "grid partition",
            Self::FreeSurface => "free surface",
            Self::ResidualContext => "residual context",
            Self::AdvectionContext => "advection context",
            Self::PartitionDescriptor => "partition descriptor",
        })
    }
}

/// A value that can be stored as the payload of one section.
///
/// `persist` writes the raw payload; framing, length and checksum are
/// added by the [`CheckpointWriter`](crate::CheckpointWriter). `restore`
/// reads from a reader bounded to exactly the payload bytes.
pub trait Persist: Sized {
    /// Exact payload length for fixed-size sections, checked on both
    /// write and read.
    const FIXED_LEN: Option<u64> = None;

    /// Encode the payload.
    fn persist(&self, w: &mut dyn Write) -> Result<(), CheckpointError>;

    /// Decode the payload.
    fn restore(r: &mut dyn Read) -> Result<Self, CheckpointError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for tag in [
            SectionTag::Header,
            SectionTag::GridPartition,
            SectionTag::FreeSurface,
            SectionTag::ResidualContext,
            SectionTag::AdvectionContext,
            SectionTag::PartitionDescriptor,
        ] {
            assert_eq!(SectionTag::from_code(tag.code()), Some(tag));
        }
        assert_eq!(SectionTag::from_code(0), None);
    }
}
