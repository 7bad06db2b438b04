//! Error types for checkpoint I/O.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::section::SectionTag;

/// Errors raised while writing, publishing, locating or reading a checkpoint.
///
/// Every variant belongs to the I/O class of the run's error taxonomy:
/// the database on disk is unusable or could not be produced.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// A filesystem operation on a known path failed.
    #[error("cannot {op} {}: {source}", .path.display())]
    Fs {
        /// Operation that failed (`"create"`, `"rename"`, ...).
        op: &'static str,
        /// Path the operation was applied to.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A read or write on an open stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file does not start with the expected `b"STRA"` magic bytes.
    #[error("invalid magic bytes (expected b\"STRA\")")]
    InvalidMagic,

    /// The format version is not supported by this build.
    #[error("unsupported format version {found}")]
    UnsupportedVersion {
        /// The version found in the file.
        found: u8,
    },

    /// The file was written by another rank.
    #[error("checkpoint belongs to rank {found}, expected rank {expected}")]
    RankMismatch {
        /// Rank of the reading process.
        expected: u32,
        /// Rank recorded in the file.
        found: u32,
    },

    /// A section tag does not match the record layout.
    #[error("expected section {expected}, found tag {found}")]
    UnexpectedSection {
        /// Section the layout requires at this position.
        expected: SectionTag,
        /// Raw tag found in the file.
        found: u8,
    },

    /// A fixed-size section has the wrong length.
    #[error("{tag} size mismatch: expected {expected} bytes, found {found}")]
    SectionSize {
        /// Section with the mismatch.
        tag: SectionTag,
        /// Length this build expects.
        expected: u64,
        /// Length recorded in the file.
        found: u64,
    },

    /// A section payload does not match its stored checksum.
    #[error("{tag} checksum mismatch: stored={stored:#010x}, computed={computed:#010x}")]
    Checksum {
        /// Corrupt section.
        tag: SectionTag,
        /// CRC32 recorded in the file.
        stored: u32,
        /// CRC32 of the payload as read.
        computed: u32,
    },

    /// The stream ended before the structure was complete.
    #[error("truncated checkpoint: {detail}")]
    Truncated {
        /// What was being read.
        detail: String,
    },

    /// A section payload could not be decoded.
    #[error("malformed {tag} section: {detail}")]
    Malformed {
        /// Section being decoded.
        tag: SectionTag,
        /// What went wrong.
        detail: String,
    },

    /// Another process failed a collective checkpoint step.
    #[error("checkpoint aborted: a process failed during {stage}")]
    CollectiveAbort {
        /// Step that did not succeed on every process.
        stage: &'static str,
    },

    /// Sections were written or read out of layout order.
    #[error("checkpoint layout violated: {detail}")]
    Layout {
        /// What went wrong.
        detail: String,
    },
}

impl CheckpointError {
    /// Build a `map_err` adapter for a failed filesystem operation.
    pub fn fs(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Fs { op, path, source }
    }
}
