//! Checkpoint file reader.
//!
//! [`CheckpointReader`] validates the preamble on construction and then
//! hands out sections strictly in layout order.

use std::io::Read;

use strata_core::Rank;

use crate::codec::{decode_preamble, decode_section};
use crate::error::CheckpointError;
use crate::section::{Persist, SectionTag};

/// Reads one checkpoint file from a byte stream.
pub struct CheckpointReader<R: Read> {
    reader: R,
    layout: &'static [SectionTag],
    next: usize,
}

impl<R: Read> CheckpointReader<R> {
    /// Open a checkpoint stream written by `rank` with `layout`.
    ///
    /// Fails on bad magic, unknown version, a file written by another rank,
    /// or a section count that does not match the layout.
    pub fn open(
        mut reader: R,
        rank: Rank,
        layout: &'static [SectionTag],
    ) -> Result<Self, CheckpointError> {
        let preamble = decode_preamble(&mut reader)?;
        if preamble.rank != rank.0 {
            return Err(CheckpointError::RankMismatch {
                expected: rank.0,
                found: preamble.rank,
            });
        }
        if preamble.sections as usize != layout.len() {
            return Err(CheckpointError::Layout {
                detail: format!(
                    "file holds {} sections, expected {}",
                    preamble.sections,
                    layout.len()
                ),
            });
        }
        Ok(Self {
            reader,
            layout,
            next: 0,
        })
    }

    /// Read and decode the next section, which must be `tag`.
    ///
    /// The payload must be consumed exactly; leftover or missing bytes
    /// make the section malformed.
    pub fn read_section<T: Persist>(&mut self, tag: SectionTag) -> Result<T, CheckpointError> {
        match self.layout.get(self.next) {
            Some(&expected) if expected == tag => {}
            Some(&expected) => {
                return Err(CheckpointError::Layout {
                    detail: format!("{tag} section read where {expected} belongs"),
                })
            }
            None => {
                return Err(CheckpointError::Layout {
                    detail: format!("{tag} section read after the last section"),
                })
            }
        }

        let payload = decode_section(&mut self.reader, tag, T::FIXED_LEN)?;
        let mut rest = payload.as_slice();
        let value = T::restore(&mut rest).map_err(|e| match e {
            CheckpointError::Truncated { detail } => CheckpointError::Malformed { tag, detail },
            other => other,
        })?;
        if !rest.is_empty() {
            return Err(CheckpointError::Malformed {
                tag,
                detail: format!("{} trailing bytes", rest.len()),
            });
        }
        self.next += 1;
        Ok(value)
    }

    /// Number of sections read so far.
    pub fn sections_read(&self) -> usize {
        self.next
    }

    /// Check every section was read and nothing follows the last one.
    pub fn finish(mut self) -> Result<(), CheckpointError> {
        if let Some(missing) = self.layout.get(self.next) {
            return Err(CheckpointError::Layout {
                detail: format!("{missing} section never read"),
            });
        }
        let mut probe = [0u8; 1];
        if self.reader.read(&mut probe)? != 0 {
            return Err(CheckpointError::Layout {
                detail: "trailing data after the last section".into(),
            });
        }
        Ok(())
    }
}
