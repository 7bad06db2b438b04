//! Checkpoint file writer.
//!
//! [`CheckpointWriter`] frames sections onto any `Write` sink in the order
//! of a fixed record layout. The preamble is written on construction.

use std::io::Write;

use strata_core::Rank;

use crate::codec::{encode_preamble, encode_section, Preamble};
use crate::error::CheckpointError;
use crate::section::{Persist, SectionTag};

/// Writes one checkpoint file to a byte stream.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and production code
/// can use `BufWriter<File>`.
///
/// # Examples
///
/// ```
/// use std::io::{Read, Write};
/// use strata_checkpoint::{codec, CheckpointError, CheckpointReader, CheckpointWriter};
/// use strata_checkpoint::{Persist, SectionTag, PARTITION_LAYOUT};
/// use strata_core::Rank;
///
/// struct Count(u64);
///
/// impl Persist for Count {
///     const FIXED_LEN: Option<u64> = Some(8);
///     fn persist(&self, w: &mut dyn Write) -> Result<(), CheckpointError> {
///         codec::write_u64_le(w, self.0)
///     }
///     fn restore(r: &mut dyn Read) -> Result<Self, CheckpointError> {
///         Ok(Count(codec::read_u64_le(r)?))
///     }
/// }
///
/// let mut writer = CheckpointWriter::new(Vec::new(), Rank(3), PARTITION_LAYOUT).unwrap();
/// writer.write_section(SectionTag::PartitionDescriptor, &Count(42)).unwrap();
/// let bytes = writer.finish().unwrap();
///
/// let mut reader = CheckpointReader::open(bytes.as_slice(), Rank(3), PARTITION_LAYOUT).unwrap();
/// let got: Count = reader.read_section(SectionTag::PartitionDescriptor).unwrap();
/// assert_eq!(got.0, 42);
/// reader.finish().unwrap();
/// ```
pub struct CheckpointWriter<W: Write> {
    writer: W,
    layout: &'static [SectionTag],
    next: usize,
    scratch: Vec<u8>,
}

impl<W: Write> CheckpointWriter<W> {
    /// Create a writer for `layout`, immediately writing the preamble.
    pub fn new(
        mut writer: W,
        rank: Rank,
        layout: &'static [SectionTag],
    ) -> Result<Self, CheckpointError> {
        let sections = u32::try_from(layout.len()).map_err(|_| CheckpointError::Layout {
            detail: format!("{} sections exceed the format limit", layout.len()),
        })?;
        encode_preamble(
            &mut writer,
            Preamble {
                rank: rank.0,
                sections,
            },
        )?;
        Ok(Self {
            writer,
            layout,
            next: 0,
            scratch: Vec::new(),
        })
    }

    /// Append the next section. `tag` must be the section the layout
    /// expects at this position.
    pub fn write_section<T: Persist>(
        &mut self,
        tag: SectionTag,
        value: &T,
    ) -> Result<(), CheckpointError> {
        match self.layout.get(self.next) {
            Some(&expected) if expected == tag => {}
            Some(&expected) => {
                return Err(CheckpointError::Layout {
                    detail: format!("{tag} section written where {expected} belongs"),
                })
            }
            None => {
                return Err(CheckpointError::Layout {
                    detail: format!("{tag} section written after the last section"),
                })
            }
        }

        self.scratch.clear();
        value.persist(&mut self.scratch)?;
        if let Some(want) = T::FIXED_LEN {
            let found = self.scratch.len() as u64;
            if found != want {
                return Err(CheckpointError::SectionSize {
                    tag,
                    expected: want,
                    found,
                });
            }
        }
        encode_section(&mut self.writer, tag, &self.scratch)?;
        self.next += 1;
        Ok(())
    }

    /// Number of sections written so far.
    pub fn sections_written(&self) -> usize {
        self.next
    }

    /// Check every section was written, flush, and return the sink.
    pub fn finish(mut self) -> Result<W, CheckpointError> {
        if let Some(missing) = self.layout.get(self.next) {
            return Err(CheckpointError::Layout {
                detail: format!("{missing} section never written"),
            });
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}
