//! Binary encode/decode for the checkpoint format.
//!
//! All integers are little-endian. Variable-length arrays are prefixed with
//! a `u64` element count. Sections carry their payload length and a CRC32
//! of the payload, so corruption and truncation are detected before any
//! payload byte is decoded.

use std::io::{self, Read, Write};

use crate::error::CheckpointError;
use crate::section::SectionTag;
use crate::{FORMAT_VERSION, MAGIC};

/// Upper bound on the up-front allocation for a length-prefixed array.
const MAX_PREALLOC: usize = 1 << 20;

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), CheckpointError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), CheckpointError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian u64.
pub fn write_u64_le(w: &mut dyn Write, v: u64) -> Result<(), CheckpointError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian f64.
pub fn write_f64_le(w: &mut dyn Write, v: f64) -> Result<(), CheckpointError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a count-prefixed f64 array.
pub fn write_f64_slice(w: &mut dyn Write, values: &[f64]) -> Result<(), CheckpointError> {
    write_u64_le(w, values.len() as u64)?;
    for &v in values {
        write_f64_le(w, v)?;
    }
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

fn fill(r: &mut dyn Read, buf: &mut [u8], what: &str) -> Result<(), CheckpointError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            CheckpointError::Truncated {
                detail: format!("stream ended inside {what}"),
            }
        } else {
            CheckpointError::Io(e)
        }
    })
}

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, CheckpointError> {
    let mut buf = [0u8; 1];
    fill(r, &mut buf, "u8")?;
    Ok(buf[0])
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, CheckpointError> {
    let mut buf = [0u8; 4];
    fill(r, &mut buf, "u32")?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian u64.
pub fn read_u64_le(r: &mut dyn Read) -> Result<u64, CheckpointError> {
    let mut buf = [0u8; 8];
    fill(r, &mut buf, "u64")?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a little-endian f64.
pub fn read_f64_le(r: &mut dyn Read) -> Result<f64, CheckpointError> {
    let mut buf = [0u8; 8];
    fill(r, &mut buf, "f64")?;
    Ok(f64::from_le_bytes(buf))
}

/// Read a count-prefixed f64 array.
pub fn read_f64_vec(r: &mut dyn Read) -> Result<Vec<f64>, CheckpointError> {
    let count = read_u64_le(r)?;
    let count = usize::try_from(count).map_err(|_| CheckpointError::Truncated {
        detail: format!("array length {count} exceeds address space"),
    })?;
    let mut out = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        out.push(read_f64_le(r)?);
    }
    Ok(out)
}

// ── Preamble ────────────────────────────────────────────────────

/// Fixed-length preamble at the start of every checkpoint file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preamble {
    /// Rank of the writing process.
    pub rank: u32,
    /// Number of sections that follow.
    pub sections: u32,
}

/// Encode magic, version, rank and section count.
pub fn encode_preamble(w: &mut dyn Write, preamble: Preamble) -> Result<(), CheckpointError> {
    w.write_all(&MAGIC)?;
    write_u8(w, FORMAT_VERSION)?;
    write_u32_le(w, preamble.rank)?;
    write_u32_le(w, preamble.sections)?;
    Ok(())
}

/// Decode and validate the preamble.
pub fn decode_preamble(r: &mut dyn Read) -> Result<Preamble, CheckpointError> {
    let mut magic = [0u8; 4];
    fill(r, &mut magic, "magic")?;
    if magic != MAGIC {
        return Err(CheckpointError::InvalidMagic);
    }
    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(CheckpointError::UnsupportedVersion { found: version });
    }
    Ok(Preamble {
        rank: read_u32_le(r)?,
        sections: read_u32_le(r)?,
    })
}

// ── Sections ────────────────────────────────────────────────────

/// Frame one section: tag, payload length, payload, CRC32.
pub fn encode_section(
    w: &mut dyn Write,
    tag: SectionTag,
    payload: &[u8],
) -> Result<(), CheckpointError> {
    write_u8(w, tag.code())?;
    write_u64_le(w, payload.len() as u64)?;
    w.write_all(payload)?;
    write_u32_le(w, crc32fast::hash(payload))?;
    Ok(())
}

/// Read one section, requiring it to carry `expected`'s tag.
///
/// When `fixed_len` is set, the recorded length must match it before the
/// payload is read. The checksum is verified before the payload is
/// returned.
pub fn decode_section(
    r: &mut dyn Read,
    expected: SectionTag,
    fixed_len: Option<u64>,
) -> Result<Vec<u8>, CheckpointError> {
    let mut tag = [0u8; 1];
    fill(r, &mut tag, &format!("{expected} section tag"))?;
    if tag[0] != expected.code() {
        return Err(CheckpointError::UnexpectedSection {
            expected,
            found: tag[0],
        });
    }

    let mut len = [0u8; 8];
    fill(r, &mut len, &format!("{expected} section length"))?;
    let len = u64::from_le_bytes(len);
    if let Some(want) = fixed_len {
        if want != len {
            return Err(CheckpointError::SectionSize {
                tag: expected,
                expected: want,
                found: len,
            });
        }
    }

    // Bounded read: a corrupt length cannot trigger a huge allocation.
    let mut payload = Vec::new();
    r.take(len).read_to_end(&mut payload)?;
    if payload.len() as u64 != len {
        return Err(CheckpointError::Truncated {
            detail: format!(
                "{expected} section declares {len} bytes, {} present",
                payload.len()
            ),
        });
    }

    let mut crc = [0u8; 4];
    fill(r, &mut crc, &format!("{expected} section checksum"))?;
    let stored = u32::from_le_bytes(crc);
    let computed = crc32fast::hash(&payload);
    if stored != computed {
        return Err(CheckpointError::Checksum {
            tag: expected,
            stored,
            computed,
        });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn roundtrip_f64_bits(bits in any::<u64>()) {
            let v = f64::from_bits(bits);
            let mut buf = Vec::new();
            write_f64_le(&mut buf, v).unwrap();
            let got = read_f64_le(&mut buf.as_slice()).unwrap();
            prop_assert_eq!(got.to_bits(), bits);
        }

        #[test]
        fn roundtrip_f64_slice(values in prop::collection::vec(any::<f64>(), 0..64)) {
            let mut buf = Vec::new();
            write_f64_slice(&mut buf, &values).unwrap();
            let got = read_f64_vec(&mut buf.as_slice()).unwrap();
            let want: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
            let got: Vec<u64> = got.iter().map(|v| v.to_bits()).collect();
            prop_assert_eq!(got, want);
        }

        #[test]
        fn every_truncation_is_detected(payload in prop::collection::vec(any::<u8>(), 0..48)) {
            let mut buf = Vec::new();
            encode_section(&mut buf, SectionTag::FreeSurface, &payload).unwrap();
            for cut in 0..buf.len() {
                let result = decode_section(&mut &buf[..cut], SectionTag::FreeSurface, None);
                prop_assert!(
                    matches!(result, Err(CheckpointError::Truncated { .. })),
                    "cut at {} gave {:?}", cut, result
                );
            }
        }
    }

    #[test]
    fn preamble_roundtrip() {
        let p = Preamble {
            rank: 7,
            sections: 5,
        };
        let mut buf = Vec::new();
        encode_preamble(&mut buf, p).unwrap();
        assert_eq!(&buf[..4], b"STRA");
        assert_eq!(decode_preamble(&mut buf.as_slice()).unwrap(), p);
    }

    #[test]
    fn bad_magic_rejected() {
        let buf = b"NOPE\x01\0\0\0\0\0\0\0\0";
        match decode_preamble(&mut buf.as_slice()) {
            Err(CheckpointError::InvalidMagic) => {}
            other => panic!("expected InvalidMagic, got {other:?}"),
        }
    }

    #[test]
    fn bad_version_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(99);
        buf.extend_from_slice(&[0; 8]);
        match decode_preamble(&mut buf.as_slice()) {
            Err(CheckpointError::UnsupportedVersion { found: 99 }) => {}
            other => panic!("expected UnsupportedVersion, got {other:?}"),
        }
    }

    #[test]
    fn flipped_payload_bit_fails_checksum() {
        let mut buf = Vec::new();
        encode_section(&mut buf, SectionTag::Header, &[1, 2, 3, 4]).unwrap();
        buf[9] ^= 0x10;
        match decode_section(&mut buf.as_slice(), SectionTag::Header, None) {
            Err(CheckpointError::Checksum {
                tag: SectionTag::Header,
                ..
            }) => {}
            other => panic!("expected Checksum, got {other:?}"),
        }
    }

    #[test]
    fn wrong_tag_rejected() {
        let mut buf = Vec::new();
        encode_section(&mut buf, SectionTag::Header, &[]).unwrap();
        match decode_section(&mut buf.as_slice(), SectionTag::GridPartition, None) {
            Err(CheckpointError::UnexpectedSection { found: 1, .. }) => {}
            other => panic!("expected UnexpectedSection, got {other:?}"),
        }
    }

    #[test]
    fn fixed_length_enforced() {
        let mut buf = Vec::new();
        encode_section(&mut buf, SectionTag::Header, &[0; 12]).unwrap();
        match decode_section(&mut buf.as_slice(), SectionTag::Header, Some(16)) {
            Err(CheckpointError::SectionSize {
                expected: 16,
                found: 12,
                ..
            }) => {}
            other => panic!("expected SectionSize, got {other:?}"),
        }
    }
}
