//! End-to-end checks of staged writing, publishing and reading back a
//! multi-rank database through the filesystem.

use std::fs;
use std::io::{Read, Write};

use strata_checkpoint::{
    codec, CheckpointError, CheckpointReader, CheckpointStore, CheckpointWriter, Persist,
    SectionTag, CHECKPOINT_LAYOUT,
};
use strata_core::Rank;

#[derive(Debug, PartialEq)]
struct Values(Vec<f64>);

impl Persist for Values {
    fn persist(&self, w: &mut dyn Write) -> Result<(), CheckpointError> {
        codec::write_f64_slice(w, &self.0)
    }
    fn restore(r: &mut dyn Read) -> Result<Self, CheckpointError> {
        Ok(Values(codec::read_f64_vec(r)?))
    }
}

fn payload(rank: Rank, tag: SectionTag) -> Values {
    Values(vec![rank.0 as f64, f64::from(tag.code()), -0.0, f64::MIN_POSITIVE])
}

fn write_database(store: &CheckpointStore, ranks: u32) {
    store.prepare_staging().unwrap();
    for r in 0..ranks {
        let rank = Rank(r);
        store
            .write_staged(rank, |file| {
                let mut w = CheckpointWriter::new(file, rank, CHECKPOINT_LAYOUT)?;
                for &tag in CHECKPOINT_LAYOUT {
                    w.write_section(tag, &payload(rank, tag))?;
                }
                w.finish()?;
                Ok(())
            })
            .unwrap();
    }
    store.publish().unwrap();
}

fn read_rank(store: &CheckpointStore, rank: Rank) -> Result<Vec<Values>, CheckpointError> {
    let mut r = CheckpointReader::open(store.open(rank)?, rank, CHECKPOINT_LAYOUT)?;
    let mut out = Vec::new();
    for &tag in CHECKPOINT_LAYOUT {
        out.push(r.read_section(tag)?);
    }
    r.finish()?;
    Ok(out)
}

#[test]
fn every_rank_reads_back_its_own_sections() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    write_database(&store, 3);

    for r in 0..3 {
        let rank = Rank(r);
        let sections = read_rank(&store, rank).unwrap();
        for (got, &tag) in sections.iter().zip(CHECKPOINT_LAYOUT) {
            let want = payload(rank, tag);
            let got_bits: Vec<u64> = got.0.iter().map(|v| v.to_bits()).collect();
            let want_bits: Vec<u64> = want.0.iter().map(|v| v.to_bits()).collect();
            assert_eq!(got_bits, want_bits);
        }
    }
}

#[test]
fn truncated_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    write_database(&store, 1);

    let path = store
        .canonical_dir()
        .join(CheckpointStore::file_name(Rank(0)));
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    match read_rank(&store, Rank(0)) {
        Err(CheckpointError::Truncated { .. }) => {}
        other => panic!("expected Truncated, got {other:?}"),
    }
}

#[test]
fn corrupted_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    write_database(&store, 1);

    let path = store
        .canonical_dir()
        .join(CheckpointStore::file_name(Rank(0)));
    let mut bytes = fs::read(&path).unwrap();
    let last_payload_byte = bytes.len() - 5;
    bytes[last_payload_byte] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    match read_rank(&store, Rank(0)) {
        Err(CheckpointError::Checksum {
            tag: SectionTag::AdvectionContext,
            ..
        }) => {}
        other => panic!("expected Checksum, got {other:?}"),
    }
}

#[test]
fn file_of_another_rank_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    write_database(&store, 2);

    let canonical = store.canonical_dir();
    fs::copy(
        canonical.join(CheckpointStore::file_name(Rank(1))),
        canonical.join(CheckpointStore::file_name(Rank(0))),
    )
    .unwrap();

    match read_rank(&store, Rank(0)) {
        Err(CheckpointError::RankMismatch {
            expected: 0,
            found: 1,
        }) => {}
        other => panic!("expected RankMismatch, got {other:?}"),
    }
}
