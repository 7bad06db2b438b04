//! Collective checkpoint writes through the manager: round trips, failed
//! writes, interrupted publishes and damaged files.

use std::fs;
use std::path::Path;

use proptest::prelude::*;
use strata_checkpoint::CheckpointError;
use strata_core::{ConfigError, Marker, PhaseId, Rank, SingleProcess};
use strata_engine::checkpoint::{decode_record, encode_record};
use strata_engine::{
    CheckpointManager, EngineError, ErrorKind, Linker, RunConfig, SimulationContext,
};
use strata_test_utils::{run_ranks, TestRunBuilder};

fn linked(cfg: &RunConfig) -> SimulationContext {
    let (mut ctx, _) = SimulationContext::create(cfg, &SingleProcess).unwrap();
    Linker::link(&mut ctx);
    ctx
}

#[test]
fn roundtrip_preserves_every_bit() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TestRunBuilder::new(dir.path())
        .box_volume([0.25, 0.25, 0.75, 0.75], 2, 3, 1)
        .build();
    let mut ctx = linked(&cfg);
    ctx.apply_boundary_conditions().unwrap();
    ctx.time.advance();
    ctx.surface.topography_mut()[0] = 1.0 + f64::EPSILON;
    ctx.residual.residual[7] = -0.0;
    for (i, m) in ctx.advection.markers.iter_mut().enumerate() {
        m.temperature = 1000.0 + i as f64 / 3.0;
    }

    let manager = CheckpointManager::new(dir.path(), &SingleProcess);
    manager.write(&ctx).unwrap();
    let back = manager.read(&cfg).unwrap();

    assert_eq!(back.time.step(), ctx.time.step());
    assert_eq!(back.time.time().to_bits(), ctx.time.time().to_bits());
    assert_eq!(back.scaling, ctx.scaling);
    assert_eq!(back.materials.phases(), ctx.materials.phases());
    assert_eq!(back.grid.descriptor(), ctx.grid.descriptor());
    assert_eq!(back.surface.topography(), ctx.surface.topography());
    let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&back.residual.solution), bits(&ctx.residual.solution));
    assert_eq!(bits(&back.residual.residual), bits(&ctx.residual.residual));
    assert_eq!(back.advection.markers, ctx.advection.markers);
    assert!(Linker::verify(&back).is_ok());
}

#[test]
fn failed_write_keeps_previous_database() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TestRunBuilder::new(dir.path()).build();
    let mut ctx = linked(&cfg);
    let manager = CheckpointManager::new(dir.path(), &SingleProcess);

    ctx.time.advance();
    manager.write(&ctx).unwrap();
    let before = fs::read(manager.store().canonical_dir().join("rdb.00000000.dat")).unwrap();

    ctx.time.advance();
    ctx.advection.markers[10].phase = PhaseId(9);
    let err = manager.write(&ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let after = fs::read(manager.store().canonical_dir().join("rdb.00000000.dat")).unwrap();
    assert_eq!(before, after);
    assert_eq!(manager.read(&cfg).unwrap().time.step(), 1);
}

#[test]
fn interrupted_publish_recovers_previous_database() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TestRunBuilder::new(dir.path()).build();
    let mut ctx = linked(&cfg);
    ctx.time.advance();
    let manager = CheckpointManager::new(dir.path(), &SingleProcess);
    manager.write(&ctx).unwrap();

    // Crash between the two renames of the next publish: the old database
    // sits in the retired slot and a half-written staging directory
    // remains.
    let store = manager.store();
    fs::rename(store.canonical_dir(), store.retired_dir()).unwrap();
    fs::create_dir(store.staging_dir()).unwrap();
    fs::write(store.staging_dir().join("rdb.00000000.dat"), b"STRA\x01").unwrap();

    let back = manager.read(&cfg).unwrap();
    assert_eq!(back.time.step(), 1);
    assert!(store.canonical_dir().is_dir());
    assert!(!store.retired_dir().exists());

    // The next write replaces the stale staging directory.
    manager.write(&back).unwrap();
    assert!(!store.staging_dir().exists());
}

#[test]
fn corrupted_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TestRunBuilder::new(dir.path()).build();
    let ctx = linked(&cfg);
    let manager = CheckpointManager::new(dir.path(), &SingleProcess);
    manager.write(&ctx).unwrap();

    let path = manager.store().canonical_dir().join("rdb.00000000.dat");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 10;
    bytes[last] ^= 0x40;
    fs::write(&path, &bytes).unwrap();

    let err = manager.read(&cfg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    match err {
        EngineError::Checkpoint(CheckpointError::Checksum { .. }) => {}
        other => panic!("expected Checksum, got {other:?}"),
    }
}

#[test]
fn truncated_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TestRunBuilder::new(dir.path()).build();
    let manager = CheckpointManager::new(dir.path(), &SingleProcess);
    manager.write(&linked(&cfg)).unwrap();

    let path = manager.store().canonical_dir().join("rdb.00000000.dat");
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    match manager.read(&cfg) {
        Err(EngineError::Checkpoint(CheckpointError::Truncated { .. })) => {}
        Err(other) => panic!("expected Truncated, got {other:?}"),
        Ok(_) => panic!("expected Truncated, got a context"),
    }
}

#[test]
fn thread_group_checkpoint_roundtrips_per_rank() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TestRunBuilder::new(dir.path()).procs([1, 2, 2]).build();

    let written = run_ranks(4, |comm| {
        let (mut ctx, _) = SimulationContext::create(&cfg, &comm).unwrap();
        Linker::link(&mut ctx);
        for m in &mut ctx.advection.markers {
            m.pressure = f64::from(ctx.grid.rank().0);
        }
        CheckpointManager::new(dir.path(), &comm).write(&ctx).unwrap();
        (ctx.grid.descriptor(), ctx.advection.markers.clone())
    });

    let canonical = dir.path().join("restart");
    for (rank, (descriptor, markers)) in written.iter().enumerate() {
        let file = canonical.join(format!("rdb.{rank:08}.dat"));
        let record = decode_record(fs::File::open(file).unwrap(), (rank as u32).into()).unwrap();
        assert_eq!(&record.grid.descriptor(), descriptor);
        assert_eq!(&record.advection.markers, markers);
        assert!(markers.iter().all(|m| m.pressure == rank as f64));
    }

    let restored = run_ranks(4, |comm| {
        let ctx = CheckpointManager::new(dir.path(), &comm).read(&cfg).unwrap();
        ctx.advection.marker_count()
    });
    let expected: Vec<_> = written.iter().map(|(_, m)| m.len()).collect();
    assert_eq!(restored, expected);
}

#[test]
fn one_failing_rank_aborts_every_rank() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TestRunBuilder::new(dir.path()).procs([2, 1, 1]).build();

    let results = run_ranks(2, |comm| {
        let (mut ctx, _) = SimulationContext::create(&cfg, &comm).unwrap();
        Linker::link(&mut ctx);
        if ctx.grid.rank().0 == 1 {
            ctx.advection.markers[0].phase = PhaseId(7);
        }
        CheckpointManager::new(dir.path(), &comm)
            .write(&ctx)
            .map(|_| ())
    });

    match &results[0] {
        Err(EngineError::Checkpoint(CheckpointError::CollectiveAbort { stage })) => {
            assert_eq!(*stage, "prepare")
        }
        other => panic!("expected CollectiveAbort on rank 0, got {other:?}"),
    }
    match &results[1] {
        Err(EngineError::Config(ConfigError::PhaseOutOfRange { .. })) => {}
        other => panic!("expected PhaseOutOfRange on rank 1, got {other:?}"),
    }
    assert!(!dir.path().join("restart").exists());
    assert!(!dir.path().join("restart-tmp").exists());
}

fn marker() -> impl Strategy<Value = Marker> {
    (
        prop::array::uniform3(any::<f64>()),
        any::<u32>(),
        any::<f64>(),
        any::<f64>(),
        any::<f64>(),
    )
        .prop_map(|(position, phase, temperature, plastic_strain, pressure)| Marker {
            position,
            phase: PhaseId(phase),
            temperature,
            plastic_strain,
            pressure,
        })
}

fn marker_bits(m: &Marker) -> ([u64; 3], u32, [u64; 3]) {
    (
        m.position.map(f64::to_bits),
        m.phase.0,
        [m.temperature, m.plastic_strain, m.pressure].map(f64::to_bits),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn record_roundtrip_is_bit_exact(
        markers in prop::collection::vec(marker(), 0..200),
        surface in prop::collection::vec(any::<f64>(), 16),
    ) {
        let cfg = TestRunBuilder::new(Path::new(".")).build();
        let mut ctx = linked(&cfg);
        ctx.advection.markers = markers;
        ctx.surface.topography_mut().copy_from_slice(&surface);

        let encoded = encode_record(Vec::new(), Rank::ROOT, &ctx).unwrap();
        let back = decode_record(encoded.as_slice(), Rank::ROOT).unwrap();

        let want: Vec<_> = ctx.advection.markers.iter().map(marker_bits).collect();
        let got: Vec<_> = back.advection.markers.iter().map(marker_bits).collect();
        prop_assert_eq!(got, want);
        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        prop_assert_eq!(bits(back.surface.topography()), bits(ctx.surface.topography()));
    }
}
