//! Collective checkpoint write and restore.
//!
//! Every rank writes its own file into the staging directory; rank 0
//! publishes the directory only after all ranks report success through
//! [`Communicator::all_agree`]. Any failure leaves the previous canonical
//! database untouched.

use std::io::{Read, Write};
use std::path::PathBuf;

use strata_checkpoint::codec::{
    read_f64_le, read_u32_le, read_u64_le, read_u8, write_f64_le, write_u32_le, write_u64_le,
    write_u8,
};
use strata_checkpoint::{
    CheckpointError, CheckpointReader, CheckpointStore, CheckpointWriter, Persist, SectionTag,
    CHECKPOINT_LAYOUT,
};
use strata_core::{Axis, Communicator, ConfigError, Rank, Scaling, UnitSystem};
use strata_grid::GridPartition;
use strata_markers::check_marker_phases;
use tracing::{debug, info, warn};

use crate::advection::AdvectionContext;
use crate::config::RunConfig;
use crate::context::{ContextParts, SimulationContext};
use crate::error::EngineError;
use crate::linker::Linker;
use crate::materials::{Material, MaterialDatabase, MAX_PHASES};
use crate::residual::ResidualContext;
use crate::surface::FreeSurface;
use crate::time::TimeStepping;

// ── Header ──────────────────────────────────────────────────────

/// Encoded size of the header section: scaling (unit code and four
/// characteristic values), time state, phase count and one slot per
/// possible phase.
pub const HEADER_LEN: u64 = (1 + 4 * 8) + (3 * 8) + 4 + MAX_PHASES as u64 * 16;

/// Aggregate scalars stored first in every checkpoint file.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointHeader {
    /// Scaling of the run.
    pub scaling: Scaling,
    /// Step size, internal units.
    pub dt: f64,
    /// Simulated time, internal units.
    pub time: f64,
    /// Completed steps.
    pub step: u64,
    /// Material table, internal units.
    pub materials: Vec<Material>,
}

impl CheckpointHeader {
    /// Snapshot the header fields of `ctx`.
    pub fn capture(ctx: &SimulationContext) -> Self {
        Self {
            scaling: ctx.scaling,
            dt: ctx.time.dt(),
            time: ctx.time.time(),
            step: ctx.time.step(),
            materials: ctx.materials.phases().to_vec(),
        }
    }
}

fn header_error(detail: String) -> CheckpointError {
    CheckpointError::Malformed {
        tag: SectionTag::Header,
        detail,
    }
}

impl Persist for CheckpointHeader {
    const FIXED_LEN: Option<u64> = Some(HEADER_LEN);

    fn persist(&self, w: &mut dyn Write) -> Result<(), CheckpointError> {
        if self.materials.len() > MAX_PHASES {
            return Err(header_error(format!(
                "{} phases exceed {MAX_PHASES} slots",
                self.materials.len()
            )));
        }
        let s = &self.scaling;
        write_u8(w, s.units.code())?;
        for v in [s.length, s.viscosity, s.stress, s.temperature] {
            write_f64_le(w, v)?;
        }
        write_f64_le(w, self.dt)?;
        write_f64_le(w, self.time)?;
        write_u64_le(w, self.step)?;
        write_u32_le(w, self.materials.len() as u32)?;
        let empty = Material::default();
        for i in 0..MAX_PHASES {
            let m = self.materials.get(i).unwrap_or(&empty);
            write_f64_le(w, m.density)?;
            write_f64_le(w, m.viscosity)?;
        }
        Ok(())
    }

    fn restore(r: &mut dyn Read) -> Result<Self, CheckpointError> {
        let code = read_u8(r)?;
        let units =
            UnitSystem::from_code(code).ok_or_else(|| header_error(format!("unit code {code}")))?;
        let scaling = Scaling {
            units,
            length: read_f64_le(r)?,
            viscosity: read_f64_le(r)?,
            stress: read_f64_le(r)?,
            temperature: read_f64_le(r)?,
        };
        let dt = read_f64_le(r)?;
        let time = read_f64_le(r)?;
        let step = read_u64_le(r)?;
        let count = read_u32_le(r)? as usize;
        if count == 0 || count > MAX_PHASES {
            return Err(header_error(format!("phase count {count}")));
        }
        let mut materials = Vec::with_capacity(count);
        for i in 0..MAX_PHASES {
            let m = Material {
                density: read_f64_le(r)?,
                viscosity: read_f64_le(r)?,
            };
            if i < count {
                materials.push(m);
            }
        }
        Ok(Self {
            scaling,
            dt,
            time,
            step,
            materials,
        })
    }
}

// ── Record ──────────────────────────────────────────────────────

/// Decoded contents of one per-process checkpoint file.
#[derive(Debug)]
pub struct CheckpointRecord {
    /// Aggregate scalars.
    pub header: CheckpointHeader,
    /// Grid partition.
    pub grid: GridPartition,
    /// Free surface.
    pub surface: FreeSurface,
    /// Residual context.
    pub residual: ResidualContext,
    /// Advection context.
    pub advection: AdvectionContext,
}

/// Write `ctx`'s persisted subsystems to `sink` as `rank`'s record.
pub fn encode_record<W: Write>(
    sink: W,
    rank: Rank,
    ctx: &SimulationContext,
) -> Result<W, CheckpointError> {
    let mut writer = CheckpointWriter::new(sink, rank, CHECKPOINT_LAYOUT)?;
    writer.write_section(SectionTag::Header, &CheckpointHeader::capture(ctx))?;
    writer.write_section(SectionTag::GridPartition, &ctx.grid)?;
    writer.write_section(SectionTag::FreeSurface, &ctx.surface)?;
    writer.write_section(SectionTag::ResidualContext, &ctx.residual)?;
    writer.write_section(SectionTag::AdvectionContext, &ctx.advection)?;
    writer.finish()
}

/// Read `rank`'s record from `source`, checking the sections agree with
/// each other.
pub fn decode_record<R: Read>(source: R, rank: Rank) -> Result<CheckpointRecord, CheckpointError> {
    let mut reader = CheckpointReader::open(source, rank, CHECKPOINT_LAYOUT)?;
    let header: CheckpointHeader = reader.read_section(SectionTag::Header)?;
    let grid: GridPartition = reader.read_section(SectionTag::GridPartition)?;
    let surface: FreeSurface = reader.read_section(SectionTag::FreeSurface)?;
    let residual: ResidualContext = reader.read_section(SectionTag::ResidualContext)?;
    let advection: AdvectionContext = reader.read_section(SectionTag::AdvectionContext)?;
    reader.finish()?;

    if grid.rank() != rank {
        return Err(CheckpointError::Malformed {
            tag: SectionTag::GridPartition,
            detail: format!("partition of rank {} in rank {rank}'s file", grid.rank()),
        });
    }
    let columns = grid.local_cells(Axis::X).len() * grid.local_cells(Axis::Y).len();
    if surface.enabled() && surface.topography().len() != columns {
        return Err(CheckpointError::Malformed {
            tag: SectionTag::FreeSurface,
            detail: format!(
                "{} surface heights for {columns} columns",
                surface.topography().len()
            ),
        });
    }
    let len = ResidualContext::local_len(&grid);
    if residual.solution.len() != len {
        return Err(CheckpointError::Malformed {
            tag: SectionTag::ResidualContext,
            detail: format!("{} values for {len} local unknowns", residual.solution.len()),
        });
    }
    Ok(CheckpointRecord {
        header,
        grid,
        surface,
        residual,
        advection,
    })
}

// ── CheckpointManager ───────────────────────────────────────────

/// Collective checkpoint operations for one rank.
pub struct CheckpointManager<'c, C: Communicator + ?Sized> {
    store: CheckpointStore,
    comm: &'c C,
}

impl<'c, C: Communicator + ?Sized> CheckpointManager<'c, C> {
    /// Manager for the database under `run_dir`.
    pub fn new(run_dir: impl Into<PathBuf>, comm: &'c C) -> Self {
        Self {
            store: CheckpointStore::new(run_dir),
            comm,
        }
    }

    /// The on-disk store.
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Write and publish a checkpoint of `ctx`. Every rank must call this.
    ///
    /// Returns the canonical directory. On failure nothing is published and
    /// the previous database, if any, stays valid.
    pub fn write(&self, ctx: &SimulationContext) -> Result<PathBuf, EngineError> {
        let rank = self.comm.rank();

        // 1. Markers must be valid and the staging directory fresh.
        let valid = ctx.check_markers();
        let prepared = if rank.is_root() && valid.is_ok() {
            self.store.prepare_staging()
        } else {
            Ok(())
        };
        if !self.comm.all_agree(valid.is_ok() && prepared.is_ok()) {
            if rank.is_root() && valid.is_ok() && prepared.is_ok() {
                self.discard_quietly();
            }
            valid?;
            prepared?;
            return Err(abort("prepare"));
        }

        // 2. Every rank writes and syncs its own file.
        let written = self
            .store
            .write_staged(rank, |w| encode_record(w, rank, ctx).map(drop));
        if !self.comm.all_agree(written.is_ok()) {
            if rank.is_root() {
                self.discard_quietly();
            }
            written?;
            return Err(abort("write"));
        }
        if let Ok(path) = &written {
            debug!(path = %path.display(), "staged checkpoint file");
        }

        // 3. Rank 0 publishes once every file is durable.
        let published = if rank.is_root() {
            self.store.publish()
        } else {
            Ok(())
        };
        if !self.comm.all_agree(published.is_ok()) {
            published?;
            return Err(abort("publish"));
        }

        info!(
            step = ctx.time.step(),
            markers = ctx.advection.marker_count(),
            "checkpoint written"
        );
        Ok(self.store.canonical_dir())
    }

    /// Rebuild and link a context from the canonical database. Every rank
    /// must call this.
    pub fn read(&self, config: &RunConfig) -> Result<SimulationContext, EngineError> {
        let rank = self.comm.rank();

        let recovered = if rank.is_root() {
            self.store.recover_interrupted_publish().map(drop)
        } else {
            Ok(())
        };
        if !self.comm.all_agree(recovered.is_ok()) {
            recovered?;
            return Err(abort("recover"));
        }

        let local = self.read_local(config);
        if !self.comm.all_agree(local.is_ok()) {
            return Err(match local {
                Err(e) => e,
                Ok(_) => abort("restore"),
            });
        }
        let mut ctx = local?;
        Linker::link(&mut ctx);
        info!(
            step = ctx.time.step(),
            time = ctx.time.time(),
            markers = ctx.advection.marker_count(),
            "checkpoint restored"
        );
        Ok(ctx)
    }

    fn read_local(&self, config: &RunConfig) -> Result<SimulationContext, EngineError> {
        let rank = self.comm.rank();
        let canonical = self.store.canonical_dir();
        if !canonical.is_dir() {
            return Err(ConfigError::MissingRestartDatabase { path: canonical }.into());
        }
        let record = decode_record(self.store.open(rank)?, rank)?;
        let CheckpointRecord {
            header,
            grid,
            surface,
            residual,
            advection,
        } = record;

        if grid.size() != self.comm.size() {
            return Err(ConfigError::InvalidGrid {
                reason: format!(
                    "checkpoint written by {} processes, run has {}",
                    grid.size(),
                    self.comm.size()
                ),
            }
            .into());
        }
        if grid.cells() != config.grid.cells {
            warn!(
                checkpoint = ?grid.cells(),
                configured = ?config.grid.cells,
                "grid differs from configuration; using the checkpoint"
            );
        }

        let materials = MaterialDatabase::from_materials(header.materials);
        check_marker_phases(&advection.markers, materials.num_phases())?;
        let time = TimeStepping::resumed(
            header.dt,
            header.time,
            header.step,
            &config.time,
            &header.scaling,
        );

        Ok(SimulationContext::from_parts(
            config,
            ContextParts {
                scaling: header.scaling,
                time,
                materials,
                grid,
                surface,
                residual,
                advection,
            },
        ))
    }

    fn discard_quietly(&self) {
        if let Err(e) = self.store.discard_staging() {
            warn!(error = %e, "could not discard staging directory");
        }
    }
}

fn abort(stage: &'static str) -> EngineError {
    CheckpointError::CollectiveAbort { stage }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::SingleProcess;

    fn config(run_dir: &std::path::Path) -> RunConfig {
        let mut cfg = RunConfig::from_json(
            r#"{
                "time": {"dt": 0.25, "time_end": 1.0},
                "materials": [{"density": 3300, "viscosity": 1e21}, {"density": 2700, "viscosity": 1e22}],
                "grid": {"domain_min": [0,0,0], "domain_max": [2,1,1], "cells": [4,2,2]},
                "free_surface": {"enabled": true, "level": 1.0},
                "markers": {"seed": 9, "jitter": 0.5,
                            "layers": [{"bottom": 0.0, "top": 0.5, "phase": 1}]}
            }"#,
        )
        .unwrap();
        cfg.run_dir = run_dir.to_path_buf();
        cfg
    }

    fn linked(cfg: &RunConfig) -> SimulationContext {
        let (mut ctx, _) = SimulationContext::create(cfg, &SingleProcess).unwrap();
        Linker::link(&mut ctx);
        ctx
    }

    #[test]
    fn header_has_fixed_length() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = linked(&config(dir.path()));
        let mut buf = Vec::new();
        CheckpointHeader::capture(&ctx).persist(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, HEADER_LEN);
        let back = CheckpointHeader::restore(&mut buf.as_slice()).unwrap();
        assert_eq!(back, CheckpointHeader::capture(&ctx));
    }

    #[test]
    fn header_rejects_unknown_units() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = linked(&config(dir.path()));
        let mut buf = Vec::new();
        CheckpointHeader::capture(&ctx).persist(&mut buf).unwrap();
        buf[0] = 9;
        match CheckpointHeader::restore(&mut buf.as_slice()) {
            Err(CheckpointError::Malformed {
                tag: SectionTag::Header,
                ..
            }) => {}
            other => panic!("expected Malformed header, got {other:?}"),
        }
    }

    #[test]
    fn write_then_read_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let mut ctx = linked(&cfg);
        ctx.time.advance();
        ctx.residual.solution[5] = 1.25;
        ctx.advection.markers[3].plastic_strain = 0.5;

        let manager = CheckpointManager::new(dir.path(), &SingleProcess);
        let published = manager.write(&ctx).unwrap();
        assert!(published.join("rdb.00000000.dat").is_file());
        assert!(!manager.store().staging_dir().exists());

        let back = manager.read(&cfg).unwrap();
        assert_ne!(back.id(), ctx.id());
        assert_eq!(back.time.step(), 1);
        assert_eq!(back.time.time(), 0.25);
        assert_eq!(back.residual.solution, ctx.residual.solution);
        assert_eq!(back.advection.markers, ctx.advection.markers);
        assert_eq!(back.grid.descriptor(), ctx.grid.descriptor());
        assert!(Linker::verify(&back).is_ok());
    }

    #[test]
    fn invalid_marker_phase_blocks_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = linked(&config(dir.path()));
        ctx.advection.markers[0].phase = strata_core::PhaseId(5);
        let manager = CheckpointManager::new(dir.path(), &SingleProcess);
        match manager.write(&ctx) {
            Err(EngineError::Config(ConfigError::PhaseOutOfRange { count: 1, .. })) => {}
            other => panic!("expected PhaseOutOfRange, got {other:?}"),
        }
        assert!(!manager.store().staging_dir().exists());
        assert!(!manager.store().canonical_dir().exists());
    }

    #[test]
    fn read_without_database_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path(), &SingleProcess);
        match manager.read(&config(dir.path())) {
            Err(EngineError::Config(ConfigError::MissingRestartDatabase { .. })) => {}
            other => panic!("expected MissingRestartDatabase, got {other:?}"),
        }
    }
}
