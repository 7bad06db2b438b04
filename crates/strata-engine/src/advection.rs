//! Marker ownership and persistence.

use std::io::{Read, Write};

use strata_checkpoint::codec::{
    read_f64_le, read_u32_le, read_u64_le, write_f64_le, write_u32_le, write_u64_le,
};
use strata_checkpoint::{CheckpointError, Persist, SectionTag};
use strata_core::{Link, Marker, PhaseId};
use strata_grid::GridPartition;

use crate::materials::MaterialDatabase;
use crate::residual::ResidualContext;
use crate::surface::FreeSurface;

/// Encoded size of one marker: position, phase, three auxiliary values.
const MARKER_LEN: u64 = 3 * 8 + 4 + 3 * 8;

/// The process-local markers, in generation order.
#[derive(Clone, Debug, PartialEq)]
pub struct AdvectionContext {
    /// Link to the grid partition, assigned by the linker.
    pub grid: Link<GridPartition>,
    /// Link to the residual context, assigned by the linker.
    pub residual: Link<ResidualContext>,
    /// Link to the free surface, assigned by the linker.
    pub surface: Link<FreeSurface>,
    /// Link to the material database, assigned by the linker.
    pub materials: Link<MaterialDatabase>,
    /// Local markers.
    pub markers: Vec<Marker>,
}

impl AdvectionContext {
    /// Take ownership of the local markers.
    pub fn new(markers: Vec<Marker>) -> Self {
        Self {
            grid: Link::unlinked(),
            residual: Link::unlinked(),
            surface: Link::unlinked(),
            materials: Link::unlinked(),
            markers,
        }
    }

    /// Number of local markers.
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// Local marker count per phase, indexed by phase id. Phases above the
    /// highest one in use are omitted.
    pub fn phase_counts(&self) -> Vec<usize> {
        let mut counts = Vec::new();
        for m in &self.markers {
            let i = m.phase.0 as usize;
            if i >= counts.len() {
                counts.resize(i + 1, 0);
            }
            counts[i] += 1;
        }
        counts
    }

    /// Local markers of `phase`.
    pub fn count_phase(&self, phase: PhaseId) -> usize {
        self.markers.iter().filter(|m| m.phase == phase).count()
    }
}

fn malformed(detail: String) -> CheckpointError {
    CheckpointError::Malformed {
        tag: SectionTag::AdvectionContext,
        detail,
    }
}

impl Persist for AdvectionContext {
    fn persist(&self, w: &mut dyn Write) -> Result<(), CheckpointError> {
        write_u64_le(w, self.markers.len() as u64)?;
        for m in &self.markers {
            for x in m.position {
                write_f64_le(w, x)?;
            }
            write_u32_le(w, m.phase.0)?;
            write_f64_le(w, m.temperature)?;
            write_f64_le(w, m.plastic_strain)?;
            write_f64_le(w, m.pressure)?;
        }
        Ok(())
    }

    fn restore(r: &mut dyn Read) -> Result<Self, CheckpointError> {
        let count = read_u64_le(r)?;
        let count = usize::try_from(count)
            .map_err(|_| malformed(format!("marker count {count} exceeds address space")))?;
        // The count is untrusted until the markers are actually read.
        let mut markers = Vec::with_capacity(count.min((1 << 24) / MARKER_LEN as usize));
        for _ in 0..count {
            let position = [read_f64_le(r)?, read_f64_le(r)?, read_f64_le(r)?];
            let phase = PhaseId(read_u32_le(r)?);
            markers.push(Marker {
                position,
                phase,
                temperature: read_f64_le(r)?,
                plastic_strain: read_f64_le(r)?,
                pressure: read_f64_le(r)?,
            });
        }
        Ok(Self::new(markers))
    }
}
