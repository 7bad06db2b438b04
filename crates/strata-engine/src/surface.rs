//! Free-surface topography.

use std::io::{Read, Write};

use strata_checkpoint::codec::{
    read_f64_le, read_f64_vec, read_u8, write_f64_le, write_f64_slice, write_u8,
};
use strata_checkpoint::{CheckpointError, Persist, SectionTag};
use strata_core::{Axis, Link, Scaling};
use strata_grid::GridPartition;

use crate::config::FreeSurfaceSpec;
use crate::residual::ResidualContext;

/// Surface height over the local columns, x fastest.
///
/// The surface physics belongs to the solver; this subsystem only owns the
/// state that must survive a restart.
#[derive(Clone, Debug, PartialEq)]
pub struct FreeSurface {
    /// Link to the residual context, assigned by the linker.
    pub residual: Link<ResidualContext>,
    enabled: bool,
    level: f64,
    topography: Vec<f64>,
}

impl FreeSurface {
    /// Flat surface at the configured level over the local columns.
    pub fn new(spec: &FreeSurfaceSpec, scaling: &Scaling, grid: &GridPartition) -> Self {
        let level = scaling.length_to_internal(spec.level);
        let columns = grid.local_cells(Axis::X).len() * grid.local_cells(Axis::Y).len();
        let topography = if spec.enabled {
            vec![level; columns]
        } else {
            Vec::new()
        };
        Self {
            residual: Link::unlinked(),
            enabled: spec.enabled,
            level,
            topography,
        }
    }

    /// Whether the surface is tracked.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Reference level.
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Column heights.
    pub fn topography(&self) -> &[f64] {
        &self.topography
    }

    /// Mutable column heights for the solver.
    pub fn topography_mut(&mut self) -> &mut [f64] {
        &mut self.topography
    }

    /// Largest deviation from the reference level.
    pub fn relief(&self) -> f64 {
        self.topography
            .iter()
            .map(|h| (h - self.level).abs())
            .fold(0.0, f64::max)
    }
}

impl Persist for FreeSurface {
    fn persist(&self, w: &mut dyn Write) -> Result<(), CheckpointError> {
        write_u8(w, u8::from(self.enabled))?;
        write_f64_le(w, self.level)?;
        write_f64_slice(w, &self.topography)
    }

    fn restore(r: &mut dyn Read) -> Result<Self, CheckpointError> {
        let enabled = match read_u8(r)? {
            0 => false,
            1 => true,
            other => {
                return Err(CheckpointError::Malformed {
                    tag: SectionTag::FreeSurface,
                    detail: format!("enabled flag {other}"),
                })
            }
        };
        let level = read_f64_le(r)?;
        let topography = read_f64_vec(r)?;
        Ok(Self {
            residual: Link::unlinked(),
            enabled,
            level,
            topography,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ContextId, Rank, SubsystemId};
    use strata_grid::GridSpec;

    fn grid() -> GridPartition {
        let spec = GridSpec {
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            cells: [4, 2, 3],
            procs: Some([2, 1, 1]),
            markers_per_cell: [1, 1, 1],
        };
        GridPartition::new(&spec, &Scaling::default(), Rank(1), 2).unwrap()
    }

    #[test]
    fn enabled_surface_covers_local_columns() {
        let spec = FreeSurfaceSpec {
            enabled: true,
            level: 0.75,
        };
        let s = FreeSurface::new(&spec, &Scaling::default(), &grid());
        assert_eq!(s.topography().len(), 2 * 2);
        assert!(s.topography().iter().all(|&h| h == 0.75));
        assert_eq!(s.relief(), 0.0);
    }

    #[test]
    fn disabled_surface_is_empty() {
        let s = FreeSurface::new(&FreeSurfaceSpec::default(), &Scaling::default(), &grid());
        assert!(!s.enabled());
        assert!(s.topography().is_empty());
    }

    #[test]
    fn persist_roundtrip_drops_link() {
        let spec = FreeSurfaceSpec {
            enabled: true,
            level: 1.0,
        };
        let mut s = FreeSurface::new(&spec, &Scaling::default(), &grid());
        s.topography_mut()[1] = 1.5;
        s.residual.assign(ContextId::next(), SubsystemId::ResidualContext);

        let mut buf = Vec::new();
        s.persist(&mut buf).unwrap();
        let back = FreeSurface::restore(&mut buf.as_slice()).unwrap();
        assert_eq!(back.topography(), s.topography());
        assert_eq!(back.relief(), 0.5);
        assert!(!back.residual.is_linked());
    }

    #[test]
    fn bad_flag_is_malformed() {
        let mut buf = vec![7u8];
        buf.extend_from_slice(&0.0f64.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        match FreeSurface::restore(&mut buf.as_slice()) {
            Err(CheckpointError::Malformed { .. }) => {}
            other => panic!("expected Malformed, got {other:?}"),
        }
    }
}
