//! Global processor partitioning, written once in save-grid mode so later
//! runs (and external tools) can reuse the decomposition.

use std::io::{Read, Write};

use strata_checkpoint::codec::{read_f64_le, read_u64_le, write_f64_le, write_u64_le};
use strata_checkpoint::{CheckpointError, Persist, SectionTag};
use strata_core::Axis;

/// Process grid, global cell counts, domain and block offsets.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionDescriptor {
    /// Process grid.
    pub procs: [usize; 3],
    /// Global cell counts.
    pub cells: [usize; 3],
    /// Lower domain corner (nondimensional).
    pub domain_min: [f64; 3],
    /// Upper domain corner (nondimensional).
    pub domain_max: [f64; 3],
    /// Per axis, `procs + 1` cell boundaries of the process blocks.
    pub offsets: [Vec<usize>; 3],
}

impl PartitionDescriptor {
    /// File name, e.g. `ProcessorPartitioning_8cpu_2.2.2.bin`.
    pub fn file_name(&self) -> String {
        let [px, py, pz] = self.procs;
        format!("ProcessorPartitioning_{}cpu_{px}.{py}.{pz}.bin", px * py * pz)
    }

    /// Coordinates of the process block edges along `axis`.
    pub fn boundaries(&self, axis: Axis) -> Vec<f64> {
        let i = axis.index();
        let w = (self.domain_max[i] - self.domain_min[i]) / self.cells[i] as f64;
        self.offsets[i]
            .iter()
            .map(|&c| {
                if c == self.cells[i] {
                    self.domain_max[i]
                } else {
                    self.domain_min[i] + c as f64 * w
                }
            })
            .collect()
    }
}

impl Persist for PartitionDescriptor {
    fn persist(&self, w: &mut dyn Write) -> Result<(), CheckpointError> {
        for axis in Axis::ALL {
            let i = axis.index();
            write_u64_le(w, self.procs[i] as u64)?;
            write_u64_le(w, self.cells[i] as u64)?;
            write_f64_le(w, self.domain_min[i])?;
            write_f64_le(w, self.domain_max[i])?;
            for x in self.boundaries(axis) {
                write_f64_le(w, x)?;
            }
            for &o in &self.offsets[i] {
                write_u64_le(w, o as u64)?;
            }
        }
        Ok(())
    }

    fn restore(r: &mut dyn Read) -> Result<Self, CheckpointError> {
        let malformed = |detail: String| CheckpointError::Malformed {
            tag: SectionTag::PartitionDescriptor,
            detail,
        };
        let mut out = PartitionDescriptor {
            procs: [0; 3],
            cells: [0; 3],
            domain_min: [0.0; 3],
            domain_max: [0.0; 3],
            offsets: Default::default(),
        };
        for i in 0..3 {
            let procs = read_u64_le(r)?;
            let cells = read_u64_le(r)?;
            if procs == 0 || procs > cells {
                return Err(malformed(format!("{procs} processes over {cells} cells")));
            }
            out.procs[i] = usize::try_from(procs).map_err(|_| malformed("process count".into()))?;
            out.cells[i] = usize::try_from(cells).map_err(|_| malformed("cell count".into()))?;
            out.domain_min[i] = read_f64_le(r)?;
            out.domain_max[i] = read_f64_le(r)?;
            // Edge coordinates are derived data; skip them.
            for _ in 0..=out.procs[i] {
                read_f64_le(r)?;
            }
            let mut offsets = Vec::with_capacity(out.procs[i] + 1);
            for _ in 0..=out.procs[i] {
                let o = read_u64_le(r)?;
                offsets.push(usize::try_from(o).map_err(|_| malformed("offset".into()))?);
            }
            if offsets.first() != Some(&0) || offsets.last() != Some(&out.cells[i]) {
                return Err(malformed(format!("invalid block offsets {offsets:?}")));
            }
            out.offsets[i] = offsets;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GridPartition, GridSpec};
    use strata_core::{Rank, Scaling};

    fn descriptor() -> PartitionDescriptor {
        let spec = GridSpec {
            domain_min: [0.0, 0.0, -1.0],
            domain_max: [1.0, 1.0, 0.0],
            cells: [10, 4, 4],
            procs: Some([3, 2, 1]),
            markers_per_cell: [2, 2, 2],
        };
        GridPartition::new(&spec, &Scaling::default(), Rank(0), 6)
            .unwrap()
            .descriptor()
    }

    #[test]
    fn file_name_lists_process_grid() {
        assert_eq!(
            descriptor().file_name(),
            "ProcessorPartitioning_6cpu_3.2.1.bin"
        );
    }

    #[test]
    fn boundaries_span_domain() {
        let d = descriptor();
        let b = d.boundaries(Axis::X);
        assert_eq!(b.len(), 4);
        assert_eq!(b[0], 0.0);
        assert_eq!(b[3], 1.0);
        assert!((b[1] - 0.4).abs() < 1e-12);
        assert_eq!(d.boundaries(Axis::Z), vec![-1.0, 0.0]);
    }

    #[test]
    fn persist_roundtrip() {
        let d = descriptor();
        let mut buf = Vec::new();
        d.persist(&mut buf).unwrap();
        assert_eq!(PartitionDescriptor::restore(&mut buf.as_slice()).unwrap(), d);
    }
}
