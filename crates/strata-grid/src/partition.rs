//! One process's block of the global grid.

use std::io::{Read, Write};
use std::ops::Range;

use strata_checkpoint::codec::{read_f64_le, read_u64_le, write_f64_le, write_u64_le};
use strata_checkpoint::{CheckpointError, Persist, SectionTag};
use strata_core::{Axis, ConfigError, Link, Rank, Scaling};

use crate::descriptor::PartitionDescriptor;
use crate::spec::GridSpec;

/// Cell boundaries of `parts` contiguous blocks over `cells` cells. The
/// first `cells % parts` blocks get one extra cell.
pub(crate) fn block_offsets(cells: usize, parts: usize) -> Vec<usize> {
    let base = cells / parts;
    let rem = cells % parts;
    let mut out = Vec::with_capacity(parts + 1);
    let mut at = 0;
    out.push(at);
    for p in 0..parts {
        at += base + usize::from(p < rem);
        out.push(at);
    }
    out
}

/// Process-local sub-domain and the global geometry needed to place
/// markers and polygon volumes.
///
/// Coordinates are nondimensional: the configured domain is converted with
/// [`Scaling::length_to_internal`] at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct GridPartition {
    /// Link to the run's scaling, assigned by the linker.
    pub scaling: Link<Scaling>,
    procs: [usize; 3],
    coords: [usize; 3],
    cells: [usize; 3],
    markers_per_cell: [usize; 3],
    domain_min: [f64; 3],
    domain_max: [f64; 3],
    offsets: [Vec<usize>; 3],
}

impl GridPartition {
    /// Decompose `spec` over `size` processes and keep `rank`'s block.
    pub fn new(
        spec: &GridSpec,
        scaling: &Scaling,
        rank: Rank,
        size: usize,
    ) -> Result<Self, ConfigError> {
        spec.validate()?;
        let procs = spec.process_grid(size)?;
        if rank.index() >= size {
            return Err(ConfigError::InvalidGrid {
                reason: format!("rank {rank} outside a run of {size} processes"),
            });
        }
        let coords = coords_of(procs, rank);
        let offsets = [0, 1, 2].map(|i| block_offsets(spec.cells[i], procs[i]));
        Ok(Self {
            scaling: Link::unlinked(),
            procs,
            coords,
            cells: spec.cells,
            markers_per_cell: spec.markers_per_cell,
            domain_min: spec.domain_min.map(|x| scaling.length_to_internal(x)),
            domain_max: spec.domain_max.map(|x| scaling.length_to_internal(x)),
            offsets,
        })
    }

    // ── Decomposition ───────────────────────────────────────────

    /// Rank of this partition.
    pub fn rank(&self) -> Rank {
        self.rank_of(self.coords)
    }

    /// Number of processes in the decomposition.
    pub fn size(&self) -> usize {
        self.procs.iter().product()
    }

    /// Process grid.
    pub fn procs(&self) -> [usize; 3] {
        self.procs
    }

    /// This process's coordinates in the process grid.
    pub fn coords(&self) -> [usize; 3] {
        self.coords
    }

    /// Rank at process coordinates (x fastest).
    pub fn rank_of(&self, coords: [usize; 3]) -> Rank {
        let [px, py, _] = self.procs;
        Rank((coords[0] + px * (coords[1] + py * coords[2])) as u32)
    }

    /// Cell boundaries of every process block along `axis`.
    pub fn offsets(&self, axis: Axis) -> &[usize] {
        &self.offsets[axis.index()]
    }

    // ── Geometry ────────────────────────────────────────────────

    /// Global cell counts.
    pub fn cells(&self) -> [usize; 3] {
        self.cells
    }

    /// Markers per cell per axis.
    pub fn markers_per_cell(&self) -> [usize; 3] {
        self.markers_per_cell
    }

    /// Lower corner of the global domain.
    pub fn domain_min(&self) -> [f64; 3] {
        self.domain_min
    }

    /// Upper corner of the global domain.
    pub fn domain_max(&self) -> [f64; 3] {
        self.domain_max
    }

    /// Uniform cell width along `axis`.
    pub fn cell_width(&self, axis: Axis) -> f64 {
        let i = axis.index();
        (self.domain_max[i] - self.domain_min[i]) / self.cells[i] as f64
    }

    /// Local cell range along `axis`.
    pub fn local_cells(&self, axis: Axis) -> Range<usize> {
        let off = &self.offsets[axis.index()];
        let c = self.coords[axis.index()];
        off[c]..off[c + 1]
    }

    /// Local sub-domain `[lo, hi)` along `axis`.
    pub fn local_bounds(&self, axis: Axis) -> (f64, f64) {
        let i = axis.index();
        let cells = self.local_cells(axis);
        let w = self.cell_width(axis);
        let lo = self.domain_min[i] + cells.start as f64 * w;
        let hi = if cells.end == self.cells[i] {
            self.domain_max[i]
        } else {
            self.domain_min[i] + cells.end as f64 * w
        };
        (lo, hi)
    }

    /// Whether `position` lies in the local sub-domain.
    pub fn contains(&self, position: [f64; 3]) -> bool {
        Axis::ALL.iter().all(|&axis| {
            let (lo, hi) = self.local_bounds(axis);
            let x = position[axis.index()];
            x >= lo && x < hi
        })
    }

    // ── Marker slabs ────────────────────────────────────────────

    /// Width of one marker slab along `axis`.
    pub fn slab_width(&self, axis: Axis) -> f64 {
        self.cell_width(axis) / self.markers_per_cell[axis.index()] as f64
    }

    /// Number of slabs in the global domain along `axis`.
    pub fn global_slab_count(&self, axis: Axis) -> usize {
        self.cells[axis.index()] * self.markers_per_cell[axis.index()]
    }

    /// Global slab range owned by this process along `axis`.
    pub fn local_slabs(&self, axis: Axis) -> Range<usize> {
        let m = self.markers_per_cell[axis.index()];
        let cells = self.local_cells(axis);
        cells.start * m..cells.end * m
    }

    /// Global slab index of coordinate `x` along `axis`:
    /// `floor((x - domain_min) / slab_width)`. May fall outside the domain.
    pub fn slab_index(&self, axis: Axis, x: f64) -> i64 {
        ((x - self.domain_min[axis.index()]) / self.slab_width(axis)).floor() as i64
    }

    /// Process coordinate along `axis` that owns global slab `slab`.
    pub fn owner_of_slab(&self, axis: Axis, slab: usize) -> Option<usize> {
        let m = self.markers_per_cell[axis.index()];
        let cell = slab / m;
        let off = &self.offsets[axis.index()];
        if cell >= *off.last()? {
            return None;
        }
        // First block whose end lies beyond the cell.
        Some(off[1..].partition_point(|&end| end <= cell))
    }

    /// Number of markers the local sub-domain holds at generation.
    pub fn local_marker_count(&self) -> usize {
        Axis::ALL
            .iter()
            .map(|&a| self.local_slabs(a).len())
            .product()
    }

    /// Global decomposition for persisting in save-grid mode.
    pub fn descriptor(&self) -> PartitionDescriptor {
        PartitionDescriptor {
            procs: self.procs,
            cells: self.cells,
            domain_min: self.domain_min,
            domain_max: self.domain_max,
            offsets: self.offsets.clone(),
        }
    }
}

fn coords_of(procs: [usize; 3], rank: Rank) -> [usize; 3] {
    let r = rank.index();
    [r % procs[0], (r / procs[0]) % procs[1], r / (procs[0] * procs[1])]
}

// ── Persistence ─────────────────────────────────────────────────

fn malformed(detail: String) -> CheckpointError {
    CheckpointError::Malformed {
        tag: SectionTag::GridPartition,
        detail,
    }
}

fn read_usize(r: &mut dyn Read) -> Result<usize, CheckpointError> {
    let v = read_u64_le(r)?;
    usize::try_from(v).map_err(|_| malformed(format!("count {v} exceeds address space")))
}

impl Persist for GridPartition {
    fn persist(&self, w: &mut dyn Write) -> Result<(), CheckpointError> {
        for i in 0..3 {
            write_u64_le(w, self.procs[i] as u64)?;
            write_u64_le(w, self.coords[i] as u64)?;
            write_u64_le(w, self.cells[i] as u64)?;
            write_u64_le(w, self.markers_per_cell[i] as u64)?;
            write_f64_le(w, self.domain_min[i])?;
            write_f64_le(w, self.domain_max[i])?;
            for &o in &self.offsets[i] {
                write_u64_le(w, o as u64)?;
            }
        }
        Ok(())
    }

    fn restore(r: &mut dyn Read) -> Result<Self, CheckpointError> {
        let mut procs = [0; 3];
        let mut coords = [0; 3];
        let mut cells = [0; 3];
        let mut markers_per_cell = [0; 3];
        let mut domain_min = [0.0; 3];
        let mut domain_max = [0.0; 3];
        let mut offsets: [Vec<usize>; 3] = Default::default();
        for i in 0..3 {
            procs[i] = read_usize(r)?;
            coords[i] = read_usize(r)?;
            cells[i] = read_usize(r)?;
            markers_per_cell[i] = read_usize(r)?;
            domain_min[i] = read_f64_le(r)?;
            domain_max[i] = read_f64_le(r)?;
            if procs[i] == 0 || coords[i] >= procs[i] || procs[i] > cells[i] {
                return Err(malformed(format!(
                    "process coordinate {} of {} over {} cells",
                    coords[i], procs[i], cells[i]
                )));
            }
            if markers_per_cell[i] == 0 {
                return Err(malformed("zero markers per cell".into()));
            }
            let axis_offsets = (0..=procs[i])
                .map(|_| read_usize(r))
                .collect::<Result<Vec<_>, _>>()?;
            let monotone = axis_offsets.windows(2).all(|w| w[0] < w[1]);
            if axis_offsets[0] != 0 || axis_offsets[procs[i]] != cells[i] || !monotone {
                return Err(malformed(format!("invalid block offsets {axis_offsets:?}")));
            }
            offsets[i] = axis_offsets;
        }
        Ok(Self {
            scaling: Link::unlinked(),
            procs,
            coords,
            cells,
            markers_per_cell,
            domain_min,
            domain_max,
            offsets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strata_core::{ScalingSpec, UnitSystem};

    fn spec(cells: [usize; 3], procs: [usize; 3]) -> GridSpec {
        GridSpec {
            domain_min: [0.0; 3],
            domain_max: [1.0, 2.0, 4.0],
            cells,
            procs: Some(procs),
            markers_per_cell: [2, 3, 1],
        }
    }

    fn partition(cells: [usize; 3], procs: [usize; 3], rank: u32) -> GridPartition {
        let size = procs.iter().product();
        GridPartition::new(&spec(cells, procs), &Scaling::default(), Rank(rank), size).unwrap()
    }

    #[test]
    fn uneven_split_front_loads_remainder() {
        assert_eq!(block_offsets(10, 3), vec![0, 4, 7, 10]);
        assert_eq!(block_offsets(4, 4), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn ranks_and_coords_agree() {
        for r in 0..12 {
            let p = partition([6, 6, 6], [3, 2, 2], r);
            assert_eq!(p.rank(), Rank(r));
            assert_eq!(p.size(), 12);
        }
        let p = partition([6, 6, 6], [3, 2, 2], 7);
        assert_eq!(p.coords(), [1, 0, 1]);
    }

    #[test]
    fn slab_index_follows_sub_cell_width() {
        let p = partition([4, 4, 4], [1, 1, 1], 0);
        // Cell width along y is 0.5, three markers per cell.
        assert!((p.slab_width(Axis::Y) - 0.5 / 3.0).abs() < 1e-15);
        assert_eq!(p.slab_index(Axis::Y, 0.0), 0);
        assert_eq!(p.slab_index(Axis::Y, 0.49), 2);
        assert_eq!(p.slab_index(Axis::Y, 0.51), 3);
        assert_eq!(p.slab_index(Axis::Y, -0.01), -1);
        assert_eq!(p.global_slab_count(Axis::Y), 12);
    }

    #[test]
    fn local_bounds_tile_the_domain() {
        let procs = [3, 1, 1];
        let mut edges = Vec::new();
        for r in 0..3 {
            let p = partition([10, 2, 2], procs, r);
            edges.push(p.local_bounds(Axis::X));
        }
        assert_eq!(edges[0].0, 0.0);
        assert_eq!(edges[2].1, 1.0);
        assert_eq!(edges[0].1, edges[1].0);
        assert_eq!(edges[1].1, edges[2].0);
        assert!((edges[0].1 - 0.4).abs() < 1e-12);
    }

    #[test]
    fn geo_units_scale_the_domain() {
        let scaling = Scaling::from_spec(&ScalingSpec {
            units: UnitSystem::Geo,
            length: 1.0e4,
            ..ScalingSpec::default()
        })
        .unwrap();
        let p = GridPartition::new(&spec([2, 2, 2], [1, 1, 1]), &scaling, Rank(0), 1).unwrap();
        assert!((p.domain_max()[2] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn rank_outside_run_rejected() {
        match GridPartition::new(&spec([4, 4, 4], [2, 1, 1]), &Scaling::default(), Rank(2), 2) {
            Err(ConfigError::InvalidGrid { .. }) => {}
            other => panic!("expected InvalidGrid, got {other:?}"),
        }
    }

    #[test]
    fn persist_roundtrip() {
        let p = partition([7, 5, 3], [3, 2, 1], 4);
        let mut buf = Vec::new();
        p.persist(&mut buf).unwrap();
        let back = GridPartition::restore(&mut buf.as_slice()).unwrap();
        assert_eq!(back, p);
        assert!(!back.scaling.is_linked());
    }

    #[test]
    fn corrupt_offsets_rejected() {
        let p = partition([4, 1, 1], [2, 1, 1], 0);
        let mut buf = Vec::new();
        p.persist(&mut buf).unwrap();
        // First offset of the x axis follows six 8-byte fields.
        buf[48] = 1;
        match GridPartition::restore(&mut buf.as_slice()) {
            Err(CheckpointError::Malformed { .. }) => {}
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn every_slab_has_exactly_one_owner(
            cells in 1usize..40,
            parts in 1usize..8,
            mpc in 1usize..4,
        ) {
            prop_assume!(parts <= cells);
            let spec = GridSpec {
                domain_min: [0.0; 3],
                domain_max: [1.0; 3],
                cells: [cells, 1, 1],
                procs: Some([parts, 1, 1]),
                markers_per_cell: [mpc, 1, 1],
            };
            let parts_vec: Vec<GridPartition> = (0..parts)
                .map(|r| GridPartition::new(&spec, &Scaling::default(), Rank(r as u32), parts).unwrap())
                .collect();
            for slab in 0..cells * mpc {
                let owners: Vec<usize> = parts_vec
                    .iter()
                    .filter(|p| p.local_slabs(Axis::X).contains(&slab))
                    .map(|p| p.coords()[0])
                    .collect();
                prop_assert_eq!(owners.len(), 1);
                prop_assert_eq!(Some(owners[0]), parts_vec[0].owner_of_slab(Axis::X, slab));
            }
            prop_assert_eq!(parts_vec[0].owner_of_slab(Axis::X, cells * mpc), None);
        }
    }
}
