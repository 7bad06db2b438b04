//! Initial marker positions.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strata_core::{Axis, ConfigError, Marker, PhaseId};
use strata_grid::GridPartition;

/// Regular lattice of markers at sub-cell centres of the local sub-domain,
/// with optional deterministic jitter.
///
/// Jitter moves each coordinate by less than half a sub-cell, so every
/// marker stays in the slab it was generated for. The generator is seeded
/// with `seed ^ rank`, making positions reproducible per process.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerLattice {
    seed: u64,
    jitter: f64,
}

impl MarkerLattice {
    /// Create a lattice generator. `jitter` is a fraction of the sub-cell
    /// width in `[0, 1)`.
    pub fn new(seed: u64, jitter: f64) -> Result<Self, ConfigError> {
        if !(0.0..1.0).contains(&jitter) {
            return Err(ConfigError::Invalid {
                section: "markers",
                reason: format!("jitter must be in [0, 1), got {jitter}"),
            });
        }
        Ok(Self { seed, jitter })
    }

    /// Seed of the jitter generator.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate every local marker with phase `phase`, x fastest.
    pub fn generate(&self, grid: &GridPartition, phase: PhaseId) -> Vec<Marker> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ u64::from(grid.rank().0));
        let slabs = Axis::ALL.map(|a| grid.local_slabs(a));
        let width = Axis::ALL.map(|a| grid.slab_width(a));
        let origin = grid.domain_min();

        let mut markers = Vec::with_capacity(grid.local_marker_count());
        for k in slabs[2].clone() {
            for j in slabs[1].clone() {
                for i in slabs[0].clone() {
                    let mut position = [0.0; 3];
                    for (d, idx) in [i, j, k].into_iter().enumerate() {
                        let centre = origin[d] + (idx as f64 + 0.5) * width[d];
                        let offset = if self.jitter > 0.0 {
                            (rng.random::<f64>() - 0.5) * self.jitter * width[d]
                        } else {
                            0.0
                        };
                        position[d] = centre + offset;
                    }
                    markers.push(Marker::new(position, phase));
                }
            }
        }
        markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Rank, Scaling};
    use strata_grid::GridSpec;

    fn grid(rank: u32) -> GridPartition {
        let spec = GridSpec {
            domain_min: [0.0, 0.0, -1.0],
            domain_max: [2.0, 1.0, 0.0],
            cells: [4, 2, 2],
            procs: Some([2, 1, 1]),
            markers_per_cell: [2, 3, 2],
        };
        GridPartition::new(&spec, &Scaling::default(), Rank(rank), 2).unwrap()
    }

    #[test]
    fn rejects_jitter_outside_unit_interval() {
        assert!(MarkerLattice::new(0, 1.0).is_err());
        assert!(MarkerLattice::new(0, -0.1).is_err());
        assert!(MarkerLattice::new(0, f64::NAN).is_err());
    }

    #[test]
    fn markers_fill_local_sub_domain() {
        let lattice = MarkerLattice::new(7, 0.9).unwrap();
        for rank in 0..2 {
            let g = grid(rank);
            let markers = lattice.generate(&g, PhaseId(0));
            assert_eq!(markers.len(), g.local_marker_count());
            assert_eq!(markers.len(), 4 * 6 * 4);
            for m in &markers {
                assert!(g.contains(m.position), "{:?} outside rank {rank}", m.position);
            }
        }
    }

    #[test]
    fn jitter_preserves_slab_membership() {
        let g = grid(1);
        let plain = MarkerLattice::new(3, 0.0).unwrap().generate(&g, PhaseId(0));
        let shaken = MarkerLattice::new(3, 0.99).unwrap().generate(&g, PhaseId(0));
        for (a, b) in plain.iter().zip(&shaken) {
            for axis in Axis::ALL {
                assert_eq!(
                    g.slab_index(axis, a.coord(axis)),
                    g.slab_index(axis, b.coord(axis))
                );
            }
        }
    }

    #[test]
    fn jitter_is_deterministic_per_seed_and_rank() {
        let g = grid(0);
        let a = MarkerLattice::new(11, 0.5).unwrap().generate(&g, PhaseId(0));
        let b = MarkerLattice::new(11, 0.5).unwrap().generate(&g, PhaseId(0));
        let c = MarkerLattice::new(12, 0.5).unwrap().generate(&g, PhaseId(0));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
