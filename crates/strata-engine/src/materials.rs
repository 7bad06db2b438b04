//! Material properties per phase.

use strata_core::{Link, PhaseId, Scaling};

use crate::config::MaterialSpec;

/// Largest number of phases a run may define. The checkpoint header
/// reserves a slot for each.
pub const MAX_PHASES: usize = 32;

/// Reference properties of one phase, internal units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Material {
    /// Density.
    pub density: f64,
    /// Viscosity.
    pub viscosity: f64,
}

/// Phase-indexed material table.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDatabase {
    /// Link to the run's scaling, assigned by the linker.
    pub scaling: Link<Scaling>,
    phases: Vec<Material>,
}

impl MaterialDatabase {
    /// Build from configuration, nondimensionalising viscosities.
    pub fn from_specs(specs: &[MaterialSpec], scaling: &Scaling) -> Self {
        let phases = specs
            .iter()
            .map(|m| Material {
                density: m.density,
                viscosity: m.viscosity / scaling.viscosity,
            })
            .collect();
        Self::from_materials(phases)
    }

    /// Wrap already-converted materials.
    pub fn from_materials(phases: Vec<Material>) -> Self {
        Self {
            scaling: Link::unlinked(),
            phases,
        }
    }

    /// Number of defined phases.
    pub fn num_phases(&self) -> u32 {
        self.phases.len() as u32
    }

    /// Properties of `phase`, if defined.
    pub fn get(&self, phase: PhaseId) -> Option<&Material> {
        self.phases.get(phase.0 as usize)
    }

    /// All phases in id order.
    pub fn phases(&self) -> &[Material] {
        &self.phases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ScalingSpec, UnitSystem};

    #[test]
    fn viscosity_is_scaled() {
        let scaling = Scaling::from_spec(&ScalingSpec {
            units: UnitSystem::Si,
            length: 1.0e3,
            viscosity: 1.0e20,
            stress: 1.0e6,
            temperature: 1.0e3,
        })
        .unwrap();
        let db = MaterialDatabase::from_specs(
            &[MaterialSpec {
                density: 3300.0,
                viscosity: 1.0e21,
            }],
            &scaling,
        );
        assert_eq!(db.num_phases(), 1);
        let m = db.get(PhaseId(0)).unwrap();
        assert_eq!(m.density, 3300.0);
        assert!((m.viscosity - 10.0).abs() < 1e-12);
        assert!(db.get(PhaseId(1)).is_none());
    }
}
