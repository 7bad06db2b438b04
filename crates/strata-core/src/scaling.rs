//! Nondimensionalisation.
//!
//! [`Scaling`] converts between physical input units and the internal
//! nondimensional units every other subsystem works in. Characteristic
//! length, viscosity and stress are configured; time and velocity follow
//! from them.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Seconds per year (Julian).
const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;
/// Seconds per million years.
const SECONDS_PER_MYR: f64 = 1.0e6 * SECONDS_PER_YEAR;

/// Unit system of the physical input values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    /// Input is already nondimensional; all characteristic values are 1.
    #[default]
    None,
    /// SI units (m, s, Pa·s, Pa).
    Si,
    /// Geological units: km, Myr, cm/yr.
    Geo,
}

impl UnitSystem {
    /// Stable on-disk code.
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Si => 1,
            Self::Geo => 2,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Si),
            2 => Some(Self::Geo),
            _ => None,
        }
    }
}

/// Scaling section of the run configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingSpec {
    /// Unit system of physical inputs.
    pub units: UnitSystem,
    /// Characteristic length (m).
    pub length: f64,
    /// Characteristic viscosity (Pa·s).
    pub viscosity: f64,
    /// Characteristic stress (Pa).
    pub stress: f64,
    /// Characteristic temperature (K).
    pub temperature: f64,
}

impl Default for ScalingSpec {
    fn default() -> Self {
        Self {
            units: UnitSystem::None,
            length: 1.0,
            viscosity: 1.0,
            stress: 1.0,
            temperature: 1.0,
        }
    }
}

/// Characteristic values of the run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scaling {
    /// Unit system of physical inputs.
    pub units: UnitSystem,
    /// Characteristic length (m).
    pub length: f64,
    /// Characteristic viscosity (Pa·s).
    pub viscosity: f64,
    /// Characteristic stress (Pa).
    pub stress: f64,
    /// Characteristic temperature (K).
    pub temperature: f64,
}

impl Default for Scaling {
    fn default() -> Self {
        Self {
            units: UnitSystem::None,
            length: 1.0,
            viscosity: 1.0,
            stress: 1.0,
            temperature: 1.0,
        }
    }
}

impl Scaling {
    /// Build from configuration, validating the characteristic values.
    ///
    /// With [`UnitSystem::None`] the configured values are ignored and all
    /// characteristic values are 1.
    pub fn from_spec(spec: &ScalingSpec) -> Result<Self, ConfigError> {
        if spec.units == UnitSystem::None {
            return Ok(Self::default());
        }
        for (name, v) in [
            ("length", spec.length),
            ("viscosity", spec.viscosity),
            ("stress", spec.stress),
            ("temperature", spec.temperature),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(ConfigError::Invalid {
                    section: "scaling",
                    reason: format!("{name} must be finite and positive, got {v}"),
                });
            }
        }
        Ok(Self {
            units: spec.units,
            length: spec.length,
            viscosity: spec.viscosity,
            stress: spec.stress,
            temperature: spec.temperature,
        })
    }

    /// Characteristic time (s): viscosity / stress.
    pub fn time(&self) -> f64 {
        self.viscosity / self.stress
    }

    /// Characteristic velocity (m/s): length / time.
    pub fn velocity(&self) -> f64 {
        self.length / self.time()
    }

    /// Convert a physical time (s, or Myr in geo units) to internal units.
    pub fn time_to_internal(&self, t: f64) -> f64 {
        match self.units {
            UnitSystem::None => t,
            UnitSystem::Si => t / self.time(),
            UnitSystem::Geo => t * SECONDS_PER_MYR / self.time(),
        }
    }

    /// Convert an internal time back to physical units.
    pub fn time_to_physical(&self, t: f64) -> f64 {
        match self.units {
            UnitSystem::None => t,
            UnitSystem::Si => t * self.time(),
            UnitSystem::Geo => t * self.time() / SECONDS_PER_MYR,
        }
    }

    /// Convert a physical length (m, or km in geo units) to internal units.
    pub fn length_to_internal(&self, x: f64) -> f64 {
        match self.units {
            UnitSystem::None => x,
            UnitSystem::Si => x / self.length,
            UnitSystem::Geo => x * 1.0e3 / self.length,
        }
    }

    /// Convert a physical strain rate (1/s) to internal units.
    pub fn strain_rate_to_internal(&self, e: f64) -> f64 {
        match self.units {
            UnitSystem::None => e,
            UnitSystem::Si | UnitSystem::Geo => e * self.time(),
        }
    }

    /// Convert a physical velocity (m/s, or cm/yr in geo units) to internal units.
    pub fn velocity_to_internal(&self, v: f64) -> f64 {
        match self.units {
            UnitSystem::None => v,
            UnitSystem::Si => v / self.velocity(),
            UnitSystem::Geo => v * 1.0e-2 / SECONDS_PER_YEAR / self.velocity(),
        }
    }
}
