//! Run configuration, validation, and error types.
//!
//! A run is described by one JSON document. Every section except `time`,
//! `materials` and `grid` has defaults. [`RunConfig::validate`] checks the
//! structural invariants up front so that subsystem construction only
//! fails on genuinely environmental problems.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strata_core::{ConfigError, Scaling, ScalingSpec};
use strata_grid::GridSpec;
use strata_markers::MarkerSetup;

use crate::materials::MAX_PHASES;

// ── RunMode ─────────────────────────────────────────────────────

/// What a run does after configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Fresh start and time loop.
    Normal,
    /// Resume the time loop from the canonical checkpoint.
    Restart,
    /// Fresh start and a single initial residual evaluation.
    DryRun,
    /// Build the grid partition, persist it and stop.
    SaveGridOnly,
}

impl RunMode {
    /// Configuration string of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Restart => "restart",
            Self::DryRun => "dry_run",
            Self::SaveGridOnly => "save_grid",
        }
    }
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "restart" => Ok(Self::Restart),
            "dry_run" => Ok(Self::DryRun),
            "save_grid" => Ok(Self::SaveGridOnly),
            other => Err(ConfigError::InvalidMode {
                found: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Sections ────────────────────────────────────────────────────

/// Time stepping section. Times are in physical units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeSpec {
    /// Step size.
    pub dt: f64,
    /// Simulated time at which the run ends.
    pub time_end: f64,
    /// Hard cap on the number of steps.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

fn default_max_steps() -> u64 {
    u64::MAX
}

/// One material phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialSpec {
    /// Reference density.
    pub density: f64,
    /// Reference viscosity (Pa·s).
    pub viscosity: f64,
}

/// Free-surface section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreeSurfaceSpec {
    /// Whether the surface is tracked.
    pub enabled: bool,
    /// Initial surface level along z, physical length units.
    pub level: f64,
}

/// Boundary condition section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundarySpec {
    /// Background strain rates along x and y (1/s); the side walls move
    /// to impose them.
    pub strain_rate: [f64; 2],
    /// Time over which the wall velocities ramp up linearly from zero,
    /// physical units. Zero applies them at full strength immediately.
    pub ramp_time: f64,
}

/// When an output driver emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSchedule {
    /// Whether the driver emits at all.
    pub enabled: bool,
    /// Emit every this many steps.
    pub every_steps: u64,
}

impl Default for OutputSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            every_steps: 1,
        }
    }
}

/// Output section: one schedule per driver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSpec {
    /// Grid (velocity/residual) output.
    pub grid: OutputSchedule,
    /// Free-surface output.
    pub surface: OutputSchedule,
    /// Marker output.
    pub markers: OutputSchedule,
    /// Phase-volume output.
    pub phases: OutputSchedule,
}

/// Checkpoint section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointSpec {
    /// Write a checkpoint every this many steps; 0 disables periodic
    /// checkpoints.
    pub every_steps: u64,
    /// Write a checkpoint when the time loop finishes.
    pub on_finish: bool,
}

// ── RunConfig ───────────────────────────────────────────────────

fn default_mode() -> String {
    RunMode::Normal.as_str().to_string()
}

fn default_run_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Complete description of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Run mode string; parsed by [`run_mode`](Self::run_mode).
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Directory holding the restart database and partition files.
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,
    /// Nondimensionalisation.
    #[serde(default)]
    pub scaling: ScalingSpec,
    /// Time stepping.
    pub time: TimeSpec,
    /// Material phases, indexed by phase id.
    pub materials: Vec<MaterialSpec>,
    /// Global grid.
    pub grid: GridSpec,
    /// Free surface.
    #[serde(default)]
    pub free_surface: FreeSurfaceSpec,
    /// Boundary conditions.
    #[serde(default)]
    pub boundary: BoundarySpec,
    /// Initial marker field.
    #[serde(default)]
    pub markers: MarkerSetup,
    /// Output drivers.
    #[serde(default)]
    pub output: OutputSpec,
    /// Checkpoint schedule.
    #[serde(default)]
    pub checkpoint: CheckpointSpec,
}

impl RunConfig {
    /// Parse a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Load {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })
    }

    /// Read and parse a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let load_err = |reason: String| ConfigError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| load_err(e.to_string()))
    }

    /// Parse the configured run mode.
    pub fn run_mode(&self) -> Result<RunMode, ConfigError> {
        self.mode.parse()
    }

    /// Validate every structural invariant for a run on `size` processes.
    pub fn validate(&self, size: usize) -> Result<(), ConfigError> {
        // 1. Mode string must name a mode.
        self.run_mode()?;
        // 2. Scaling values must be usable.
        Scaling::from_spec(&self.scaling)?;
        // 3. Time stepping must advance and terminate.
        let t = &self.time;
        if !t.dt.is_finite() || t.dt <= 0.0 {
            return Err(invalid("time", format!("dt must be finite and positive, got {}", t.dt)));
        }
        if !t.time_end.is_finite() || t.time_end <= 0.0 {
            return Err(invalid(
                "time",
                format!("time_end must be finite and positive, got {}", t.time_end),
            ));
        }
        if t.max_steps == 0 {
            return Err(invalid("time", "max_steps must be at least 1".into()));
        }
        // 4. Material database must fit its fixed checkpoint slots.
        if self.materials.is_empty() {
            return Err(invalid("materials", "at least one phase is required".into()));
        }
        if self.materials.len() > MAX_PHASES {
            return Err(invalid(
                "materials",
                format!("{} phases exceed the limit of {MAX_PHASES}", self.materials.len()),
            ));
        }
        for (i, m) in self.materials.iter().enumerate() {
            if !m.density.is_finite() || m.density <= 0.0 {
                return Err(invalid("materials", format!("phase {i}: density must be positive")));
            }
            if !m.viscosity.is_finite() || m.viscosity <= 0.0 {
                return Err(invalid(
                    "materials",
                    format!("phase {i}: viscosity must be positive"),
                ));
            }
        }
        // 5. Grid must split over the process count.
        self.grid.validate()?;
        self.grid.process_grid(size)?;
        // 6. Marker setup phases must exist.
        self.markers.validate(self.materials.len() as u32)?;
        // 7. Output and boundary values must be usable.
        if !self.free_surface.level.is_finite() {
            return Err(invalid("free_surface", "level must be finite".into()));
        }
        if self.boundary.strain_rate.iter().any(|e| !e.is_finite()) {
            return Err(invalid("boundary", "strain rates must be finite".into()));
        }
        if !self.boundary.ramp_time.is_finite() || self.boundary.ramp_time < 0.0 {
            return Err(invalid("boundary", "ramp_time must be finite and non-negative".into()));
        }
        let o = &self.output;
        for (name, s) in [
            ("grid", o.grid),
            ("surface", o.surface),
            ("markers", o.markers),
            ("phases", o.phases),
        ] {
            if s.enabled && s.every_steps == 0 {
                return Err(invalid("output", format!("{name}: every_steps must be at least 1")));
            }
        }
        Ok(())
    }
}

fn invalid(section: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { section, reason }
}
