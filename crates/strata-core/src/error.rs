//! Error types shared across the workspace.
//!
//! Two of the three error classes live here: [`ConfigError`] for anything
//! the user can fix in the run configuration, and [`LinkError`] for
//! invariant violations in subsystem wiring (never user-recoverable). I/O
//! failures belong to the checkpoint crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::id::{ContextId, PhaseId, SubsystemId};

/// Invalid configuration or invalid simulation input.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// The run mode string is not one of the supported modes.
    #[error("incorrect run mode '{found}' (expected normal, restart, dry_run or save_grid)")]
    InvalidMode {
        /// The rejected string.
        found: String,
    },

    /// Restart was requested but there is no checkpoint directory.
    #[error("no restart database available at {} (check the run mode)", .path.display())]
    MissingRestartDatabase {
        /// Canonical checkpoint directory that was looked up.
        path: PathBuf,
    },

    /// A polygon-volume definition is malformed.
    #[error("polygon {index}: {reason}")]
    MalformedPolygon {
        /// Position of the polygon in the configured sequence.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// Markers carry phases outside the material database.
    #[error(
        "{count} marker(s) carry a phase outside [0, {num_phases}), first offending phase {first}"
    )]
    PhaseOutOfRange {
        /// Number of offending markers.
        count: usize,
        /// Number of phases in the material database.
        num_phases: u32,
        /// Phase of the first offending marker.
        first: PhaseId,
    },

    /// The grid or process decomposition is invalid.
    #[error("invalid grid: {reason}")]
    InvalidGrid {
        /// What is wrong with it.
        reason: String,
    },

    /// Any other section of the configuration failed validation.
    #[error("invalid {section} configuration: {reason}")]
    Invalid {
        /// Configuration section.
        section: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The configuration document could not be read or parsed.
    #[error("cannot load configuration from {}: {reason}", .path.display())]
    Load {
        /// Path of the configuration document.
        path: PathBuf,
        /// Parser or I/O message.
        reason: String,
    },
}

/// A cross-reference was dereferenced in a state where it is not valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The link was never assigned by the linker.
    #[error("{target} referenced before linking")]
    Unlinked {
        /// Subsystem the caller tried to reach.
        target: SubsystemId,
    },

    /// The link was established in another context.
    #[error("link to {target} belongs to context {found}, not {expected}")]
    ForeignContext {
        /// Subsystem the caller tried to reach.
        target: SubsystemId,
        /// Context doing the resolution.
        expected: ContextId,
        /// Context the link was wired in.
        found: ContextId,
    },

    /// The link points at a different subsystem slot.
    #[error("link expected {expected} but points at {found}")]
    WrongTarget {
        /// Subsystem the caller tried to reach.
        expected: SubsystemId,
        /// Subsystem the link was wired to.
        found: SubsystemId,
    },
}
