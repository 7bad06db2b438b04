//! Engine error types and the run-level error taxonomy.

use std::fmt;

use strata_checkpoint::CheckpointError;
use strata_core::{ConfigError, LinkError};
use thiserror::Error;

/// Error reported by a [`TimeStepSolver`](crate::solver::TimeStepSolver).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("solver failed: {reason}")]
pub struct SolverError {
    /// What went wrong.
    pub reason: String,
}

/// Any failure inside the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration or invalid simulation input.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Checkpoint file or directory failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    /// A cross-reference was used in an invalid state.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// The external solver failed.
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Coarse classification of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-fixable configuration or input problem.
    Config,
    /// Filesystem or checkpoint format problem.
    Io,
    /// Invariant violation; never user-recoverable.
    FatalRuntime,
    /// The external solver reported a failure, here or on another rank.
    Solver,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "configuration error",
            Self::Io => "I/O error",
            Self::FatalRuntime => "fatal runtime error",
            Self::Solver => "solver error",
        })
    }
}

impl EngineError {
    /// Error class of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Checkpoint(_) => ErrorKind::Io,
            Self::Link(_) => ErrorKind::FatalRuntime,
            Self::Solver(_) => ErrorKind::Solver,
        }
    }
}

/// Lifecycle step a run failed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleStep {
    /// Parsing and validating the configuration and run mode.
    Configure,
    /// Building and persisting the partition in save-grid mode.
    SaveGrid,
    /// Building subsystems from configuration.
    Create,
    /// Rebuilding subsystems from a checkpoint.
    Restore,
    /// Wiring cross-references.
    Link,
    /// Running the time loop.
    Solve,
    /// Evaluating the initial residual only.
    DryRun,
    /// Writing a checkpoint.
    Checkpoint,
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configure => "configure",
            Self::SaveGrid => "save grid",
            Self::Create => "create",
            Self::Restore => "restore",
            Self::Link => "link",
            Self::Solve => "solve",
            Self::DryRun => "dry run",
            Self::Checkpoint => "checkpoint",
        })
    }
}

/// A failed run: the step that failed and why.
#[derive(Debug, Error)]
#[error("{step} failed ({}): {source}", .source.kind())]
pub struct RunError {
    /// Failing lifecycle step.
    pub step: LifecycleStep,
    /// Underlying error.
    #[source]
    pub source: EngineError,
}

impl RunError {
    /// Attach `step` to an engine error, for use with `map_err`.
    pub fn at<E: Into<EngineError>>(step: LifecycleStep) -> impl FnOnce(E) -> Self {
        move |source| Self {
            step,
            source: source.into(),
        }
    }

    /// Error class of the underlying failure.
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::SubsystemId;

    #[test]
    fn kinds_follow_taxonomy() {
        let config: EngineError = ConfigError::InvalidMode {
            found: "fast".into(),
        }
        .into();
        assert_eq!(config.kind(), ErrorKind::Config);

        let io: EngineError = CheckpointError::InvalidMagic.into();
        assert_eq!(io.kind(), ErrorKind::Io);

        let link: EngineError = LinkError::Unlinked {
            target: SubsystemId::Scaling,
        }
        .into();
        assert_eq!(link.kind(), ErrorKind::FatalRuntime);

        let solver: EngineError = SolverError {
            reason: "diverged".into(),
        }
        .into();
        assert_eq!(solver.kind(), ErrorKind::Solver);
    }

    #[test]
    fn solver_failure_is_reported_as_such() {
        let err = RunError::at(LifecycleStep::Solve)(SolverError {
            reason: "diverged".into(),
        });
        let msg = err.to_string();
        assert!(msg.starts_with("solve failed (solver error)"), "{msg}");
    }

    #[test]
    fn run_error_names_the_step() {
        let err = RunError::at(LifecycleStep::Restore)(CheckpointError::InvalidMagic);
        let msg = err.to_string();
        assert!(msg.starts_with("restore failed (I/O error)"), "{msg}");
    }
}
