//! Marker phase validation pass.

use strata_core::{ConfigError, Marker};

/// Fail if any marker carries a phase outside `[0, num_phases)`.
///
/// The error reports how many markers are affected and the first
/// offending phase in marker order.
pub fn check_marker_phases(markers: &[Marker], num_phases: u32) -> Result<(), ConfigError> {
    let mut bad = markers.iter().filter(|m| m.phase.0 >= num_phases);
    let Some(first) = bad.next() else {
        return Ok(());
    };
    Err(ConfigError::PhaseOutOfRange {
        count: 1 + bad.count(),
        num_phases,
        first: first.phase,
    })
}
