//! Time-step state.

use strata_core::{Link, Scaling};

use crate::config::TimeSpec;

/// Relative slack when deciding whether the last step reaches the end time.
const END_SLACK: f64 = 1e-9;

/// Current simulated time, step counter and stopping criteria, all in
/// internal units.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeStepping {
    /// Link to the run's scaling, assigned by the linker.
    pub scaling: Link<Scaling>,
    dt: f64,
    time: f64,
    step: u64,
    time_end: f64,
    max_steps: u64,
}

impl TimeStepping {
    /// Fresh state at time zero.
    pub fn from_spec(spec: &TimeSpec, scaling: &Scaling) -> Self {
        Self {
            scaling: Link::unlinked(),
            dt: scaling.time_to_internal(spec.dt),
            time: 0.0,
            step: 0,
            time_end: scaling.time_to_internal(spec.time_end),
            max_steps: spec.max_steps,
        }
    }

    /// State restored from a checkpoint. The stopping criteria come from
    /// the current configuration so a restart can extend a run.
    pub fn resumed(dt: f64, time: f64, step: u64, spec: &TimeSpec, scaling: &Scaling) -> Self {
        Self {
            scaling: Link::unlinked(),
            dt,
            time,
            step,
            time_end: scaling.time_to_internal(spec.time_end),
            max_steps: spec.max_steps,
        }
    }

    /// Step size.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Simulated time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Completed steps.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// End time.
    pub fn time_end(&self) -> f64 {
        self.time_end
    }

    /// Step cap.
    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }

    /// Whether the run has reached its end time or step cap.
    pub fn is_done(&self) -> bool {
        self.step >= self.max_steps || self.time >= self.time_end
    }

    /// Complete one step. The final step lands exactly on the end time.
    /// Returns whether the run is now done.
    pub fn advance(&mut self) -> bool {
        let remaining = self.time_end - self.time;
        if remaining <= self.dt * (1.0 + END_SLACK) {
            self.time = self.time_end;
        } else {
            self.time += self.dt;
        }
        self.step += 1;
        self.is_done()
    }
}
