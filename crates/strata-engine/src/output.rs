//! Output drivers.
//!
//! Each driver follows one link to the state it reports on. Writing the
//! actual output files belongs to the I/O layer; drivers here decide when
//! a frame is due, summarise the state, and count emitted frames.

use strata_core::Link;

use crate::advection::AdvectionContext;
use crate::config::OutputSchedule;
use crate::residual::ResidualContext;
use crate::surface::FreeSurface;

/// Schedule and frame counter shared by every driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutputState {
    schedule: OutputSchedule,
    frames: u64,
}

impl OutputState {
    /// Fresh state for `schedule`.
    pub fn new(schedule: OutputSchedule) -> Self {
        Self {
            schedule,
            frames: 0,
        }
    }

    /// Whether a frame is due after `step` completed steps.
    pub fn is_due(&self, step: u64) -> bool {
        self.schedule.enabled
            && self.schedule.every_steps > 0
            && step % self.schedule.every_steps == 0
    }

    /// Count one emitted frame.
    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    /// Frames emitted so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// Velocity field output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridOutput {
    /// Link to the residual context, assigned by the linker.
    pub residual: Link<ResidualContext>,
    /// Schedule and counter.
    pub state: OutputState,
}

/// Free-surface output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceOutput {
    /// Link to the free surface, assigned by the linker.
    pub surface: Link<FreeSurface>,
    /// Schedule and counter.
    pub state: OutputState,
}

/// Marker output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerOutput {
    /// Link to the advection context, assigned by the linker.
    pub advection: Link<AdvectionContext>,
    /// Schedule and counter.
    pub state: OutputState,
}

/// Phase-volume output: marker counts per phase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhaseOutput {
    /// Link to the advection context, assigned by the linker.
    pub advection: Link<AdvectionContext>,
    /// Schedule and counter.
    pub state: OutputState,
}

macro_rules! driver_ctor {
    ($ty:ident, $link:ident) => {
        impl $ty {
            /// Unlinked driver for `schedule`.
            pub fn new(schedule: OutputSchedule) -> Self {
                Self {
                    $link: Link::unlinked(),
                    state: OutputState::new(schedule),
                }
            }
        }
    };
}

driver_ctor!(GridOutput, residual);
driver_ctor!(SurfaceOutput, surface);
driver_ctor!(MarkerOutput, advection);
driver_ctor!(PhaseOutput, advection);
