//! Linear advance.
//!
//! While linear advance runs, the block's own extruder steps are withheld from
//! the pulse phase and counted as a deficit. A separate timed task re-emits
//! them at the block's extruder rate plus or minus the pressure advance rate,
//! so the nozzle pressure leads acceleration and lags deceleration.

use embedded_hal::delay::DelayNs;

use crate::motion::{AxisBits, Planner};
use crate::motor::{AxisDriver, StepperTimer};

use super::engine::StepperEngine;
use super::NEVER;

/// Linear advance state of the running block.
#[derive(Debug, Clone, Copy)]
pub(super) struct LinearAdvance {
    /// Advance runs for the current block.
    pub(super) active: bool,
    /// Extruder Bresenham dividend, scaled and oversampled.
    pub(super) dividend: i32,
    /// Extruder Bresenham accumulator.
    pub(super) delta_error: i32,
    /// Pressure steps emitted ahead of the block (negative while withholding).
    pub(super) advance_steps: i32,
    /// Ticks between advance task runs.
    pub(super) interval: u32,
    /// Ticks until the next advance task run.
    pub(super) next: u32,
}

impl LinearAdvance {
    pub(super) const fn new() -> Self {
        Self {
            active: false,
            dividend: 0,
            delta_error: 0,
            advance_steps: 0,
            interval: NEVER,
            next: NEVER,
        }
    }

    /// Stop the advance task.
    pub(super) fn stop(&mut self) {
        self.active = false;
        self.interval = NEVER;
        self.next = NEVER;
    }

    /// Schedule the advance task every `ticks`.
    #[inline]
    pub(super) fn set_interval(&mut self, ticks: u32) {
        self.interval = ticks.max(1);
    }
}

impl<P, D, T, DL> StepperEngine<'_, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    /// Extruder pressure steps withheld or emitted ahead of the block.
    #[inline]
    pub fn advance_steps(&self) -> i32 {
        self.advance.advance_steps
    }

    /// Emit at most one extruder step in the current extruder direction.
    pub(super) fn advance_isr(&mut self) {
        if !self.advance.active {
            return;
        }
        let Some(extruder) = self.extruder else {
            return;
        };

        self.advance.delta_error = self.advance.delta_error.wrapping_add(self.advance.dividend);
        if self.advance.delta_error < 0 {
            return;
        }
        self.advance.delta_error = self
            .advance
            .delta_error
            .wrapping_sub(self.bresenham.divisor() as i32);

        let sign = self.last_direction_bits.direction(extruder).sign();
        self.advance.advance_steps = self.advance.advance_steps.wrapping_add(sign);
        self.pulse_axes(AxisBits::EMPTY.with(extruder, true));
    }
}
