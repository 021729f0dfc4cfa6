//! Babystepping.
//!
//! Babysteps are small position corrections applied while printing. They pulse
//! the motors directly, outside of the block being stepped, and restore the DIR
//! pin afterwards. The tracked position is left alone: the correction is meant
//! to shift the physical axis against it.

use embedded_hal::delay::DelayNs;

use crate::motion::Planner;
use crate::motor::{AxisDriver, StepperTimer};

use super::engine::StepperEngine;
use super::NEVER;

impl<P, D, T, DL> StepperEngine<'_, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    /// Issue one babystep on every axis with steps queued.
    ///
    /// Returns the ticks until the next babystep task run.
    pub(super) fn babystep_isr(&mut self) -> u32 {
        let (axes, forward, more) = self.signals.take_babysteps();
        for axis in axes.iter() {
            if axis < self.settings.axis_count {
                self.babystep_axis(axis, forward.get(axis));
            }
        }
        if more {
            self.settings.babystep_ticks
        } else {
            NEVER
        }
    }

    fn babystep_axis(&mut self, axis: usize, forward: bool) {
        let old = self.last_direction_bits.get(axis);
        self.ensure_enabled(axis);

        self.delay.delay_ns(self.settings.dir_setup_ns);
        let result = self.motors.set_direction(axis, forward);
        self.check(result);
        self.delay.delay_ns(self.settings.dir_hold_ns);

        // All motors of the axis move, locked or not
        self.pulse.start(&mut self.timer);
        let result = self.motors.set_step(axis, true, false);
        self.check(result);
        self.pulse.await_high(&mut self.timer);
        let result = self.motors.set_step(axis, false, false);
        self.check(result);

        self.delay.delay_ns(self.settings.dir_setup_ns);
        let result = self.motors.set_direction(axis, old);
        self.check(result);
        self.delay.delay_ns(self.settings.dir_hold_ns);
    }
}
