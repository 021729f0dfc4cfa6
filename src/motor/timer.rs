//! Timer abstraction for the stepper ISR.
//!
//! The engine needs two clocks:
//! - the step timer, a compare-match timer that fires the ISR and restarts its
//!   count at every match;
//! - a free-running pulse counter used to busy-wait minimum STEP high and low
//!   times.
//!
//! Both may be the same peripheral on small MCUs.

/// Hardware timers driven by the stepper ISR.
pub trait StepperTimer {
    /// Step timer ticks elapsed since the current compare match fired.
    fn count(&mut self) -> u32;

    /// Fire the next compare match `ticks` after the current one.
    fn set_compare(&mut self, ticks: u32);

    /// Free-running pulse counter, wrapping.
    fn pulse_count(&mut self) -> u32;
}

impl<T: StepperTimer + ?Sized> StepperTimer for &mut T {
    #[inline]
    fn count(&mut self) -> u32 {
        (**self).count()
    }

    #[inline]
    fn set_compare(&mut self, ticks: u32) {
        (**self).set_compare(ticks)
    }

    #[inline]
    fn pulse_count(&mut self) -> u32 {
        (**self).pulse_count()
    }
}

/// Busy-wait helper for STEP pulse widths.
///
/// Measures from the edge recorded by [`start`](Self::start), so CPU time spent
/// between pin writes counts toward the pulse width.
#[derive(Debug, Clone, Copy, Default)]
pub struct PulseTiming {
    high_ticks: u32,
    low_ticks: u32,
    start: u32,
}

impl PulseTiming {
    /// Pulse widths in pulse counter ticks.
    pub const fn new(high_ticks: u32, low_ticks: u32) -> Self {
        Self {
            high_ticks,
            low_ticks,
            start: 0,
        }
    }

    /// Record the time of a STEP edge.
    #[inline]
    pub fn start<T: StepperTimer + ?Sized>(&mut self, timer: &mut T) {
        self.start = timer.pulse_count();
    }

    /// Wait until STEP has been high long enough.
    #[inline]
    pub fn await_high<T: StepperTimer + ?Sized>(&self, timer: &mut T) {
        self.wait(timer, self.high_ticks);
    }

    /// Wait until STEP has been low long enough.
    #[inline]
    pub fn await_low<T: StepperTimer + ?Sized>(&self, timer: &mut T) {
        self.wait(timer, self.low_ticks);
    }

    #[inline]
    fn wait<T: StepperTimer + ?Sized>(&self, timer: &mut T, ticks: u32) {
        if ticks == 0 {
            return;
        }
        while timer.pulse_count().wrapping_sub(self.start) < ticks {
            core::hint::spin_loop();
        }
    }
}
