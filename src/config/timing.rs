//! Timer and pulse timing configuration.

use serde::Deserialize;

use super::units::{Hertz, Microseconds, Nanoseconds};

/// How step rates are turned into timer intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum IntervalMode {
    /// Integer division, for CPUs with a hardware divider.
    #[default]
    Direct,
    /// Piecewise-linear lookup table, for CPUs without one.
    Table,
}

/// Hardware timing parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Clock of the scheduling (compare-match) timer.
    #[serde(rename = "step_timer_hz")]
    pub step_timer: Hertz,

    /// Clock of the free-running counter used for pulse-width busy-waits.
    #[serde(rename = "pulse_timer_hz")]
    pub pulse_timer: Hertz,

    /// Minimum STEP high time.
    #[serde(default = "default_pulse_ns", rename = "min_pulse_high_ns")]
    pub min_pulse_high: Nanoseconds,

    /// Minimum STEP low time.
    #[serde(default = "default_pulse_ns", rename = "min_pulse_low_ns")]
    pub min_pulse_low: Nanoseconds,

    /// CPU overhead already spent between pin writes, subtracted from pulse widths.
    #[serde(default, rename = "pulse_setup_ns")]
    pub pulse_setup: Nanoseconds,

    /// Wait before a DIR change.
    #[serde(default = "default_dir_ns", rename = "dir_setup_ns")]
    pub dir_setup: Nanoseconds,

    /// Wait after a DIR change, before the next STEP edge.
    #[serde(default = "default_dir_ns", rename = "dir_hold_ns")]
    pub dir_hold: Nanoseconds,

    /// Scheduling margin added to the timer count when programming the next deadline.
    #[serde(default = "default_isr_margin", rename = "isr_margin_us")]
    pub isr_margin: Microseconds,

    /// Maximum passes through the ISR loop before forcing a deadline.
    #[serde(default = "default_max_isr_loops")]
    pub max_isr_loops: u8,

    /// Interval used while the block queue is empty.
    #[serde(default = "default_idle_interval", rename = "idle_interval_us")]
    pub idle_interval: Microseconds,

    /// Rate-to-interval conversion strategy.
    #[serde(default)]
    pub interval_mode: IntervalMode,
}

fn default_pulse_ns() -> Nanoseconds {
    Nanoseconds(500)
}

fn default_dir_ns() -> Nanoseconds {
    Nanoseconds(50)
}

fn default_isr_margin() -> Microseconds {
    Microseconds(1)
}

fn default_max_isr_loops() -> u8 {
    10
}

fn default_idle_interval() -> Microseconds {
    Microseconds(1000)
}

impl TimingConfig {
    /// STEP high busy-wait in pulse timer ticks.
    pub fn pulse_high_ticks(&self) -> u32 {
        self.min_pulse_high
            .saturating_sub(self.pulse_setup)
            .to_ticks(self.pulse_timer)
    }

    /// STEP low busy-wait in pulse timer ticks.
    pub fn pulse_low_ticks(&self) -> u32 {
        self.min_pulse_low
            .saturating_sub(self.pulse_setup)
            .to_ticks(self.pulse_timer)
    }

    /// Highest step rate the pulse widths allow on one axis.
    pub fn max_step_rate(&self) -> u32 {
        let period = (self.min_pulse_high + self.min_pulse_low).value().max(1);
        1_000_000_000 / period
    }

    /// Scheduling margin in step timer ticks.
    pub fn isr_margin_ticks(&self) -> u32 {
        self.isr_margin.to_ticks(self.step_timer)
    }

    /// Idle interval in step timer ticks.
    pub fn idle_interval_ticks(&self) -> u32 {
        self.idle_interval.to_ticks(self.step_timer).max(1)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            step_timer: Hertz(2_000_000),
            pulse_timer: Hertz(2_000_000),
            min_pulse_high: default_pulse_ns(),
            min_pulse_low: default_pulse_ns(),
            pulse_setup: Nanoseconds(0),
            dir_setup: default_dir_ns(),
            dir_hold: default_dir_ns(),
            isr_margin: default_isr_margin(),
            max_isr_loops: default_max_isr_loops(),
            idle_interval: default_idle_interval(),
            interval_mode: IntervalMode::Direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_ticks_subtract_setup() {
        let timing = TimingConfig {
            pulse_timer: Hertz(100_000_000),
            min_pulse_high: Nanoseconds(1000),
            min_pulse_low: Nanoseconds(2000),
            pulse_setup: Nanoseconds(200),
            ..TimingConfig::default()
        };

        assert_eq!(timing.pulse_high_ticks(), 80);
        assert_eq!(timing.pulse_low_ticks(), 180);
        assert_eq!(timing.max_step_rate(), 333_333);
    }

    #[test]
    fn test_setup_longer_than_pulse() {
        let timing = TimingConfig {
            min_pulse_high: Nanoseconds(100),
            pulse_setup: Nanoseconds(500),
            ..TimingConfig::default()
        };

        assert_eq!(timing.pulse_high_ticks(), 0);
    }

    #[test]
    fn test_default_idle_is_one_millisecond() {
        let timing = TimingConfig::default();
        assert_eq!(timing.idle_interval_ticks(), 2000);
        assert_eq!(timing.isr_margin_ticks(), 2);
    }
}
