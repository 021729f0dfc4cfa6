//! Tick-domain settings derived from an [`EngineConfig`].
//!
//! Everything the ISR needs is converted to timer ticks once at startup so the
//! hot path never touches floating point or unit conversions.

use crate::error::Result;
use crate::motion::{IntervalCalculator, MAX_AXES};
use crate::stepper::{echo_delay_ticks, zv_factors};

use super::axis::ShapingConfig;
use super::features::CurvePrecision;
use super::timing::IntervalMode;
use super::validation::validate_config;
use super::EngineConfig;

/// Input shaping parameters of one axis, in ISR units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapingSettings {
    /// Cancelled frequency in Hz. Zero means shaping is off.
    pub frequency: f32,
    /// Damping ratio of the cancelled resonance.
    pub damping_ratio: f32,
    /// Lowest frequency the echo queue was sized for.
    pub min_frequency: f32,
    /// Half-step hysteresis on direction reversal.
    pub hysteresis: bool,
    /// Echo delay in step timer ticks.
    pub delay_ticks: u32,
    /// Share of each step given to the primary pulse (out of 128).
    pub factor1: u8,
    /// Share of each step given to the echo (out of 128).
    pub factor2: u8,
}

impl ShapingSettings {
    /// Derive from configuration for a step timer at `timer_rate` Hz.
    pub fn new(timer_rate: u32, config: &ShapingConfig) -> Self {
        let (factor1, factor2) = zv_factors(config.damping_ratio);
        Self {
            frequency: config.frequency_hz,
            damping_ratio: config.damping_ratio,
            min_frequency: config.min_frequency(),
            hysteresis: config.hysteresis,
            delay_ticks: echo_delay_ticks(timer_rate, config.frequency_hz),
            factor1,
            factor2,
        }
    }

    /// Whether echoes are currently produced.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.delay_ticks != 0
    }
}

/// All values the engine needs at runtime.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Step timer frequency.
    pub timer_rate: u32,
    /// Rate-to-interval strategy.
    pub interval_mode: IntervalMode,
    /// STEP high busy-wait, pulse timer ticks.
    pub pulse_high_ticks: u32,
    /// STEP low busy-wait, pulse timer ticks.
    pub pulse_low_ticks: u32,
    /// Wait before a DIR change, nanoseconds.
    pub dir_setup_ns: u32,
    /// Wait after a DIR change, nanoseconds.
    pub dir_hold_ns: u32,
    /// Scheduling margin, step timer ticks.
    pub isr_margin_ticks: u32,
    /// Passes through the ISR loop before the deadline is forced.
    pub max_isr_loops: u8,
    /// Interval while idle, step timer ticks.
    pub idle_ticks: u32,
    /// Spacing of babystep pulses, step timer ticks.
    pub babystep_ticks: u32,
    /// Ceiling for pulses per ISR call.
    pub multistep_limit: u32,
    /// Oversample slow blocks.
    pub adaptive_smoothing: bool,
    /// Lowest ISR rate adaptive smoothing aims for.
    pub min_isr_frequency: u32,
    /// Count overruns at the multistep ceiling.
    pub count_lost_steps: bool,
    /// Bézier velocity profile instead of the trapezoid.
    pub s_curve: bool,
    /// Fixed-point width of the Bézier evaluator.
    pub curve_precision: CurvePrecision,
    /// Linear advance enabled.
    pub linear_advance: bool,
    /// Extruder axis, if exactly one is configured.
    pub extruder: Option<usize>,
    /// Number of configured axes.
    pub axis_count: usize,
    /// Motors per axis.
    pub motors: [u8; MAX_AXES],
    /// Shared enable line id per axis.
    pub enable_groups: [Option<u8>; MAX_AXES],
    /// Input shaping per axis.
    pub shaping: [Option<ShapingSettings>; MAX_AXES],
}

impl EngineSettings {
    /// Validate `config` and derive the runtime settings.
    ///
    /// # Errors
    ///
    /// Returns any validation error from [`validate_config`].
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        validate_config(config)?;

        let timing = &config.timing;
        let timer_rate = timing.step_timer.value();

        let mut motors = [0u8; MAX_AXES];
        let mut enable_groups = [None; MAX_AXES];
        let mut shaping = [None; MAX_AXES];
        for (index, axis) in config.axes.values().enumerate() {
            motors[index] = axis.motors;
            enable_groups[index] = axis.enable_group;
            shaping[index] = axis
                .shaping
                .as_ref()
                .map(|s| ShapingSettings::new(timer_rate, s));
        }

        Ok(Self {
            timer_rate,
            interval_mode: timing.interval_mode,
            pulse_high_ticks: timing.pulse_high_ticks(),
            pulse_low_ticks: timing.pulse_low_ticks(),
            dir_setup_ns: timing.dir_setup.value(),
            dir_hold_ns: timing.dir_hold.value(),
            isr_margin_ticks: timing.isr_margin_ticks(),
            max_isr_loops: timing.max_isr_loops.max(1),
            idle_ticks: timing.idle_interval_ticks(),
            babystep_ticks: config.babystep.interval.to_ticks(timing.step_timer).max(1),
            multistep_limit: config.multistep.limit,
            adaptive_smoothing: config.multistep.adaptive_smoothing,
            min_isr_frequency: config.multistep.min_isr_frequency.value(),
            count_lost_steps: config.multistep.count_lost_steps,
            s_curve: config.motion.s_curve,
            curve_precision: config.motion.curve_precision,
            linear_advance: config.linear_advance.enabled,
            extruder: config.extruder_index(),
            axis_count: config.axis_count(),
            motors,
            enable_groups,
            shaping,
        })
    }

    /// Interval calculator matching these settings.
    pub fn interval_calculator(&self) -> IntervalCalculator {
        IntervalCalculator::new(self.interval_mode, self.timer_rate)
    }
}
