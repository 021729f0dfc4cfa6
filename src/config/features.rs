//! Optional engine features: multistepping, S-curve, linear advance, babystepping.

use serde::Deserialize;

use super::units::{Hertz, Microseconds};

/// Multi-stepping and adaptive step smoothing.
#[derive(Debug, Clone, Deserialize)]
pub struct MultistepConfig {
    /// Ceiling for pulses per ISR call (power of two).
    #[serde(default = "default_multistep_limit")]
    pub limit: u32,

    /// Oversample slow blocks so the ISR runs at least `min_isr_frequency_hz`.
    #[serde(default)]
    pub adaptive_smoothing: bool,

    /// Lowest ISR rate adaptive smoothing aims for.
    #[serde(default = "default_min_isr_frequency", rename = "min_isr_frequency_hz")]
    pub min_isr_frequency: Hertz,

    /// Count overruns that happen while already at the multistep ceiling.
    #[serde(default = "default_true")]
    pub count_lost_steps: bool,
}

fn default_multistep_limit() -> u32 {
    16
}

fn default_min_isr_frequency() -> Hertz {
    Hertz(20_000)
}

fn default_true() -> bool {
    true
}

impl Default for MultistepConfig {
    fn default() -> Self {
        Self {
            limit: default_multistep_limit(),
            adaptive_smoothing: false,
            min_isr_frequency: default_min_isr_frequency(),
            count_lost_steps: true,
        }
    }
}

/// Fixed-point width used by the S-curve evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum CurvePrecision {
    /// 32-bit time base with a 64-bit accumulator.
    #[default]
    Wide,
    /// 16-bit time base with 24-bit products, for 8-bit CPUs.
    Narrow,
}

/// Velocity profile selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MotionConfig {
    /// Use the quintic Bézier (S-curve) velocity profile instead of the trapezoid.
    #[serde(default)]
    pub s_curve: bool,

    /// Fixed-point width of the S-curve evaluator.
    #[serde(default)]
    pub curve_precision: CurvePrecision,
}

/// Linear advance (pressure compensation on the extruder).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinearAdvanceConfig {
    /// Enable extra extruder pulses proportional to acceleration.
    #[serde(default)]
    pub enabled: bool,

    /// Advance gain: extra extruder steps per unit of extruder step rate.
    #[serde(default)]
    pub k: f32,
}

/// Babystepping (live single-pulse injection).
#[derive(Debug, Clone, Deserialize)]
pub struct BabystepConfig {
    /// Spacing between injected pulses.
    #[serde(default = "default_babystep_interval", rename = "interval_us")]
    pub interval: Microseconds,
}

fn default_babystep_interval() -> Microseconds {
    Microseconds(20)
}

impl Default for BabystepConfig {
    fn default() -> Self {
        Self {
            interval: default_babystep_interval(),
        }
    }
}
