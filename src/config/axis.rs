//! Axis configuration from TOML.

use serde::Deserialize;

/// Role of a logical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    /// Positioning axis (X, Y, Z and extra linear/rotary axes).
    #[default]
    Linear,
    /// Filament extruder, the target of linear advance.
    Extruder,
}

/// Input shaping (ZV) parameters for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ShapingConfig {
    /// Resonant frequency to cancel. Zero disables shaping at startup.
    pub frequency_hz: f32,

    /// Damping ratio of the resonance, in [0, 1).
    #[serde(default = "default_damping_ratio")]
    pub damping_ratio: f32,

    /// Half-step hysteresis on echo direction reversals.
    #[serde(default)]
    pub hysteresis: bool,

    /// Lowest frequency accepted at runtime. Defaults to `frequency_hz`.
    #[serde(default)]
    pub min_frequency_hz: Option<f32>,

    /// Fastest step rate this axis will see, used to size the echo queue.
    #[serde(default = "default_shaping_max_step_rate")]
    pub max_step_rate: u32,
}

fn default_damping_ratio() -> f32 {
    0.1
}

fn default_shaping_max_step_rate() -> u32 {
    10_000
}

impl ShapingConfig {
    /// Shaping at `frequency_hz` with default damping and no hysteresis.
    pub fn new(frequency_hz: f32) -> Self {
        Self {
            frequency_hz,
            damping_ratio: default_damping_ratio(),
            hysteresis: false,
            min_frequency_hz: None,
            max_step_rate: default_shaping_max_step_rate(),
        }
    }

    /// Lowest frequency the echo queue is sized for.
    pub fn min_frequency(&self) -> f32 {
        self.min_frequency_hz.unwrap_or(self.frequency_hz)
    }

    /// Echo queue entries needed at `max_step_rate` and the lowest frequency.
    pub fn required_queue_len(&self) -> usize {
        let min_freq = self.min_frequency();
        if min_freq <= 0.0 {
            return usize::MAX;
        }
        (self.max_step_rate as f32 / (2.0 * min_freq)) as usize + 3
    }
}

/// Complete configuration of one logical axis.
#[derive(Debug, Clone, Deserialize)]
pub struct AxisConfig {
    /// Axis role.
    #[serde(default)]
    pub kind: AxisKind,

    /// Invert DIR pin logic.
    #[serde(default)]
    pub invert_direction: bool,

    /// STEP pulses are active-low.
    #[serde(default)]
    pub invert_step: bool,

    /// ENABLE pin is active-high (most drivers enable on low).
    #[serde(default)]
    pub invert_enable: bool,

    /// Number of motors driven by this axis (2..=4 for multi-endstop axes).
    #[serde(default = "default_motors")]
    pub motors: u8,

    /// Axes with the same group id share one physical enable line.
    #[serde(default)]
    pub enable_group: Option<u8>,

    /// Optional input shaping.
    #[serde(default)]
    pub shaping: Option<ShapingConfig>,
}

fn default_motors() -> u8 {
    1
}

impl AxisConfig {
    /// A single-motor linear axis with default pin polarities.
    pub fn linear() -> Self {
        Self {
            kind: AxisKind::Linear,
            invert_direction: false,
            invert_step: false,
            invert_enable: false,
            motors: 1,
            enable_group: None,
            shaping: None,
        }
    }

    /// A single-motor extruder axis.
    pub fn extruder() -> Self {
        Self {
            kind: AxisKind::Extruder,
            ..Self::linear()
        }
    }

    /// Whether input shaping is configured for this axis.
    #[inline]
    pub fn is_shaped(&self) -> bool {
        self.shaping.is_some()
    }
}
