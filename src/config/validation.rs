//! Configuration validation.

use crate::error::{ConfigError, Error, Result};
use crate::motion::{IntervalCalculator, MAX_AXES, MAX_MOTORS_PER_AXIS};
use crate::stepper::{MAX_SHAPED_AXES, SHAPING_QUEUE_LEN};

use super::axis::{AxisConfig, AxisKind};
use super::timing::IntervalMode;
use super::EngineConfig;

/// Highest multistep ceiling accepted.
const MAX_MULTISTEP_LIMIT: u32 = 128;

/// Number of distinct enable lines that can be shared.
const MAX_ENABLE_GROUPS: u8 = 8;

/// Validate an engine configuration.
///
/// Checks:
/// - Timer rates are non-zero and the interval mode fits the step timer
/// - Pulse widths are non-zero and a full pulse fits in the idle interval
/// - Multistep limit is a power of two up to 128
/// - Axis count, motor counts and enable groups are in range
/// - Shaping parameters are sane and the echo queue is large enough
/// - Linear advance has exactly one extruder to drive
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    validate_timing(config)?;

    let limit = config.multistep.limit;
    if limit == 0 || limit > MAX_MULTISTEP_LIMIT || !limit.is_power_of_two() {
        return Err(Error::Config(ConfigError::InvalidMultistepLimit(limit)));
    }

    let min_isr = config.multistep.min_isr_frequency.value();
    if min_isr > config.timing.step_timer.value() / 2 {
        return Err(Error::Config(ConfigError::InvalidMinIsrFrequency(min_isr)));
    }

    if config.axes.len() > MAX_AXES {
        return Err(Error::Config(ConfigError::TooManyAxes(config.axes.len())));
    }

    for (_name, axis) in config.axes.iter() {
        validate_axis(axis)?;
    }

    let shaped = config.axes.values().filter(|axis| axis.is_shaped()).count();
    if shaped > MAX_SHAPED_AXES {
        return Err(Error::Config(ConfigError::TooManyShapedAxes(shaped)));
    }

    if config.linear_advance.enabled && config.extruder_index().is_none() {
        return Err(Error::Config(ConfigError::ExtruderNotFound));
    }

    if config.babystep.interval.value() == 0 {
        return Err(Error::Config(ConfigError::InvalidBabystepInterval(
            config.babystep.interval.value(),
        )));
    }

    Ok(())
}

fn validate_timing(config: &EngineConfig) -> Result<()> {
    let timing = &config.timing;

    if timing.step_timer.value() == 0 {
        return Err(Error::Config(ConfigError::InvalidTimerRate(
            timing.step_timer.value(),
        )));
    }
    if timing.pulse_timer.value() == 0 {
        return Err(Error::Config(ConfigError::InvalidTimerRate(
            timing.pulse_timer.value(),
        )));
    }

    let high = timing.min_pulse_high.value();
    let low = timing.min_pulse_low.value();
    let period = timing.min_pulse_high + timing.min_pulse_low;
    if high == 0 || low == 0 || period >= timing.idle_interval.to_nanos() {
        return Err(Error::Config(ConfigError::InvalidPulseWidth {
            high_ns: high,
            low_ns: low,
        }));
    }

    if timing.interval_mode == IntervalMode::Table
        && IntervalCalculator::table_minimal_rate(timing.step_timer.value())
            >= IntervalCalculator::FAST_TABLE_START
    {
        return Err(Error::Config(ConfigError::InvalidIntervalMode(
            timing.step_timer.value(),
        )));
    }

    Ok(())
}

fn validate_axis(axis: &AxisConfig) -> Result<()> {
    if axis.motors == 0 || axis.motors as usize > MAX_MOTORS_PER_AXIS {
        return Err(Error::Config(ConfigError::InvalidMotorCount(axis.motors)));
    }

    if let Some(group) = axis.enable_group {
        if group >= MAX_ENABLE_GROUPS {
            return Err(Error::Config(ConfigError::InvalidEnableGroup(group)));
        }
    }

    if let Some(ref shaping) = axis.shaping {
        if axis.kind == AxisKind::Extruder {
            return Err(Error::Config(ConfigError::InvalidShapingFrequency(
                shaping.frequency_hz,
            )));
        }

        // Zero is allowed and means "configured but currently off"
        if shaping.frequency_hz < 0.0 || !shaping.frequency_hz.is_finite() {
            return Err(Error::Config(ConfigError::InvalidShapingFrequency(
                shaping.frequency_hz,
            )));
        }

        let min_freq = shaping.min_frequency();
        if min_freq <= 0.0 || (shaping.frequency_hz > 0.0 && shaping.frequency_hz < min_freq) {
            return Err(Error::Config(ConfigError::InvalidShapingFrequency(min_freq)));
        }

        if !(0.0..1.0).contains(&shaping.damping_ratio) {
            return Err(Error::Config(ConfigError::InvalidDampingRatio(
                shaping.damping_ratio,
            )));
        }

        let required = shaping.required_queue_len();
        if required > SHAPING_QUEUE_LEN {
            return Err(Error::Config(ConfigError::ShapingQueueTooSmall {
                required,
                capacity: SHAPING_QUEUE_LEN,
            }));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShapingConfig;

    fn config_with(axis: AxisConfig) -> EngineConfig {
        EngineConfig::default().with_axis("x", axis).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = config_with(AxisConfig::linear());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_motor_count() {
        let mut axis = AxisConfig::linear();
        axis.motors = 5;

        let result = validate_config(&config_with(axis));
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidMotorCount(5)))
        ));
    }

    #[test]
    fn test_multistep_limit_power_of_two() {
        let mut config = config_with(AxisConfig::linear());
        config.multistep.limit = 12;

        assert!(matches!(
            validate_config(&config),
            Err(Error::Config(ConfigError::InvalidMultistepLimit(12)))
        ));
    }

    #[test]
    fn test_min_isr_frequency_ceiling() {
        let mut config = config_with(AxisConfig::linear());
        config.multistep.min_isr_frequency.0 = 1_000_000;
        assert!(validate_config(&config).is_ok());

        config.multistep.min_isr_frequency.0 = 3_000_000_000;
        assert!(matches!(
            validate_config(&config),
            Err(Error::Config(ConfigError::InvalidMinIsrFrequency(3_000_000_000)))
        ));
    }

    #[test]
    fn test_shaping_queue_capacity() {
        let mut shaping = ShapingConfig::new(5.0);
        shaping.max_step_rate = 100_000;
        let mut axis = AxisConfig::linear();
        axis.shaping = Some(shaping);

        assert!(matches!(
            validate_config(&config_with(axis)),
            Err(Error::Config(ConfigError::ShapingQueueTooSmall { .. }))
        ));
    }

    #[test]
    fn test_damping_ratio_range() {
        let mut shaping = ShapingConfig::new(40.0);
        shaping.damping_ratio = 1.0;
        let mut axis = AxisConfig::linear();
        axis.shaping = Some(shaping);

        assert!(matches!(
            validate_config(&config_with(axis)),
            Err(Error::Config(ConfigError::InvalidDampingRatio(_)))
        ));
    }

    #[test]
    fn test_linear_advance_needs_extruder() {
        let mut config = config_with(AxisConfig::linear());
        config.linear_advance.enabled = true;

        assert!(matches!(
            validate_config(&config),
            Err(Error::Config(ConfigError::ExtruderNotFound))
        ));
    }
}
