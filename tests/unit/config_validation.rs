//! Unit tests for configuration validation.

use stepper_pulse::config::{
    parse_config, validate_config, AxisConfig, EngineConfig, IntervalMode, ShapingConfig,
};
use stepper_pulse::error::{ConfigError, Error};
use stepper_pulse::Hertz;

fn xy() -> EngineConfig {
    EngineConfig::default()
        .with_axis("x", AxisConfig::linear())
        .and_then(|c| c.with_axis("y", AxisConfig::linear()))
        .expect("Failed to add axes")
}

fn config_error(config: &EngineConfig) -> ConfigError {
    match validate_config(config) {
        Err(Error::Config(e)) => e,
        other => panic!("expected a config error, got {:?}", other),
    }
}

/// Test validation of a valid configuration.
#[test]
fn test_valid_config_passes_validation() {
    assert!(validate_config(&xy()).is_ok());

    let toml_str = r#"
[timing]
step_timer_hz = 2000000
pulse_timer_hz = 72000000

[axes.x]
[axes.x.shaping]
frequency_hz = 0.0
min_frequency_hz = 25.0
"#;
    // Shaping may start switched off
    assert!(parse_config(toml_str).is_ok());
}

/// Test validation fails for a zero timer rate.
#[test]
fn test_zero_timer_rate() {
    let mut config = xy();
    config.timing.step_timer = Hertz(0);
    assert_eq!(config_error(&config), ConfigError::InvalidTimerRate(0));
}

/// Test validation fails when a full pulse does not fit the idle interval.
#[test]
fn test_pulse_wider_than_idle_interval() {
    let mut config = xy();
    config.timing.min_pulse_high.0 = 600_000;
    config.timing.min_pulse_low.0 = 600_000;
    assert!(matches!(
        config_error(&config),
        ConfigError::InvalidPulseWidth { high_ns: 600_000, .. }
    ));
}

/// Test validation fails for a multistep limit that is not a power of two.
#[test]
fn test_invalid_multistep_limit() {
    for limit in [0, 12, 256] {
        let mut config = xy();
        config.multistep.limit = limit;
        assert_eq!(config_error(&config), ConfigError::InvalidMultistepLimit(limit));
    }
}

/// Test that the smoothing ISR frequency stays below half the step timer.
#[test]
fn test_min_isr_frequency_above_timer() {
    let mut config = xy();
    config.multistep.adaptive_smoothing = true;
    config.multistep.min_isr_frequency = Hertz(1_000_001);
    assert_eq!(
        config_error(&config),
        ConfigError::InvalidMinIsrFrequency(1_000_001)
    );

    config.timing.step_timer = Hertz(4_000_000);
    assert!(validate_config(&config).is_ok());
}

/// Test that lookup-table intervals need a timer slow enough for 16 bits.
#[test]
fn test_table_mode_timer_rate() {
    let mut config = xy();
    config.timing.interval_mode = IntervalMode::Table;
    assert!(validate_config(&config).is_ok());

    config.timing.step_timer = Hertz(200_000_000);
    assert_eq!(
        config_error(&config),
        ConfigError::InvalidIntervalMode(200_000_000)
    );
}

/// Test validation of motor counts and enable groups.
#[test]
fn test_motor_count_and_enable_group() {
    let mut axis = AxisConfig::linear();
    axis.motors = 5;
    let config = EngineConfig::default().with_axis("z", axis).expect("Failed to add axis");
    assert_eq!(config_error(&config), ConfigError::InvalidMotorCount(5));

    let mut axis = AxisConfig::linear();
    axis.enable_group = Some(8);
    let config = EngineConfig::default().with_axis("z", axis).expect("Failed to add axis");
    assert_eq!(config_error(&config), ConfigError::InvalidEnableGroup(8));
}

/// Test validation of input shaping parameters.
#[test]
fn test_shaping_parameters() {
    let shaped = |shaping: ShapingConfig| {
        let mut axis = AxisConfig::linear();
        axis.shaping = Some(shaping);
        EngineConfig::default().with_axis("x", axis).expect("Failed to add axis")
    };

    let mut shaping = ShapingConfig::new(40.0);
    shaping.damping_ratio = 1.0;
    assert_eq!(
        config_error(&shaped(shaping)),
        ConfigError::InvalidDampingRatio(1.0)
    );

    assert!(matches!(
        config_error(&shaped(ShapingConfig::new(-5.0))),
        ConfigError::InvalidShapingFrequency(_)
    ));

    // Off, with no frequency to size the echo queue for
    assert!(matches!(
        config_error(&shaped(ShapingConfig::new(0.0))),
        ConfigError::InvalidShapingFrequency(_)
    ));

    let mut shaping = ShapingConfig::new(10.0);
    shaping.max_step_rate = 50_000;
    assert!(matches!(
        config_error(&shaped(shaping)),
        ConfigError::ShapingQueueTooSmall { capacity: 256, .. }
    ));

    let mut extruder = AxisConfig::extruder();
    extruder.shaping = Some(ShapingConfig::new(40.0));
    let config = EngineConfig::default().with_axis("e", extruder).expect("Failed to add axis");
    assert!(validate_config(&config).is_err());
}

/// Test that at most three axes are shaped.
#[test]
fn test_too_many_shaped_axes() {
    let mut config = EngineConfig::default();
    for name in ["x", "y", "z", "a"] {
        let mut axis = AxisConfig::linear();
        axis.shaping = Some(ShapingConfig::new(40.0));
        config = config.with_axis(name, axis).expect("Failed to add axis");
    }
    assert_eq!(config_error(&config), ConfigError::TooManyShapedAxes(4));
}

/// Test that linear advance needs exactly one extruder.
#[test]
fn test_linear_advance_needs_extruder() {
    let mut config = xy();
    config.linear_advance.enabled = true;
    assert_eq!(config_error(&config), ConfigError::ExtruderNotFound);

    let config_two = config
        .clone()
        .with_axis("e0", AxisConfig::extruder())
        .and_then(|c| c.with_axis("e1", AxisConfig::extruder()))
        .expect("Failed to add axes");
    assert_eq!(config_error(&config_two), ConfigError::ExtruderNotFound);

    let config_one = config
        .with_axis("e", AxisConfig::extruder())
        .expect("Failed to add axis");
    assert!(validate_config(&config_one).is_ok());
}

/// Test validation fails for a zero babystep interval.
#[test]
fn test_zero_babystep_interval() {
    let mut config = xy();
    config.babystep.interval.0 = 0;
    assert_eq!(config_error(&config), ConfigError::InvalidBabystepInterval(0));
}
