//! Unit tests for TOML configuration parsing.

use stepper_pulse::config::{
    parse_config, AxisKind, CurvePrecision, EngineConfig, EngineSettings, IntervalMode,
};
use stepper_pulse::error::{ConfigError, Error};

const TIMING: &str = r#"
[timing]
step_timer_hz = 2000000
pulse_timer_hz = 72000000
"#;

/// Test that omitted sections fall back to their defaults.
#[test]
fn test_parse_defaults() {
    let toml_str = format!("{}\n[axes.x]\n[axes.y]\n", TIMING);

    let config: EngineConfig = toml::from_str(&toml_str).expect("Failed to parse TOML");

    assert_eq!(config.axis_count(), 2);
    assert_eq!(config.timing.min_pulse_high.value(), 500);
    assert_eq!(config.timing.max_isr_loops, 10);
    assert_eq!(config.timing.interval_mode, IntervalMode::Direct);
    assert_eq!(config.multistep.limit, 16);
    assert!(config.multistep.count_lost_steps);
    assert!(!config.multistep.adaptive_smoothing);
    assert!(!config.motion.s_curve);
    assert_eq!(config.motion.curve_precision, CurvePrecision::Wide);
    assert!(!config.linear_advance.enabled);
    assert_eq!(config.babystep.interval.value(), 20);
}

/// Test that table order defines axis indices.
#[test]
fn test_axis_order_is_index_order() {
    let toml_str = format!(
        "{}\n[axes.z]\n[axes.x]\n[axes.e]\nkind = \"extruder\"\n",
        TIMING
    );

    let config = parse_config(&toml_str).expect("Failed to parse config");

    let names: Vec<&str> = config.axis_names().collect();
    assert_eq!(names, ["z", "x", "e"]);
    assert_eq!(config.axis_index("x"), Some(1));
    assert_eq!(config.axis("e").map(|a| a.kind), Some(AxisKind::Extruder));
    assert_eq!(config.extruder_index(), Some(2));
}

/// Test parsing every optional feature section.
#[test]
fn test_parse_full_config() {
    let toml_str = r#"
[timing]
step_timer_hz = 2000000
pulse_timer_hz = 72000000
min_pulse_high_ns = 1000
min_pulse_low_ns = 1000
dir_setup_ns = 200
dir_hold_ns = 100
isr_margin_us = 2
idle_interval_us = 500
interval_mode = "table"

[multistep]
limit = 32
adaptive_smoothing = true
min_isr_frequency_hz = 30000
count_lost_steps = false

[motion]
s_curve = true
curve_precision = "narrow"

[linear_advance]
enabled = true
k = 0.08

[babystep]
interval_us = 50

[axes.x]
motors = 2
invert_direction = true
enable_group = 0

[axes.x.shaping]
frequency_hz = 45.0
damping_ratio = 0.15
min_frequency_hz = 30.0

[axes.y]
enable_group = 0

[axes.e]
kind = "extruder"
invert_step = true
"#;

    let config = parse_config(toml_str).expect("Failed to parse config");

    assert_eq!(config.timing.interval_mode, IntervalMode::Table);
    assert_eq!(config.timing.isr_margin_ticks(), 4);
    assert_eq!(config.timing.idle_interval_ticks(), 1000);
    assert_eq!(config.multistep.limit, 32);
    assert_eq!(config.multistep.min_isr_frequency.value(), 30_000);
    assert!(!config.multistep.count_lost_steps);
    assert_eq!(config.motion.curve_precision, CurvePrecision::Narrow);
    assert_eq!(config.linear_advance.k, 0.08);
    assert_eq!(config.babystep.interval.value(), 50);

    let x = config.axis("x").expect("Axis not found");
    assert_eq!(x.motors, 2);
    assert!(x.invert_direction);
    assert_eq!(x.enable_group, Some(0));
    let shaping = x.shaping.expect("Shaping not parsed");
    assert_eq!(shaping.frequency_hz, 45.0);
    assert_eq!(shaping.damping_ratio, 0.15);
    assert_eq!(shaping.min_frequency(), 30.0);
    assert!(config.axis("e").map(|a| a.invert_step).unwrap_or(false));
}

/// Test that settings convert configuration units into timer ticks.
#[test]
fn test_settings_from_config() {
    let toml_str = format!(
        "{}\n[linear_advance]\nenabled = true\nk = 0.05\n\n[axes.x]\n[axes.x.shaping]\nfrequency_hz = 40.0\n\n[axes.e]\nkind = \"extruder\"\n",
        TIMING
    );
    let config = parse_config(&toml_str).expect("Failed to parse config");

    let settings = EngineSettings::from_config(&config).expect("Invalid settings");

    assert_eq!(settings.timer_rate, 2_000_000);
    assert_eq!(settings.axis_count, 2);
    assert_eq!(settings.idle_ticks, 2000);
    assert_eq!(settings.babystep_ticks, 40);
    assert_eq!(settings.pulse_high_ticks, 36);
    assert!(settings.linear_advance);
    assert_eq!(settings.extruder, Some(1));

    let shaping = settings.shaping[0].expect("Shaping settings missing");
    // Half a period of 40 Hz
    assert_eq!(shaping.delay_ticks, 25_000);
    assert_eq!(u16::from(shaping.factor1) + u16::from(shaping.factor2), 128);
    assert!(settings.shaping[1].is_none());
}

/// Test that malformed TOML is reported as a parse error.
#[test]
fn test_parse_error() {
    let result = parse_config("[timing\nstep_timer_hz = ");
    assert!(matches!(result, Err(Error::Config(ConfigError::ParseError(_)))));

    // Timing section is required
    let result = parse_config("[axes.x]\n");
    assert!(matches!(result, Err(Error::Config(ConfigError::ParseError(_)))));
}

/// Test that unknown enum values are rejected.
#[test]
fn test_unknown_axis_kind() {
    let toml_str = format!("{}\n[axes.x]\nkind = \"rotary\"\n", TIMING);
    assert!(parse_config(&toml_str).is_err());
}
