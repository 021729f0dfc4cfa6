//! Configuration module for stepper-pulse.
//!
//! Provides types for loading and validating engine configurations from TOML
//! files (with `std` feature) or pre-parsed data, and the tick-domain
//! [`EngineSettings`] derived from them.

mod axis;
mod features;
mod settings;
mod system;
mod timing;
pub mod units;
#[cfg(feature = "std")]
mod loader;
mod validation;

pub use axis::{AxisConfig, AxisKind, ShapingConfig};
pub use features::{
    BabystepConfig, CurvePrecision, LinearAdvanceConfig, MotionConfig, MultistepConfig,
};
pub use settings::{EngineSettings, ShapingSettings};
pub use system::EngineConfig;
pub use timing::{IntervalMode, TimingConfig};
pub use validation::validate_config;

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};

// Re-export unit types at config level
pub use units::{Hertz, Microseconds, Nanoseconds};
