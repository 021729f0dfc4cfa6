//! Builder pattern for StepperDriver.

use embedded_hal::digital::OutputPin;

use crate::config::EngineConfig;
use crate::error::{ConfigError, Error, Result};

use super::driver::{NoEnable, Polarity, StepperDriver};

/// Builder for creating [`StepperDriver`] instances.
///
/// # Example
///
/// ```rust,ignore
/// let driver = StepperDriverBuilder::new()
///     .step_pin(x_step)
///     .dir_pin(x_dir)
///     .enable_pin(x_en)
///     .from_config(&config, "x")?
///     .build()?;
/// ```
pub struct StepperDriverBuilder<STEP, DIR, EN = NoEnable>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    step_pin: Option<STEP>,
    dir_pin: Option<DIR>,
    enable_pin: EN,
    polarity: Polarity,
}

impl<STEP, DIR> Default for StepperDriverBuilder<STEP, DIR, NoEnable>
where
    STEP: OutputPin,
    DIR: OutputPin,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<STEP, DIR> StepperDriverBuilder<STEP, DIR, NoEnable>
where
    STEP: OutputPin,
    DIR: OutputPin,
{
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            step_pin: None,
            dir_pin: None,
            enable_pin: NoEnable,
            polarity: Polarity::default(),
        }
    }
}

impl<STEP, DIR, EN> StepperDriverBuilder<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    /// Set the STEP pin.
    pub fn step_pin(mut self, pin: STEP) -> Self {
        self.step_pin = Some(pin);
        self
    }

    /// Set the DIR pin.
    pub fn dir_pin(mut self, pin: DIR) -> Self {
        self.dir_pin = Some(pin);
        self
    }

    /// Set the ENABLE pin.
    pub fn enable_pin<E: OutputPin>(self, pin: E) -> StepperDriverBuilder<STEP, DIR, E> {
        StepperDriverBuilder {
            step_pin: self.step_pin,
            dir_pin: self.dir_pin,
            enable_pin: pin,
            polarity: self.polarity,
        }
    }

    /// Set STEP inversion (active-low pulses).
    pub fn invert_step(mut self, invert: bool) -> Self {
        self.polarity.invert_step = invert;
        self
    }

    /// Set direction inversion.
    pub fn invert_direction(mut self, invert: bool) -> Self {
        self.polarity.invert_direction = invert;
        self
    }

    /// Set ENABLE inversion (active-high enable).
    pub fn invert_enable(mut self, invert: bool) -> Self {
        self.polarity.invert_enable = invert;
        self
    }

    /// Take pin polarities from the axis named `axis_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AxisNotFound`] if the axis is not configured.
    pub fn from_config(mut self, config: &EngineConfig, axis_name: &str) -> Result<Self> {
        let axis = config.axis(axis_name).ok_or_else(|| {
            Error::Config(ConfigError::AxisNotFound(
                heapless::String::try_from(axis_name).unwrap_or_default(),
            ))
        })?;
        self.polarity = Polarity::from_axis(axis);
        Ok(self)
    }

    /// Build the StepperDriver.
    ///
    /// # Errors
    ///
    /// Returns an error if the STEP or DIR pin is missing.
    pub fn build(self) -> Result<StepperDriver<STEP, DIR, EN>> {
        let step_pin = self.step_pin.ok_or_else(|| missing("step_pin is required"))?;
        let dir_pin = self.dir_pin.ok_or_else(|| missing("dir_pin is required"))?;

        Ok(StepperDriver::with_enable(
            step_pin,
            dir_pin,
            self.enable_pin,
            self.polarity,
        ))
    }
}

fn missing(message: &str) -> Error {
    Error::Config(ConfigError::ParseError(
        heapless::String::try_from(message).unwrap_or_default(),
    ))
}
