//! Builder pattern for StepperEngine.

use embedded_hal::delay::DelayNs;
use heapless::{String, Vec};

use crate::config::{EngineConfig, EngineSettings};
use crate::error::{ConfigError, Error, Result};
use crate::motion::{Planner, MAX_AXES};
use crate::motor::{AxisBank, AxisDriver, StepperTimer};

use super::engine::StepperEngine;
use super::signals::EngineSignals;

/// Builder for creating [`StepperEngine`] instances.
///
/// # Example
///
/// ```rust,ignore
/// static SIGNALS: EngineSignals = EngineSignals::new();
///
/// let engine = EngineBuilder::new()
///     .config(&config)?
///     .planner(consumer)
///     .timer(timer)
///     .delay(delay)
///     .signals(&SIGNALS)
///     .attach_named("x", x_driver)?
///     .attach_named("y", y_driver)?
///     .build()?;
/// ```
pub struct EngineBuilder<'s, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    settings: Option<EngineSettings>,
    names: Vec<String<32>, MAX_AXES>,
    planner: Option<P>,
    timer: Option<T>,
    delay: Option<DL>,
    signals: Option<&'s EngineSignals>,
    bank: Option<AxisBank<D>>,
}

impl<'s, P, D, T, DL> Default for EngineBuilder<'s, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'s, P, D, T, DL> EngineBuilder<'s, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            settings: None,
            names: Vec::new(),
            planner: None,
            timer: None,
            delay: None,
            signals: None,
            bank: None,
        }
    }

    /// Validate `config` and take the engine settings from it.
    ///
    /// Also makes axes addressable by name in [`attach_named`](Self::attach_named).
    ///
    /// # Errors
    ///
    /// Returns any validation error of the configuration.
    pub fn config(mut self, config: &EngineConfig) -> Result<Self> {
        let settings = EngineSettings::from_config(config)?;
        self.names.clear();
        for name in config.axis_names() {
            let name = String::try_from(name).map_err(|_| missing("axis name too long"))?;
            self.names
                .push(name)
                .map_err(|_| ConfigError::TooManyAxes(config.axis_count()))?;
        }
        self.bank = Some(AxisBank::new(settings.axis_count));
        self.settings = Some(settings);
        Ok(self)
    }

    /// Use already derived settings. Axes can then only be attached by index.
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.bank = Some(AxisBank::new(settings.axis_count));
        self.names.clear();
        self.settings = Some(settings);
        self
    }

    /// Set the planner the engine pulls blocks from.
    pub fn planner(mut self, planner: P) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Set the step timer.
    pub fn timer(mut self, timer: T) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Set the delay provider used for DIR setup and hold times.
    pub fn delay(mut self, delay: DL) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the signals shared with endstop and user interface code.
    pub fn signals(mut self, signals: &'s EngineSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Attach a motor driver to an axis by index.
    ///
    /// # Errors
    ///
    /// Returns an error if settings are not set yet, the axis is not
    /// configured, or the axis already has all of its configured motors.
    pub fn attach(mut self, axis: usize, driver: D) -> Result<Self> {
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| missing("settings must be set before attaching drivers"))?;
        let configured = settings.motors.get(axis).copied().unwrap_or(0);
        let bank = self
            .bank
            .as_mut()
            .ok_or_else(|| missing("settings must be set before attaching drivers"))?;

        let motor = bank.attach(axis, driver)?;
        if motor >= configured as usize {
            return Err(ConfigError::InvalidMotorCount(motor as u8 + 1).into());
        }
        Ok(self)
    }

    /// Attach a motor driver to an axis by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AxisNotFound`] for an unknown name, otherwise as
    /// [`attach`](Self::attach).
    pub fn attach_named(self, name: &str, driver: D) -> Result<Self> {
        let axis = self
            .names
            .iter()
            .position(|n| n.as_str() == name)
            .ok_or_else(|| {
                Error::Config(ConfigError::AxisNotFound(
                    String::try_from(name).unwrap_or_default(),
                ))
            })?;
        self.attach(axis, driver)
    }

    /// Build the StepperEngine.
    ///
    /// # Errors
    ///
    /// Returns an error if settings, planner, timer, delay or signals are missing.
    pub fn build(self) -> Result<StepperEngine<'s, P, D, T, DL>> {
        let settings = self.settings.ok_or_else(|| missing("settings are required"))?;
        let bank = self
            .bank
            .unwrap_or_else(|| AxisBank::new(settings.axis_count));
        let planner = self.planner.ok_or_else(|| missing("planner is required"))?;
        let timer = self.timer.ok_or_else(|| missing("timer is required"))?;
        let delay = self.delay.ok_or_else(|| missing("delay is required"))?;
        let signals = self.signals.ok_or_else(|| missing("signals are required"))?;

        Ok(StepperEngine::new(settings, planner, bank, timer, delay, signals))
    }
}

fn missing(message: &str) -> Error {
    Error::Config(ConfigError::ParseError(
        String::try_from(message).unwrap_or_default(),
    ))
}
