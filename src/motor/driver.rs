//! Stepper driver outputs.
//!
//! [`AxisDriver`] is the seam between the engine and the hardware: one
//! implementation per physical motor, taking logical levels (step active,
//! direction forward, enabled). [`StepperDriver`] implements it over
//! embedded-hal 1.0 output pins and applies the configured polarities.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::config::AxisConfig;
use crate::error::MotorError;

/// Logical outputs of one stepper driver.
///
/// Called from the stepper ISR: implementations must not block.
pub trait AxisDriver {
    /// Drive STEP to its active (`true`) or idle level.
    fn set_step(&mut self, active: bool) -> Result<(), MotorError>;

    /// Drive DIR for forward (`true`) or backward motion.
    fn set_direction(&mut self, forward: bool) -> Result<(), MotorError>;

    /// Energize (`true`) or release the motor.
    fn set_enabled(&mut self, enabled: bool) -> Result<(), MotorError>;
}

impl<T: AxisDriver + ?Sized> AxisDriver for &mut T {
    #[inline]
    fn set_step(&mut self, active: bool) -> Result<(), MotorError> {
        (**self).set_step(active)
    }

    #[inline]
    fn set_direction(&mut self, forward: bool) -> Result<(), MotorError> {
        (**self).set_direction(forward)
    }

    #[inline]
    fn set_enabled(&mut self, enabled: bool) -> Result<(), MotorError> {
        (**self).set_enabled(enabled)
    }
}

/// Placeholder for drivers whose enable line is hard-wired or shared elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnable;

impl ErrorType for NoEnable {
    type Error = Infallible;
}

impl OutputPin for NoEnable {
    #[inline]
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    #[inline]
    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Pin polarities of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Polarity {
    /// STEP pulses are active-low.
    pub invert_step: bool,
    /// DIR is high for backward motion.
    pub invert_direction: bool,
    /// ENABLE is active-high.
    pub invert_enable: bool,
}

impl Polarity {
    /// Polarities configured for an axis.
    pub fn from_axis(config: &AxisConfig) -> Self {
        Self {
            invert_step: config.invert_step,
            invert_direction: config.invert_direction,
            invert_enable: config.invert_enable,
        }
    }
}

/// STEP/DIR(/ENABLE) driver over embedded-hal output pins.
///
/// Generic over:
/// - `STEP`: STEP pin type (must implement `OutputPin`)
/// - `DIR`: DIR pin type (must implement `OutputPin`)
/// - `EN`: ENABLE pin type, [`NoEnable`] when there is none
pub struct StepperDriver<STEP, DIR, EN = NoEnable>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    step_pin: STEP,
    dir_pin: DIR,
    enable_pin: EN,
    polarity: Polarity,
}

impl<STEP, DIR> StepperDriver<STEP, DIR, NoEnable>
where
    STEP: OutputPin,
    DIR: OutputPin,
{
    /// Driver without an enable pin.
    pub fn new(step_pin: STEP, dir_pin: DIR, polarity: Polarity) -> Self {
        Self::with_enable(step_pin, dir_pin, NoEnable, polarity)
    }
}

impl<STEP, DIR, EN> StepperDriver<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    /// Driver with its own enable pin.
    pub fn with_enable(step_pin: STEP, dir_pin: DIR, enable_pin: EN, polarity: Polarity) -> Self {
        Self {
            step_pin,
            dir_pin,
            enable_pin,
            polarity,
        }
    }

    /// Configured polarities.
    #[inline]
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Give the pins back.
    pub fn release(self) -> (STEP, DIR, EN) {
        (self.step_pin, self.dir_pin, self.enable_pin)
    }
}

#[inline]
fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), MotorError> {
    if high {
        pin.set_high().map_err(|_| MotorError::PinError)
    } else {
        pin.set_low().map_err(|_| MotorError::PinError)
    }
}

impl<STEP, DIR, EN> AxisDriver for StepperDriver<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    #[inline]
    fn set_step(&mut self, active: bool) -> Result<(), MotorError> {
        drive(&mut self.step_pin, active != self.polarity.invert_step)
    }

    #[inline]
    fn set_direction(&mut self, forward: bool) -> Result<(), MotorError> {
        drive(&mut self.dir_pin, forward != self.polarity.invert_direction)
    }

    #[inline]
    fn set_enabled(&mut self, enabled: bool) -> Result<(), MotorError> {
        // Most drivers enable on low
        drive(&mut self.enable_pin, enabled == self.polarity.invert_enable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};

    #[test]
    fn test_levels_follow_polarity() {
        let mut step = PinMock::new(&[
            Transaction::set(State::Low),
            Transaction::set(State::High),
        ]);
        let mut dir = PinMock::new(&[Transaction::set(State::Low)]);
        let mut enable = PinMock::new(&[
            Transaction::set(State::Low),
            Transaction::set(State::High),
        ]);

        let polarity = Polarity {
            invert_step: true,
            invert_direction: true,
            invert_enable: false,
        };
        let mut driver =
            StepperDriver::with_enable(step.clone(), dir.clone(), enable.clone(), polarity);

        driver.set_step(true).unwrap();
        driver.set_step(false).unwrap();
        driver.set_direction(true).unwrap();
        driver.set_enabled(true).unwrap();
        driver.set_enabled(false).unwrap();

        step.done();
        dir.done();
        enable.done();
    }

    #[test]
    fn test_no_enable_is_silent() {
        let mut step = PinMock::new(&[]);
        let mut dir = PinMock::new(&[]);
        let mut driver = StepperDriver::new(step.clone(), dir.clone(), Polarity::default());

        assert!(driver.set_enabled(true).is_ok());

        step.done();
        dir.done();
    }
}
