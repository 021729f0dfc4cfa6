//! Motors grouped per logical axis.
//!
//! An axis drives one to four motors in lockstep. While homing an axis with one
//! endstop per motor, individual motors can be locked so they skip STEP pulses
//! and square the gantry; DIR and ENABLE always reach every motor.

use heapless::Vec;

use crate::error::MotorError;
use crate::motion::{MAX_AXES, MAX_MOTORS_PER_AXIS};

use super::driver::AxisDriver;

/// Motors of one logical axis.
pub struct AxisMotors<D: AxisDriver> {
    motors: Vec<D, MAX_MOTORS_PER_AXIS>,
    locked: u8,
}

impl<D: AxisDriver> AxisMotors<D> {
    /// An axis without motors.
    pub const fn new() -> Self {
        Self {
            motors: Vec::new(),
            locked: 0,
        }
    }

    /// Attach a motor, returning its index on the axis.
    ///
    /// # Errors
    ///
    /// Returns the driver back when the axis already has four motors.
    pub fn push(&mut self, driver: D) -> Result<usize, D> {
        self.motors.push(driver)?;
        Ok(self.motors.len() - 1)
    }

    /// Number of attached motors.
    #[inline]
    pub fn len(&self) -> usize {
        self.motors.len()
    }

    /// Whether no motor is attached.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }

    /// Lock or unlock one motor.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::MotorOutOfRange`] for a missing motor.
    pub fn set_lock(&mut self, axis: usize, motor: usize, lock: bool) -> Result<(), MotorError> {
        if motor >= self.motors.len() {
            return Err(MotorError::MotorOutOfRange { axis, motor });
        }
        if lock {
            self.locked |= 1 << motor;
        } else {
            self.locked &= !(1 << motor);
        }
        Ok(())
    }

    /// Lock or unlock every motor, leaving `except` in the opposite state.
    pub fn set_all_locks(&mut self, lock: bool, except: Option<usize>) {
        let all = ((1u16 << self.motors.len()) - 1) as u8;
        self.locked = if lock { all } else { 0 };
        if let Some(motor) = except.filter(|&m| m < self.motors.len()) {
            self.locked ^= 1 << motor;
        }
    }

    /// Whether a motor skips STEP pulses.
    #[inline]
    pub fn is_locked(&self, motor: usize) -> bool {
        self.locked & (1 << motor) != 0
    }

    /// Drive STEP on every motor, skipping locked ones when `honor_locks` is set.
    ///
    /// Every motor is written even if an earlier one fails; the first error
    /// is returned.
    #[inline]
    pub fn set_step(&mut self, active: bool, honor_locks: bool) -> Result<(), MotorError> {
        let locked = if honor_locks { self.locked } else { 0 };
        let mut result = Ok(());
        for (motor, driver) in self.motors.iter_mut().enumerate() {
            // Locked motors only skip the rising edge
            if active && locked & (1 << motor) != 0 {
                continue;
            }
            result = result.and(driver.set_step(active));
        }
        result
    }

    /// Drive DIR on every motor.
    pub fn set_direction(&mut self, forward: bool) -> Result<(), MotorError> {
        let mut result = Ok(());
        for driver in self.motors.iter_mut() {
            result = result.and(driver.set_direction(forward));
        }
        result
    }

    /// Drive ENABLE on every motor.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), MotorError> {
        let mut result = Ok(());
        for driver in self.motors.iter_mut() {
            result = result.and(driver.set_enabled(enabled));
        }
        result
    }

    /// Access one motor's driver.
    pub fn motor_mut(&mut self, motor: usize) -> Option<&mut D> {
        self.motors.get_mut(motor)
    }
}

impl<D: AxisDriver> Default for AxisMotors<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Motors of every configured axis, indexed by axis.
pub struct AxisBank<D: AxisDriver> {
    axes: Vec<AxisMotors<D>, MAX_AXES>,
}

impl<D: AxisDriver> AxisBank<D> {
    /// A bank with `axis_count` empty axes (clamped to the axis limit).
    pub fn new(axis_count: usize) -> Self {
        let mut axes = Vec::new();
        for _ in 0..axis_count.min(MAX_AXES) {
            let _ = axes.push(AxisMotors::new());
        }
        Self { axes }
    }

    /// Number of axes.
    #[inline]
    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    /// Motors of one axis.
    #[inline]
    pub fn axis(&self, axis: usize) -> Option<&AxisMotors<D>> {
        self.axes.get(axis)
    }

    /// Mutable motors of one axis.
    #[inline]
    pub fn axis_mut(&mut self, axis: usize) -> Option<&mut AxisMotors<D>> {
        self.axes.get_mut(axis)
    }

    /// Attach a motor to an axis.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::AxisOutOfRange`] for a missing axis and
    /// [`MotorError::MotorOutOfRange`] when the axis is full.
    pub fn attach(&mut self, axis: usize, driver: D) -> Result<usize, MotorError> {
        let motors = self
            .axes
            .get_mut(axis)
            .ok_or(MotorError::AxisOutOfRange(axis))?;
        let count = motors.len();
        motors.push(driver).map_err(|_| MotorError::MotorOutOfRange {
            axis,
            motor: count,
        })
    }

    /// Drive STEP on one axis. Missing axes are ignored.
    #[inline]
    pub fn set_step(&mut self, axis: usize, active: bool, honor_locks: bool) -> Result<(), MotorError> {
        match self.axes.get_mut(axis) {
            Some(motors) => motors.set_step(active, honor_locks),
            None => Ok(()),
        }
    }

    /// Drive DIR on one axis. Missing axes are ignored.
    #[inline]
    pub fn set_direction(&mut self, axis: usize, forward: bool) -> Result<(), MotorError> {
        match self.axes.get_mut(axis) {
            Some(motors) => motors.set_direction(forward),
            None => Ok(()),
        }
    }

    /// Drive ENABLE on one axis. Missing axes are ignored.
    #[inline]
    pub fn set_enabled(&mut self, axis: usize, enabled: bool) -> Result<(), MotorError> {
        match self.axes.get_mut(axis) {
            Some(motors) => motors.set_enabled(enabled),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        steps: u32,
        level: bool,
        forward: bool,
        enabled: bool,
    }

    impl AxisDriver for Recorder {
        fn set_step(&mut self, active: bool) -> Result<(), MotorError> {
            if active && !self.level {
                self.steps += 1;
            }
            self.level = active;
            Ok(())
        }

        fn set_direction(&mut self, forward: bool) -> Result<(), MotorError> {
            self.forward = forward;
            Ok(())
        }

        fn set_enabled(&mut self, enabled: bool) -> Result<(), MotorError> {
            self.enabled = enabled;
            Ok(())
        }
    }

    fn pulse(motors: &mut AxisMotors<Recorder>) {
        motors.set_step(true, true).unwrap();
        motors.set_step(false, true).unwrap();
    }

    #[test]
    fn test_locked_motor_skips_steps() {
        let mut motors = AxisMotors::new();
        motors.push(Recorder::default()).ok();
        motors.push(Recorder::default()).ok();

        pulse(&mut motors);
        motors.set_lock(0, 1, true).unwrap();
        pulse(&mut motors);
        motors.set_direction(true).unwrap();
        // Locks are ignored outside multi-endstop homing
        motors.set_step(true, false).unwrap();
        motors.set_step(false, false).unwrap();

        assert_eq!(motors.motor_mut(0).unwrap().steps, 3);
        let second = motors.motor_mut(1).unwrap();
        assert_eq!(second.steps, 2);
        assert!(second.forward);
    }

    #[test]
    fn test_all_locks_with_exception() {
        let mut motors = AxisMotors::new();
        for _ in 0..3 {
            motors.push(Recorder::default()).ok();
        }

        motors.set_all_locks(true, Some(2));
        assert!(motors.is_locked(0));
        assert!(motors.is_locked(1));
        assert!(!motors.is_locked(2));

        motors.set_all_locks(false, None);
        assert!((0..3).all(|motor| !motors.is_locked(motor)));
        assert_eq!(
            motors.set_lock(4, 3, true),
            Err(MotorError::MotorOutOfRange { axis: 4, motor: 3 })
        );
    }

    #[test]
    fn test_bank_attach_bounds() {
        let mut bank: AxisBank<Recorder> = AxisBank::new(2);
        assert_eq!(bank.attach(1, Recorder::default()), Ok(0));
        assert_eq!(bank.attach(1, Recorder::default()), Ok(1));
        assert_eq!(
            bank.attach(2, Recorder::default()),
            Err(MotorError::AxisOutOfRange(2))
        );
        assert!(bank.set_step(7, true, true).is_ok());
    }
}
