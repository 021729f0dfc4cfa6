//! Engine shared between the stepper interrupt and foreground code.
//!
//! The engine lives in a critical-section mutex. The interrupt handler calls
//! [`SharedEngine::isr`]; foreground calls borrow the engine inside a critical
//! section, so they never observe it half way through an ISR.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;

use crate::error::{MotorError, Result};
use crate::motion::{BlockId, Planner};
use crate::motor::{AxisDriver, Position, StepperTimer};

use super::diagnostics::Diagnostics;
use super::engine::StepperEngine;

/// Slot holding an engine that several contexts use.
///
/// # Example
///
/// ```rust,ignore
/// static ENGINE: SharedEngine<Engine> = SharedEngine::new();
///
/// #[interrupt]
/// fn TIM2() {
///     ENGINE.isr();
/// }
///
/// ENGINE.install(engine);
/// ENGINE.synchronize()?;
/// ENGINE.set_position(Position::ZERO)?;
/// ```
pub struct SharedEngine<E> {
    inner: Mutex<RefCell<Option<E>>>,
}

impl<E> SharedEngine<E> {
    /// An empty slot.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Put an engine in the slot, returning the previous one.
    pub fn install(&self, engine: E) -> Option<E> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).replace(engine))
    }

    /// Take the engine out of the slot.
    pub fn take(&self) -> Option<E> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take())
    }

    /// Whether an engine is installed.
    pub fn is_installed(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).is_some())
    }

    /// Run `f` on the engine inside a critical section.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::NotInitialized`] when the slot is empty.
    pub fn with<R>(&self, f: impl FnOnce(&mut E) -> R) -> Result<R> {
        critical_section::with(|cs| {
            let mut slot = self.inner.borrow_ref_mut(cs);
            let engine = slot.as_mut().ok_or(MotorError::NotInitialized)?;
            Ok(f(engine))
        })
    }
}

impl<E> Default for SharedEngine<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, D, T, DL> SharedEngine<StepperEngine<'_, P, D, T, DL>>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    /// Run one stepper interrupt. Does nothing before an engine is installed.
    pub fn isr(&self) {
        if self.with(|engine| engine.isr()).is_err() {
            trace!("stepper ISR before engine install");
        }
    }

    /// Whether motion is queued, running or still echoing.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::NotInitialized`] when the slot is empty.
    pub fn is_busy(&self) -> Result<bool> {
        self.with(|engine| engine.is_busy())
    }

    /// Spin until every queued block is executed and every echo is out.
    ///
    /// The stepper interrupt must keep running meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::NotInitialized`] when the slot is empty.
    pub fn synchronize(&self) -> Result<()> {
        while self.is_busy()? {
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// Position of one axis.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::NotInitialized`] when the slot is empty.
    pub fn position(&self, axis: usize) -> Result<i32> {
        self.with(|engine| engine.position(axis))
    }

    /// Position of every axis.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::NotInitialized`] when the slot is empty.
    pub fn positions(&self) -> Result<Position> {
        self.with(|engine| engine.positions())
    }

    /// Wait for motion to finish, then overwrite every axis position.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::NotInitialized`] when the slot is empty.
    pub fn set_position(&self, position: Position) -> Result<()> {
        self.synchronize()?;
        self.with(|engine| engine.set_position(position))?
    }

    /// Wait for motion to finish, then overwrite one axis position.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::NotInitialized`] when the slot is empty.
    pub fn set_axis_position(&self, axis: usize, steps: i32) -> Result<()> {
        self.synchronize()?;
        self.with(|engine| engine.set_axis_position(axis, steps))?
    }

    /// Record an endstop hit and abort the running block.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::NotInitialized`] when the slot is empty.
    pub fn endstop_triggered(&self, axis: usize) -> Result<()> {
        self.with(|engine| engine.endstop_triggered(axis))
    }

    /// Id of the running block.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::NotInitialized`] when the slot is empty.
    pub fn current_block_id(&self) -> Result<BlockId> {
        self.with(|engine| engine.current_block_id())
    }

    /// Health counters.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::NotInitialized`] when the slot is empty.
    pub fn diagnostics(&self) -> Result<Diagnostics> {
        self.with(|engine| engine.diagnostics())
    }
}
