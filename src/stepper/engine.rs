//! The stepper engine object.
//!
//! [`StepperEngine`] owns everything the ISR touches: the planner consumer, the
//! axis drivers, the timers and all per-block state. The hardware interrupt
//! calls [`StepperEngine::isr`]; foreground code reaches the position and
//! enable API either by owning the engine or through
//! [`SharedEngine`](super::SharedEngine).

use embedded_hal::delay::DelayNs;

use crate::config::EngineSettings;
use crate::error::{MotionError, MotorError, Result};
use crate::motion::{
    AxisBits, BezierCurve, BlockId, Bresenham, IntervalCalculator, MotionBlock, PageCursor,
    Planner,
};
use crate::motor::{AxisBank, AxisDriver, EnableState, Position, PulseTiming, StepperTimer};

use super::advance::LinearAdvance;
use super::block_phase::Ramp;
use super::diagnostics::Diagnostics;
use super::shaping::Shaping;
use super::signals::EngineSignals;
use super::NEVER;

/// Interrupt-driven stepper pulse generator.
///
/// Generic over the planner it pulls blocks from, the axis drivers, the step
/// timer and the delay provider used for DIR setup and hold times.
pub struct StepperEngine<'s, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    pub(super) settings: EngineSettings,
    pub(super) calc: IntervalCalculator,
    pub(super) planner: P,
    pub(super) motors: AxisBank<D>,
    pub(super) timer: T,
    pub(super) delay: DL,
    pub(super) signals: &'s EngineSignals,
    pub(super) pulse: PulseTiming,

    // Running block
    pub(super) block: Option<MotionBlock>,
    pub(super) ramp: Ramp,
    pub(super) page: Option<PageCursor>,
    pub(super) bresenham: Bresenham,
    pub(super) bezier: BezierCurve,
    pub(super) bezier_second_half: bool,
    pub(super) axis_mask: AxisBits,
    pub(super) step_events_completed: u32,
    pub(super) step_event_count: u32,
    pub(super) accelerate_before: u32,
    pub(super) decelerate_start: u32,
    pub(super) oversampling: u8,
    pub(super) acc_step_rate: u32,
    pub(super) acceleration_time: u32,
    pub(super) deceleration_time: u32,
    pub(super) ticks_nominal: u32,

    // Scheduling
    pub(super) steps_per_isr: u32,
    pub(super) next_main: u32,
    pub(super) next_babystep: u32,
    pub(super) time_in_isr: u32,
    pub(super) time_out_isr: u32,

    // Axes
    pub(super) extruder: Option<usize>,
    pub(super) last_direction_bits: AxisBits,
    pub(super) position: Position,
    pub(super) triggered: Position,
    pub(super) enable: EnableState,
    pub(super) separate_multi_axis: bool,

    pub(super) advance: LinearAdvance,
    pub(super) shaping: Shaping,
    pub(super) diagnostics: Diagnostics,
}

impl<'s, P, D, T, DL> StepperEngine<'s, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    /// Create an engine.
    ///
    /// Every DIR output is driven backward once, so the engine and the pins
    /// agree on the direction state before the first block.
    pub fn new(
        settings: EngineSettings,
        planner: P,
        motors: AxisBank<D>,
        timer: T,
        delay: DL,
        signals: &'s EngineSignals,
    ) -> Self {
        info!(
            "stepper engine: {} axes, step timer {} Hz",
            settings.axis_count,
            settings.timer_rate
        );

        let mut engine = Self {
            calc: settings.interval_calculator(),
            pulse: PulseTiming::new(settings.pulse_high_ticks, settings.pulse_low_ticks),
            bezier: BezierCurve::new(settings.curve_precision),
            shaping: Shaping::new(&settings.shaping),
            enable: EnableState::new(&settings.enable_groups),
            extruder: if settings.linear_advance {
                settings.extruder
            } else {
                None
            },
            settings,
            planner,
            motors,
            timer,
            delay,
            signals,

            block: None,
            ramp: Ramp::default(),
            page: None,
            bresenham: Bresenham::new(),
            bezier_second_half: false,
            axis_mask: AxisBits::EMPTY,
            step_events_completed: 0,
            step_event_count: 0,
            accelerate_before: 0,
            decelerate_start: 0,
            oversampling: 0,
            acc_step_rate: 0,
            acceleration_time: 0,
            deceleration_time: 0,
            ticks_nominal: 0,

            steps_per_isr: 1,
            next_main: 0,
            next_babystep: NEVER,
            time_in_isr: 0,
            time_out_isr: 0,

            last_direction_bits: AxisBits::EMPTY,
            position: Position::ZERO,
            triggered: Position::ZERO,
            separate_multi_axis: false,

            advance: LinearAdvance::new(),
            diagnostics: Diagnostics::default(),
        };
        engine.set_directions(AxisBits::EMPTY);
        engine
    }

    // ==== Position ====

    /// Position of one axis in steps.
    #[inline]
    pub fn position(&self, axis: usize) -> i32 {
        self.position.axis(axis)
    }

    /// Position of every axis.
    #[inline]
    pub fn positions(&self) -> Position {
        self.position
    }

    /// Position an axis had when its endstop last triggered.
    #[inline]
    pub fn triggered_position(&self, axis: usize) -> i32 {
        self.triggered.axis(axis)
    }

    /// Overwrite every axis position.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::NotSynchronized`] while blocks are queued, a
    /// block is running or echoes are pending.
    pub fn set_position(&mut self, position: Position) -> Result<()> {
        self.ensure_synchronized()?;
        self.apply_position(position);
        Ok(())
    }

    /// Overwrite one axis position.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::NotSynchronized`] while the engine is busy.
    pub fn set_axis_position(&mut self, axis: usize, steps: i32) -> Result<()> {
        self.ensure_synchronized()?;
        let mut position = self.position;
        position.set_axis(axis, steps);
        self.apply_position(position);
        Ok(())
    }

    /// Record the endstop position of `axis` and abort the running block.
    ///
    /// Safe to call from an endstop handler that holds the engine; handlers
    /// that cannot reach it use [`EngineSignals::trigger_endstop`].
    pub fn endstop_triggered(&mut self, axis: usize) {
        self.triggered.set_axis(axis, self.position.axis(axis));
        self.signals.abort_current_block();
        info!("endstop on axis {} at {}", axis, self.position.axis(axis));
    }

    /// Stop motion as soon as possible by aborting the running block.
    #[inline]
    pub fn quick_stop(&mut self) {
        self.signals.abort_current_block();
    }

    /// Drop the running block at the next pulse phase.
    #[inline]
    pub fn abort_current_block(&self) {
        self.signals.abort_current_block();
    }

    /// Log every axis position and return them.
    pub fn report_positions(&self) -> Position {
        for axis in 0..self.settings.axis_count {
            info!("axis {}: {}", axis, self.position.axis(axis));
        }
        self.position
    }

    /// Whether motion is queued, running or still echoing.
    pub fn is_busy(&self) -> bool {
        self.block.is_some() || self.planner.has_blocks() || !self.shaping.is_idle()
    }

    /// Id of the running block, [`BlockId::NONE`] when idle.
    #[inline]
    pub fn current_block_id(&self) -> BlockId {
        self.block.as_ref().map_or(BlockId::NONE, |block| block.id)
    }

    // ==== Enable lines ====

    /// Energize one axis.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::AxisOutOfRange`] for an unknown axis, or the pin
    /// error of the enable output.
    pub fn enable_axis(&mut self, axis: usize) -> Result<()> {
        self.check_axis(axis)?;
        self.enable.mark_enabled(axis);
        self.motors.set_enabled(axis, true)?;
        Ok(())
    }

    /// Mark an axis disabled and release its enable line if no axis sharing
    /// the line is still enabled.
    ///
    /// Returns whether the line was released.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::AxisOutOfRange`] for an unknown axis, or the pin
    /// error of the enable output.
    pub fn disable_axis(&mut self, axis: usize) -> Result<bool> {
        self.check_axis(axis)?;
        self.enable.mark_disabled(axis);
        if !self.enable.can_disable(axis) {
            return Ok(false);
        }
        self.motors.set_enabled(axis, false)?;
        Ok(true)
    }

    /// Energize every axis.
    ///
    /// # Errors
    ///
    /// Returns the first pin error.
    pub fn enable_all(&mut self) -> Result<()> {
        for axis in 0..self.settings.axis_count {
            self.enable_axis(axis)?;
        }
        Ok(())
    }

    /// Release every axis.
    ///
    /// # Errors
    ///
    /// Returns the first pin error.
    pub fn disable_all(&mut self) -> Result<()> {
        for axis in 0..self.settings.axis_count {
            self.enable.mark_disabled(axis);
        }
        for axis in 0..self.settings.axis_count {
            self.motors.set_enabled(axis, false)?;
        }
        Ok(())
    }

    /// Whether an axis is marked enabled.
    #[inline]
    pub fn axis_is_enabled(&self, axis: usize) -> bool {
        self.enable.is_enabled(axis)
    }

    // ==== Multi-motor locks ====

    /// Honour per-motor locks while stepping (multi-endstop homing).
    #[inline]
    pub fn set_separate_multi_axis(&mut self, separate: bool) {
        self.separate_multi_axis = separate;
    }

    /// Lock or unlock one motor of an axis.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::AxisOutOfRange`] or [`MotorError::MotorOutOfRange`].
    pub fn set_motor_lock(&mut self, axis: usize, motor: usize, lock: bool) -> Result<()> {
        let motors = self
            .motors
            .axis_mut(axis)
            .ok_or(MotorError::AxisOutOfRange(axis))?;
        motors.set_lock(axis, motor, lock)?;
        Ok(())
    }

    /// Lock or unlock every motor of an axis except `except`.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::AxisOutOfRange`] for an unknown axis.
    pub fn set_all_motor_locks(&mut self, axis: usize, lock: bool, except: Option<usize>) -> Result<()> {
        let motors = self
            .motors
            .axis_mut(axis)
            .ok_or(MotorError::AxisOutOfRange(axis))?;
        motors.set_all_locks(lock, except);
        Ok(())
    }

    // ==== Accessors ====

    /// Health counters.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            steps_per_isr: self.steps_per_isr,
            oversampling: self.oversampling,
            ..self.diagnostics
        }
    }

    /// Reset the health counters.
    pub fn clear_diagnostics(&mut self) {
        self.diagnostics = Diagnostics::default();
    }

    /// Pulses issued per ISR call.
    #[inline]
    pub fn steps_per_isr(&self) -> u32 {
        self.steps_per_isr
    }

    /// Runtime settings.
    #[inline]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The planner the engine consumes.
    #[inline]
    pub fn planner(&self) -> &P {
        &self.planner
    }

    /// Mutable access to the planner.
    #[inline]
    pub fn planner_mut(&mut self) -> &mut P {
        &mut self.planner
    }

    /// The axis drivers.
    #[inline]
    pub fn motors(&self) -> &AxisBank<D> {
        &self.motors
    }

    /// Signals shared with other contexts.
    #[inline]
    pub fn signals(&self) -> &'s EngineSignals {
        self.signals
    }

    /// Tear down the engine, returning its parts.
    pub fn release(self) -> (P, AxisBank<D>, T, DL) {
        (self.planner, self.motors, self.timer, self.delay)
    }

    // ==== Internals shared by the ISR phases ====

    fn ensure_synchronized(&self) -> Result<()> {
        if self.is_busy() {
            return Err(MotionError::NotSynchronized.into());
        }
        Ok(())
    }

    fn check_axis(&self, axis: usize) -> Result<()> {
        if axis >= self.settings.axis_count {
            return Err(MotorError::AxisOutOfRange(axis).into());
        }
        Ok(())
    }

    /// Set positions, keeping what shaped axes still owe from queued echoes.
    pub(super) fn apply_position(&mut self, target: Position) {
        let mut position = target;
        for slot in 0..self.shaping.len() {
            let shaper = self.shaping.slot_mut(slot);
            if !shaper.is_enabled() {
                continue;
            }
            let axis = shaper.axis;
            let owed = self.position.axis(axis).wrapping_sub(shaper.last_block_end_pos);
            position.offset_axis(axis, owed);
            shaper.last_block_end_pos = target.axis(axis);
        }
        self.position = position;
    }

    /// Count a failed pin write. The ISR never stops on one.
    #[inline]
    pub(super) fn check(&mut self, result: core::result::Result<(), MotorError>) {
        if result.is_err() {
            self.diagnostics.pin_faults = self.diagnostics.pin_faults.wrapping_add(1);
            error!("pin fault in stepper ISR");
        }
    }

    /// Raise STEP on `axes`, counting each step in the current direction.
    pub(super) fn pulse_start(&mut self, axes: AxisBits) {
        let honor_locks = self.separate_multi_axis;
        for axis in axes.iter() {
            let sign = self.last_direction_bits.direction(axis).sign();
            self.position.offset_axis(axis, sign);
            let result = self.motors.set_step(axis, true, honor_locks);
            self.check(result);
        }
    }

    /// Drop STEP on `axes`.
    pub(super) fn pulse_stop(&mut self, axes: AxisBits) {
        let honor_locks = self.separate_multi_axis;
        for axis in axes.iter() {
            let result = self.motors.set_step(axis, false, honor_locks);
            self.check(result);
        }
    }

    /// One full STEP pulse on `axes`, honouring the minimum high time.
    pub(super) fn pulse_axes(&mut self, axes: AxisBits) {
        if axes.is_empty() {
            return;
        }
        self.pulse_start(axes);
        self.pulse.start(&mut self.timer);
        self.pulse.await_high(&mut self.timer);
        self.pulse_stop(axes);
    }

    /// Change the DIR output of one axis with setup and hold waits.
    pub(super) fn apply_direction(&mut self, axis: usize, forward: bool) {
        self.last_direction_bits.set(axis, forward);
        self.delay.delay_ns(self.settings.dir_setup_ns);
        let result = self.motors.set_direction(axis, forward);
        self.check(result);
        self.delay.delay_ns(self.settings.dir_hold_ns);
    }

    /// Drive every DIR output from `bits`.
    pub(super) fn set_directions(&mut self, bits: AxisBits) {
        self.delay.delay_ns(self.settings.dir_setup_ns);
        for axis in 0..self.settings.axis_count {
            let result = self.motors.set_direction(axis, bits.get(axis));
            self.check(result);
        }
        self.last_direction_bits = bits;
        self.delay.delay_ns(self.settings.dir_hold_ns);
    }

    /// Energize an axis from the ISR if it is not already.
    pub(super) fn ensure_enabled(&mut self, axis: usize) {
        if self.enable.is_enabled(axis) {
            return;
        }
        self.enable.mark_enabled(axis);
        let result = self.motors.set_enabled(axis, true);
        self.check(result);
    }
}
