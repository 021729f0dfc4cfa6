//! ZV input shaping.
//!
//! Every primary step of a shaped axis is split in two impulses: a share
//! `factor1 / 128` emitted right away and a share `factor2 / 128` emitted half a
//! resonance period later (the echo). A second, per-axis accumulator turns the
//! sum of both impulse trains back into whole steps, so the motor still moves
//! exactly the planned number of steps.

use embedded_hal::delay::DelayNs;
use heapless::{Deque, Vec};
use libm::floorf;

use crate::config::ShapingSettings;
use crate::error::{ConfigError, MotionError, Result};
use crate::motion::{AxisBits, Planner, MAX_AXES};
use crate::motor::{AxisDriver, Position, StepperTimer};

use super::engine::StepperEngine;
use super::NEVER;

/// Echo entries per shaped axis.
pub const SHAPING_QUEUE_LEN: usize = 256;

/// Axes that can be shaped at the same time.
pub const MAX_SHAPED_AXES: usize = 3;

/// Step threshold of the shaping accumulator (half a step, 128 = one step).
const HALF_STEP: i16 = 64;

/// Split of one step between the primary pulse and its echo, out of 128.
///
/// Uses the polynomial fit of the ZV shaper amplitudes over the damping ratio.
/// Returns `(factor1, factor2)`.
pub fn zv_factors(damping_ratio: f32) -> (u8, u8) {
    let zeta = damping_ratio;
    let factor2 = if zeta <= 0.0 {
        64
    } else if zeta >= 1.0 {
        0
    } else {
        let zeta2 = zeta * zeta;
        let zeta3 = zeta2 * zeta;
        let fit = 64.440_56 - 99.020_09 * zeta - 7.580_955 * zeta2 + 43.073_216 * zeta3;
        floorf(fit).clamp(0.0, 64.0) as u8
    };
    (128 - factor2, factor2)
}

/// Echo delay in step timer ticks, half a period at `frequency` Hz.
///
/// Zero when the frequency is not positive (shaping off).
pub fn echo_delay_ticks(timer_rate: u32, frequency: f32) -> u32 {
    if frequency.is_nan() || frequency <= 0.0 {
        return 0;
    }
    ((timer_rate / 2) as f32 / frequency) as u32
}

/// Shaping state of one axis.
pub(super) struct AxisShaper {
    pub(super) axis: usize,
    pub(super) settings: ShapingSettings,
    /// Accumulated step fraction, 128 per step.
    pub(super) delta_error: i16,
    /// Logical direction of the block being stepped.
    pub(super) forward: bool,
    /// Position the axis reaches once every queued echo is out.
    pub(super) last_block_end_pos: i32,
    /// Due time and direction of pending echoes.
    echoes: Deque<(u32, bool), SHAPING_QUEUE_LEN>,
}

impl AxisShaper {
    fn new(axis: usize, settings: ShapingSettings) -> Self {
        Self {
            axis,
            settings,
            delta_error: 0,
            forward: true,
            last_block_end_pos: 0,
            echoes: Deque::new(),
        }
    }

    #[inline]
    pub(super) fn is_enabled(&self) -> bool {
        self.settings.is_enabled()
    }

    #[inline]
    fn threshold(&self) -> i16 {
        if self.settings.hysteresis {
            HALF_STEP * 2
        } else {
            HALF_STEP
        }
    }

    /// Add an impulse of `amount / 128` steps.
    ///
    /// Returns `Some(forward)` when the accumulator crossed into a whole step,
    /// with the direction of that step.
    pub(super) fn accumulate(&mut self, amount: i16) -> Option<bool> {
        let threshold = self.threshold();
        let mut error = self.delta_error.saturating_add(amount);
        let step = if error >= threshold {
            error -= 128;
            Some(true)
        } else if error <= -threshold {
            error += 128;
            Some(false)
        } else {
            None
        };
        self.delta_error = error;
        step
    }

    /// Signed share given to the primary pulse.
    #[inline]
    pub(super) fn primary_share(&self) -> i16 {
        signed(self.settings.factor1, self.forward)
    }

    /// Signed share given to an echo of the given direction.
    #[inline]
    pub(super) fn echo_share(&self, forward: bool) -> i16 {
        signed(self.settings.factor2, forward)
    }

    #[inline]
    pub(super) fn queue_is_empty(&self) -> bool {
        self.echoes.is_empty()
    }

    #[inline]
    fn free(&self) -> usize {
        SHAPING_QUEUE_LEN - self.echoes.len()
    }

    /// Ticks until the oldest echo is due, [`NEVER`] with no echo queued.
    fn peek(&self, now: u32) -> u32 {
        match self.echoes.front() {
            Some(&(due, _)) => (due.wrapping_sub(now) as i32).max(0) as u32,
            None => NEVER,
        }
    }

    fn clear(&mut self, position: i32) {
        self.echoes.clear();
        self.delta_error = 0;
        self.last_block_end_pos = position;
    }
}

#[inline]
fn signed(factor: u8, forward: bool) -> i16 {
    if forward {
        factor as i16
    } else {
        -(factor as i16)
    }
}

/// All shaped axes and the clock their echoes are scheduled on.
pub(super) struct Shaping {
    now: u32,
    slots: Vec<AxisShaper, MAX_SHAPED_AXES>,
    by_axis: [Option<u8>; MAX_AXES],
}

impl Shaping {
    /// Shaping for every axis with settings, up to [`MAX_SHAPED_AXES`].
    pub(super) fn new(settings: &[Option<ShapingSettings>; MAX_AXES]) -> Self {
        let mut slots = Vec::new();
        let mut by_axis = [None; MAX_AXES];
        for (axis, shaping) in settings.iter().enumerate() {
            let Some(shaping) = shaping else { continue };
            let index = slots.len();
            if slots.push(AxisShaper::new(axis, *shaping)).is_ok() {
                by_axis[axis] = Some(index as u8);
            }
        }
        Self {
            now: 0,
            slots,
            by_axis,
        }
    }

    #[inline]
    pub(super) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(super) fn slot(&self, index: usize) -> &AxisShaper {
        &self.slots[index]
    }

    #[inline]
    pub(super) fn slot_mut(&mut self, index: usize) -> &mut AxisShaper {
        &mut self.slots[index]
    }

    /// Slot shaping `axis`, if any.
    #[inline]
    pub(super) fn slot_of(&self, axis: usize) -> Option<usize> {
        self.by_axis.get(axis).copied().flatten().map(usize::from)
    }

    /// Ticks until the next echo on any axis.
    pub(super) fn next_due(&self) -> u32 {
        self.slots
            .iter()
            .map(|slot| slot.peek(self.now))
            .min()
            .unwrap_or(NEVER)
    }

    /// Move the echo clock forward.
    #[inline]
    pub(super) fn advance(&mut self, ticks: u32) {
        self.now = self.now.wrapping_add(ticks);
    }

    /// Queue an echo on a slot. Returns `false` if the queue is full.
    pub(super) fn enqueue(&mut self, index: usize, forward: bool) -> bool {
        let due = self.now.wrapping_add(self.slots[index].settings.delay_ticks);
        self.slots[index].echoes.push_back((due, forward)).is_ok()
    }

    /// Whether a slot has an echo due, or is close to overflowing.
    #[inline]
    pub(super) fn needs_step(&self, index: usize, steps_per_isr: u32) -> bool {
        let slot = &self.slots[index];
        !slot.queue_is_empty()
            && (slot.peek(self.now) == 0 || slot.free() < steps_per_isr as usize)
    }

    /// Take the oldest echo of a slot, returning its direction.
    #[inline]
    pub(super) fn dequeue(&mut self, index: usize) -> Option<bool> {
        self.slots[index].echoes.pop_front().map(|(_, forward)| forward)
    }

    /// Whether no echo is pending on any axis.
    pub(super) fn is_idle(&self) -> bool {
        self.slots.iter().all(AxisShaper::queue_is_empty)
    }

    /// Drop every pending echo and re-anchor the accumulators on `position`.
    pub(super) fn purge(&mut self, position: &Position) {
        for slot in self.slots.iter_mut() {
            let axis = slot.axis;
            slot.clear(position.axis(axis));
        }
    }

    /// Re-anchor one slot on `position`.
    pub(super) fn reset_slot(&mut self, index: usize, position: i32) {
        self.slots[index].clear(position);
    }
}

impl<P, D, T, DL> StepperEngine<'_, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    /// Emit every echo that is due, plus enough to keep each queue from
    /// overflowing during the next pulse phase.
    pub(super) fn shaping_isr(&mut self) {
        let mut needed = self.echoes_needed();
        while needed.any() {
            let mut step = AxisBits::EMPTY;
            for slot in 0..self.shaping.len() {
                let axis = self.shaping.slot(slot).axis;
                if !needed.get(axis) {
                    continue;
                }
                let Some(forward) = self.shaping.dequeue(slot) else {
                    continue;
                };
                let share = self.shaping.slot(slot).echo_share(forward);
                if self.shaping_prep(slot, share) {
                    step.set(axis, true);
                }
            }
            self.pulse_axes(step);

            needed = self.echoes_needed();
            if needed.is_empty() {
                break;
            }
            self.pulse.start(&mut self.timer);
            self.pulse.await_low(&mut self.timer);
        }
    }

    fn echoes_needed(&self) -> AxisBits {
        let mut needed = AxisBits::EMPTY;
        for slot in 0..self.shaping.len() {
            if self.shaping.needs_step(slot, self.steps_per_isr) {
                needed.set(self.shaping.slot(slot).axis, true);
            }
        }
        needed
    }

    /// Feed an impulse to a slot's accumulator.
    ///
    /// Returns whether a physical step is due, with DIR already switched to
    /// the step's direction.
    pub(super) fn shaping_prep(&mut self, slot: usize, amount: i16) -> bool {
        let axis = self.shaping.slot(slot).axis;
        let Some(forward) = self.shaping.slot_mut(slot).accumulate(amount) else {
            return false;
        };
        if forward != self.last_direction_bits.get(axis) {
            self.pulse.start(&mut self.timer);
            self.pulse.await_low(&mut self.timer);
            self.apply_direction(axis, forward);
        }
        true
    }

    fn shaped_slot(&self, axis: usize) -> Result<usize> {
        self.shaping
            .slot_of(axis)
            .ok_or_else(|| MotionError::AxisNotShaped(axis).into())
    }

    /// Change the cancelled frequency of a shaped axis. Zero turns shaping off.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::NotSynchronized`] while motion is pending,
    /// [`MotionError::AxisNotShaped`] for an axis without shaping, and
    /// [`ConfigError::InvalidShapingFrequency`] below the frequency the echo
    /// queue was sized for.
    pub fn set_shaping_frequency(&mut self, axis: usize, frequency: f32) -> Result<()> {
        if self.is_busy() {
            return Err(MotionError::NotSynchronized.into());
        }
        let slot = self.shaped_slot(axis)?;
        let settings = &self.shaping.slot(slot).settings;
        if frequency.is_nan()
            || frequency < 0.0
            || (frequency > 0.0 && frequency < settings.min_frequency)
        {
            return Err(ConfigError::InvalidShapingFrequency(frequency).into());
        }

        let delay_ticks = echo_delay_ticks(self.settings.timer_rate, frequency);
        if let Some(shaping) = self.settings.shaping[axis].as_mut() {
            shaping.frequency = frequency;
            shaping.delay_ticks = delay_ticks;
        }
        let shaper = self.shaping.slot_mut(slot);
        shaper.settings.frequency = frequency;
        shaper.settings.delay_ticks = delay_ticks;
        self.shaping.reset_slot(slot, self.position.axis(axis));
        info!("axis {} shaping at {} Hz", axis, frequency);
        Ok(())
    }

    /// Cancelled frequency of an axis, zero when shaping is off.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::AxisNotShaped`] for an axis without shaping.
    pub fn shaping_frequency(&self, axis: usize) -> Result<f32> {
        let slot = self.shaped_slot(axis)?;
        let settings = &self.shaping.slot(slot).settings;
        Ok(if settings.is_enabled() {
            settings.frequency
        } else {
            0.0
        })
    }

    /// Change the damping ratio of a shaped axis.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::NotSynchronized`] while motion is pending,
    /// [`MotionError::AxisNotShaped`] for an axis without shaping, and
    /// [`ConfigError::InvalidDampingRatio`] outside `[0, 1)`.
    pub fn set_shaping_damping_ratio(&mut self, axis: usize, damping_ratio: f32) -> Result<()> {
        if self.is_busy() {
            return Err(MotionError::NotSynchronized.into());
        }
        let slot = self.shaped_slot(axis)?;
        if !(0.0..1.0).contains(&damping_ratio) {
            return Err(ConfigError::InvalidDampingRatio(damping_ratio).into());
        }

        let (factor1, factor2) = zv_factors(damping_ratio);
        if let Some(shaping) = self.settings.shaping[axis].as_mut() {
            shaping.damping_ratio = damping_ratio;
            shaping.factor1 = factor1;
            shaping.factor2 = factor2;
        }
        let shaper = self.shaping.slot_mut(slot);
        shaper.settings.damping_ratio = damping_ratio;
        shaper.settings.factor1 = factor1;
        shaper.settings.factor2 = factor2;
        debug!("axis {} damping {}, split {}/{}", axis, damping_ratio, factor1, factor2);
        Ok(())
    }

    /// Damping ratio of a shaped axis.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::AxisNotShaped`] for an axis without shaping.
    pub fn shaping_damping_ratio(&self, axis: usize) -> Result<f32> {
        let slot = self.shaped_slot(axis)?;
        Ok(self.shaping.slot(slot).settings.damping_ratio)
    }
}
