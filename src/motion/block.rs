//! Motion blocks.
//!
//! A block is one constant-acceleration segment prepared by the planner: step
//! counts per axis, direction bits and the trapezoid (or S-curve) parameters the
//! stepper ISR needs. The ISR treats blocks as read-only and hands them back to
//! the planner once every step event has been issued.

use libm::{ceilf, roundf, sqrtf};

use crate::error::MotionError;
use crate::motor::Position;

use super::axis::{AxisBits, MAX_AXES};
use super::interval::IntervalCalculator;
use super::page::PAGE_EVENTS;
use super::profile::period_inverse;

/// Identifier assigned to a block when it is queued. Zero means "no block".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockId(pub u16);

impl BlockId {
    /// The "no block" id.
    pub const NONE: Self = Self(0);

    /// Whether this id refers to a block.
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

/// Side effects carried by a sync block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncKind {
    /// Overwrite the engine position.
    Position(Position),
    /// Set a fan speed in step with motion.
    Fan {
        /// Fan index
        fan: u8,
        /// Speed, 0-255
        speed: u8,
    },
    /// Set laser/spindle power in step with motion.
    Power(u16),
}

/// What a block does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockKind {
    /// Bresenham-stepped motion.
    Motion,
    /// Direct stepping from a pre-rendered page.
    Page {
        /// Page index in the planner's page store
        page: u16,
    },
    /// No motion, side effects only.
    Sync(SyncKind),
}

/// Linear advance parameters of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvanceParams {
    /// Extra extruder step rate while building pressure (steps/s). Zero disables.
    pub rate: u32,
    /// Right shift applied to advance rates so each advance ISR call moves few steps.
    pub scaling: u8,
    /// Advance steps to reach at cruise.
    pub max_steps: u32,
    /// Advance steps to keep at the end of the block.
    pub final_steps: u32,
}

impl AdvanceParams {
    /// Whether linear advance runs for this block.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.rate != 0
    }
}

/// A planned motion segment.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionBlock {
    /// Queue-assigned id.
    pub id: BlockId,
    /// Motion, page or sync.
    pub kind: BlockKind,
    /// Steps per axis (unsigned).
    pub steps: [u32; MAX_AXES],
    /// Direction per axis, set = forward.
    pub direction_bits: AxisBits,
    /// Number of Bresenham events, the largest per-axis step count.
    pub step_event_count: u32,
    /// Rate at block entry (steps/s of the event axis).
    pub initial_rate: u32,
    /// Target cruise rate.
    pub nominal_rate: u32,
    /// Rate at block exit.
    pub final_rate: u32,
    /// Peak rate actually reached (below nominal when there is no plateau).
    pub cruise_rate: u32,
    /// Acceleration ends after this many events.
    pub accelerate_before: u32,
    /// Deceleration starts at this event.
    pub decelerate_start: u32,
    /// Acceleration in Q24 steps/s per timer tick.
    pub acceleration_rate: u32,
    /// Duration of the acceleration ramp in timer ticks.
    pub acceleration_time: u32,
    /// Duration of the deceleration ramp in timer ticks.
    pub deceleration_time: u32,
    /// `0xFFFF_FFFF / acceleration_time`, seeds the S-curve.
    pub acceleration_time_inverse: u32,
    /// `0xFFFF_FFFF / deceleration_time`, seeds the S-curve.
    pub deceleration_time_inverse: u32,
    /// Linear advance parameters.
    pub advance: AdvanceParams,
}

impl MotionBlock {
    /// A sync block with the given side effect.
    pub fn sync(kind: SyncKind) -> Self {
        Self {
            kind: BlockKind::Sync(kind),
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            id: BlockId::NONE,
            kind: BlockKind::Motion,
            steps: [0; MAX_AXES],
            direction_bits: AxisBits::EMPTY,
            step_event_count: 0,
            initial_rate: 0,
            nominal_rate: 0,
            final_rate: 0,
            cruise_rate: 0,
            accelerate_before: 0,
            decelerate_start: 0,
            acceleration_rate: 0,
            acceleration_time: 0,
            deceleration_time: 0,
            acceleration_time_inverse: 0,
            deceleration_time_inverse: 0,
            advance: AdvanceParams::default(),
        }
    }

    /// Whether this block only carries side effects.
    #[inline]
    pub fn is_sync(&self) -> bool {
        matches!(self.kind, BlockKind::Sync(_))
    }

    /// Page index for direct-stepping blocks.
    #[inline]
    pub fn page_index(&self) -> Option<u16> {
        match self.kind {
            BlockKind::Page { page } => Some(page),
            _ => None,
        }
    }

    /// Axes with at least one step.
    pub fn moving_axes(&self) -> AxisBits {
        let mut bits = AxisBits::EMPTY;
        for (axis, &steps) in self.steps.iter().enumerate() {
            bits.set(axis, steps != 0);
        }
        bits
    }

    /// Signed step count of one axis.
    #[inline]
    pub fn signed_steps(&self, axis: usize) -> i32 {
        let steps = self.steps.get(axis).copied().unwrap_or(0) as i32;
        if self.direction_bits.get(axis) {
            steps
        } else {
            -steps
        }
    }

    /// Check the block invariants.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::InvalidBlock`] when the phase boundaries are out of
    /// order or the event count does not match the step counts.
    pub fn validate(&self) -> Result<(), MotionError> {
        if self.is_sync() {
            return Ok(());
        }
        if self.step_event_count == 0 {
            return Err(MotionError::invalid_block("no step events"));
        }
        if self.accelerate_before > self.decelerate_start
            || self.decelerate_start > self.step_event_count
        {
            return Err(MotionError::invalid_block("phase boundaries out of order"));
        }
        match self.kind {
            BlockKind::Motion => {
                let max = self.steps.iter().copied().max().unwrap_or(0);
                if max != self.step_event_count {
                    return Err(MotionError::invalid_block("event count is not the largest step count"));
                }
            }
            BlockKind::Page { .. } => {
                if self.step_event_count > PAGE_EVENTS as u32 {
                    return Err(MotionError::invalid_block("page block longer than a page"));
                }
            }
            BlockKind::Sync(_) => {}
        }
        if self.nominal_rate == 0 {
            return Err(MotionError::invalid_block("zero nominal rate"));
        }
        Ok(())
    }
}

/// Prepares motion blocks from step counts, rates and acceleration.
///
/// Computes the phase boundaries (with the no-plateau fallback), the cruise
/// rate actually reached, the Q24 acceleration rate, the ramp durations and
/// their inverses, and the linear advance parameters.
///
/// # Example
///
/// ```rust,ignore
/// let block = BlockBuilder::new(2_000_000)
///     .steps(0, 1600)
///     .steps(1, -800)
///     .rates(200, 8000, 200)
///     .acceleration(40_000)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    timer_rate: u32,
    minimal_rate: u32,
    steps: [u32; MAX_AXES],
    direction_bits: AxisBits,
    initial_rate: u32,
    nominal_rate: u32,
    final_rate: u32,
    acceleration: u32,
    advance: Option<(usize, f32)>,
    page: Option<(u16, u32)>,
}

impl BlockBuilder {
    /// Create a builder for a step timer running at `timer_rate` Hz.
    pub fn new(timer_rate: u32) -> Self {
        Self {
            timer_rate: timer_rate.max(1),
            minimal_rate: IntervalCalculator::direct_minimal_rate(timer_rate),
            steps: [0; MAX_AXES],
            direction_bits: AxisBits::EMPTY,
            initial_rate: 0,
            nominal_rate: 0,
            final_rate: 0,
            acceleration: 0,
            advance: None,
            page: None,
        }
    }

    /// Floor applied to all rates (see [`IntervalCalculator::minimal_rate`]).
    pub fn minimal_rate(mut self, rate: u32) -> Self {
        self.minimal_rate = rate.max(1);
        self
    }

    /// Signed step count for one axis. Out-of-range axes are ignored.
    pub fn steps(mut self, axis: usize, steps: i32) -> Self {
        if axis < MAX_AXES {
            self.steps[axis] = steps.unsigned_abs();
            self.direction_bits.set(axis, steps >= 0);
        }
        self
    }

    /// Entry, cruise and exit rates in steps/s of the event axis.
    pub fn rates(mut self, initial: u32, nominal: u32, final_rate: u32) -> Self {
        self.initial_rate = initial;
        self.nominal_rate = nominal;
        self.final_rate = final_rate;
        self
    }

    /// Acceleration in steps/s² of the event axis. Zero means constant speed.
    pub fn acceleration(mut self, steps_per_s2: u32) -> Self {
        self.acceleration = steps_per_s2;
        self
    }

    /// Enable linear advance on `extruder` with gain `k`.
    pub fn linear_advance(mut self, extruder: usize, k: f32) -> Self {
        self.advance = Some((extruder, k));
        self
    }

    /// Make this a direct-stepping block over `events` entries of page `page`.
    ///
    /// Direction bits come from [`steps`](Self::steps) signs; step counts are
    /// ignored.
    pub fn page(mut self, page: u16, events: u32) -> Self {
        self.page = Some((page, events));
        self
    }

    /// Direction bit for an axis without steps (page blocks).
    pub fn direction(mut self, axis: usize, forward: bool) -> Self {
        self.direction_bits.set(axis, forward);
        self
    }

    /// Compute the block.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::InvalidBlock`] if the block has no steps.
    pub fn build(self) -> Result<MotionBlock, MotionError> {
        let (kind, step_event_count) = match self.page {
            Some((page, events)) => (BlockKind::Page { page }, events),
            None => (
                BlockKind::Motion,
                self.steps.iter().copied().max().unwrap_or(0),
            ),
        };
        if step_event_count == 0 {
            return Err(MotionError::invalid_block("no steps"));
        }

        let nominal_rate = self.nominal_rate.max(self.minimal_rate);
        let initial_rate = self.initial_rate.max(self.minimal_rate).min(nominal_rate);
        let final_rate = self.final_rate.max(self.minimal_rate).min(nominal_rate);
        let mut cruise_rate = nominal_rate;

        let sec = step_event_count as i64;
        let mut accelerate_steps: i64 = 0;
        let mut decelerate_steps: i64 = 0;
        let accel = self.acceleration;

        let mut inverse_accel = 0.0f32;
        if accel != 0 {
            inverse_accel = 1.0 / accel as f32;
            let half_inverse = 0.5 * inverse_accel;
            let nominal_sq = sq(nominal_rate);
            let accelerate_float = half_inverse * (nominal_sq - sq(initial_rate));
            let decelerate_float = half_inverse * (nominal_sq - sq(final_rate));
            accelerate_steps = ceilf(accelerate_float) as i64;
            decelerate_steps = ceilf(decelerate_float) as i64;

            let plateau_steps = sec - accelerate_steps - decelerate_steps;
            if plateau_steps < 0 {
                // Nominal rate is never reached: meet the final rate exactly at the end
                accelerate_steps =
                    roundf((sec as f32 + accelerate_float - decelerate_float) * 0.5) as i64;
                accelerate_steps = accelerate_steps.clamp(0, sec);
                decelerate_steps = sec - accelerate_steps;
                let reached = sqrtf(sq(initial_rate) + 2.0 * accel as f32 * accelerate_steps as f32);
                cruise_rate = cruise_rate.min(reached as u32).max(initial_rate);
            }
        }

        let rate_factor = inverse_accel * self.timer_rate as f32;
        let acceleration_time = (rate_factor * (cruise_rate - initial_rate) as f32) as u32;
        let deceleration_time =
            (rate_factor * cruise_rate.saturating_sub(final_rate) as f32) as u32;
        let acceleration_rate =
            (accel as f32 * ((1u32 << 24) as f32 / self.timer_rate as f32)) as u32;

        let mut block = MotionBlock {
            id: BlockId::NONE,
            kind,
            steps: if self.page.is_some() { [0; MAX_AXES] } else { self.steps },
            direction_bits: self.direction_bits,
            step_event_count,
            initial_rate,
            nominal_rate,
            final_rate,
            cruise_rate,
            accelerate_before: accelerate_steps as u32,
            decelerate_start: (sec - decelerate_steps) as u32,
            acceleration_rate,
            acceleration_time,
            deceleration_time,
            acceleration_time_inverse: period_inverse(acceleration_time),
            deceleration_time_inverse: period_inverse(deceleration_time),
            advance: AdvanceParams::default(),
        };

        if let Some((extruder, k)) = self.advance {
            block.advance = advance_params(&block, extruder, k, accel);
        }

        Ok(block)
    }
}

#[inline]
fn sq(rate: u32) -> f32 {
    let rate = rate as f32;
    rate * rate
}

/// Linear advance only applies to extrusion alongside other motion.
fn advance_params(block: &MotionBlock, extruder: usize, k: f32, accel: u32) -> AdvanceParams {
    let e_steps = block.steps.get(extruder).copied().unwrap_or(0);
    let others_move = block
        .moving_axes()
        .iter()
        .any(|axis| axis != extruder);
    if k <= 0.0 || e_steps == 0 || !block.direction_bits.get(extruder) || !others_move {
        return AdvanceParams::default();
    }

    let rate = (k * accel as f32) as u32;
    if rate == 0 {
        return AdvanceParams::default();
    }

    // At most four extruder steps per advance ISR call
    let mut scaling = 0u8;
    let mut dividend = e_steps << 1;
    while dividend <= block.step_event_count >> 2 {
        scaling += 1;
        dividend <<= 1;
    }

    let comp = k * e_steps as f32 / block.step_event_count as f32;
    AdvanceParams {
        rate,
        scaling,
        max_steps: (block.cruise_rate as f32 * comp) as u32,
        final_steps: (block.final_rate as f32 * comp) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMER: u32 = 2_000_000;

    #[test]
    fn test_full_trapezoid() {
        // 100 -> 1000 at 2048 steps/s²: (1000² - 100²) / 4096 = 241.7 steps each side
        let block = BlockBuilder::new(TIMER)
            .steps(0, 1000)
            .steps(1, -500)
            .rates(100, 1000, 100)
            .acceleration(2048)
            .build()
            .unwrap();

        assert_eq!(block.step_event_count, 1000);
        assert_eq!(block.accelerate_before, 242);
        assert_eq!(block.decelerate_start, 758);
        // 2048 · 2^24 / 2 MHz
        assert_eq!(block.acceleration_rate, 17179);
        assert_eq!(block.cruise_rate, 1000);
        assert!(block.direction_bits.get(0));
        assert!(!block.direction_bits.get(1));
        assert_eq!(block.signed_steps(1), -500);
        assert!(block.validate().is_ok());
    }

    #[test]
    fn test_no_plateau() {
        let block = BlockBuilder::new(TIMER)
            .steps(0, 100)
            .rates(100, 10_000, 100)
            .acceleration(10_000)
            .build()
            .unwrap();

        assert_eq!(block.accelerate_before, 50);
        assert_eq!(block.decelerate_start, 50);
        // sqrt(100² + 2·10000·50) ≈ 1004
        assert!(block.cruise_rate < 1010 && block.cruise_rate > 1000);
        assert!(block.validate().is_ok());
    }

    #[test]
    fn test_rates_floored() {
        let block = BlockBuilder::new(TIMER)
            .minimal_rate(31)
            .steps(2, 10)
            .rates(0, 0, 0)
            .build()
            .unwrap();

        assert_eq!(block.initial_rate, 31);
        assert_eq!(block.nominal_rate, 31);
        assert_eq!(block.accelerate_before, 0);
        assert_eq!(block.decelerate_start, 10);
    }

    #[test]
    fn test_empty_block_rejected() {
        let result = BlockBuilder::new(TIMER).rates(100, 100, 100).build();
        assert!(matches!(result, Err(MotionError::InvalidBlock(_))));
    }

    #[test]
    fn test_linear_advance_params() {
        let block = BlockBuilder::new(TIMER)
            .steps(0, 1000)
            .steps(3, 100)
            .rates(500, 5000, 500)
            .acceleration(50_000)
            .linear_advance(3, 0.1)
            .build()
            .unwrap();

        assert_eq!(block.advance.rate, 5000);
        // 200 <= 250 -> 1, 400 > 250
        assert_eq!(block.advance.scaling, 1);
        assert_eq!(block.advance.max_steps, 50);
        assert_eq!(block.advance.final_steps, 5);
    }

    #[test]
    fn test_linear_advance_skips_retraction() {
        let block = BlockBuilder::new(TIMER)
            .steps(0, 1000)
            .steps(3, -100)
            .rates(500, 5000, 500)
            .acceleration(50_000)
            .linear_advance(3, 0.1)
            .build()
            .unwrap();

        assert!(!block.advance.is_active());
    }
}
