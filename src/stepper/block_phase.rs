//! Block phase: pace the running block and load the next one.
//!
//! Runs after every pulse phase. While a block is running it computes the
//! interval to the next pulse phase from the velocity profile; once every step
//! event is out it hands the block back to the planner and loads the next
//! motion block, executing sync blocks on the way.

use embedded_hal::delay::DelayNs;

use crate::motion::{
    accelerate_rate, decelerate_rate, oversampling_headroom, smoothing_oversampling,
    AdvanceParams, AxisBits, BlockId, BlockKind, MotionBlock, PageCursor, Planner, SyncKind,
    PAGE_AXES,
};
use crate::motor::{AxisDriver, StepperTimer};

use super::engine::StepperEngine;
use super::NEVER;

/// Velocity profile fields of the running block.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Ramp {
    pub(super) initial_rate: u32,
    pub(super) nominal_rate: u32,
    pub(super) final_rate: u32,
    pub(super) cruise_rate: u32,
    pub(super) acceleration_rate: u32,
    pub(super) acceleration_time: u32,
    pub(super) deceleration_time: u32,
    pub(super) deceleration_time_inverse: u32,
    pub(super) advance: AdvanceParams,
}

impl Ramp {
    fn of(block: &MotionBlock) -> Self {
        Self {
            initial_rate: block.initial_rate,
            nominal_rate: block.nominal_rate,
            final_rate: block.final_rate,
            cruise_rate: block.cruise_rate,
            acceleration_rate: block.acceleration_rate,
            acceleration_time: block.acceleration_time,
            deceleration_time: block.deceleration_time,
            deceleration_time_inverse: block.deceleration_time_inverse,
            advance: block.advance,
        }
    }
}

impl<P, D, T, DL> StepperEngine<'_, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    /// Returns the ticks until the next pulse phase.
    pub(super) fn block_phase(&mut self) -> u32 {
        self.adapt_multistep();

        let mut interval = self.settings.idle_ticks;
        if self.block.is_some() {
            if self.step_events_completed >= self.step_event_count {
                self.complete_block();
            } else {
                interval = self.ramp_interval();
            }
        }
        if self.block.is_none() {
            if let Some(first) = self.load_next_block() {
                interval = first;
            }
        }
        interval.max(1)
    }

    /// Halve the pulses per ISR call once the ISR spends clearly less time
    /// inside than outside.
    fn adapt_multistep(&mut self) {
        let time_spent = self.timer.count();
        if self.steps_per_isr > 1
            && self.time_out_isr >= self.time_in_isr.wrapping_add(time_spent)
        {
            self.steps_per_isr >>= 1;
            self.ticks_nominal = 0;
            self.diagnostics.multistep_deescalations =
                self.diagnostics.multistep_deescalations.wrapping_add(1);
            debug!("multistepping down to {}", self.steps_per_isr);
        }
        self.time_in_isr = time_spent.wrapping_neg();
        self.time_out_isr = 0;
    }

    fn complete_block(&mut self) {
        if let Some(block) = self.block.take() {
            self.planner.block_completed(&block);
            trace!("block {} completed", block.id.0);
        }
        self.planner.discard_current_block();
        self.page = None;
        self.signals.monitor().set(BlockId::NONE);
    }

    /// Interval for the next pulse phase of the running block.
    fn ramp_interval(&mut self) -> u32 {
        let ramp = self.ramp;
        let os = self.oversampling;

        if self.step_events_completed < self.accelerate_before {
            let rate = if self.settings.s_curve {
                if self.acceleration_time < ramp.acceleration_time {
                    self.bezier.eval(self.acceleration_time)
                } else {
                    ramp.cruise_rate
                }
            } else {
                accelerate_rate(
                    self.acceleration_time,
                    ramp.acceleration_rate,
                    ramp.initial_rate,
                    ramp.nominal_rate,
                )
            };
            self.acc_step_rate = rate;

            let interval = self.calc.multistep_interval(rate << os, self.steps_per_isr);
            self.acceleration_time = self.acceleration_time.wrapping_add(interval);
            self.deceleration_time = 0;

            if self.advance.active {
                let boost = if self.advance_below(ramp.advance.max_steps) {
                    ramp.advance.rate
                } else {
                    0
                };
                let la_rate = rate.saturating_add(boost) >> ramp.advance.scaling;
                self.advance.set_interval(self.calc.interval(la_rate));
            }
            interval
        } else if self.step_events_completed >= self.decelerate_start {
            let rate = if self.settings.s_curve {
                if !self.bezier_second_half {
                    self.bezier.init(
                        ramp.cruise_rate,
                        ramp.final_rate,
                        ramp.deceleration_time_inverse,
                    );
                    self.bezier_second_half = true;
                }
                if self.deceleration_time < ramp.deceleration_time {
                    self.bezier.eval(self.deceleration_time)
                } else {
                    ramp.final_rate
                }
            } else {
                decelerate_rate(
                    self.deceleration_time,
                    ramp.acceleration_rate,
                    self.acc_step_rate,
                    ramp.final_rate,
                )
            };

            let interval = self.calc.multistep_interval(rate << os, self.steps_per_isr);
            self.deceleration_time = self.deceleration_time.wrapping_add(interval);

            if self.advance.active {
                self.decelerate_advance(rate, &ramp.advance);
            }
            interval
        } else {
            if self.ticks_nominal == 0 {
                self.ticks_nominal = self
                    .calc
                    .multistep_interval(ramp.nominal_rate << os, self.steps_per_isr);
                self.acc_step_rate = ramp.nominal_rate;
                self.deceleration_time = self.ticks_nominal / 2;
                if self.advance.active {
                    let la_rate = ramp.nominal_rate >> ramp.advance.scaling;
                    self.advance.set_interval(self.calc.interval(la_rate));
                }
            }
            self.ticks_nominal
        }
    }

    #[inline]
    fn advance_below(&self, steps: u32) -> bool {
        i64::from(self.advance.advance_steps) < i64::from(steps)
    }

    /// Bleed off pressure while decelerating, reversing the extruder when the
    /// bleed rate exceeds the block's own extruder rate.
    fn decelerate_advance(&mut self, rate: u32, advance: &AdvanceParams) {
        let bleed = if i64::from(self.advance.advance_steps) > i64::from(advance.final_steps) {
            advance.rate
        } else {
            0
        };
        if bleed == rate {
            self.advance.interval = NEVER;
            return;
        }

        let forward = bleed < rate;
        let la_rate = rate.abs_diff(bleed) >> advance.scaling;
        self.advance.set_interval(self.calc.interval(la_rate));

        if let Some(extruder) = self.extruder {
            if forward != self.last_direction_bits.get(extruder) {
                self.pulse.start(&mut self.timer);
                self.pulse.await_low(&mut self.timer);
                self.apply_direction(extruder, forward);
            }
        }
    }

    fn apply_sync(&mut self, sync: SyncKind) {
        match sync {
            SyncKind::Position(position) => self.apply_position(position),
            SyncKind::Fan { fan, speed } => self.planner.sync_fan(fan, speed),
            SyncKind::Power(power) => self.planner.sync_power(power),
        }
    }

    /// Load the next motion block, running sync blocks ahead of it.
    ///
    /// Returns the interval to its first pulse phase, or `None` when nothing
    /// was loaded.
    fn load_next_block(&mut self) -> Option<u32> {
        let mut block = loop {
            let sync = match self.planner.current_block() {
                None => {
                    self.advance.stop();
                    return None;
                }
                Some(block) => match block.kind {
                    BlockKind::Sync(sync) => sync,
                    _ => break block.clone(),
                },
            };
            self.apply_sync(sync);
            self.planner.discard_current_block();
        };

        let page = match block.page_index() {
            Some(index) => match self.planner.page(index) {
                Some(data) => Some(PageCursor::new(data)),
                None => {
                    self.planner.discard_current_block();
                    warn!("page {} unavailable, block {} dropped", index, block.id.0);
                    return None;
                }
            },
            None => None,
        };
        let moving = if page.is_some() {
            let axes = PAGE_AXES.min(self.settings.axis_count);
            AxisBits::from_bits(((1u16 << axes) - 1) as u8)
        } else {
            block.moving_axes()
        };

        // Page events map one to one onto page entries
        let os = if self.settings.adaptive_smoothing && page.is_none() {
            // Shifted event counts, rates and the LA dividend (at most twice
            // the event count) must stay clear of the sign bit
            let widest = block
                .step_event_count
                .saturating_mul(2)
                .max(block.nominal_rate);
            smoothing_oversampling(block.nominal_rate, self.settings.min_isr_frequency)
                .min(oversampling_headroom(widest))
        } else {
            0
        };
        self.oversampling = os;
        self.step_event_count = block.step_event_count << os;
        self.bresenham.start(&block.steps, self.step_event_count);

        for slot in 0..self.shaping.len() {
            let shaper = self.shaping.slot_mut(slot);
            if !shaper.is_enabled() {
                continue;
            }
            let axis = shaper.axis;
            shaper.last_block_end_pos = shaper
                .last_block_end_pos
                .wrapping_add(block.signed_steps(axis));
            shaper.forward = block.direction_bits.get(axis);
            // Echoes of the previous block still own the DIR pin
            if !shaper.queue_is_empty() {
                block
                    .direction_bits
                    .set(axis, self.last_direction_bits.get(axis));
            }
        }

        self.step_events_completed = 0;
        self.accelerate_before = block.accelerate_before << os;
        self.decelerate_start = block.decelerate_start << os;

        let extruder = self
            .extruder
            .filter(|_| block.advance.is_active() && page.is_none());
        match extruder {
            Some(extruder) => {
                self.advance.active = true;
                let dividend = (self.bresenham.dividend(extruder) << block.advance.scaling) << os;
                self.advance.dividend = dividend as i32;
                self.advance.delta_error = -(self.step_event_count as i32);
            }
            None => {
                self.advance.active = false;
                self.advance.interval = NEVER;
            }
        }

        if block.direction_bits != self.last_direction_bits {
            self.set_directions(block.direction_bits);
        }
        for axis in moving.iter() {
            self.ensure_enabled(axis);
        }

        self.planner.block_started(&block);
        self.signals.monitor().set(block.id);
        self.ticks_nominal = 0;
        if self.settings.s_curve {
            self.bezier.init(
                block.initial_rate,
                block.cruise_rate,
                block.acceleration_time_inverse,
            );
        }
        self.bezier_second_half = false;
        self.acc_step_rate = block.initial_rate;
        self.ramp = Ramp::of(&block);
        self.axis_mask = moving;
        self.page = page;

        let interval = self
            .calc
            .multistep_interval(block.initial_rate << os, self.steps_per_isr);
        self.acceleration_time = interval / 2;
        self.deceleration_time = interval / 2;

        if self.advance.active {
            let boost = if self.advance_below(block.advance.max_steps) {
                block.advance.rate
            } else {
                0
            };
            let la_rate = block.initial_rate.saturating_add(boost) >> block.advance.scaling;
            self.advance.set_interval(self.calc.interval(la_rate));
        }

        debug!(
            "block {} loaded: {} events, oversampling {}",
            block.id.0,
            self.step_event_count,
            os
        );
        self.block = Some(block);
        Some(interval)
    }
}
