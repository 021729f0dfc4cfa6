//! Pulse phase: issue the step events due for the running block.

use embedded_hal::delay::DelayNs;

use crate::motion::{AxisBits, BlockId, Planner};
use crate::motor::{AxisDriver, StepperTimer};

use super::engine::StepperEngine;

impl<P, D, T, DL> StepperEngine<'_, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    /// Issue up to `steps_per_isr` step events of the running block.
    pub(super) fn pulse_phase(&mut self) {
        if self.signals.take_abort() && self.block.is_some() {
            self.abort_block();
        }
        if self.block.is_none() || self.step_events_completed >= self.step_event_count {
            return;
        }

        let events = (self.step_event_count - self.step_events_completed).min(self.steps_per_isr);
        self.step_events_completed += events;

        let mask = self.axis_mask;
        for event in 0..events {
            let mut step = match self.page.as_mut() {
                Some(cursor) => cursor
                    .next_event()
                    .map_or(AxisBits::EMPTY, |bits| AxisBits::from_bits(bits.bits() & mask.bits())),
                None => self.bresenham.step(mask),
            };

            if let Some(extruder) = self.extruder {
                if self.advance.active && step.get(extruder) {
                    // Re-emitted by the advance task
                    step.set(extruder, false);
                    self.advance.advance_steps = self.advance.advance_steps.wrapping_sub(1);
                }
            }

            step = self.shape_primary(step);

            if event != 0 {
                self.pulse.await_low(&mut self.timer);
            }
            self.pulse_axes(step);
            if event + 1 < events {
                self.pulse.start(&mut self.timer);
            }
        }
    }

    /// Queue echoes for shaped axes and keep only the primary steps that
    /// cross a whole step.
    fn shape_primary(&mut self, mut step: AxisBits) -> AxisBits {
        for slot in 0..self.shaping.len() {
            let shaper = self.shaping.slot(slot);
            let axis = shaper.axis;
            if !shaper.is_enabled() || !step.get(axis) {
                continue;
            }
            let forward = shaper.forward;
            let share = shaper.primary_share();
            if !self.shaping.enqueue(slot, forward) {
                self.diagnostics.dropped_echoes = self.diagnostics.dropped_echoes.wrapping_add(1);
            }
            let fire = self.shaping_prep(slot, share);
            step.set(axis, fire);
        }
        step
    }

    /// Drop the running block without completing it.
    pub(super) fn abort_block(&mut self) {
        let id = self.current_block_id();
        self.planner.discard_current_block();
        self.block = None;
        self.page = None;
        self.signals.monitor().set(BlockId::NONE);
        self.shaping.purge(&self.position);
        self.advance.stop();
        self.diagnostics.aborted_blocks = self.diagnostics.aborted_blocks.wrapping_add(1);
        warn!("block {} aborted", id.0);
    }
}
