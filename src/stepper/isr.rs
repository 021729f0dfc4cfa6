//! The stepper interrupt handler.
//!
//! One ISR call interleaves four tasks, each with its own countdown: the echo
//! task of input shaping, the pulse and block phases, the linear advance task
//! and the babystep task. Every pass runs whatever is due, then advances all
//! countdowns by the smallest one. Passes repeat while the next event is
//! already too close to leave the handler, up to a fixed loop limit; past that
//! the deadline is pushed out and multistepping is raised.

use embedded_hal::delay::DelayNs;

use crate::motion::Planner;
use crate::motor::{AxisDriver, StepperTimer};

use super::engine::StepperEngine;
use super::NEVER;

impl<P, D, T, DL> StepperEngine<'_, P, D, T, DL>
where
    P: Planner,
    D: AxisDriver,
    T: StepperTimer,
    DL: DelayNs,
{
    /// Run one stepper interrupt.
    ///
    /// Call from the step timer's compare-match handler. Ends by programming
    /// the next compare match.
    pub fn isr(&mut self) {
        // Keep the timer quiet while the handler runs
        let max_interval = self.calc.max_interval();
        self.timer.set_compare(max_interval);

        self.apply_endstop_hits();
        if self.next_babystep == NEVER && self.signals.has_babysteps() {
            self.next_babystep = 0;
        }

        let mut next_isr_ticks: u32 = 0;
        let mut loops = self.settings.max_isr_loops.max(1);
        let min_ticks = loop {
            self.shaping_isr();

            if self.next_main == 0 {
                self.pulse_phase();
            }

            if self.advance.next == 0 {
                self.advance_isr();
                self.advance.next = self.advance.interval;
            } else if self.advance.next > self.advance.interval {
                self.advance.next = self.advance.interval;
            }

            let is_babystep = self.next_babystep == 0;
            if is_babystep {
                self.next_babystep = self.babystep_isr();
            }

            if self.next_main == 0 {
                self.next_main = self.block_phase();
            }

            // Babysteps steal time from the block, never the other way round
            if is_babystep {
                self.next_main = self.next_main.max(self.settings.babystep_ticks >> 3);
            }
            if self.next_babystep != NEVER {
                self.next_babystep = self.next_babystep.max(self.next_main >> 1);
            }

            let interval = self
                .next_main
                .min(max_interval)
                .min(self.shaping.next_due())
                .min(self.advance.next)
                .min(self.next_babystep);

            self.next_main -= interval;
            self.shaping.advance(interval);
            if self.advance.next != NEVER {
                self.advance.next -= interval;
            }
            if self.next_babystep != NEVER {
                self.next_babystep -= interval;
            }

            next_isr_ticks = next_isr_ticks.saturating_add(interval);
            let min_ticks = self
                .timer
                .count()
                .saturating_add(self.settings.isr_margin_ticks);

            loops -= 1;
            if loops == 0 || next_isr_ticks >= min_ticks {
                break min_ticks;
            }
        };

        let time_spent = self.timer.count();
        self.time_in_isr = self.time_in_isr.wrapping_add(time_spent);

        if next_isr_ticks < min_ticks {
            next_isr_ticks = min_ticks;
            self.handle_overrun();
        } else {
            self.time_out_isr = self
                .time_out_isr
                .wrapping_add(next_isr_ticks.wrapping_sub(time_spent));
        }

        self.timer.set_compare(next_isr_ticks);
    }

    /// The ISR could not meet its deadline: issue more pulses per call so
    /// fewer calls are needed.
    fn handle_overrun(&mut self) {
        self.diagnostics.overruns = self.diagnostics.overruns.wrapping_add(1);
        if self.steps_per_isr < self.settings.multistep_limit {
            self.steps_per_isr <<= 1;
            self.ticks_nominal = 0;
            self.diagnostics.multistep_escalations =
                self.diagnostics.multistep_escalations.wrapping_add(1);
            warn!("stepper ISR overrun, {} steps per call", self.steps_per_isr);
        } else if self.settings.count_lost_steps {
            self.diagnostics.lost_step_risk = self.diagnostics.lost_step_risk.wrapping_add(1);
            warn!("stepper ISR overrun at the multistep limit");
        }
    }

    /// Record positions of endstops reported through the signals.
    fn apply_endstop_hits(&mut self) {
        let hits = self.signals.take_endstop_hits();
        for axis in hits.iter() {
            self.triggered.set_axis(axis, self.position.axis(axis));
            info!("endstop on axis {} at {}", axis, self.position.axis(axis));
        }
    }
}
