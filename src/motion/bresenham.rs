//! Bresenham step distribution.
//!
//! Every axis keeps a signed error accumulator. Per step event the axis adds its
//! dividend (`2·steps`); when the accumulator turns non-negative the axis steps
//! and the divisor (`2·events`) is subtracted. Starting at `-events` centers the
//! first step, and after exactly `events` events every axis has issued exactly
//! its step count.

use super::axis::{AxisBits, MAX_AXES};

/// Per-axis Bresenham state for one block.
#[derive(Debug, Clone, Default)]
pub struct Bresenham {
    delta_error: [i32; MAX_AXES],
    dividend: [u32; MAX_AXES],
    divisor: u32,
}

impl Bresenham {
    /// Empty state: no axis ever steps.
    pub const fn new() -> Self {
        Self {
            delta_error: [0; MAX_AXES],
            dividend: [0; MAX_AXES],
            divisor: 0,
        }
    }

    /// Prepare for a block of `events` step events (already oversampled).
    pub fn start(&mut self, steps: &[u32; MAX_AXES], events: u32) {
        let bias = -(events as i32);
        self.delta_error = [bias; MAX_AXES];
        for (dividend, &axis_steps) in self.dividend.iter_mut().zip(steps) {
            *dividend = axis_steps << 1;
        }
        self.divisor = events << 1;
    }

    /// Advance one event for the axes in `mask`; returns the axes that step.
    #[inline]
    pub fn step(&mut self, mask: AxisBits) -> AxisBits {
        let mut stepped = AxisBits::EMPTY;
        for axis in mask.iter() {
            if self.step_axis(axis) {
                stepped.set(axis, true);
            }
        }
        stepped
    }

    /// Advance one event on one axis.
    #[inline]
    pub fn step_axis(&mut self, axis: usize) -> bool {
        let error = &mut self.delta_error[axis];
        *error = error.wrapping_add(self.dividend[axis] as i32);
        if *error >= 0 {
            *error = error.wrapping_sub(self.divisor as i32);
            true
        } else {
            false
        }
    }

    /// Dividend of an axis (`2·steps`).
    #[inline]
    pub fn dividend(&self, axis: usize) -> u32 {
        self.dividend.get(axis).copied().unwrap_or(0)
    }

    /// Divisor shared by all axes (`2·events`).
    #[inline]
    pub fn divisor(&self) -> u32 {
        self.divisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(steps: &[u32; MAX_AXES], events: u32) -> [u32; MAX_AXES] {
        let mut state = Bresenham::new();
        state.start(steps, events);
        let mut counts = [0u32; MAX_AXES];
        for _ in 0..events {
            for axis in state.step(AxisBits::ALL).iter() {
                counts[axis] += 1;
            }
        }
        counts
    }

    #[test]
    fn test_diagonal_zig_zag() {
        let mut steps = [0; MAX_AXES];
        steps[0] = 100;
        steps[1] = 50;

        let mut state = Bresenham::new();
        state.start(&steps, 100);

        let mut y_pattern = [false; 100];
        for event in y_pattern.iter_mut() {
            let stepped = state.step(AxisBits::ALL);
            assert!(stepped.get(0));
            *event = stepped.get(1);
        }
        // Y alternates, never twice in a row
        assert!(y_pattern.windows(2).all(|w| w[0] != w[1]));
        assert_eq!(y_pattern.iter().filter(|&&s| s).count(), 50);
    }

    #[test]
    fn test_exact_counts() {
        let steps = [7, 1, 0, 13, 12, 2, 13, 5];
        assert_eq!(run(&steps, 13), steps);
    }

    #[test]
    fn test_idle_axis_never_steps() {
        let mut steps = [0; MAX_AXES];
        steps[2] = 3;
        let counts = run(&steps, 3);
        assert_eq!(counts[0], 0);
        assert_eq!(counts[2], 3);
    }
}
