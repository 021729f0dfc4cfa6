//! Axis position vector.
//!
//! Absolute positions in steps, one entry per logical axis. The engine mutates
//! its copy with every pulse; callers only ever see snapshots.

use core::ops::{Index, IndexMut};

use crate::motion::MAX_AXES;

/// Absolute position of every axis, in steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Position([i32; MAX_AXES]);

impl Position {
    /// All axes at zero.
    pub const ZERO: Self = Self([0; MAX_AXES]);

    /// Create from raw step counts.
    #[inline]
    pub const fn new(steps: [i32; MAX_AXES]) -> Self {
        Self(steps)
    }

    /// Create from a slice, leaving axes beyond its length at zero.
    pub fn from_slice(steps: &[i32]) -> Self {
        let mut position = Self::ZERO;
        for (dst, src) in position.0.iter_mut().zip(steps) {
            *dst = *src;
        }
        position
    }

    /// Position of one axis. Out-of-range axes read as zero.
    #[inline]
    pub fn axis(&self, axis: usize) -> i32 {
        self.0.get(axis).copied().unwrap_or(0)
    }

    /// Set one axis. Out-of-range axes are ignored.
    #[inline]
    pub fn set_axis(&mut self, axis: usize, steps: i32) {
        if let Some(slot) = self.0.get_mut(axis) {
            *slot = steps;
        }
    }

    /// Move one axis by `delta` steps.
    #[inline]
    pub fn offset_axis(&mut self, axis: usize, delta: i32) {
        if let Some(slot) = self.0.get_mut(axis) {
            *slot = slot.wrapping_add(delta);
        }
    }

    /// Raw step counts.
    #[inline]
    pub fn as_array(&self) -> &[i32; MAX_AXES] {
        &self.0
    }
}

impl Index<usize> for Position {
    type Output = i32;

    fn index(&self, axis: usize) -> &i32 {
        &self.0[axis]
    }
}

impl IndexMut<usize> for Position {
    fn index_mut(&mut self, axis: usize) -> &mut i32 {
        &mut self.0[axis]
    }
}

impl From<[i32; MAX_AXES]> for Position {
    fn from(steps: [i32; MAX_AXES]) -> Self {
        Self(steps)
    }
}
