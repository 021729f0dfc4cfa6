//! Unit types for timing quantities.
//!
//! Provides type-safe representations of clock rates and durations so timer
//! ticks, nanoseconds and microseconds cannot be mixed up at compile time.

use core::ops::{Add, Mul};

use serde::Deserialize;

/// Clock or step frequency in hertz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct Hertz(pub u32);

impl Hertz {
    /// Create a new Hertz value.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl Mul<u32> for Hertz {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self::Output {
        Self(self.0.saturating_mul(rhs))
    }
}

/// Duration in nanoseconds.
///
/// Used for pulse widths and direction setup/hold times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct Nanoseconds(pub u32);

impl Nanoseconds {
    /// Create a new Nanoseconds value.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Convert to ticks of `clock`, rounded to the nearest tick.
    #[inline]
    pub const fn to_ticks(self, clock: Hertz) -> u32 {
        let ticks = (self.0 as u64 * clock.0 as u64 + 500_000_000) / 1_000_000_000;
        if ticks > u32::MAX as u64 {
            u32::MAX
        } else {
            ticks as u32
        }
    }

    /// Saturating subtraction.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Nanoseconds {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

/// Duration in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct Microseconds(pub u32);

impl Microseconds {
    /// Create a new Microseconds value.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Convert to ticks of `clock`, truncating.
    #[inline]
    pub const fn to_ticks(self, clock: Hertz) -> u32 {
        let ticks = self.0 as u64 * clock.0 as u64 / 1_000_000;
        if ticks > u32::MAX as u64 {
            u32::MAX
        } else {
            ticks as u32
        }
    }

    /// Convert to nanoseconds.
    #[inline]
    pub const fn to_nanos(self) -> Nanoseconds {
        Nanoseconds(self.0.saturating_mul(1000))
    }
}

/// Extension trait for creating unit types from primitives.
pub trait UnitExt {
    /// Convert to Hertz.
    fn hz(self) -> Hertz;
    /// Convert to Nanoseconds.
    fn ns(self) -> Nanoseconds;
    /// Convert to Microseconds.
    fn us(self) -> Microseconds;
}

impl UnitExt for u32 {
    #[inline]
    fn hz(self) -> Hertz {
        Hertz(self)
    }

    #[inline]
    fn ns(self) -> Nanoseconds {
        Nanoseconds(self)
    }

    #[inline]
    fn us(self) -> Microseconds {
        Microseconds(self)
    }
}
