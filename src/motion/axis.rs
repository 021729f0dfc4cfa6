//! Axis indexing primitives shared by blocks and the engine.

/// Maximum number of logical axes the engine drives.
pub const MAX_AXES: usize = 8;

/// Maximum number of motors on one logical axis (quad-endstop axes).
pub const MAX_MOTORS_PER_AXIS: usize = 4;

/// Direction of motion on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Increasing position.
    #[default]
    Forward,
    /// Decreasing position.
    Backward,
}

impl Direction {
    /// Direction from a "forward" flag.
    #[inline]
    pub const fn from_forward(forward: bool) -> Self {
        if forward {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    /// Position change of one step in this direction.
    #[inline]
    pub const fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// One bit per axis.
///
/// Used for direction bits (set = forward), per-event step flags and
/// "which axes moved" masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisBits(u8);

impl AxisBits {
    /// No bits set.
    pub const EMPTY: Self = Self(0);

    /// All axes set.
    pub const ALL: Self = Self(u8::MAX);

    /// Create from raw bits.
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether the bit for `axis` is set.
    #[inline]
    pub const fn get(self, axis: usize) -> bool {
        axis < MAX_AXES && self.0 & (1 << axis) != 0
    }

    /// Set or clear the bit for `axis`. Out-of-range axes are ignored.
    #[inline]
    pub fn set(&mut self, axis: usize, value: bool) {
        if axis >= MAX_AXES {
            return;
        }
        if value {
            self.0 |= 1 << axis;
        } else {
            self.0 &= !(1 << axis);
        }
    }

    /// Flip the bit for `axis`.
    #[inline]
    pub fn toggle(&mut self, axis: usize) {
        if axis < MAX_AXES {
            self.0 ^= 1 << axis;
        }
    }

    /// Builder-style set.
    #[inline]
    pub fn with(mut self, axis: usize, value: bool) -> Self {
        self.set(axis, value);
        self
    }

    /// Whether no bit is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether any bit is set.
    #[inline]
    pub const fn any(self) -> bool {
        self.0 != 0
    }

    /// Direction encoded by the bit for `axis` (set = forward).
    #[inline]
    pub const fn direction(self, axis: usize) -> Direction {
        Direction::from_forward(self.get(axis))
    }

    /// Indices of set bits, lowest first.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_AXES).filter(move |&axis| self.get(axis))
    }
}

impl core::ops::BitOr for AxisBits {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitAnd for AxisBits {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl core::ops::BitXor for AxisBits {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl core::ops::Not for AxisBits {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}
