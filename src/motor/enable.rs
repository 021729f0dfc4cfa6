//! Enable line bookkeeping.
//!
//! Several axes may share one physical ENABLE line (an enable group). An axis
//! is marked disabled on request, but its line is only released once no other
//! axis of the same group is still marked enabled.

use crate::motion::{AxisBits, MAX_AXES};

/// Which axes are marked enabled and which share enable lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnableState {
    enabled: AxisBits,
    overlap: [AxisBits; MAX_AXES],
}

impl EnableState {
    /// Build from the enable group of every axis.
    pub fn new(groups: &[Option<u8>; MAX_AXES]) -> Self {
        let mut overlap = [AxisBits::EMPTY; MAX_AXES];
        for (axis, group) in groups.iter().enumerate() {
            let Some(group) = group else { continue };
            for (other, other_group) in groups.iter().enumerate() {
                if other != axis && *other_group == Some(*group) {
                    overlap[axis].set(other, true);
                }
            }
        }
        Self {
            enabled: AxisBits::EMPTY,
            overlap,
        }
    }

    /// Axes currently marked enabled.
    #[inline]
    pub fn enabled(&self) -> AxisBits {
        self.enabled
    }

    /// Whether an axis is marked enabled.
    #[inline]
    pub fn is_enabled(&self, axis: usize) -> bool {
        self.enabled.get(axis)
    }

    /// Mark an axis enabled.
    #[inline]
    pub fn mark_enabled(&mut self, axis: usize) {
        self.enabled.set(axis, true);
    }

    /// Mark an axis disabled.
    #[inline]
    pub fn mark_disabled(&mut self, axis: usize) {
        self.enabled.set(axis, false);
    }

    /// Other axes sharing this axis' enable line.
    #[inline]
    pub fn overlap(&self, axis: usize) -> AxisBits {
        self.overlap.get(axis).copied().unwrap_or(AxisBits::EMPTY)
    }

    /// Whether the enable line of `axis` may be released.
    #[inline]
    pub fn can_disable(&self, axis: usize) -> bool {
        (self.enabled & self.overlap(axis)).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_line_stays_enabled() {
        let mut groups = [None; MAX_AXES];
        groups[0] = Some(1);
        groups[1] = Some(1);
        let mut state = EnableState::new(&groups);

        state.mark_enabled(0);
        state.mark_enabled(1);
        state.mark_disabled(0);
        assert!(!state.can_disable(0));

        state.mark_disabled(1);
        assert!(state.can_disable(1));
        assert!(state.can_disable(0));
    }

    #[test]
    fn test_unshared_axes() {
        let mut state = EnableState::new(&[None; MAX_AXES]);
        state.mark_enabled(2);
        assert!(state.can_disable(3));
        assert!(state.overlap(2).is_empty());
        assert!(state.is_enabled(2));
    }
}
