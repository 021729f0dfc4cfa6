//! State shared between the stepper ISR and other contexts.
//!
//! Everything here is safe to touch from the foreground or from another
//! interrupt handler while the stepper ISR runs. Only loads and stores are used
//! on the atomics so the type also works on cores without compare-and-swap.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use critical_section::Mutex;

use crate::motion::{AxisBits, BlockId, MAX_AXES};

/// Id of the block the ISR is executing, readable without tearing.
///
/// The id is published as two bytes. Readers keep reading until two
/// consecutive reads agree, so an ISR update between the two halves is never
/// observed as a mix of old and new.
#[derive(Debug, Default)]
pub struct BlockMonitor {
    low: AtomicU8,
    high: AtomicU8,
}

impl BlockMonitor {
    /// No block running.
    pub const fn new() -> Self {
        Self {
            low: AtomicU8::new(0),
            high: AtomicU8::new(0),
        }
    }

    /// Publish the running block. Called from the ISR only.
    pub(crate) fn set(&self, id: BlockId) {
        let [low, high] = id.0.to_le_bytes();
        self.low.store(low, Ordering::Release);
        self.high.store(high, Ordering::Release);
    }

    #[inline]
    fn read_once(&self) -> u16 {
        let low = self.low.load(Ordering::Acquire);
        let high = self.high.load(Ordering::Acquire);
        u16::from_le_bytes([low, high])
    }

    /// Block currently running.
    pub fn current(&self) -> BlockId {
        let mut new = self.read_once();
        loop {
            let old = new;
            new = self.read_once();
            if old == new {
                return BlockId(new);
            }
        }
    }

    /// Whether the ISR is executing block `id`.
    #[inline]
    pub fn is_block_busy(&self, id: BlockId) -> bool {
        id.is_some() && self.current() == id
    }
}

/// Flags and requests exchanged with the stepper ISR.
///
/// Usually placed in a `static` and shared by reference with the engine.
///
/// # Example
///
/// ```rust,ignore
/// static SIGNALS: EngineSignals = EngineSignals::new();
///
/// // endstop interrupt
/// SIGNALS.trigger_endstop(Z);
///
/// // user interface
/// SIGNALS.babystep(Z, -4);
/// ```
pub struct EngineSignals {
    abort: AtomicBool,
    endstop_hits: Mutex<Cell<AxisBits>>,
    babysteps: Mutex<Cell<[i16; MAX_AXES]>>,
    monitor: BlockMonitor,
}

impl EngineSignals {
    /// Create with nothing pending.
    pub const fn new() -> Self {
        Self {
            abort: AtomicBool::new(false),
            endstop_hits: Mutex::new(Cell::new(AxisBits::EMPTY)),
            babysteps: Mutex::new(Cell::new([0; MAX_AXES])),
            monitor: BlockMonitor::new(),
        }
    }

    /// Request the running block to be dropped at the next pulse phase.
    ///
    /// Raising it again before it is consumed has no further effect.
    #[inline]
    pub fn abort_current_block(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Whether an abort is pending.
    #[inline]
    pub fn abort_pending(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Consume a pending abort.
    #[inline]
    pub(crate) fn take_abort(&self) -> bool {
        if self.abort.load(Ordering::Acquire) {
            self.abort.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Report an endstop hit from an interrupt that cannot reach the engine.
    ///
    /// The engine records the position at the start of its next ISR, before
    /// any further pulse, and aborts the running block.
    pub fn trigger_endstop(&self, axis: usize) {
        critical_section::with(|cs| {
            let hits = self.endstop_hits.borrow(cs);
            hits.set(hits.get().with(axis, true));
        });
        self.abort_current_block();
    }

    /// Consume pending endstop hits.
    pub(crate) fn take_endstop_hits(&self) -> AxisBits {
        critical_section::with(|cs| self.endstop_hits.borrow(cs).replace(AxisBits::EMPTY))
    }

    /// Queue `steps` babysteps on an axis (negative = backward).
    pub fn babystep(&self, axis: usize, steps: i16) {
        if axis >= MAX_AXES {
            return;
        }
        critical_section::with(|cs| {
            let cell = self.babysteps.borrow(cs);
            let mut pending = cell.get();
            pending[axis] = pending[axis].saturating_add(steps);
            cell.set(pending);
        });
    }

    /// Babysteps still queued per axis.
    pub fn pending_babysteps(&self) -> [i16; MAX_AXES] {
        critical_section::with(|cs| self.babysteps.borrow(cs).get())
    }

    /// Whether any babystep is queued.
    pub fn has_babysteps(&self) -> bool {
        self.pending_babysteps().iter().any(|&steps| steps != 0)
    }

    /// Take one babystep from every axis that has some queued.
    ///
    /// Returns the axes to step, their directions (set = forward) and whether
    /// more steps remain.
    pub(crate) fn take_babysteps(&self) -> (AxisBits, AxisBits, bool) {
        critical_section::with(|cs| {
            let cell = self.babysteps.borrow(cs);
            let mut pending = cell.get();
            let mut axes = AxisBits::EMPTY;
            let mut forward = AxisBits::EMPTY;
            for (axis, steps) in pending.iter_mut().enumerate() {
                if *steps != 0 {
                    axes.set(axis, true);
                    forward.set(axis, *steps > 0);
                    *steps -= steps.signum();
                }
            }
            cell.set(pending);
            let more = pending.iter().any(|&steps| steps != 0);
            (axes, forward, more)
        })
    }

    /// Drop all queued babysteps.
    pub fn clear_babysteps(&self) {
        critical_section::with(|cs| self.babysteps.borrow(cs).set([0; MAX_AXES]));
    }

    /// Running block monitor.
    #[inline]
    pub fn monitor(&self) -> &BlockMonitor {
        &self.monitor
    }

    /// Whether the ISR is executing block `id`.
    #[inline]
    pub fn is_block_busy(&self, id: BlockId) -> bool {
        self.monitor.is_block_busy(id)
    }
}

impl Default for EngineSignals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_idempotent() {
        let signals = EngineSignals::new();
        signals.abort_current_block();
        signals.abort_current_block();

        assert!(signals.take_abort());
        assert!(!signals.take_abort());
    }

    #[test]
    fn test_babysteps_drain_one_at_a_time() {
        let signals = EngineSignals::new();
        signals.babystep(2, -2);
        signals.babystep(0, 1);

        let (axes, forward, more) = signals.take_babysteps();
        assert_eq!(axes.bits(), 0b101);
        assert!(forward.get(0));
        assert!(!forward.get(2));
        assert!(more);

        let (axes, _, more) = signals.take_babysteps();
        assert_eq!(axes.bits(), 0b100);
        assert!(!more);
        assert!(!signals.has_babysteps());
    }

    #[test]
    fn test_block_monitor() {
        let monitor = BlockMonitor::new();
        monitor.set(BlockId(0x1234));

        assert!(monitor.is_block_busy(BlockId(0x1234)));
        assert!(!monitor.is_block_busy(BlockId(0x1235)));
        assert!(!monitor.is_block_busy(BlockId::NONE));
    }

    #[test]
    fn test_endstop_hits_raise_abort() {
        let signals = EngineSignals::new();
        signals.trigger_endstop(1);

        assert!(signals.abort_pending());
        assert_eq!(signals.take_endstop_hits().bits(), 0b10);
        assert!(signals.take_endstop_hits().is_empty());
    }
}
