//! Step rate to timer interval conversion.
//!
//! Two strategies are available:
//! - [`IntervalMode::Direct`]: one integer division per call.
//! - [`IntervalMode::Table`]: a piecewise-linear approximation built once at
//!   startup, for CPUs without a hardware divider. Rates of 2048 steps/s and
//!   above are banded by 256 (indexed by `rate >> 8`), lower rates by 8 starting
//!   at the minimal step rate. Intervals stay within 16 bits.
//!
//! Multi-stepping divides the rate by the number of pulses issued per ISR call
//! so the interval covers all of them.

use crate::config::IntervalMode;

/// One band of the lookup table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TableEntry {
    /// Interval at the start of the band.
    base: u16,
    /// Interval decrease across the band.
    gain: u16,
}

const TABLE_LEN: usize = 256;

/// Lookup tables for [`IntervalMode::Table`].
#[derive(Debug, Clone)]
struct IntervalTable {
    fast: [TableEntry; TABLE_LEN],
    slow: [TableEntry; TABLE_LEN],
}

impl IntervalTable {
    fn build(timer_rate: u32, minimal_rate: u32) -> Self {
        let clamp = |ticks: u32| ticks.min(u16::MAX as u32) as u16;

        let mut fast = [TableEntry::default(); TABLE_LEN];
        let first_fast = (IntervalCalculator::FAST_TABLE_START >> 8) as usize;
        for (index, entry) in fast.iter_mut().enumerate().skip(first_fast) {
            let rate = (index as u32) << 8;
            let base = timer_rate / rate;
            let next = timer_rate / (rate + 256);
            *entry = TableEntry {
                base: clamp(base),
                gain: clamp(base - next),
            };
        }

        let mut slow = [TableEntry::default(); TABLE_LEN];
        for (index, entry) in slow.iter_mut().enumerate() {
            let rate = minimal_rate + ((index as u32) << 3);
            let base = timer_rate / rate;
            let next = timer_rate / (rate + 8);
            *entry = TableEntry {
                base: clamp(base),
                gain: clamp(base - next),
            };
        }

        Self { fast, slow }
    }

    fn lookup(&self, timer_rate: u32, minimal_rate: u32, rate: u32) -> u32 {
        if rate >= IntervalCalculator::FAST_TABLE_START {
            if rate > 0xFFFF {
                return (timer_rate >> 16).max(1);
            }
            let entry = self.fast[(rate >> 8) as usize];
            let offset = (rate & 0xFF) * entry.gain as u32;
            return entry.base as u32 - (offset >> 8);
        }

        if rate > minimal_rate {
            let rate = rate - minimal_rate;
            let entry = self.slow[((rate >> 3) as usize).min(TABLE_LEN - 1)];
            let offset = (entry.gain as u32 * (rate & 0x07)) >> 3;
            return entry.base as u32 - offset;
        }

        self.slow[0].base as u32
    }
}

/// Converts step rates (steps/s) into step timer ticks.
#[derive(Debug, Clone)]
pub struct IntervalCalculator {
    timer_rate: u32,
    minimal_rate: u32,
    table: Option<IntervalTable>,
}

impl IntervalCalculator {
    /// First rate handled by the fast table.
    pub const FAST_TABLE_START: u32 = 0x0800;

    /// Create a calculator for a step timer running at `timer_rate` Hz.
    pub fn new(mode: IntervalMode, timer_rate: u32) -> Self {
        let timer_rate = timer_rate.max(1);
        match mode {
            IntervalMode::Direct => Self {
                timer_rate,
                minimal_rate: Self::direct_minimal_rate(timer_rate),
                table: None,
            },
            IntervalMode::Table => {
                let minimal_rate = Self::table_minimal_rate(timer_rate);
                Self {
                    timer_rate,
                    minimal_rate,
                    table: Some(IntervalTable::build(timer_rate, minimal_rate)),
                }
            }
        }
    }

    /// Lowest step rate for direct division with a 32-bit timer.
    pub const fn direct_minimal_rate(timer_rate: u32) -> u32 {
        let rate = timer_rate / u32::MAX;
        if rate < 1 {
            1
        } else {
            rate
        }
    }

    /// Lowest step rate whose interval fits a 16-bit timer.
    pub const fn table_minimal_rate(timer_rate: u32) -> u32 {
        let max = u16::MAX as u32;
        let rate = timer_rate / max + (timer_rate % max != 0) as u32;
        if rate < 1 {
            1
        } else {
            rate
        }
    }

    /// Step timer frequency.
    #[inline]
    pub fn timer_rate(&self) -> u32 {
        self.timer_rate
    }

    /// Rates at or below this are treated as stopped.
    #[inline]
    pub fn minimal_rate(&self) -> u32 {
        self.minimal_rate
    }

    /// Interval that represents a stopped axis.
    #[inline]
    pub fn max_interval(&self) -> u32 {
        if self.table.is_some() {
            u16::MAX as u32
        } else {
            u32::MAX
        }
    }

    /// Timer ticks between events at `rate` steps/s.
    pub fn interval(&self, rate: u32) -> u32 {
        match &self.table {
            Some(table) => table.lookup(self.timer_rate, self.minimal_rate, rate),
            None => {
                if rate > self.minimal_rate {
                    self.timer_rate / rate
                } else {
                    u32::MAX
                }
            }
        }
    }

    /// Interval for one ISR call that issues `steps_per_isr` pulses.
    ///
    /// `steps_per_isr` is a power of two up to 128.
    pub fn multistep_interval(&self, mut rate: u32, steps_per_isr: u32) -> u32 {
        let mut loops = steps_per_isr;
        if loops >= 16 {
            rate >>= 4;
            loops >>= 4;
        }
        if loops >= 4 {
            rate >>= 2;
            loops >>= 2;
        }
        if loops >= 2 {
            rate >>= 1;
        }
        self.interval(rate)
    }

    /// Step rate that corresponds to an interval, the inverse of [`interval`](Self::interval).
    pub fn rate(&self, ticks: u32) -> u32 {
        if ticks == 0 {
            u32::MAX
        } else {
            self.timer_rate / ticks
        }
    }
}

/// Oversampling shift so a block with the given nominal rate still triggers the
/// ISR at least `min_isr_frequency` times per second.
pub fn smoothing_oversampling(nominal_rate: u32, min_isr_frequency: u32) -> u8 {
    let target = u64::from(min_isr_frequency);
    let mut factor = 0u8;
    let mut max_rate = u64::from(nominal_rate.max(1));
    while max_rate < target {
        max_rate <<= 1;
        if max_rate < target {
            factor += 1;
        }
    }
    factor
}

/// Largest shift that keeps `widest << shift` below 2^30.
pub fn oversampling_headroom(widest: u32) -> u8 {
    (widest.max(1).leading_zeros() as u8).saturating_sub(2)
}
