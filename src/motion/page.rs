//! Direct stepping pages.
//!
//! A page is a pre-rendered bitstream in the 4×1-bit format: every step event
//! takes one nibble, low nibble first, and bits 3..0 of the nibble pulse axes
//! 0..3. Pages are written by the host side into a [`PageStore`] and copied by
//! the ISR when a page block is loaded.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::error::MotionError;

use super::axis::AxisBits;

/// Bytes per page.
pub const PAGE_SIZE: usize = 256;

/// Step events per page (one nibble each).
pub const PAGE_EVENTS: usize = PAGE_SIZE * 2;

/// Axes a page can drive.
pub const PAGE_AXES: usize = 4;

/// Raw page data.
pub type Page = [u8; PAGE_SIZE];

/// Decoder state for the page being stepped.
#[derive(Debug, Clone)]
pub struct PageCursor {
    data: Page,
    index: usize,
}

impl PageCursor {
    /// Start stepping `data` from its first event.
    pub fn new(data: Page) -> Self {
        Self { data, index: 0 }
    }

    /// Step flags of the next event. Returns `None` past the end of the page.
    pub fn next_event(&mut self) -> Option<AxisBits> {
        if self.index >= PAGE_EVENTS {
            return None;
        }
        let mut nibble = self.data[self.index >> 1];
        if self.index & 1 != 0 {
            nibble >>= 4;
        }
        self.index += 1;

        let mut bits = AxisBits::EMPTY;
        for axis in 0..PAGE_AXES {
            bits.set(axis, nibble & (0b1000 >> axis) != 0);
        }
        Some(bits)
    }

    /// Events consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.index
    }
}

/// Fixed-capacity page storage shared between the host side and the ISR.
pub struct PageStore<const P: usize> {
    pages: Mutex<RefCell<[Option<Page>; P]>>,
}

impl<const P: usize> PageStore<P> {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            pages: Mutex::new(RefCell::new([None; P])),
        }
    }

    /// Store page data at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::PageUnavailable`] if `index` is out of range.
    pub fn write(&self, index: u16, data: &Page) -> Result<(), MotionError> {
        critical_section::with(|cs| {
            let mut pages = self.pages.borrow_ref_mut(cs);
            let slot = pages
                .get_mut(index as usize)
                .ok_or(MotionError::PageUnavailable(index))?;
            *slot = Some(*data);
            Ok(())
        })
    }

    /// Copy of the page at `index`, if present.
    pub fn get(&self, index: u16) -> Option<Page> {
        critical_section::with(|cs| {
            self.pages
                .borrow_ref(cs)
                .get(index as usize)
                .copied()
                .flatten()
        })
    }

    /// Drop the page at `index`.
    pub fn release(&self, index: u16) {
        critical_section::with(|cs| {
            if let Some(slot) = self.pages.borrow_ref_mut(cs).get_mut(index as usize) {
                *slot = None;
            }
        });
    }
}

impl<const P: usize> Default for PageStore<P> {
    fn default() -> Self {
        Self::new()
    }
}
