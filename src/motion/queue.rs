//! Planner interface and the fixed-capacity block queue.
//!
//! The stepper ISR only talks to the planner through [`Planner`]. [`BlockQueue`]
//! is a ready-made implementation on top of `heapless::spsc`: the foreground
//! keeps the [`BlockProducer`] and pushes prepared blocks, the engine owns the
//! [`BlockConsumer`].

use heapless::spsc::{Consumer, Producer, Queue};

use crate::error::MotionError;

use super::block::{BlockId, MotionBlock};
use super::page::{Page, PageStore};

/// Source of motion blocks for the stepper ISR.
///
/// Called from interrupt context: implementations must not block.
pub trait Planner {
    /// Block at the head of the queue, without removing it.
    fn current_block(&mut self) -> Option<&MotionBlock>;

    /// Release the head block back to the planner.
    fn discard_current_block(&mut self);

    /// Whether any block is still queued.
    fn has_blocks(&self) -> bool;

    /// Data of a direct-stepping page.
    fn page(&mut self, _index: u16) -> Option<Page> {
        None
    }

    /// A motion block finished all of its step events.
    fn block_completed(&mut self, _block: &MotionBlock) {}

    /// A motion block was loaded. Endstops that are already pressed should be
    /// reported from here, since no edge will fire for them.
    fn block_started(&mut self, _block: &MotionBlock) {}

    /// Fan speed carried by a sync block.
    fn sync_fan(&mut self, _fan: u8, _speed: u8) {}

    /// Laser/spindle power carried by a sync block.
    fn sync_power(&mut self, _power: u16) {}
}

/// Read access to stored pages.
pub trait PageSource {
    /// Copy of the page at `index`.
    fn page(&self, index: u16) -> Option<Page>;
}

impl<const P: usize> PageSource for PageStore<P> {
    fn page(&self, index: u16) -> Option<Page> {
        self.get(index)
    }
}

/// Fixed-capacity single-producer single-consumer block queue.
///
/// Holds up to `N - 1` blocks.
pub struct BlockQueue<const N: usize> {
    queue: Queue<MotionBlock, N>,
}

impl<const N: usize> BlockQueue<N> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
        }
    }

    /// Split into the foreground producer and the ISR consumer.
    pub fn split(&mut self) -> (BlockProducer<'_, N>, BlockConsumer<'_, N>) {
        let (producer, consumer) = self.queue.split();
        (
            BlockProducer {
                producer,
                next_id: 1,
            },
            BlockConsumer {
                consumer,
                pages: None,
                completed: 0,
                last_fan: None,
                last_power: None,
            },
        )
    }
}

impl<const N: usize> Default for BlockQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Foreground side of a [`BlockQueue`].
pub struct BlockProducer<'a, const N: usize> {
    producer: Producer<'a, MotionBlock, N>,
    next_id: u16,
}

impl<'a, const N: usize> BlockProducer<'a, N> {
    /// Validate and queue a block, returning the id it was assigned.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::InvalidBlock`] if the block breaks its invariants
    /// and [`MotionError::QueueFull`] if there is no free slot.
    pub fn push(&mut self, mut block: MotionBlock) -> Result<BlockId, MotionError> {
        block.validate()?;
        if !self.producer.ready() {
            return Err(MotionError::QueueFull);
        }

        let id = BlockId(self.next_id);
        block.id = id;
        self.producer
            .enqueue(block)
            .map_err(|_| MotionError::QueueFull)?;

        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        Ok(id)
    }

    /// Whether another block fits.
    #[inline]
    pub fn ready(&self) -> bool {
        self.producer.ready()
    }

    /// Blocks currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.producer.len()
    }

    /// Whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.producer.len() == 0
    }
}

/// ISR side of a [`BlockQueue`].
pub struct BlockConsumer<'a, const N: usize> {
    consumer: Consumer<'a, MotionBlock, N>,
    pages: Option<&'a dyn PageSource>,
    completed: u32,
    last_fan: Option<(u8, u8)>,
    last_power: Option<u16>,
}

impl<'a, const N: usize> BlockConsumer<'a, N> {
    /// Serve direct-stepping pages from `pages`.
    pub fn with_pages(mut self, pages: &'a dyn PageSource) -> Self {
        self.pages = Some(pages);
        self
    }

    /// Motion blocks completed since the queue was split.
    #[inline]
    pub fn completed_blocks(&self) -> u32 {
        self.completed
    }

    /// Last fan sync applied, as `(fan, speed)`.
    #[inline]
    pub fn last_fan(&self) -> Option<(u8, u8)> {
        self.last_fan
    }

    /// Last power sync applied.
    #[inline]
    pub fn last_power(&self) -> Option<u16> {
        self.last_power
    }
}

impl<'a, const N: usize> Planner for BlockConsumer<'a, N> {
    fn current_block(&mut self) -> Option<&MotionBlock> {
        self.consumer.peek()
    }

    fn discard_current_block(&mut self) {
        let _ = self.consumer.dequeue();
    }

    fn has_blocks(&self) -> bool {
        self.consumer.len() > 0
    }

    fn page(&mut self, index: u16) -> Option<Page> {
        self.pages.and_then(|pages| pages.page(index))
    }

    fn block_completed(&mut self, _block: &MotionBlock) {
        self.completed = self.completed.wrapping_add(1);
    }

    fn sync_fan(&mut self, fan: u8, speed: u8) {
        self.last_fan = Some((fan, speed));
    }

    fn sync_power(&mut self, power: u16) {
        self.last_power = Some(power);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::BlockBuilder;

    fn block() -> MotionBlock {
        BlockBuilder::new(2_000_000)
            .steps(0, 10)
            .rates(1000, 1000, 1000)
            .build()
            .unwrap()
    }

    #[test]
    fn test_push_assigns_ids() {
        let mut queue: BlockQueue<4> = BlockQueue::new();
        let (mut producer, mut consumer) = queue.split();

        assert_eq!(producer.push(block()), Ok(BlockId(1)));
        assert_eq!(producer.push(block()), Ok(BlockId(2)));
        assert_eq!(consumer.current_block().map(|b| b.id), Some(BlockId(1)));

        consumer.discard_current_block();
        assert_eq!(consumer.current_block().map(|b| b.id), Some(BlockId(2)));
        assert!(consumer.has_blocks());
    }

    #[test]
    fn test_queue_full() {
        let mut queue: BlockQueue<3> = BlockQueue::new();
        let (mut producer, _consumer) = queue.split();

        assert!(producer.push(block()).is_ok());
        assert!(producer.push(block()).is_ok());
        assert_eq!(producer.push(block()), Err(MotionError::QueueFull));
    }

    #[test]
    fn test_invalid_block_not_queued() {
        let mut queue: BlockQueue<4> = BlockQueue::new();
        let (mut producer, consumer) = queue.split();

        let mut bad = block();
        bad.accelerate_before = 8;
        bad.decelerate_start = 4;
        assert!(matches!(
            producer.push(bad),
            Err(MotionError::InvalidBlock(_))
        ));
        assert!(!consumer.has_blocks());
    }
}
