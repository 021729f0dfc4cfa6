//! Motion module for stepper-pulse.
//!
//! Provides the block model and planner interface, Bresenham step distribution,
//! velocity profiles, rate-to-interval conversion and direct-stepping pages.

mod axis;
mod block;
mod bresenham;
mod interval;
mod page;
mod profile;
mod queue;

pub use axis::{AxisBits, Direction, MAX_AXES, MAX_MOTORS_PER_AXIS};
pub use block::{AdvanceParams, BlockBuilder, BlockId, BlockKind, MotionBlock, SyncKind};
pub use bresenham::Bresenham;
pub use interval::{oversampling_headroom, smoothing_oversampling, IntervalCalculator};
pub use page::{Page, PageCursor, PageStore, PAGE_AXES, PAGE_EVENTS, PAGE_SIZE};
pub use profile::{accelerate_rate, decelerate_rate, period_inverse, step_multiply, BezierCurve};
pub use queue::{BlockConsumer, BlockProducer, BlockQueue, PageSource, Planner};
