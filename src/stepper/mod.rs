//! Stepper module for stepper-pulse.
//!
//! Provides the interrupt-driven [`StepperEngine`]: the pulse and block phases,
//! input shaping echoes, linear advance, babystepping, the ISR scheduling loop
//! with multistep adaptation, and the foreground position API.

mod advance;
mod babystep;
mod block_phase;
mod builder;
mod diagnostics;
mod engine;
mod isr;
mod pulse;
mod shaping;
mod shared;
mod signals;

pub use builder::EngineBuilder;
pub use diagnostics::Diagnostics;
pub use engine::StepperEngine;
pub use shaping::{echo_delay_ticks, zv_factors, MAX_SHAPED_AXES, SHAPING_QUEUE_LEN};
pub use shared::SharedEngine;
pub use signals::{BlockMonitor, EngineSignals};

/// Countdown value of a task that is not scheduled.
pub const NEVER: u32 = u32::MAX;
