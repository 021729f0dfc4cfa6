//! # stepper-pulse
//!
//! Interrupt-driven stepper pulse generation with embedded-hal 1.0 support.
//!
//! A motion planner prepares blocks (step counts, directions and a velocity
//! profile); this crate executes them from the step timer interrupt, turning
//! each block into precisely timed STEP and DIR edges.
//!
//! ## Features
//!
//! - **Bresenham stepping**: Exact step distribution across up to eight axes
//! - **Velocity profiles**: Trapezoid or quintic Bézier (S-curve) ramps
//! - **Multistepping**: Several pulses per interrupt at high rates, with
//!   automatic escalation on overrun and adaptive smoothing at low rates
//! - **Input shaping**: ZV shaping with per-axis echo queues
//! - **Linear advance**: Extruder pressure compensation on its own timeline
//! - **Babystepping**: Live single-pulse corrections during motion
//! - **Multi-motor axes**: Per-motor locks for multi-endstop homing and
//!   shared enable lines
//! - **no_std compatible**: Core library works without standard library
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepper_pulse::{BlockBuilder, BlockQueue, EngineBuilder, EngineSignals};
//!
//! static SIGNALS: EngineSignals = EngineSignals::new();
//!
//! // Load configuration from TOML
//! let config = stepper_pulse::load_config("stepper.toml")?;
//!
//! let mut queue: BlockQueue<16> = BlockQueue::new();
//! let (mut producer, consumer) = queue.split();
//!
//! let mut engine = EngineBuilder::new()
//!     .config(&config)?
//!     .planner(consumer)
//!     .timer(step_timer)
//!     .delay(delay)
//!     .signals(&SIGNALS)
//!     .attach_named("x", x_driver)?
//!     .build()?;
//!
//! producer.push(
//!     BlockBuilder::new(2_000_000)
//!         .steps(0, 1600)
//!         .rates(200, 8000, 200)
//!         .acceleration(40_000)
//!         .build()?,
//! )?;
//!
//! // From the step timer interrupt
//! engine.isr();
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables file I/O and TOML parsing
//! - `alloc`: Enables heap allocation for no_std with allocator
//! - `defmt`: Enables defmt logging for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[macro_use]
mod fmt;

// Core modules
pub mod config;
pub mod error;
pub mod motion;
pub mod motor;
pub mod stepper;

// Re-exports for ergonomic API
pub use config::{validate_config, AxisConfig, EngineConfig, EngineSettings, ShapingConfig};
pub use error::{Error, Result};
pub use motion::{
    AxisBits, BlockBuilder, BlockId, BlockQueue, Direction, MotionBlock, Planner, SyncKind,
};
pub use motor::{AxisBank, AxisDriver, Position, StepperDriver, StepperTimer};
pub use stepper::{Diagnostics, EngineBuilder, EngineSignals, SharedEngine, StepperEngine};

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::{load_config, parse_config};

// Unit types
pub use config::units::{Hertz, Microseconds, Nanoseconds};
