//! Motor module for stepper-pulse.
//!
//! Provides the driver seam over embedded-hal pins, multi-motor axes with
//! per-motor locks, enable line bookkeeping, timer traits and step positions.

mod axis;
mod builder;
mod driver;
mod enable;
mod position;
mod timer;

pub use axis::{AxisBank, AxisMotors};
pub use builder::StepperDriverBuilder;
pub use driver::{AxisDriver, NoEnable, Polarity, StepperDriver};
pub use enable::EnableState;
pub use position::Position;
pub use timer::{PulseTiming, StepperTimer};
