//! Error types for stepper-pulse.
//!
//! Provides unified error handling across configuration, motor hardware and motion blocks.
//! Nothing in here is raised from inside the stepper ISR: faults seen there are counted
//! in [`Diagnostics`](crate::stepper::Diagnostics) instead.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all stepper-pulse operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// Driver or pin operation error
    Motor(MotorError),
    /// Motion block or queue error
    Motion(MotionError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// Axis name not found in configuration
    AxisNotFound(heapless::String<32>),
    /// Duplicate axis name in configuration
    DuplicateAxis(heapless::String<32>),
    /// More axes configured than the engine supports
    TooManyAxes(usize),
    /// Timer rate must be non-zero
    InvalidTimerRate(u32),
    /// Pulse width does not fit the step period
    InvalidPulseWidth {
        /// Configured high time in nanoseconds
        high_ns: u32,
        /// Configured low time in nanoseconds
        low_ns: u32,
    },
    /// Multistep limit must be a power of two in 1..=128
    InvalidMultistepLimit(u32),
    /// Smoothing ISR frequency must not exceed half the step timer rate
    InvalidMinIsrFrequency(u32),
    /// Input shaping frequency must be positive
    InvalidShapingFrequency(f32),
    /// Damping ratio must lie in [0, 1)
    InvalidDampingRatio(f32),
    /// Echo queue cannot hold the echoes of the fastest configured step rate
    ShapingQueueTooSmall {
        /// Entries needed for the configuration
        required: usize,
        /// Compile-time queue capacity
        capacity: usize,
    },
    /// More axes with input shaping than the engine supports
    TooManyShapedAxes(usize),
    /// Motors per axis must be 1..=4
    InvalidMotorCount(u8),
    /// Enable group id out of range
    InvalidEnableGroup(u8),
    /// Linear advance enabled but no single extruder axis configured
    ExtruderNotFound,
    /// Babystep interval must be non-zero
    InvalidBabystepInterval(u32),
    /// Lookup-table intervals need a 16-bit friendly timer rate
    InvalidIntervalMode(u32),
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Driver and pin errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MotorError {
    /// Pin operation failed
    PinError,
    /// Axis index not configured
    AxisOutOfRange(usize),
    /// Motor index not present on the axis
    MotorOutOfRange {
        /// Axis index
        axis: usize,
        /// Requested motor index
        motor: usize,
    },
    /// Engine not installed in its shared slot
    NotInitialized,
}

/// Motion block and execution errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionError {
    /// Block fields violate the block invariants
    InvalidBlock(heapless::String<64>),
    /// Block queue has no free slot
    QueueFull,
    /// Operation requires an empty queue and an idle engine
    NotSynchronized,
    /// Page data for a direct-stepping block is missing
    PageUnavailable(u16),
    /// Axis has no input shaping configured
    AxisNotShaped(usize),
}

impl MotionError {
    /// Build an `InvalidBlock` error from a static reason.
    pub(crate) fn invalid_block(reason: &str) -> Self {
        MotionError::InvalidBlock(heapless::String::try_from(reason).unwrap_or_default())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Motor(e) => write!(f, "Motor error: {}", e),
            Error::Motion(e) => write!(f, "Motion error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::AxisNotFound(name) => write!(f, "Axis '{}' not found", name),
            ConfigError::DuplicateAxis(name) => write!(f, "Duplicate axis name: '{}'", name),
            ConfigError::TooManyAxes(n) => write!(f, "Too many axes: {} (max 8)", n),
            ConfigError::InvalidTimerRate(v) => write!(f, "Invalid timer rate: {} Hz", v),
            ConfigError::InvalidPulseWidth { high_ns, low_ns } => {
                write!(f, "Invalid pulse width: high {} ns, low {} ns", high_ns, low_ns)
            }
            ConfigError::InvalidMultistepLimit(v) => {
                write!(f, "Invalid multistep limit: {}. Must be a power of 2 up to 128", v)
            }
            ConfigError::InvalidMinIsrFrequency(v) => {
                write!(f, "Invalid minimum ISR frequency: {} Hz exceeds half the step timer", v)
            }
            ConfigError::InvalidShapingFrequency(v) => {
                write!(f, "Invalid shaping frequency: {}. Must be > 0", v)
            }
            ConfigError::InvalidDampingRatio(v) => {
                write!(f, "Invalid damping ratio: {}. Must be in [0, 1)", v)
            }
            ConfigError::ShapingQueueTooSmall { required, capacity } => {
                write!(f, "Shaping queue needs {} entries, capacity is {}", required, capacity)
            }
            ConfigError::TooManyShapedAxes(n) => {
                write!(f, "Too many shaped axes: {} (max 3)", n)
            }
            ConfigError::InvalidMotorCount(v) => write!(f, "Invalid motor count: {}. Must be 1-4", v),
            ConfigError::InvalidEnableGroup(v) => {
                write!(f, "Invalid enable group: {}. Must be below 8", v)
            }
            ConfigError::ExtruderNotFound => {
                write!(f, "Linear advance needs exactly one extruder axis")
            }
            ConfigError::InvalidBabystepInterval(v) => {
                write!(f, "Invalid babystep interval: {} us", v)
            }
            ConfigError::InvalidIntervalMode(v) => {
                write!(f, "Timer rate {} Hz is too fast for table intervals", v)
            }
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for MotorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorError::PinError => write!(f, "GPIO pin operation failed"),
            MotorError::AxisOutOfRange(axis) => write!(f, "Axis {} is not configured", axis),
            MotorError::MotorOutOfRange { axis, motor } => {
                write!(f, "Axis {} has no motor {}", axis, motor)
            }
            MotorError::NotInitialized => write!(f, "Engine not initialized"),
        }
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::InvalidBlock(reason) => write!(f, "Invalid block: {}", reason),
            MotionError::QueueFull => write!(f, "Block queue is full"),
            MotionError::NotSynchronized => {
                write!(f, "Motion queue must be drained before this operation")
            }
            MotionError::PageUnavailable(page) => write!(f, "Page {} is not available", page),
            MotionError::AxisNotShaped(axis) => write!(f, "Axis {} has no input shaping", axis),
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<MotorError> for Error {
    fn from(e: MotorError) -> Self {
        Error::Motor(e)
    }
}

impl From<MotionError> for Error {
    fn from(e: MotionError) -> Self {
        Error::Motion(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for MotorError {}

#[cfg(feature = "std")]
impl std::error::Error for MotionError {}
