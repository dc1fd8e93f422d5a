//! Engine error model.

use thiserror::Error;

/// Result type used across the engine crates.
pub type ChronicleResult<T> = Result<T, ChronicleError>;

/// Engine-level error.
///
/// Protocol violations (illegal state transitions, sequence retreat, bounds
/// errors on a record view) are programming errors and surface immediately.
/// Application callback failures are not represented here; they travel as
/// `anyhow::Error` to the exception handling strategy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChronicleError {
    /// An operation was invoked in a state that does not allow it.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A sequence generator was asked to move backwards (or stand still).
    #[error("sequence cannot retreat from {current} to {requested}")]
    SequenceRetreat { current: u64, requested: u64 },

    /// A read or write fell outside the bound buffer.
    #[error("out of bounds: offset {offset} + length {length} exceeds capacity {capacity}")]
    OutOfBounds {
        offset: usize,
        length: usize,
        capacity: usize,
    },

    /// A record was encoded with a layout version this build does not know.
    #[error("unsupported record version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    /// A record decoded fine but its content is not valid for the caller.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The underlying log collaborator failed.
    #[error("log failure: {0}")]
    Log(String),

    /// Configuration could not be parsed or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ChronicleError {
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn log(msg: impl Into<String>) -> Self {
        Self::Log(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn out_of_bounds(offset: usize, length: usize, capacity: usize) -> Self {
        Self::OutOfBounds {
            offset,
            length,
            capacity,
        }
    }
}
