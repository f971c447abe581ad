//! Errors in the library.
use thiserror::Error;

/// Errors raised by the core types and the agents built on them.
#[derive(Error, Debug)]
pub enum ForestFireError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// A batch was requested from a replay buffer holding no transition.
    #[error("Replay buffer is empty")]
    EmptyReplayBuffer,

    /// The shape of a pushed item does not match the buffer.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Shape of the stored items.
        expected: Vec<i64>,
        /// Shape of the given item.
        actual: Vec<i64>,
    },

    /// The agent does not accept the given configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
