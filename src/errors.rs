/// Custom error types for ReLink ARQ operations
///
/// Covers the full failure taxonomy of the transport core: backpressure,
/// retry exhaustion, configuration rejection, and wire (de)serialization.
/// Frame corruption and out-of-window arrivals are recovered locally by the
/// state machines and never surface here.
use std::fmt;

/// Result type alias for ReLink operations
pub type Result<T> = std::result::Result<T, ArqError>;

/// ReLink ARQ error enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArqError {
    /// Send window is full - backpressure, caller must retry later
    WindowFull,

    /// Retry counter for the oldest unacknowledged frame reached its
    /// configured maximum - fatal transport failure for this session
    RetryLimitExceeded { seqnum: i32, attempts: u32 },

    /// Session configuration rejected by validation
    InvalidConfig(String),

    /// Application payload exceeds the fixed frame payload size
    PayloadTooLarge { len: usize, max: usize },

    /// Serialization failed - frame could not be encoded for the wire
    SerializationError(String),

    /// Deserialization failed - datagram is not a structurally valid frame
    DeserializationError(String),
}

impl fmt::Display for ArqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WindowFull => write!(f, "send window is full"),
            Self::RetryLimitExceeded { seqnum, attempts } => {
                write!(
                    f,
                    "retry limit exceeded for frame {} after {} attempts",
                    seqnum, attempts
                )
            }
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload too large: {} bytes, maximum {}", len, max)
            }
            Self::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            Self::DeserializationError(msg) => write!(f, "deserialization error: {}", msg),
        }
    }
}

impl std::error::Error for ArqError {}

impl ArqError {
    /// True for errors that end the session (nothing the caller can retry)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RetryLimitExceeded { .. })
    }
}
