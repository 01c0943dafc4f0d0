//! Error types for wire encoding and decoding.

use thiserror::Error;

/// Result alias for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors produced while encoding or decoding classical messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Encoded message exceeds the size any valid tuple can have
    #[error("encoded message too large: {size} bytes (max {max})")]
    TooLarge {
        /// Size of the rejected buffer
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// Bytes are not a `[tag, int]` CBOR array with a known tag
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Serialization into CBOR failed
    #[error("encode failed: {0}")]
    Encode(String),

    /// Bell measurement outcome outside `0..=3`
    #[error("invalid Bell measurement outcome: {0}")]
    InvalidBellOutcome(i64),
}
