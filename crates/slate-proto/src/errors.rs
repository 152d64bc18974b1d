//! Protocol error types.
//!
//! Every error here is scoped to a single event or connection. The broker
//! treats a protocol error as grounds for terminating the offending
//! connection; it is never fatal to the process.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while validating, encoding, or decoding wire events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Room code failed validation (empty, over-long, or non-alphanumeric).
    #[error("invalid room code: {0}")]
    InvalidRoomCode(String),

    /// Drawing operation carried unusable geometry.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Event exceeds the wire size bound.
    #[error("event too large: {size} bytes exceeds limit of {max}")]
    Oversized {
        /// Claimed or actual event size in bytes.
        size: usize,
        /// The enforced maximum.
        max: usize,
    },

    /// CBOR serialization failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR deserialization failed or the payload shape was wrong.
    #[error("decode error: {0}")]
    Decode(String),
}
