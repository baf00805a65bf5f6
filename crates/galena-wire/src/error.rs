//! Wire protocol error types.

use thiserror::Error;

/// Result type for wire protocol operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding the wire protocol.
#[derive(Debug, Error)]
pub enum WireError {
    /// Handshake magic did not match either protocol constant.
    #[error("bad handshake magic: {0:02x?}")]
    BadMagic([u8; 8]),

    /// Declared payload size is negative or exceeds the maximum.
    #[error("payload size out of range: {size} bytes (max {max})")]
    PayloadTooLarge { size: i32, max: i32 },

    /// Header id is not a known reply id.
    #[error("unknown message id {0} in reply header")]
    UnknownMessageId(i16),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
