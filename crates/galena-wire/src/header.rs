//! Message header encoding and decoding.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{WireError, WireResult};

/// Message header size in bytes (id + size).
pub const HEADER_SIZE: usize = 6;

/// Maximum payload size (64 MiB).
pub const MAX_PAYLOAD_SIZE: i32 = 64 * 1024 * 1024;

/// Wire id of a result reply; the payload is the output message.
pub const REPLY_RESULT: i16 = -1;

/// Wire id of a failure reply; the size field carries a `CommandResult`.
pub const REPLY_FAIL: i16 = -2;

/// Wire id of a text-notification reply.
pub const REPLY_TEXT: i16 = -3;

/// Wire id of a quit request; the server closes the connection instead of
/// replying.
pub const REQUEST_QUIT: i16 = -4;

/// Frame header: a method or reply id followed by the payload size.
///
/// For [`REPLY_FAIL`] frames the size field is reused to carry a small
/// signed command-result enumerator and no payload follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Method id (non-negative) or one of the reserved reply/request ids.
    pub id: i16,
    /// Payload length in bytes, or the result code for `REPLY_FAIL`.
    pub size: i32,
}

impl MessageHeader {
    /// Creates a new header.
    pub fn new(id: i16, size: i32) -> Self {
        Self { id, size }
    }

    /// Creates the quit request header.
    pub fn request_quit() -> Self {
        Self::new(REQUEST_QUIT, 0)
    }

    /// Encodes the header to bytes.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i16_le(self.id);
        buf.put_i32_le(self.size);
    }

    /// Decodes a header from bytes.
    ///
    /// Returns `None` if there aren't enough bytes.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < HEADER_SIZE {
            return None;
        }

        Some(Self {
            id: buf.get_i16_le(),
            size: buf.get_i32_le(),
        })
    }

    /// Returns true if `size` payload bytes follow this header on the wire.
    pub fn has_payload(&self) -> bool {
        self.id >= 0 || self.id == REPLY_RESULT || self.id == REPLY_TEXT
    }

    /// Validates the declared payload size.
    pub fn validate(&self) -> WireResult<()> {
        if self.has_payload() && !(0..=MAX_PAYLOAD_SIZE).contains(&self.size) {
            return Err(WireError::PayloadTooLarge {
                size: self.size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(())
    }
}
