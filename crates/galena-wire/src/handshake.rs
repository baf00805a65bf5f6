//! Handshake packet encoding and decoding.

use bytes::{Buf, BufMut, BytesMut};

/// Size of the magic string in bytes.
pub const MAGIC_SIZE: usize = 8;

/// Magic sent by the client when the TCP connection is established.
pub const REQUEST_MAGIC: [u8; MAGIC_SIZE] = *b"DFHack?\n";

/// Magic the server answers with.
pub const REPLY_MAGIC: [u8; MAGIC_SIZE] = *b"DFHack!\n";

/// Protocol version exchanged in both directions.
pub const PROTOCOL_VERSION: i32 = 1;

/// Total handshake packet size in bytes (magic + version).
pub const HANDSHAKE_SIZE: usize = MAGIC_SIZE + 4;

/// The 12-byte packet exchanged once per direction after TCP connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePacket {
    /// Magic string identifying the protocol and direction.
    pub magic: [u8; MAGIC_SIZE],
    /// Protocol version.
    pub version: i32,
}

impl HandshakePacket {
    /// Creates the client-side handshake request.
    pub fn request() -> Self {
        Self {
            magic: REQUEST_MAGIC,
            version: PROTOCOL_VERSION,
        }
    }

    /// Creates the server-side handshake reply.
    pub fn reply() -> Self {
        Self {
            magic: REPLY_MAGIC,
            version: PROTOCOL_VERSION,
        }
    }

    /// Encodes the packet to bytes.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.magic);
        buf.put_i32_le(self.version);
    }

    /// Decodes a packet from bytes.
    ///
    /// Returns `None` if there aren't enough bytes. The magic is not
    /// validated here so the caller can log the offending bytes.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < HANDSHAKE_SIZE {
            return None;
        }

        let mut magic = [0u8; MAGIC_SIZE];
        buf.copy_to_slice(&mut magic);
        let version = buf.get_i32_le();
        Some(Self { magic, version })
    }

    /// Returns true if this packet carries the server reply magic.
    pub fn is_reply(&self) -> bool {
        self.magic == REPLY_MAGIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_bytes() {
        let mut buf = BytesMut::new();
        HandshakePacket::request().encode(&mut buf);

        assert_eq!(
            &buf[..],
            &[0x44, 0x46, 0x48, 0x61, 0x63, 0x6b, 0x3f, 0x0a, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn reply_wire_bytes() {
        let mut buf = BytesMut::new();
        HandshakePacket::reply().encode(&mut buf);

        assert_eq!(
            &buf[..],
            &[0x44, 0x46, 0x48, 0x61, 0x63, 0x6b, 0x21, 0x0a, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn roundtrip() {
        let mut buf = BytesMut::new();
        HandshakePacket::reply().encode(&mut buf);

        let decoded = HandshakePacket::decode(&mut buf).expect("complete packet");
        assert_eq!(decoded, HandshakePacket::reply());
        assert!(decoded.is_reply());
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_packet() {
        let mut buf = &b"DFHack!"[..];
        assert!(HandshakePacket::decode(&mut buf).is_none());
    }

    #[test]
    fn request_is_not_reply() {
        assert!(!HandshakePacket::request().is_reply());
    }
}
