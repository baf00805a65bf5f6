//! # galena-wire: Binary wire protocol for the DFHack remote interface
//!
//! This crate defines the fixed-layout binary protocol spoken between a
//! client and a running DFHack server.
//!
//! ## Handshake
//!
//! Both directions exchange a single 12-byte packet when the TCP connection
//! is established:
//!
//! ```text
//! ┌──────────────┬──────────────┐
//! │ Magic        │ Version      │
//! │ (8 B)        │ (4 B, LE)    │
//! └──────────────┴──────────────┘
//! ```
//!
//! The client sends `"DFHack?\n"`, the server answers `"DFHack!\n"`; the
//! version is 1 in both directions.
//!
//! ## Message frames
//!
//! After the handshake every message is a 6-byte header followed by an
//! optional payload:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────────────────┐
//! │ Id (i16, LE) │ Size (i32,LE)│            Payload               │
//! └──────────────┴──────────────┴──────────────────────────────────┘
//! ```
//!
//! Non-negative ids invoke bound methods and carry `size` payload bytes.
//! Negative ids are reserved:
//!
//! - `-1` (`REPLY_RESULT`): the output message, `size` payload bytes
//! - `-2` (`REPLY_FAIL`): no payload; `size` carries a [`CommandResult`]
//! - `-3` (`REPLY_TEXT`): a text notification, `size` payload bytes
//! - `-4` (`REQUEST_QUIT`): no payload; the server closes the connection
//!
//! Payloads are capped at 64 MiB. Their contents are opaque to this crate.

mod error;
mod handshake;
mod header;
mod result;

pub use error::{WireError, WireResult};
pub use handshake::{
    HandshakePacket, HANDSHAKE_SIZE, MAGIC_SIZE, PROTOCOL_VERSION, REPLY_MAGIC, REQUEST_MAGIC,
};
pub use header::{
    MessageHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE, REPLY_FAIL, REPLY_RESULT, REPLY_TEXT,
    REQUEST_QUIT,
};
pub use result::CommandResult;
