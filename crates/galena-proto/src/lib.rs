//! # galena-proto: Core protocol messages for the DFHack remote interface
//!
//! Request and reply payloads on the wire are protocol-buffer messages from
//! the `dfproto` package. This crate defines the handful of messages the
//! client library itself needs — method binding, text notifications, and
//! the small generic value messages — as hand-written `prost` structs with
//! the original field numbers, so no build-time codegen is required.
//!
//! Everything else stays opaque: the protocol engine moves payloads around
//! as byte blobs, and applications bring their own message types for the
//! plugin functions they call. The [`ReplyMessage`] trait is the seam
//! between the two worlds — it lets the engine fill an empty reply message
//! of a concrete type it knows nothing about.

mod color;
mod message;
mod reply;

pub use color::Color;
pub use message::{
    CoreBindReply, CoreBindRequest, CoreRunCommandRequest, CoreTextFragment,
    CoreTextNotification, EmptyMessage, IntMessage, StringMessage, TypeNamed,
};
pub use reply::ReplyMessage;
