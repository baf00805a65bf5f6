//! The `dfproto` core messages, hand-derived with `prost`.
//!
//! Field numbers follow the server's `CoreProtocol.proto`. The server's
//! schema is proto2 with `required` scalar fields; encoding them as plain
//! (non-optional) prost fields produces byte-identical frames for every
//! value the protocol actually carries.

use prost::Message;

/// Stable `dfproto` type name of a message, as sent in bind requests.
pub trait TypeNamed {
    /// Fully qualified protobuf type name, e.g. `"dfproto.IntMessage"`.
    const TYPE_NAME: &'static str;
}

/// A message with no fields.
#[derive(Clone, PartialEq, Message)]
pub struct EmptyMessage {}

impl TypeNamed for EmptyMessage {
    const TYPE_NAME: &'static str = "dfproto.EmptyMessage";
}

/// A single 32-bit integer value.
#[derive(Clone, PartialEq, Message)]
pub struct IntMessage {
    #[prost(int32, tag = "1")]
    pub value: i32,
}

impl TypeNamed for IntMessage {
    const TYPE_NAME: &'static str = "dfproto.IntMessage";
}

/// A single string value.
#[derive(Clone, PartialEq, Message)]
pub struct StringMessage {
    #[prost(string, tag = "1")]
    pub value: String,
}

impl TypeNamed for StringMessage {
    const TYPE_NAME: &'static str = "dfproto.StringMessage";
}

/// One colored fragment of a text notification.
#[derive(Clone, PartialEq, Message)]
pub struct CoreTextFragment {
    #[prost(string, optional, tag = "1")]
    pub text: Option<String>,
    #[prost(int32, optional, tag = "2")]
    pub color: Option<i32>,
}

/// A text notification: an ordered list of colored fragments.
///
/// Sent by the server in `REPLY_TEXT` frames while a call is in flight.
#[derive(Clone, PartialEq, Message)]
pub struct CoreTextNotification {
    #[prost(message, repeated, tag = "1")]
    pub fragments: Vec<CoreTextFragment>,
}

impl TypeNamed for CoreTextNotification {
    const TYPE_NAME: &'static str = "dfproto.CoreTextNotification";
}

/// Request payload for the reserved `CoreBind` method (wire id 0).
#[derive(Clone, PartialEq, Message)]
pub struct CoreBindRequest {
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(string, tag = "2")]
    pub input_msg: String,
    #[prost(string, tag = "3")]
    pub output_msg: String,
    #[prost(string, optional, tag = "4")]
    pub plugin: Option<String>,
}

impl TypeNamed for CoreBindRequest {
    const TYPE_NAME: &'static str = "dfproto.CoreBindRequest";
}

/// Reply payload for `CoreBind`: the wire id assigned to the method.
#[derive(Clone, PartialEq, Message)]
pub struct CoreBindReply {
    #[prost(int32, tag = "1")]
    pub assigned_id: i32,
}

impl TypeNamed for CoreBindReply {
    const TYPE_NAME: &'static str = "dfproto.CoreBindReply";
}

/// Request payload for `CoreRunCommand` (wire id 1).
#[derive(Clone, PartialEq, Message)]
pub struct CoreRunCommandRequest {
    #[prost(string, tag = "1")]
    pub command: String,
    #[prost(string, repeated, tag = "2")]
    pub arguments: Vec<String>,
}

impl TypeNamed for CoreRunCommandRequest {
    const TYPE_NAME: &'static str = "dfproto.CoreRunCommandRequest";
}
