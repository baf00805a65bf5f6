//! Object-safe reply parsing.
//!
//! The protocol engine treats payloads as opaque byte blobs; concrete
//! message types only exist at the typed call layer. [`ReplyMessage`]
//! bridges the two: a caller hands the engine a freshly allocated, empty
//! message of the expected reply type, the engine parses the result payload
//! into it without knowing the schema, and the caller recovers the concrete
//! type afterwards.

use std::any::Any;

use prost::Message;

/// An owned, initially-empty reply message the engine fills by parsing.
pub trait ReplyMessage: Send + 'static {
    /// Parses `payload` into this message, replacing its contents.
    ///
    /// Returns false if the payload is not a valid encoding of the message.
    fn merge_payload(&mut self, payload: &[u8]) -> bool;

    /// Recovers the concrete message type.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> ReplyMessage for T
where
    T: Message + Default + 'static,
{
    fn merge_payload(&mut self, payload: &[u8]) -> bool {
        match T::decode(payload) {
            Ok(parsed) => {
                *self = parsed;
                true
            }
            Err(_) => false,
        }
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}
