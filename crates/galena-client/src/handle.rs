//! Asynchronous result and notification handles.
//!
//! Every call produces two independent handles: a one-shot [`CallHandle`]
//! for the final result and a [`Notifications`] stream for text fragments
//! received while the call was in flight. Both are plain channel receivers
//! and may be observed from any thread; neither requires the other to be
//! consumed. If the engine goes away, waiting yields `LinkFailure` rather
//! than blocking forever.

use std::fmt;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use galena_proto::{Color, ReplyMessage};
use galena_wire::CommandResult;

/// A colored text fragment emitted by the server during a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNotification {
    /// Console palette color of the fragment.
    pub color: Color,
    /// Fragment text.
    pub text: String,
}

/// Final outcome of a call: the command result, plus the parsed output
/// message when the result is `Ok`.
pub struct CallReply {
    /// The command result.
    pub result: CommandResult,
    message: Option<Box<dyn ReplyMessage>>,
}

impl CallReply {
    pub(crate) fn new(result: CommandResult, message: Option<Box<dyn ReplyMessage>>) -> Self {
        Self { result, message }
    }

    pub(crate) fn link_failure() -> Self {
        Self::new(CommandResult::LinkFailure, None)
    }

    /// Returns true if the result is `Ok` and an output message is present.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok() && self.message.is_some()
    }

    /// Recovers the output message as its concrete type.
    ///
    /// Returns `None` unless the result was `Ok` and the reply was created
    /// with an output message of type `T`.
    pub fn into_output<T: 'static>(self) -> Option<T> {
        self.message?
            .into_any()
            .downcast::<T>()
            .ok()
            .map(|message| *message)
    }
}

impl fmt::Debug for CallReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallReply")
            .field("result", &self.result)
            .field("has_message", &self.message.is_some())
            .finish()
    }
}

/// One-shot handle for the result of a call.
#[derive(Debug)]
pub struct CallHandle {
    rx: Receiver<CallReply>,
}

impl CallHandle {
    pub(crate) fn new(rx: Receiver<CallReply>) -> Self {
        Self { rx }
    }

    /// Blocks until the call terminates.
    pub fn wait(self) -> CallReply {
        self.rx.recv().unwrap_or_else(|_| CallReply::link_failure())
    }

    /// Blocks until the call terminates or the timeout elapses.
    ///
    /// On timeout the handle is returned so waiting can be resumed.
    pub fn wait_timeout(self, timeout: Duration) -> Result<CallReply, Self> {
        match self.rx.recv_timeout(timeout) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(CallReply::link_failure()),
        }
    }
}

/// Ordered, finite stream of text notifications for one call.
///
/// The stream ends no later than the resolution of the call's result
/// handle; iterating after the call terminated yields the remaining
/// buffered fragments and then stops.
#[derive(Debug)]
pub struct Notifications {
    rx: Receiver<TextNotification>,
}

impl Notifications {
    pub(crate) fn new(rx: Receiver<TextNotification>) -> Self {
        Self { rx }
    }

    /// Blocks for the next notification; `None` once the stream is closed.
    pub fn recv(&self) -> Option<TextNotification> {
        self.rx.recv().ok()
    }

    /// Returns a buffered notification without blocking.
    pub fn try_recv(&self) -> Option<TextNotification> {
        self.rx.try_recv().ok()
    }
}

impl IntoIterator for Notifications {
    type Item = TextNotification;
    type IntoIter = std::sync::mpsc::IntoIter<TextNotification>;

    fn into_iter(self) -> Self::IntoIter {
        self.rx.into_iter()
    }
}

/// One-shot handle for the outcome of a connection attempt.
#[derive(Debug)]
pub struct ConnectHandle {
    rx: Receiver<bool>,
}

impl ConnectHandle {
    pub(crate) fn new(rx: Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Blocks until the handshake completes; true once the link is ready.
    pub fn wait(self) -> bool {
        self.rx.recv().unwrap_or(false)
    }

    /// Blocks until the handshake completes or the timeout elapses.
    pub fn wait_timeout(self, timeout: Duration) -> Result<bool, Self> {
        match self.rx.recv_timeout(timeout) {
            Ok(connected) => Ok(connected),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(false),
        }
    }
}

/// One-shot handle for the completion of a disconnect request.
#[derive(Debug)]
pub struct DisconnectHandle {
    inner: CallHandle,
}

impl DisconnectHandle {
    pub(crate) fn new(inner: CallHandle) -> Self {
        Self { inner }
    }

    /// Blocks until the quit request has been handed to the link (or the
    /// link was already down).
    pub fn wait(self) {
        let _ = self.inner.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn wait_resolves_delivered_reply() {
        let (tx, rx) = mpsc::channel();
        tx.send(CallReply::new(CommandResult::WrongUsage, None))
            .unwrap();

        let reply = CallHandle::new(rx).wait();
        assert_eq!(reply.result, CommandResult::WrongUsage);
        assert!(!reply.is_ok());
    }

    #[test]
    fn wait_on_dead_engine_is_link_failure() {
        let (tx, rx) = mpsc::channel::<CallReply>();
        drop(tx);

        let reply = CallHandle::new(rx).wait();
        assert_eq!(reply.result, CommandResult::LinkFailure);
    }

    #[test]
    fn wait_timeout_returns_handle_back() {
        let (_tx, rx) = mpsc::channel::<CallReply>();
        let handle = CallHandle::new(rx);

        let handle = handle
            .wait_timeout(Duration::from_millis(10))
            .expect_err("no reply yet");
        drop(handle);
    }

    #[test]
    fn into_output_downcasts_concrete_type() {
        use galena_proto::IntMessage;

        let message: Box<dyn ReplyMessage> = Box::new(IntMessage { value: 3 });
        let reply = CallReply::new(CommandResult::Ok, Some(message));
        assert!(reply.is_ok());
        assert_eq!(reply.into_output::<IntMessage>().map(|m| m.value), Some(3));
    }

    #[test]
    fn into_output_rejects_wrong_type() {
        use galena_proto::{IntMessage, StringMessage};

        let message: Box<dyn ReplyMessage> = Box::new(IntMessage { value: 3 });
        let reply = CallReply::new(CommandResult::Ok, Some(message));
        assert!(reply.into_output::<StringMessage>().is_none());
    }

    #[test]
    fn notifications_drain_in_order_then_close() {
        let (tx, rx) = mpsc::channel();
        for text in ["one", "two"] {
            tx.send(TextNotification {
                color: Color::Green,
                text: text.to_string(),
            })
            .unwrap();
        }
        drop(tx);

        let texts: Vec<String> = Notifications::new(rx)
            .into_iter()
            .map(|n| n.text)
            .collect();
        assert_eq!(texts, ["one", "two"]);
    }
}
