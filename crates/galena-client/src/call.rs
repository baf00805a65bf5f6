//! In-flight call objects.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use bytes::Bytes;
use galena_proto::{CoreBindReply, ReplyMessage};
use galena_wire::CommandResult;

use crate::binding::Binding;
use crate::handle::{CallHandle, CallReply, Notifications, TextNotification};

/// Where a finished call delivers its result.
enum ResultSink {
    /// A caller waiting on a [`CallHandle`].
    Channel(Sender<CallReply>),
    /// A shared binding filled from the CoreBindReply.
    Binding(Arc<Binding>),
}

/// A single outbound request and the sinks for its inbound reply stream.
///
/// The input is serialized once, at creation; the output is a freshly
/// allocated empty message of the expected reply type, filled by the engine
/// when the result frame arrives.
pub(crate) struct Call {
    pub id: i16,
    pub input: Bytes,
    pub output: Option<Box<dyn ReplyMessage>>,
    result: ResultSink,
    notifications: Sender<TextNotification>,
}

impl Call {
    /// Creates a call delivering to caller-held handles.
    pub fn new(
        id: i16,
        input: Bytes,
        output: Option<Box<dyn ReplyMessage>>,
    ) -> (Self, CallHandle, Notifications) {
        let (result_tx, result_rx) = mpsc::channel();
        let (note_tx, note_rx) = mpsc::channel();

        let call = Self {
            id,
            input,
            output,
            result: ResultSink::Channel(result_tx),
            notifications: note_tx,
        };
        (call, CallHandle::new(result_rx), Notifications::new(note_rx))
    }

    /// Creates the CoreBind call for a pending binding (wire id 0).
    pub fn for_binding(input: Bytes, binding: Arc<Binding>) -> Self {
        // Binding calls have no per-call notification consumer; fragments
        // still reach subscribers through the client-level event.
        let (note_tx, _) = mpsc::channel();

        Self {
            id: 0,
            input,
            output: Some(Box::<CoreBindReply>::default()),
            result: ResultSink::Binding(binding),
            notifications: note_tx,
        }
    }

    /// Delivers one text notification to this call's stream.
    pub fn notify(&self, notification: TextNotification) {
        let _ = self.notifications.send(notification);
    }

    /// Terminates the call: closes the notification stream, then resolves
    /// the result sink. The output message is delivered only on `Ok`.
    pub fn finish(self, result: CommandResult) {
        // The notification stream closes strictly before the result.
        drop(self.notifications);

        let message = if result.is_ok() { self.output } else { None };
        match self.result {
            ResultSink::Channel(tx) => {
                let _ = tx.send(CallReply::new(result, message));
            }
            ResultSink::Binding(binding) => {
                let assigned_id = message
                    .and_then(|m| m.into_any().downcast::<CoreBindReply>().ok())
                    .and_then(|reply| i16::try_from(reply.assigned_id).ok());
                binding.complete(assigned_id);
            }
        }
    }
}
