//! The client: public surface over the engine thread.

use std::fmt;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use prost::Message;
use tracing::debug;

use galena_proto::{CoreBindRequest, ReplyMessage};
use galena_wire::{CommandResult, REQUEST_QUIT};

use crate::binding::{BindRequest, Binding, BindingCache};
use crate::call::Call;
use crate::engine::{Command, Engine};
use crate::handle::{CallHandle, ConnectHandle, DisconnectHandle, Notifications, TextNotification};

/// Depth of the caller→engine command queue.
const COMMAND_QUEUE_DEPTH: usize = 1024;

/// Configuration for the client engine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long each engine iteration waits for socket readiness.
    pub poll_interval: Duration,
    /// Maximum commands drained from caller threads per iteration.
    pub max_commands_per_tick: usize,
    /// Socket read scratch-buffer size.
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            max_commands_per_tick: 128,
            read_buffer_size: 8 * 1024,
        }
    }
}

/// Events observable by any subscriber, independent of individual calls.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The link became ready, or went away.
    ConnectionChanged(bool),
    /// A socket-level error was encountered.
    SocketError {
        kind: io::ErrorKind,
        message: String,
    },
    /// A text notification was received (for whichever call was in flight).
    Notification(TextNotification),
}

/// DFHack remote protocol client.
///
/// The client owns a dedicated engine thread which in turn owns the socket
/// and the protocol state machine. All methods are non-blocking; they hand
/// work to the engine and return handles for the eventual outcome. The
/// client may be shared between threads by reference.
///
/// Dropping the client sends a quit request if the link is up, waits for it
/// to be handed to the link, and joins the engine thread.
pub struct Client {
    commands: SyncSender<Command>,
    bindings: Arc<BindingCache>,
    subscribers: Arc<Mutex<Vec<Sender<ClientEvent>>>>,
    engine: Option<JoinHandle<()>>,
}

impl Client {
    /// Default server port.
    pub const DEFAULT_PORT: u16 = 5000;

    /// Creates a client with default configuration.
    pub fn new() -> io::Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a client and spawns its engine thread.
    pub fn with_config(config: ClientConfig) -> io::Result<Self> {
        let (commands, command_rx) = mpsc::sync_channel(COMMAND_QUEUE_DEPTH);
        let bindings = Arc::new(BindingCache::new());
        let subscribers = Arc::new(Mutex::new(Vec::new()));

        let mut engine = Engine::new(config, command_rx, bindings.clone(), subscribers.clone())?;
        let engine = thread::Builder::new()
            .name("galena-engine".to_string())
            .spawn(move || engine.run())?;

        Ok(Self {
            commands,
            bindings,
            subscribers,
            engine: Some(engine),
        })
    }

    /// Starts a connection attempt.
    ///
    /// The handle resolves true once the handshake completes. If an attempt
    /// is already in flight the handle attaches to it; if the link is
    /// already up the handle resolves true immediately.
    pub fn connect(&self, host: &str, port: u16) -> ConnectHandle {
        let (tx, rx) = mpsc::channel();
        match self.commands.send(Command::Connect {
            host: host.to_string(),
            port,
            reply: tx,
        }) {
            Ok(()) => {}
            Err(mpsc::SendError(Command::Connect { reply, .. })) => {
                let _ = reply.send(false);
            }
            Err(_) => {}
        }
        ConnectHandle::new(rx)
    }

    /// Requests a clean disconnect.
    ///
    /// The quit request takes its place in the call queue; the server
    /// answers by closing the socket rather than with a reply frame.
    pub fn disconnect(&self) -> DisconnectHandle {
        let (call, handle, _notifications) = Call::new(REQUEST_QUIT, Bytes::new(), None);
        self.send_call(call);
        DisconnectHandle::new(handle)
    }

    /// Low-level remote call.
    ///
    /// `input` is the serialized request payload; `output` is a freshly
    /// allocated empty message of the expected reply type, which the engine
    /// fills when the result frame arrives. Most callers want the typed
    /// [`Function`](crate::Function) layer instead.
    pub fn call(
        &self,
        id: i16,
        input: Bytes,
        output: Box<dyn ReplyMessage>,
    ) -> (CallHandle, Notifications) {
        let (call, handle, notifications) = Call::new(id, input, Some(output));
        self.send_call(call);
        (handle, notifications)
    }

    /// Returns the shared binding for a method, issuing the CoreBind call
    /// on first lookup. Concurrent lookups with equal keys share one call.
    pub fn get_binding(&self, request: &BindRequest) -> Arc<Binding> {
        let (binding, created) = self.bindings.get(request);
        if created {
            debug!(method = %request.method, plugin = %request.plugin, "binding method");
            let message = CoreBindRequest {
                method: request.method.clone(),
                input_msg: request.input_msg.clone(),
                output_msg: request.output_msg.clone(),
                plugin: if request.plugin.is_empty() {
                    None
                } else {
                    Some(request.plugin.clone())
                },
            };
            let call = Call::for_binding(Bytes::from(message.encode_to_vec()), binding.clone());
            self.send_call(call);
        }
        binding
    }

    /// Registers a subscriber for client-level events.
    pub fn subscribe(&self) -> Receiver<ClientEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub(crate) fn send_call(&self, call: Call) {
        match self.commands.send(Command::Call(call)) {
            Ok(()) => {}
            Err(mpsc::SendError(Command::Call(call))) => {
                call.finish(CommandResult::LinkFailure);
            }
            Err(_) => {}
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect().wait();
        let _ = self.commands.send(Command::Shutdown);
        if let Some(engine) = self.engine.take() {
            let _ = engine.join();
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("engine_running", &self.engine.is_some())
            .finish_non_exhaustive()
    }
}
