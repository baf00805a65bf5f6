//! The protocol engine: connection state machine and event loop.
//!
//! A dedicated thread owns the socket, the state machine, the FIFO call
//! queue, and the partial-read buffer. Each iteration polls for socket
//! readiness with a bounded timeout, then drains commands marshalled from
//! caller threads. Nothing here blocks: reads and writes run until the OS
//! would block, and partially received frames are carried across poll
//! iterations in the receive buffer.
//!
//! Only the engine mutates the socket and the state machine. The binding
//! cache is shared (it has its own mutex); everything else reaches callers
//! through channels.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, ToSocketAddrs};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use prost::Message;
use tracing::{debug, error, info, trace, warn};

use galena_proto::{Color, CoreTextNotification};
use galena_wire::{
    CommandResult, HandshakePacket, MessageHeader, WireError, HANDSHAKE_SIZE, HEADER_SIZE,
    MAX_PAYLOAD_SIZE, REPLY_FAIL, REPLY_RESULT, REPLY_TEXT, REQUEST_QUIT,
};

use crate::binding::BindingCache;
use crate::call::Call;
use crate::client::{ClientConfig, ClientEvent};
use crate::handle::TextNotification;

/// Token registered for the client socket.
const SOCKET: Token = Token(0);

/// Maximum events to process per poll iteration.
const MAX_EVENTS: usize = 16;

/// Connection lifecycle states.
///
/// In `AwaitingHeader` and `AwaitingPayload` the queue is non-empty and its
/// head is the call whose reply is being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connecting,
    Handshake,
    Ready,
    AwaitingHeader,
    AwaitingPayload,
    Disconnecting,
}

/// Work items marshalled from caller threads onto the engine context.
pub(crate) enum Command {
    Connect {
        host: String,
        port: u16,
        reply: Sender<bool>,
    },
    Call(Call),
    Shutdown,
}

pub(crate) struct Engine {
    config: ClientConfig,
    poll: Poll,
    commands: Receiver<Command>,
    bindings: Arc<BindingCache>,
    subscribers: Arc<Mutex<Vec<Sender<ClientEvent>>>>,
    socket: Option<TcpStream>,
    state: ConnectionState,
    /// Header of the frame currently being received.
    header: MessageHeader,
    /// Bytes accumulated toward the current read target.
    recv_buf: Vec<u8>,
    /// Encoded bytes not yet accepted by the OS.
    write_buf: Vec<u8>,
    /// Socket read scratch buffer.
    scratch: Vec<u8>,
    queue: VecDeque<Call>,
    connect_waiters: Vec<Sender<bool>>,
    /// Shut the write side down once the write buffer drains.
    shutdown_on_flush: bool,
    running: bool,
}

impl Engine {
    pub fn new(
        config: ClientConfig,
        commands: Receiver<Command>,
        bindings: Arc<BindingCache>,
        subscribers: Arc<Mutex<Vec<Sender<ClientEvent>>>>,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        let scratch = vec![0u8; config.read_buffer_size];

        Ok(Self {
            config,
            poll,
            commands,
            bindings,
            subscribers,
            socket: None,
            state: ConnectionState::Disconnected,
            header: MessageHeader::new(0, 0),
            recv_buf: Vec::with_capacity(4096),
            write_buf: Vec::new(),
            scratch,
            queue: VecDeque::new(),
            connect_waiters: Vec::new(),
            shutdown_on_flush: false,
            running: true,
        })
    }

    /// Runs the event loop until shutdown.
    pub fn run(&mut self) {
        info!("protocol engine started");

        let mut events = Events::with_capacity(MAX_EVENTS);
        while self.running {
            if let Err(e) = self
                .poll
                .poll(&mut events, Some(self.config.poll_interval))
            {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "poll failed");
                break;
            }

            for event in events.iter() {
                if event.token() != SOCKET {
                    continue;
                }
                // Failed connects can surface as error readiness alone.
                if event.is_writable() || event.is_error() {
                    self.on_writable();
                }
                if event.is_readable() || event.is_read_closed() {
                    self.on_readable();
                }
            }

            self.process_commands();
        }

        if self.state != ConnectionState::Disconnected {
            self.teardown();
        }

        info!("protocol engine stopped");
    }

    fn process_commands(&mut self) {
        for _ in 0..self.config.max_commands_per_tick {
            match self.commands.try_recv() {
                Ok(Command::Connect { host, port, reply }) => {
                    self.handle_connect(&host, port, reply);
                }
                Ok(Command::Call(call)) => self.handle_call(call),
                Ok(Command::Shutdown) => {
                    debug!("shutdown requested");
                    self.running = false;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running = false;
                    break;
                }
            }
        }
    }

    fn handle_connect(&mut self, host: &str, port: u16, reply: Sender<bool>) {
        match self.state {
            ConnectionState::Disconnected => {
                debug!(host, port, "connecting");
                let addr = match (host, port).to_socket_addrs().map(|mut a| a.next()) {
                    Ok(Some(addr)) => addr,
                    Ok(None) => {
                        warn!(host, "host resolved to no addresses");
                        let _ = reply.send(false);
                        return;
                    }
                    Err(e) => {
                        warn!(host, error = %e, "address resolution failed");
                        self.emit(ClientEvent::SocketError {
                            kind: e.kind(),
                            message: e.to_string(),
                        });
                        let _ = reply.send(false);
                        return;
                    }
                };

                let mut stream = match TcpStream::connect(addr) {
                    Ok(stream) => stream,
                    Err(e) => {
                        self.socket_error(&e);
                        let _ = reply.send(false);
                        return;
                    }
                };
                if let Err(e) =
                    self.poll
                        .registry()
                        .register(&mut stream, SOCKET, Interest::WRITABLE)
                {
                    self.socket_error(&e);
                    let _ = reply.send(false);
                    return;
                }

                self.socket = Some(stream);
                self.state = ConnectionState::Connecting;
                self.connect_waiters.push(reply);
            }
            ConnectionState::Connecting | ConnectionState::Handshake => {
                self.connect_waiters.push(reply);
            }
            _ => {
                // Already connected (or on the way down); report success
                // immediately, as a second connect attempt would.
                let _ = reply.send(true);
            }
        }
    }

    fn handle_call(&mut self, call: Call) {
        let link_up = matches!(
            self.state,
            ConnectionState::Handshake
                | ConnectionState::Ready
                | ConnectionState::AwaitingHeader
                | ConnectionState::AwaitingPayload
                | ConnectionState::Disconnecting
        );
        if !link_up {
            debug!(id = call.id, "call while disconnected");
            call.finish(CommandResult::LinkFailure);
            return;
        }

        trace!(id = call.id, "call queued");
        self.queue.push_back(call);
        if self.state == ConnectionState::Ready {
            self.send_next_call();
        }
    }

    /// Connect completion and buffered-write readiness.
    fn on_writable(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.complete_connect();
        }
        if self.socket.is_some() && !self.write_buf.is_empty() {
            self.flush();
        }
    }

    fn complete_connect(&mut self) {
        let Some(mut stream) = self.socket.take() else {
            return;
        };

        match stream.take_error() {
            Ok(Some(e)) | Err(e) => {
                self.socket_error(&e);
                self.connect_failed();
                return;
            }
            Ok(None) => {}
        }
        match stream.peer_addr() {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                // Connection still in flight; wait for the next event.
                self.socket = Some(stream);
                return;
            }
            Err(e) => {
                self.socket_error(&e);
                self.connect_failed();
                return;
            }
        }

        if let Err(e) = self.poll.registry().reregister(
            &mut stream,
            SOCKET,
            Interest::READABLE | Interest::WRITABLE,
        ) {
            self.socket_error(&e);
            self.connect_failed();
            return;
        }
        self.socket = Some(stream);

        debug!("connection established, sending handshake");
        let mut buf = BytesMut::with_capacity(HANDSHAKE_SIZE);
        HandshakePacket::request().encode(&mut buf);
        self.write_buf.extend_from_slice(&buf);
        self.state = ConnectionState::Handshake;
        self.recv_buf.clear();
        self.flush();
    }

    /// Failure before the link ever reached Ready: no connection-changed
    /// signal, just the waiters.
    fn connect_failed(&mut self) {
        if let Some(mut stream) = self.socket.take() {
            let _ = self.poll.registry().deregister(&mut stream);
        }
        self.state = ConnectionState::Disconnected;
        self.recv_buf.clear();
        self.write_buf.clear();
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(false);
        }
    }

    fn on_readable(&mut self) {
        let mut closed = false;
        let mut failure: Option<io::Error> = None;
        {
            let Some(stream) = self.socket.as_mut() else {
                return;
            };
            loop {
                match stream.read(&mut self.scratch) {
                    Ok(0) => {
                        closed = true;
                        break;
                    }
                    Ok(n) => self.recv_buf.extend_from_slice(&self.scratch[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        if let Some(e) = failure {
            self.socket_error(&e);
            self.teardown();
            return;
        }

        // Frames already buffered are processed even when the peer closed
        // right after sending them.
        self.process_recv();

        if closed && self.state != ConnectionState::Disconnected {
            debug!("peer closed connection");
            self.teardown();
        }
    }

    /// Advances the state machine one frame at a time until more bytes are
    /// needed. Leaves Ready only after sending the next queued call.
    fn process_recv(&mut self) {
        loop {
            match self.state {
                ConnectionState::Handshake => {
                    let Some(packet) = HandshakePacket::decode(&mut &self.recv_buf[..]) else {
                        return;
                    };
                    self.recv_buf.drain(..HANDSHAKE_SIZE);

                    if !packet.is_reply() {
                        warn!(magic = ?packet.magic, "handshake reply mismatch");
                        self.emit(ClientEvent::SocketError {
                            kind: io::ErrorKind::InvalidData,
                            message: WireError::BadMagic(packet.magic).to_string(),
                        });
                        self.teardown();
                        return;
                    }

                    debug!("handshake complete");
                    self.state = ConnectionState::Ready;
                    for waiter in self.connect_waiters.drain(..) {
                        let _ = waiter.send(true);
                    }
                    self.emit(ClientEvent::ConnectionChanged(true));
                }

                ConnectionState::AwaitingHeader => {
                    let Some(header) = MessageHeader::decode(&mut &self.recv_buf[..]) else {
                        return;
                    };
                    self.recv_buf.drain(..HEADER_SIZE);
                    self.header = header;

                    match header.id {
                        REPLY_FAIL => {
                            self.finish_current(CommandResult::from_reply_fail(header.size));
                        }
                        REPLY_RESULT | REPLY_TEXT => {
                            if let Err(e) = header.validate() {
                                error!(size = header.size, "reply payload size out of range");
                                self.finish_current(CommandResult::LinkFailure);
                                self.emit(ClientEvent::SocketError {
                                    kind: io::ErrorKind::InvalidData,
                                    message: e.to_string(),
                                });
                                self.teardown();
                                return;
                            }
                            self.state = ConnectionState::AwaitingPayload;
                        }
                        id => {
                            error!(id, "unknown message id in reply header");
                            self.finish_current(CommandResult::LinkFailure);
                            self.emit(ClientEvent::SocketError {
                                kind: io::ErrorKind::InvalidData,
                                message: WireError::UnknownMessageId(id).to_string(),
                            });
                            self.teardown();
                            return;
                        }
                    }
                }

                ConnectionState::AwaitingPayload => {
                    let size = self.header.size as usize;
                    if self.recv_buf.len() < size {
                        return;
                    }
                    let payload: Vec<u8> = self.recv_buf.drain(..size).collect();

                    if self.header.id == REPLY_RESULT {
                        let parsed = self.queue.front_mut().is_some_and(|call| {
                            call.output
                                .as_mut()
                                .is_some_and(|out| out.merge_payload(&payload))
                        });
                        if parsed {
                            self.finish_current(CommandResult::Ok);
                        } else {
                            // The peer misbehaved for this call only; the
                            // framing is intact, so the link stays up.
                            warn!("failed to parse result payload");
                            self.finish_current(CommandResult::LinkFailure);
                        }
                    } else {
                        match CoreTextNotification::decode(&payload[..]) {
                            Ok(text) => self.deliver_notifications(text),
                            Err(e) => error!(error = %e, "failed to parse text notification"),
                        }
                        self.state = ConnectionState::AwaitingHeader;
                    }
                }

                ConnectionState::Ready => {
                    if self.queue.is_empty() {
                        return;
                    }
                    self.send_next_call();
                    if self.state == ConnectionState::Ready {
                        // Nothing was sent (the queue drained without a
                        // wire write); don't spin.
                        return;
                    }
                }

                ConnectionState::Disconnected
                | ConnectionState::Connecting
                | ConnectionState::Disconnecting => {
                    if !self.recv_buf.is_empty() {
                        debug!(bytes = self.recv_buf.len(), "unexpected data outside a read state");
                        self.recv_buf.clear();
                    }
                    return;
                }
            }
        }
    }

    fn deliver_notifications(&mut self, text: CoreTextNotification) {
        for fragment in text.fragments {
            let notification = TextNotification {
                color: fragment
                    .color
                    .and_then(Color::from_i32)
                    .unwrap_or_default(),
                text: fragment.text.unwrap_or_default(),
            };
            trace!(text = %notification.text, "notification");
            if let Some(call) = self.queue.front() {
                call.notify(notification.clone());
            }
            self.emit(ClientEvent::Notification(notification));
        }
    }

    /// Terminates the current call and returns the link to Ready.
    fn finish_current(&mut self, result: CommandResult) {
        self.state = ConnectionState::Ready;
        match self.queue.pop_front() {
            Some(call) => {
                debug!(id = call.id, result = %result, "call finished");
                call.finish(result);
            }
            None => warn!("reply frame with no call in flight"),
        }
    }

    /// Sends the call at the head of the queue.
    fn send_next_call(&mut self) {
        while self.state == ConnectionState::Ready {
            let Some(call) = self.queue.front() else {
                return;
            };

            if call.id == REQUEST_QUIT {
                trace!("sending quit request");
                let mut buf = BytesMut::with_capacity(HEADER_SIZE);
                MessageHeader::request_quit().encode(&mut buf);
                self.write_buf.extend_from_slice(&buf);
                self.state = ConnectionState::Disconnecting;
                self.shutdown_on_flush = true;
                if let Some(call) = self.queue.pop_front() {
                    call.finish(CommandResult::Ok);
                }
                self.flush();
                return;
            }

            if call.input.len() > MAX_PAYLOAD_SIZE as usize {
                warn!(id = call.id, size = call.input.len(), "input exceeds maximum payload size");
                if let Some(call) = self.queue.pop_front() {
                    call.finish(CommandResult::LinkFailure);
                }
                continue;
            }

            trace!(id = call.id, size = call.input.len(), "sending call");
            let mut buf = BytesMut::with_capacity(HEADER_SIZE + call.input.len());
            MessageHeader::new(call.id, call.input.len() as i32).encode(&mut buf);
            buf.extend_from_slice(&call.input);
            self.write_buf.extend_from_slice(&buf);
            self.state = ConnectionState::AwaitingHeader;
            self.flush();
            return;
        }
    }

    /// Writes buffered bytes until the OS would block.
    fn flush(&mut self) {
        let outcome = {
            let Some(stream) = self.socket.as_mut() else {
                return;
            };
            let mut outcome = Ok(());
            while !self.write_buf.is_empty() {
                match stream.write(&self.write_buf) {
                    Ok(0) => {
                        outcome = Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "socket write returned zero",
                        ));
                        break;
                    }
                    Ok(n) => {
                        trace!(bytes = n, "flushed");
                        self.write_buf.drain(..n);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
            outcome
        };

        match outcome {
            Ok(()) => {
                if self.write_buf.is_empty() && self.shutdown_on_flush {
                    self.shutdown_on_flush = false;
                    if let Some(stream) = self.socket.as_ref() {
                        let _ = stream.shutdown(Shutdown::Write);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "write error");
                self.socket_error(&e);
                self.teardown();
            }
        }
    }

    /// Surfaces a socket error to subscribers, except for the remote close
    /// that is the expected end of a quit request.
    fn socket_error(&mut self, error: &io::Error) {
        if self.state == ConnectionState::Disconnecting
            && matches!(
                error.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            )
        {
            return;
        }

        error!(error = %error, "socket error");
        self.emit(ClientEvent::SocketError {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    /// The link is gone: cancel every queued call in order, invalidate all
    /// bindings, resolve pending connect attempts, and notify subscribers.
    fn teardown(&mut self) {
        if self.state != ConnectionState::Disconnecting {
            warn!("socket unexpectedly disconnected");
        }
        if let Some(mut stream) = self.socket.take() {
            let _ = self.poll.registry().deregister(&mut stream);
        }
        self.state = ConnectionState::Disconnected;
        self.shutdown_on_flush = false;
        self.recv_buf.clear();
        self.write_buf.clear();

        while let Some(call) = self.queue.pop_front() {
            call.finish(CommandResult::LinkFailure);
        }
        self.bindings.invalidate_all();

        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(false);
        }
        self.emit(ClientEvent::ConnectionChanged(false));
    }

    fn emit(&self, event: ClientEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
