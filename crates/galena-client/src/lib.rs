//! # galena-client: client for the DFHack remote interface
//!
//! This crate speaks the DFHack remote-control protocol to a running game
//! process over a single persistent TCP connection: little-endian
//! length-prefixed frames, a strict FIFO request/response discipline with
//! interleaved text notifications, and a name→id method-binding step.
//!
//! A dedicated engine thread owns the socket and the connection state
//! machine; callers on any thread get back cheap, thread-safe handles for
//! the eventual result of each operation.
//!
//! ## Usage
//!
//! ```ignore
//! use galena_client::{modules, Client};
//! use galena_proto::EmptyMessage;
//!
//! let client = Client::new()?;
//! if !client.connect("127.0.0.1", Client::DEFAULT_PORT).wait() {
//!     return Err("connection failed".into());
//! }
//!
//! // Typed remote function: bind by name, then call.
//! let suspend = modules::core::suspend(&client);
//! if suspend.bind().wait() {
//!     let (reply, notifications) = suspend.call(&EmptyMessage {});
//!     for note in notifications {
//!         println!("[{:?}] {}", note.color, note.text);
//!     }
//!     println!("suspend: {}", reply.wait().result);
//! }
//!
//! client.disconnect().wait();
//! ```
//!
//! Reconnection policy is the caller's: every disconnect cancels queued
//! calls with `LinkFailure` and invalidates cached bindings, and the client
//! may then `connect` again and re-bind.

mod binding;
mod call;
mod client;
mod engine;
mod function;
mod handle;
pub mod modules;

pub use binding::{BindRequest, Binding};
pub use client::{Client, ClientConfig, ClientEvent};
pub use function::{
    bind_all, BindAllHandle, BindHandle, Bindable, Function, FunctionCallHandle, FunctionReply,
};
pub use handle::{
    CallHandle, CallReply, ConnectHandle, DisconnectHandle, Notifications, TextNotification,
};

// Re-export the types that appear in the public API.
pub use bytes::Bytes;
pub use galena_proto::{Color, ReplyMessage};
pub use galena_wire::CommandResult;
