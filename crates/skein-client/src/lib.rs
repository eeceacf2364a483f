//! Client library for an event-emitting JSON-RPC backend
//!
//! A [`Client`] speaks JSON-RPC to the backend over one of two transports:
//!
//! 1. **WebSocket** ([`Client::connect`]): one frame per message
//! 2. **Byte streams** ([`Client::from_stream`]): one frame per line, e.g. a
//!    child process's stdio
//!
//! Backend events are pulled one at a time by the event loop and fanned out
//! to the global emitter ([`Client::events`]) and to the emitter of the
//! event's context ([`Client::get_context_events`]).

mod client;
pub mod config;
pub mod dispatch;
pub mod emitter;
mod error;
mod registry;
pub mod runtime;
pub mod transport;

pub use client::Client;
pub use config::{ClientConfig, StreamConfig, DEFAULT_URL};
pub use dispatch::{EventDispatcher, EventLoopHandle, LoopExit, LoopState};
pub use emitter::{ContextEmitter, EventKey, GlobalEmitter, ListenerId};
pub use error::{ClientError, ClientResult};
pub use registry::ContextRegistry;
pub use runtime::{JsonRpcRuntime, RpcRuntime};
pub use transport::{MalformedFramePolicy, StreamTransport, Transport, WebSocketTransport};

pub use skein_protocol::{Account, ContextId, Event, EventEnvelope};
