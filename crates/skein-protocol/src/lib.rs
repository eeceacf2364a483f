//! Wire types for the account backend's JSON-RPC channel.
//!
//! Everything exchanged over a transport is a [`Frame`]: requests sent by the
//! client, responses returned by the backend, and the event envelopes the
//! backend hands out through `get_next_event`.

mod account;
mod event;
mod protocol;

pub use account::Account;
pub use event::{ContextId, Event, EventEnvelope};
pub use protocol::{
    Frame, Request, RequestId, Response, RpcError, GET_NEXT_EVENT, METHOD_NOT_FOUND,
};
