//! Frame transports
//!
//! A transport turns an external duplex channel into whole JSON frames in
//! both directions. Outbound frames go through [`Transport::send`]; inbound
//! frames are pushed into the channel returned by each constructor, which the
//! RPC runtime drains.
//!
//! Inbound delivery ends when the sender half is dropped. A transport may push
//! one final `Err` before that to explain why it stopped.

mod stream;
mod websocket;

pub use stream::{LineFramer, MalformedFramePolicy, StreamTransport};
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use skein_protocol::Frame;
use tokio::sync::mpsc;

use crate::error::ClientResult;

/// A decoded inbound frame, or the failure that stopped inbound delivery.
pub type InboundFrame = ClientResult<Frame>;

pub type InboundSender = mpsc::UnboundedSender<InboundFrame>;
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundFrame>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one frame. Concurrent callers never interleave their frames.
    async fn send(&self, frame: &Frame) -> ClientResult<()>;

    /// Release the underlying channel, if this transport owns it.
    async fn close(&self) -> ClientResult<()>;
}
