//! Client error types

use thiserror::Error;

/// Errors surfaced by transports, the RPC runtime and the event loop.
///
/// Messages are kept as strings so one failure can be handed to every
/// pending call at once.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport closed: {0}")]
    TransportClosed(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event loop already started")]
    EventLoopAlreadyStarted,
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::TransportClosed(reason.into())
    }

    pub fn is_transport_closed(&self) -> bool {
        matches!(self, Self::TransportClosed(_))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<skein_protocol::RpcError> for ClientError {
    fn from(err: skein_protocol::RpcError) -> Self {
        Self::Rpc {
            code: err.code,
            message: err.message,
        }
    }
}
