//! WebSocket transport: one message per frame, no framing state.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{Sink, SinkExt, Stream, StreamExt};
use skein_protocol::Frame;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{InboundReceiver, InboundSender, Transport};
use crate::error::{ClientError, ClientResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport<S = WsStream>
where
    S: Sink<Message>,
{
    sink: Mutex<SplitSink<S, Message>>,
    reader: JoinHandle<()>,
}

impl WebSocketTransport<WsStream> {
    /// Open a WebSocket connection to `url`.
    pub async fn connect(url: &str) -> ClientResult<(Self, InboundReceiver)> {
        let (ws, _response) = connect_async(url).await?;
        debug!(url, "WebSocket connected");
        Ok(Self::from_stream(ws))
    }
}

impl<S> WebSocketTransport<S>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send + 'static,
{
    /// Wrap an already established WebSocket stream.
    pub fn from_stream(ws: S) -> (Self, InboundReceiver) {
        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_messages(stream, tx));
        (
            Self {
                sink: Mutex::new(sink),
                reader,
            },
            rx,
        )
    }
}

async fn read_messages<St>(mut stream: St, tx: InboundSender)
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let parsed = match message {
            Ok(Message::Text(text)) => serde_json::from_str::<Frame>(&text),
            Ok(Message::Binary(bytes)) => serde_json::from_slice::<Frame>(&bytes),
            Ok(Message::Close(close)) => {
                debug!(?close, "WebSocket closed by peer");
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket read failed");
                let _ = tx.send(Err(ClientError::closed(e.to_string())));
                return;
            }
        };

        match parsed {
            Ok(frame) => {
                if tx.send(Ok(frame)).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "Malformed WebSocket frame");
                let _ = tx.send(Err(ClientError::Deserialization(e.to_string())));
                return;
            }
        }
    }
}

fn map_send_error(err: WsError) -> ClientError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            ClientError::closed("WebSocket already closed")
        }
        other => other.into(),
    }
}

#[async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: Sink<Message, Error = WsError> + Unpin + Send,
{
    async fn send(&self, frame: &Frame) -> ClientResult<()> {
        let text =
            serde_json::to_string(frame).map_err(|e| ClientError::Serialization(e.to_string()))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(map_send_error)
    }

    async fn close(&self) -> ClientResult<()> {
        match self.sink.lock().await.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<S> Drop for WebSocketTransport<S>
where
    S: Sink<Message>,
{
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn local_server() -> (String, tokio::task::JoinHandle<WebSocketStream<TcpStream>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            accept_async(socket).await.unwrap()
        });
        (format!("ws://{}/ws", addr), handle)
    }

    #[tokio::test]
    async fn test_send_is_one_text_message() {
        let (url, server) = local_server().await;
        let (transport, _rx) = WebSocketTransport::connect(&url).await.unwrap();
        let mut server = server.await.unwrap();

        transport.send(&json!({"x": 1})).await.unwrap();

        let message = server.next().await.unwrap().unwrap();
        assert_eq!(message, Message::Text("{\"x\":1}".into()));
    }

    #[tokio::test]
    async fn test_inbound_messages_become_frames() {
        let (url, server) = local_server().await;
        let (_transport, mut rx) = WebSocketTransport::connect(&url).await.unwrap();
        let mut server = server.await.unwrap();

        server
            .send(Message::Text("{\"id\":1,\"result\":null}".into()))
            .await
            .unwrap();
        server.send(Message::Ping(Vec::new().into())).await.unwrap();
        server
            .send(Message::Binary(b"{\"id\":2}".to_vec().into()))
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap().unwrap(),
            json!({"id": 1, "result": null})
        );
        assert_eq!(rx.recv().await.unwrap().unwrap(), json!({"id": 2}));
    }

    #[tokio::test]
    async fn test_malformed_message_is_fatal() {
        let (url, server) = local_server().await;
        let (_transport, mut rx) = WebSocketTransport::connect(&url).await.unwrap();
        let mut server = server.await.unwrap();

        server.send(Message::Text("{oops".into())).await.unwrap();
        server.send(Message::Text("{}".into())).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            Err(ClientError::Deserialization(_))
        ));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_peer_close_ends_inbound() {
        let (url, server) = local_server().await;
        let (transport, mut rx) = WebSocketTransport::connect(&url).await.unwrap();
        let mut server = server.await.unwrap();

        server.close(None).await.unwrap();

        assert!(rx.recv().await.is_none());
        transport.close().await.unwrap();
    }
}
