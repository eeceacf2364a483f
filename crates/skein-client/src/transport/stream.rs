//! Newline-delimited JSON over a byte stream
//!
//! Used for backends spoken to over a child process's stdio or any other pipe
//! without message boundaries. Each frame is one line of JSON terminated by a
//! single `\n`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skein_protocol::Frame;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{InboundReceiver, InboundSender, Transport};
use crate::error::{ClientError, ClientResult};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// What the stream transport does with a line that is not valid JSON.
///
/// The offending line is always consumed; the policy only decides whether
/// reading continues afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedFramePolicy {
    /// Log the line and keep reading.
    #[default]
    Skip,
    /// Forward the error to the runtime and stop reading.
    Terminate,
}

/// Reassembles newline-delimited frames from arbitrarily chunked input.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes, in order.
    ///
    /// A line that fails to parse is returned as `Err` and removed from the
    /// buffer like any other line. Blank lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ClientResult<Frame>> {
        // Bytes already buffered contain no newline.
        let mut search_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(offset) = self.buffer[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + offset;
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            search_from = 0;

            let line = &line[..line.len() - 1];
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            frames.push(serde_json::from_slice(line).map_err(|e| {
                ClientError::Deserialization(format!(
                    "{} in line {:?}",
                    e,
                    String::from_utf8_lossy(line)
                ))
            }));
        }
        frames
    }

    /// Number of bytes held for an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Transport over a pair of byte streams.
///
/// `input` is the backend's input (we write requests to it), `output` is the
/// backend's output (we read frames from it). Both halves stay owned by the
/// caller's process, so [`Transport::close`] does nothing.
pub struct StreamTransport<W> {
    input: Mutex<W>,
    reader: JoinHandle<()>,
}

impl<W> StreamTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new<R>(input: W, output: R, policy: MalformedFramePolicy) -> (Self, InboundReceiver)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_frames(output, policy, tx));
        (
            Self {
                input: Mutex::new(input),
                reader,
            },
            rx,
        )
    }
}

async fn read_frames<R>(mut output: R, policy: MalformedFramePolicy, tx: InboundSender)
where
    R: AsyncRead + Unpin,
{
    let mut framer = LineFramer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match output.read(&mut chunk).await {
            Ok(0) => {
                debug!("Backend output reached end of stream");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Reading backend output failed");
                let _ = tx.send(Err(ClientError::closed(e.to_string())));
                return;
            }
        };

        for item in framer.push(&chunk[..n]) {
            match item {
                Ok(frame) => {
                    if tx.send(Ok(frame)).is_err() {
                        return;
                    }
                }
                Err(err) => match policy {
                    MalformedFramePolicy::Skip => {
                        warn!(error = %err, "Skipping malformed frame");
                    }
                    MalformedFramePolicy::Terminate => {
                        warn!(error = %err, "Malformed frame, closing stream transport");
                        let _ = tx.send(Err(err));
                        return;
                    }
                },
            }
        }
    }

    if !framer.is_empty() {
        debug!(
            bytes = framer.buffered(),
            "Discarding incomplete frame at end of stream"
        );
    }
}

#[async_trait]
impl<W> Transport for StreamTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, frame: &Frame) -> ClientResult<()> {
        let mut line =
            serde_json::to_vec(frame).map_err(|e| ClientError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let mut input = self.input.lock().await;
        input.write_all(&line).await?;
        input.flush().await?;
        Ok(())
    }

    async fn close(&self) -> ClientResult<()> {
        Ok(())
    }
}

impl<W> Drop for StreamTransport<W> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
