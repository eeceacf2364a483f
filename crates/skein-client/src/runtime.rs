//! JSON-RPC method calls over a [`Transport`]
//!
//! The event dispatch core only needs the [`RpcRuntime`] trait. The bundled
//! [`JsonRpcRuntime`] correlates responses to requests by numeric id and
//! fails every outstanding call once the transport stops delivering frames.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use skein_protocol::{EventEnvelope, Frame, Request, RequestId, Response, GET_NEXT_EVENT};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::transport::{InboundReceiver, Transport};

#[async_trait]
pub trait RpcRuntime: Send + Sync {
    /// Call a backend method and wait for its result.
    async fn call_method(&self, method: &str, params: Value) -> ClientResult<Value>;

    /// Wait for the next backend event, in emission order.
    async fn get_next_event(&self) -> ClientResult<EventEnvelope> {
        let value = self
            .call_method(GET_NEXT_EVENT, Value::Array(Vec::new()))
            .await?;
        serde_json::from_value(value).map_err(|e| ClientError::Deserialization(e.to_string()))
    }
}

type PendingTx = oneshot::Sender<ClientResult<Value>>;

#[derive(Default)]
struct PendingCalls {
    calls: HashMap<u64, PendingTx>,
    /// Set once inbound delivery has ended; later calls fail with it.
    closed: Option<ClientError>,
}

pub struct JsonRpcRuntime {
    transport: Arc<dyn Transport>,
    pending: Arc<Mutex<PendingCalls>>,
    next_id: AtomicU64,
    router: JoinHandle<()>,
}

impl JsonRpcRuntime {
    /// Build a runtime that sends through `transport` and reads responses
    /// from `inbound`.
    pub fn new(transport: Arc<dyn Transport>, inbound: InboundReceiver) -> Self {
        let pending = Arc::new(Mutex::new(PendingCalls::default()));
        let router = tokio::spawn(route_frames(Arc::clone(&pending), inbound));
        Self {
            transport,
            pending,
            next_id: AtomicU64::new(1),
            router,
        }
    }

    /// Whether inbound delivery has ended.
    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed.is_some()
    }

    /// Number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().calls.len()
    }
}

#[async_trait]
impl RpcRuntime for JsonRpcRuntime {
    async fn call_method(&self, method: &str, params: Value) -> ClientResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if let Some(err) = &pending.closed {
                return Err(err.clone());
            }
            pending.calls.insert(id, tx);
        }

        let request = Request::new(id, method, params);
        let frame = match serde_json::to_value(&request) {
            Ok(frame) => frame,
            Err(e) => {
                self.pending.lock().calls.remove(&id);
                return Err(ClientError::Serialization(e.to_string()));
            }
        };

        debug!(id, method, "Sending request");
        if let Err(e) = self.transport.send(&frame).await {
            self.pending.lock().calls.remove(&id);
            return Err(e);
        }

        rx.await
            .unwrap_or_else(|_| Err(ClientError::closed("runtime dropped before response")))
    }
}

impl Drop for JsonRpcRuntime {
    fn drop(&mut self) {
        self.router.abort();
    }
}

async fn route_frames(pending: Arc<Mutex<PendingCalls>>, mut inbound: InboundReceiver) {
    let reason = loop {
        match inbound.recv().await {
            Some(Ok(frame)) => route_frame(&pending, frame),
            Some(Err(err)) => break err,
            None => break ClientError::closed("connection closed"),
        }
    };

    let calls = {
        let mut pending = pending.lock();
        pending.closed = Some(reason.clone());
        std::mem::take(&mut pending.calls)
    };
    debug!(error = %reason, failed_calls = calls.len(), "Inbound frames ended");
    for (_, tx) in calls {
        let _ = tx.send(Err(reason.clone()));
    }
}

fn route_frame(pending: &Mutex<PendingCalls>, frame: Frame) {
    if frame.get("method").is_some() {
        debug!(method = ?frame.get("method"), "Ignoring backend-initiated message");
        return;
    }

    let response: Response = match serde_json::from_value(frame) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Ignoring frame that is not a JSON-RPC response");
            return;
        }
    };

    let id = match &response.id {
        Some(RequestId::Number(id)) => *id,
        other => {
            warn!(id = ?other, "Ignoring response with foreign id");
            return;
        }
    };

    let Some(tx) = pending.lock().calls.remove(&id) else {
        warn!(id, "Ignoring response for unknown request");
        return;
    };
    let _ = tx.send(response.into_result().map_err(ClientError::from));
}
