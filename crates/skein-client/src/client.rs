//! Backend client
//!
//! A [`Client`] owns one transport, the RPC runtime on top of it, the global
//! emitter and the per-context emitter registry. Events reach listeners only
//! while the event loop runs; see [`crate::dispatch`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use skein_protocol::{Account, ContextId};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::config::{ClientConfig, StreamConfig};
use crate::dispatch::{EventDispatcher, EventLoopHandle};
use crate::emitter::{ContextEmitter, GlobalEmitter};
use crate::error::{ClientError, ClientResult};
use crate::registry::ContextRegistry;
use crate::runtime::{JsonRpcRuntime, RpcRuntime};
use crate::transport::{StreamTransport, Transport, WebSocketTransport};

pub struct Client {
    runtime: Arc<dyn RpcRuntime>,
    transport: Arc<dyn Transport>,
    global: Arc<GlobalEmitter>,
    contexts: Arc<ContextRegistry>,
    dispatcher: Arc<EventDispatcher>,
    event_loop: Mutex<Option<EventLoopHandle>>,
}

impl Client {
    /// Connect to the backend over WebSocket.
    ///
    /// Accepts a full [`ClientConfig`] or just a URL.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = Client::connect("ws://localhost:20808/ws").await?;
    /// client.events().on(EventKey::All, |ctx, event| {
    ///     println!("{}: {}", ctx, event.kind);
    /// });
    /// ```
    pub async fn connect(config: impl Into<ClientConfig>) -> ClientResult<Self> {
        let config = config.into();
        let (transport, inbound) = WebSocketTransport::connect(&config.url).await?;
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let runtime = Arc::new(JsonRpcRuntime::new(Arc::clone(&transport), inbound));
        info!(url = %config.url, "Connected to backend");
        Ok(Self::from_parts(runtime, transport, config.start_event_loop))
    }

    /// Talk to the backend over a pair of byte streams, typically the stdio
    /// of a child process.
    pub fn from_stream<R, W>(config: StreamConfig<R, W>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (transport, inbound) =
            StreamTransport::new(config.input, config.output, config.malformed_frames);
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let runtime = Arc::new(JsonRpcRuntime::new(Arc::clone(&transport), inbound));
        Self::from_parts(runtime, transport, config.start_event_loop)
    }

    /// Assemble a client from an existing runtime and the transport it uses.
    pub fn from_parts(
        runtime: Arc<dyn RpcRuntime>,
        transport: Arc<dyn Transport>,
        start_event_loop: bool,
    ) -> Self {
        let global = Arc::new(GlobalEmitter::new());
        let contexts = Arc::new(ContextRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&runtime),
            Arc::clone(&global),
            Arc::clone(&contexts),
        ));
        let client = Self {
            runtime,
            transport,
            global,
            contexts,
            dispatcher,
            event_loop: Mutex::new(None),
        };
        if start_event_loop {
            let _ = client.spawn_event_loop();
        }
        client
    }

    /// Start dispatching events. Only one loop may ever run per client.
    pub fn start_event_loop(&self) -> ClientResult<EventLoopHandle> {
        self.spawn_event_loop().ok_or(ClientError::EventLoopAlreadyStarted)
    }

    /// Spawn the loop unless one exists. Check and insert share one guard.
    fn spawn_event_loop(&self) -> Option<EventLoopHandle> {
        let mut slot = self.event_loop.lock();
        if slot.is_some() {
            return None;
        }
        let handle = EventLoopHandle::spawn(Arc::clone(&self.dispatcher));
        *slot = Some(handle.clone());
        Some(handle)
    }

    /// Handle of the running (or finished) event loop, if one was started.
    pub fn event_loop(&self) -> Option<EventLoopHandle> {
        self.event_loop.lock().clone()
    }

    /// Emitter receiving the events of every context.
    pub fn events(&self) -> Arc<GlobalEmitter> {
        Arc::clone(&self.global)
    }

    /// Emitter for one context, created on first use.
    pub fn get_context_events(&self, context_id: impl Into<ContextId>) -> Arc<ContextEmitter> {
        self.contexts.get_or_create(context_id.into())
    }

    /// Forget the emitter for a context. Returns false if there was none.
    pub fn remove_context_events(&self, context_id: impl Into<ContextId>) -> bool {
        self.contexts.remove(context_id.into()).is_some()
    }

    pub async fn call_method(&self, method: &str, params: Value) -> ClientResult<Value> {
        self.runtime.call_method(method, params).await
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ClientResult<T> {
        let value = self.runtime.call_method(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::Deserialization(format!("{} result: {}", method, e)))
    }

    /// All accounts known to the backend, configured or not.
    pub async fn list_accounts(&self) -> ClientResult<Vec<Account>> {
        self.call("get_all_accounts", json!([])).await
    }

    pub async fn get_all_account_ids(&self) -> ClientResult<Vec<ContextId>> {
        self.call("get_all_account_ids", json!([])).await
    }

    pub async fn get_account_info(&self, context_id: impl Into<ContextId>) -> ClientResult<Account> {
        let context_id: ContextId = context_id.into();
        self.call("get_account_info", json!([context_id])).await
    }

    /// Create a new, unconfigured account.
    pub async fn add_account(&self) -> ClientResult<ContextId> {
        let id: ContextId = self.call("add_account", json!([])).await?;
        debug!(context_id = %id, "Added account");
        Ok(id)
    }

    /// Remove an account and drop its context emitter.
    pub async fn remove_account(&self, context_id: impl Into<ContextId>) -> ClientResult<()> {
        let context_id: ContextId = context_id.into();
        self.runtime
            .call_method("remove_account", json!([context_id]))
            .await?;
        self.contexts.remove(context_id);
        debug!(context_id = %context_id, "Removed account");
        Ok(())
    }

    /// Close the transport. For stream transports this does nothing; the
    /// caller owns the streams.
    pub async fn close(&self) -> ClientResult<()> {
        debug!("Closing client transport");
        self.transport.close().await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::LoopState;
    use async_trait::async_trait;
    use skein_protocol::{Frame, GET_NEXT_EVENT};

    /// Runtime answering account calls from fixtures; never yields events.
    #[derive(Default)]
    struct FixtureRuntime {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl RpcRuntime for FixtureRuntime {
        async fn call_method(&self, method: &str, params: Value) -> ClientResult<Value> {
            self.calls.lock().push((method.to_string(), params));
            match method {
                "get_all_accounts" => Ok(json!([
                    {"kind": "Configured", "id": 1, "displayName": "Alice",
                     "addr": "alice@example.org", "profileImage": null, "color": "#ff0000"},
                    {"kind": "Unconfigured", "id": 2},
                ])),
                "get_all_account_ids" => Ok(json!([1, 2])),
                "add_account" => Ok(json!(3)),
                "remove_account" => Ok(Value::Null),
                GET_NEXT_EVENT => std::future::pending().await,
                other => Err(ClientError::Rpc {
                    code: skein_protocol::METHOD_NOT_FOUND,
                    message: format!("unknown method {}", other),
                }),
            }
        }
    }

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _frame: &Frame) -> ClientResult<()> {
            Ok(())
        }

        async fn close(&self) -> ClientResult<()> {
            Ok(())
        }
    }

    fn client(start_event_loop: bool) -> (Client, Arc<FixtureRuntime>) {
        let runtime = Arc::new(FixtureRuntime::default());
        let client = Client::from_parts(runtime.clone(), Arc::new(NullTransport), start_event_loop);
        (client, runtime)
    }

    #[tokio::test]
    async fn test_list_accounts_decodes_both_kinds() {
        let (client, runtime) = client(false);

        let accounts = client.list_accounts().await.unwrap();

        assert_eq!(accounts.len(), 2);
        assert!(accounts[0].is_configured());
        assert_eq!(accounts[1].id(), 2);
        assert_eq!(runtime.calls.lock()[0], ("get_all_accounts".to_string(), json!([])));
    }

    #[tokio::test]
    async fn test_account_ids_and_add() {
        let (client, _runtime) = client(false);

        assert_eq!(
            client.get_all_account_ids().await.unwrap(),
            vec![ContextId(1), ContextId(2)]
        );
        assert_eq!(client.add_account().await.unwrap(), ContextId(3));
    }

    #[tokio::test]
    async fn test_remove_account_drops_context_emitter() {
        let (client, runtime) = client(false);
        let before = client.get_context_events(2u32);

        client.remove_account(2u32).await.unwrap();

        assert_eq!(
            runtime.calls.lock().last().cloned(),
            Some(("remove_account".to_string(), json!([2])))
        );
        assert!(!Arc::ptr_eq(&before, &client.get_context_events(2u32)));
    }

    #[tokio::test]
    async fn test_rpc_errors_pass_through() {
        let (client, _runtime) = client(false);
        let err = client.get_account_info(7u32).await.unwrap_err();
        assert!(matches!(err, ClientError::Rpc { .. }));
    }

    #[tokio::test]
    async fn test_context_events_are_per_id() {
        let (client, _runtime) = client(false);

        let a = client.get_context_events(1u32);
        let b = client.get_context_events(ContextId(1));
        let c = client.get_context_events(2u32);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(client.remove_context_events(ContextId(1)));
        assert!(!client.remove_context_events(ContextId(1)));
    }

    #[tokio::test]
    async fn test_event_loop_starts_once() {
        let (client, _runtime) = client(false);
        assert!(client.event_loop().is_none());

        let handle = client.start_event_loop().unwrap();
        assert_eq!(handle.state(), LoopState::Running);
        assert_eq!(
            client.start_event_loop().unwrap_err(),
            ClientError::EventLoopAlreadyStarted
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_yield_one_loop() {
        let (client, _runtime) = client(false);
        let client = Arc::new(client);
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let starts: Vec<_> = (0..8)
            .map(|_| {
                let client = Arc::clone(&client);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    client.start_event_loop().is_ok()
                })
            })
            .collect();

        let mut started = 0;
        for start in starts {
            if start.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert!(client.event_loop().is_some());
    }

    #[tokio::test]
    async fn test_event_loop_started_at_construction() {
        let (client, _runtime) = client(true);
        assert!(client.event_loop().is_some());
        assert!(matches!(
            client.start_event_loop(),
            Err(ClientError::EventLoopAlreadyStarted)
        ));
    }
}
