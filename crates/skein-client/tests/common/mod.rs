//! Fake backend speaking newline-delimited JSON-RPC over in-memory pipes

#![allow(dead_code)]

use std::sync::{Arc, Mutex as StdMutex};

use serde_json::{json, Value};
use skein_client::{Client, Event, EventEnvelope, StreamConfig};
use skein_protocol::{Request, Response, GET_NEXT_EVENT, METHOD_NOT_FOUND};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::{mpsc, Mutex};

const PIPE_CAPACITY: usize = 64 * 1024;

pub fn accounts_fixture() -> Value {
    json!([
        {
            "kind": "Configured",
            "id": 1,
            "displayName": "Alice",
            "addr": "alice@example.org",
            "profileImage": null,
            "color": "#4c9a2a"
        },
        { "kind": "Unconfigured", "id": 2 }
    ])
}

/// Backend answering account methods from fixtures and handing out events
/// queued with [`FakeBackend::emit`].
///
/// Once [`FakeBackend::finish`] is called and the queue drains, the next
/// `get_next_event` closes the backend's output, which ends the client's
/// event loop.
pub struct FakeBackend {
    events: Option<mpsc::UnboundedSender<EventEnvelope>>,
    requests: Arc<StdMutex<Vec<Request>>>,
}

impl FakeBackend {
    /// Start the backend and return the client's ends of the pipes:
    /// `(backend input, backend output)`.
    pub fn start() -> (Self, DuplexStream, DuplexStream) {
        let (client_in, backend_in) = duplex(PIPE_CAPACITY);
        let (backend_out, client_out) = duplex(PIPE_CAPACITY);
        let (tx, rx) = mpsc::unbounded_channel();
        let requests = Arc::new(StdMutex::new(Vec::new()));

        tokio::spawn(serve(backend_in, backend_out, rx, Arc::clone(&requests)));

        (
            Self {
                events: Some(tx),
                requests,
            },
            client_in,
            client_out,
        )
    }

    /// Start the backend and a stream client connected to it.
    pub fn with_client(start_event_loop: bool) -> (Self, Client) {
        let (backend, input, output) = Self::start();
        let client = Client::from_stream(StreamConfig::new(input, output, start_event_loop));
        (backend, client)
    }

    pub fn emit(&self, context_id: u32, event: Event) {
        if let Some(events) = &self.events {
            let _ = events.send(EventEnvelope::new(context_id, event));
        }
    }

    pub fn finish(&mut self) {
        self.events = None;
    }

    /// Methods received so far, in arrival order.
    pub fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.method.clone())
            .collect()
    }
}

async fn serve(
    input: DuplexStream,
    output: DuplexStream,
    events: mpsc::UnboundedReceiver<EventEnvelope>,
    requests: Arc<StdMutex<Vec<Request>>>,
) {
    let output = Arc::new(Mutex::new(output));
    let events = Arc::new(Mutex::new(events));
    let mut lines = BufReader::new(input).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(request) = serde_json::from_str::<Request>(&line) else {
            continue;
        };
        requests.lock().unwrap().push(request.clone());
        tokio::spawn(handle(request, Arc::clone(&output), Arc::clone(&events)));
    }
}

async fn handle(
    request: Request,
    output: Arc<Mutex<DuplexStream>>,
    events: Arc<Mutex<mpsc::UnboundedReceiver<EventEnvelope>>>,
) {
    let id = request.id.clone();
    let response = match request.method.as_str() {
        GET_NEXT_EVENT => match events.lock().await.recv().await {
            Some(envelope) => Response::success(id, serde_json::to_value(envelope).unwrap()),
            None => {
                let _ = output.lock().await.shutdown().await;
                return;
            }
        },
        "get_all_accounts" => Response::success(id, accounts_fixture()),
        "get_all_account_ids" => Response::success(id, json!([1, 2])),
        "get_account_info" => {
            let wanted = request.params[0].as_u64().unwrap_or_default();
            let account = accounts_fixture()
                .as_array()
                .and_then(|all| all.iter().find(|a| a["id"] == wanted).cloned());
            match account {
                Some(account) => Response::success(id, account),
                None => Response::error(id, -1, format!("no account {}", wanted)),
            }
        }
        "add_account" => Response::success(id, 3),
        "remove_account" => Response::success(id, Value::Null),
        "echo" => Response::success(id, request.params.clone()),
        other => Response::error(id, METHOD_NOT_FOUND, format!("unknown method {}", other)),
    };

    let mut line = serde_json::to_string(&response).unwrap();
    line.push('\n');
    let _ = output.lock().await.write_all(line.as_bytes()).await;
}

/// Shared log for listeners.
pub type Log<T> = Arc<StdMutex<Vec<T>>>;

pub fn log<T>() -> Log<T> {
    Arc::new(StdMutex::new(Vec::new()))
}
