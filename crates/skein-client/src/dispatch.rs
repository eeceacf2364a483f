//! Event dispatch loop
//!
//! Pulls one event at a time from the runtime and fans it out:
//!
//! 1. global listeners for the event's `type`, with `(context_id, event)`
//! 2. global catch-all listeners, with `(context_id, event)`
//! 3. the context emitter's `type` listeners, with `event`
//! 4. the context emitter's catch-all listeners, with `event`
//!
//! Steps 3 and 4 only happen if an emitter already exists for the context;
//! the loop never creates one. An event is fully delivered before the next
//! one is requested.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use skein_protocol::EventEnvelope;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{error, info, trace};

use crate::emitter::GlobalEmitter;
use crate::error::{ClientError, ClientResult};
use crate::registry::ContextRegistry;
use crate::runtime::RpcRuntime;

/// Why the event loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    /// The transport went away, usually because the client was closed.
    Closed(String),
    /// The event source failed for another reason.
    Failed(ClientError),
}

impl From<ClientError> for LoopExit {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::TransportClosed(reason) => Self::Closed(reason),
            other => Self::Failed(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    Running,
    Stopped(LoopExit),
}

pub struct EventDispatcher {
    runtime: Arc<dyn RpcRuntime>,
    global: Arc<GlobalEmitter>,
    contexts: Arc<ContextRegistry>,
    /// Serializes `step` so two events never overlap.
    turn: tokio::sync::Mutex<()>,
    /// First failure of the event source. Once set, the loop is dead.
    terminal: parking_lot::Mutex<Option<ClientError>>,
    delivered: AtomicU64,
}

impl EventDispatcher {
    pub fn new(
        runtime: Arc<dyn RpcRuntime>,
        global: Arc<GlobalEmitter>,
        contexts: Arc<ContextRegistry>,
    ) -> Self {
        Self {
            runtime,
            global,
            contexts,
            turn: tokio::sync::Mutex::new(()),
            terminal: parking_lot::Mutex::new(None),
            delivered: AtomicU64::new(0),
        }
    }

    /// Fan one event out to the global emitter and, if present, its
    /// context's emitter.
    pub fn dispatch(&self, envelope: &EventEnvelope) {
        let EventEnvelope { context_id, event } = envelope;
        trace!(context_id = %context_id, event_type = %event.kind, "Dispatching event");

        self.global.emit(*context_id, event);
        if let Some(emitter) = self.contexts.get(*context_id) {
            emitter.emit(event);
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Pull and dispatch the next event.
    ///
    /// After the event source has failed once, this returns that failure
    /// again without touching the source.
    pub async fn step(&self) -> ClientResult<()> {
        let _turn = self.turn.lock().await;
        if let Some(err) = self.terminal.lock().clone() {
            return Err(err);
        }

        match self.runtime.get_next_event().await {
            Ok(envelope) => {
                self.dispatch(&envelope);
                Ok(())
            }
            Err(err) => {
                *self.terminal.lock() = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Dispatch events until the event source fails.
    pub async fn run(&self) -> LoopExit {
        loop {
            if let Err(err) = self.step().await {
                return err.into();
            }
        }
    }

    pub fn terminal_error(&self) -> Option<ClientError> {
        self.terminal.lock().clone()
    }

    /// Number of events dispatched so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

/// Observer for a running event loop task.
#[derive(Debug, Clone)]
pub struct EventLoopHandle {
    state: watch::Receiver<LoopState>,
    abort: AbortHandle,
}

impl EventLoopHandle {
    /// Spawn `dispatcher.run()` as a background task.
    pub fn spawn(dispatcher: Arc<EventDispatcher>) -> Self {
        let (tx, rx) = watch::channel(LoopState::Running);
        let task = tokio::spawn(async move {
            info!("Event loop started");
            let exit = dispatcher.run().await;
            match &exit {
                LoopExit::Closed(reason) => info!(reason = %reason, "Event loop stopped"),
                LoopExit::Failed(err) => error!(error = %err, "Event loop failed"),
            }
            let _ = tx.send(LoopState::Stopped(exit));
        });
        Self {
            state: rx,
            abort: task.abort_handle(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.borrow(), LoopState::Running)
    }

    /// Wait until the loop stops and report why.
    pub async fn wait(&self) -> LoopExit {
        let mut state = self.state.clone();
        loop {
            if let LoopState::Stopped(exit) = &*state.borrow_and_update() {
                return exit.clone();
            }
            if state.changed().await.is_err() {
                return LoopExit::Closed("event loop task aborted".to_string());
            }
        }
    }

    pub(crate) fn abort(&self) {
        self.abort.abort();
    }
}
