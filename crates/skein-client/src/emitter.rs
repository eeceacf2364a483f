//! Event emitters
//!
//! Every delivered event reaches two listener sets on an emitter: the
//! listeners registered for its `type` and the catch-all listeners. The
//! [`GlobalEmitter`] sees every event together with its context id; a
//! [`ContextEmitter`] only sees the events of its own context.
//!
//! Listeners run synchronously on the dispatch task. No lock is held while a
//! listener runs, so a listener may subscribe or unsubscribe freely.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use skein_protocol::{ContextId, Event};
use tokio::sync::oneshot;
use tracing::error;

static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Handle returned by every subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Which events a listener receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// Events whose `type` equals this string.
    Kind(String),
    /// Every event.
    All,
}

impl EventKey {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self::Kind(kind.into())
    }
}

impl From<&str> for EventKey {
    fn from(kind: &str) -> Self {
        Self::Kind(kind.to_string())
    }
}

impl From<String> for EventKey {
    fn from(kind: String) -> Self {
        Self::Kind(kind)
    }
}

struct Entry<L> {
    id: ListenerId,
    once: bool,
    listener: L,
}

/// Listener lists keyed by event type, plus the catch-all list.
struct ListenerSet<L> {
    by_kind: HashMap<String, Vec<Entry<L>>>,
    all: Vec<Entry<L>>,
}

impl<L: Clone> ListenerSet<L> {
    fn new() -> Self {
        Self {
            by_kind: HashMap::new(),
            all: Vec::new(),
        }
    }

    fn insert(&mut self, key: EventKey, listener: L, once: bool) -> ListenerId {
        let id = ListenerId::next();
        let entry = Entry { id, once, listener };
        match key {
            EventKey::Kind(kind) => self.by_kind.entry(kind).or_default().push(entry),
            EventKey::All => self.all.push(entry),
        }
        id
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        if let Some(pos) = self.all.iter().position(|e| e.id == id) {
            self.all.remove(pos);
            return true;
        }
        let mut emptied = None;
        let mut found = false;
        for (kind, entries) in self.by_kind.iter_mut() {
            if let Some(pos) = entries.iter().position(|e| e.id == id) {
                entries.remove(pos);
                found = true;
                if entries.is_empty() {
                    emptied = Some(kind.clone());
                }
                break;
            }
        }
        if let Some(kind) = emptied {
            self.by_kind.remove(&kind);
        }
        found
    }

    fn count(&self, key: &EventKey) -> usize {
        match key {
            EventKey::Kind(kind) => self.by_kind.get(kind).map(Vec::len).unwrap_or(0),
            EventKey::All => self.all.len(),
        }
    }

    /// Clone out the listeners for one delivery, dropping `once` entries.
    fn take(&mut self, kind: Option<&str>) -> Vec<L> {
        let entries = match kind {
            Some(kind) => match self.by_kind.get_mut(kind) {
                Some(entries) => entries,
                None => return Vec::new(),
            },
            None => &mut self.all,
        };
        let listeners = entries.iter().map(|e| e.listener.clone()).collect();
        entries.retain(|e| !e.once);
        if let Some(kind) = kind {
            if entries.is_empty() {
                self.by_kind.remove(kind);
            }
        }
        listeners
    }
}

/// Run one listener, containing a panic so the remaining listeners and the
/// dispatch loop keep going.
fn invoke(kind: &str, call: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(call)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(event_type = kind, panic = %message, "Event listener panicked");
    }
}

pub type GlobalListener = Arc<dyn Fn(ContextId, &Event) + Send + Sync>;
pub type ContextListener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Emitter for events of all contexts.
pub struct GlobalEmitter {
    listeners: Mutex<ListenerSet<GlobalListener>>,
}

impl GlobalEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(ListenerSet::new()),
        }
    }

    pub fn on<F>(&self, key: impl Into<EventKey>, listener: F) -> ListenerId
    where
        F: Fn(ContextId, &Event) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .insert(key.into(), Arc::new(listener), false)
    }

    /// Subscribe for a single delivery.
    pub fn once<F>(&self, key: impl Into<EventKey>, listener: F) -> ListenerId
    where
        F: Fn(ContextId, &Event) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .insert(key.into(), Arc::new(listener), true)
    }

    /// Unsubscribe. Returns false if the listener was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.lock().remove(id)
    }

    pub fn listener_count(&self, key: &EventKey) -> usize {
        self.listeners.lock().count(key)
    }

    /// Deliver to the `type` listeners, then to the catch-all listeners.
    pub fn emit(&self, context_id: ContextId, event: &Event) {
        let specific = self.listeners.lock().take(Some(&event.kind));
        for listener in specific {
            invoke(&event.kind, || listener(context_id, event));
        }
        let all = self.listeners.lock().take(None);
        for listener in all {
            invoke(&event.kind, || listener(context_id, event));
        }
    }
}

impl Default for GlobalEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Emitter for the events of one context.
pub struct ContextEmitter {
    context_id: ContextId,
    listeners: Mutex<ListenerSet<ContextListener>>,
}

impl ContextEmitter {
    pub fn new(context_id: ContextId) -> Self {
        Self {
            context_id,
            listeners: Mutex::new(ListenerSet::new()),
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn on<F>(&self, key: impl Into<EventKey>, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .insert(key.into(), Arc::new(listener), false)
    }

    /// Subscribe for a single delivery.
    pub fn once<F>(&self, key: impl Into<EventKey>, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .insert(key.into(), Arc::new(listener), true)
    }

    /// Unsubscribe. Returns false if the listener was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.lock().remove(id)
    }

    pub fn listener_count(&self, key: &EventKey) -> usize {
        self.listeners.lock().count(key)
    }

    /// Deliver to the `type` listeners, then to the catch-all listeners.
    pub fn emit(&self, event: &Event) {
        let specific = self.listeners.lock().take(Some(&event.kind));
        for listener in specific {
            invoke(&event.kind, || listener(event));
        }
        let all = self.listeners.lock().take(None);
        for listener in all {
            invoke(&event.kind, || listener(event));
        }
    }

    /// Wait for the next event matching `key`.
    ///
    /// Returns `None` if the listener is removed before an event arrives.
    /// Waits indefinitely otherwise, including after the event loop stopped.
    pub async fn next_event(&self, key: impl Into<EventKey>) -> Option<Event> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let id = self.once(key, move |event| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(event.clone());
            }
        });
        let _guard = Unsubscribe { emitter: self, id };
        rx.await.ok()
    }
}

/// Removes a listener when a waiting future is dropped early.
struct Unsubscribe<'a> {
    emitter: &'a ContextEmitter,
    id: ListenerId,
}

impl Drop for Unsubscribe<'_> {
    fn drop(&mut self) {
        self.emitter.off(self.id);
    }
}
