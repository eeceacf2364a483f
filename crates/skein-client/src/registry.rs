//! Per-context emitter registry
//!
//! Emitters are created lazily on first lookup and kept until removed
//! explicitly. The dispatch loop only ever reads from the registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use skein_protocol::ContextId;
use tracing::debug;

use crate::emitter::ContextEmitter;

pub struct ContextRegistry {
    emitters: RwLock<HashMap<ContextId, Arc<ContextEmitter>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            emitters: RwLock::new(HashMap::new()),
        }
    }

    /// Return the emitter for `context_id`, creating it if absent.
    pub fn get_or_create(&self, context_id: ContextId) -> Arc<ContextEmitter> {
        if let Some(emitter) = self.emitters.read().get(&context_id) {
            return Arc::clone(emitter);
        }
        let mut emitters = self.emitters.write();
        let emitter = emitters.entry(context_id).or_insert_with(|| {
            debug!(context_id = %context_id, "Creating context emitter");
            Arc::new(ContextEmitter::new(context_id))
        });
        Arc::clone(emitter)
    }

    /// Look up an existing emitter without creating one.
    pub fn get(&self, context_id: ContextId) -> Option<Arc<ContextEmitter>> {
        self.emitters.read().get(&context_id).cloned()
    }

    /// Drop the emitter for `context_id`. Listeners still holding the
    /// returned `Arc` stop receiving events.
    pub fn remove(&self, context_id: ContextId) -> Option<Arc<ContextEmitter>> {
        let removed = self.emitters.write().remove(&context_id);
        if removed.is_some() {
            debug!(context_id = %context_id, "Removed context emitter");
        }
        removed
    }

    pub fn contains(&self, context_id: ContextId) -> bool {
        self.emitters.read().contains_key(&context_id)
    }

    pub fn len(&self) -> usize {
        self.emitters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.read().is_empty()
    }

    /// Registered context ids, ascending.
    pub fn context_ids(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = self.emitters.read().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}
