//! Explicit backend registry.
//!
//! Sessions build a registry at start-up, register the backends they want to offer, and hand it
//! to negotiation and loading by reference. Nothing is process-global: two sessions may carry
//! different registries side by side.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Backend, BackendId};

/// Maps backend ids to backend instances.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendId, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `backend` under its own id, returning any backend it replaced.
    pub fn register(&mut self, backend: Arc<dyn Backend>) -> Option<Arc<dyn Backend>> {
        let id = backend.id().clone();
        let previous = self.backends.insert(id.clone(), backend);
        if previous.is_some() {
            tracing::warn!(backend = %id, "backend registration replaced an existing entry");
        } else {
            tracing::debug!(backend = %id, "registered backend");
        }
        previous
    }

    /// Registers a concrete backend value.
    pub fn register_backend<B>(&mut self, backend: B) -> Option<Arc<dyn Backend>>
    where
        B: Backend + 'static,
    {
        self.register(Arc::new(backend))
    }

    pub fn get(&self, id: &BackendId) -> Option<&Arc<dyn Backend>> {
        self.backends.get(id)
    }

    /// Registered backend ids in lexical order.
    pub fn list_backends(&self) -> Vec<BackendId> {
        let mut ids: Vec<BackendId> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn has_backend(&self, id: &BackendId) -> bool {
        self.backends.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.list_backends())
            .finish()
    }
}
