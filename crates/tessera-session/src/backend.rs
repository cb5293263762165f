//! Storage backends and the table they are registered in.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::memory::{MEMORY_BACKEND, MemoryBackend};
use crate::store::SessionStore;

/// A source of [`SessionStore`]s.
///
/// The registry calls [`open`](Backend::open) under its lock whenever an
/// identifier is resolved for the first time, so it must be cheap and must
/// not block; remote backends defer their first round-trip to the store's
/// first operation.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Whether sessions live outside this process.
    fn is_remote(&self) -> bool {
        false
    }

    /// Check that the backing system is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Create an empty store bound to `id`.
    fn open(&self, id: &str) -> Arc<dyn SessionStore>;
}

/// Named table of backends, populated once by the composition root.
///
/// Registering a name twice replaces the earlier backend.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the in-process backend registered as `"memory"`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MEMORY_BACKEND, Arc::new(MemoryBackend));
        registry
    }

    /// Register `backend` under `name`, replacing any earlier registration.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn Backend>) {
        let name = name.into();
        if self.backends.insert(name.clone(), backend).is_some() {
            debug!(backend = %name, "Replaced previously registered session backend");
        }
    }

    /// Look up a backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}
