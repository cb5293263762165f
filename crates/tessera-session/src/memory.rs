//! In-process session storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::backend::Backend;
use crate::error::Result;
use crate::store::{AccessClock, SessionStore, Value};

/// Registered name of the in-process backend.
pub const MEMORY_BACKEND: &str = "memory";

/// Session values held purely in process memory.
#[derive(Debug)]
pub struct MemoryStore {
    id: String,
    entries: RwLock<HashMap<String, Value>>,
    accessed: AccessClock,
}

impl MemoryStore {
    /// Create an empty store bound to `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: RwLock::new(HashMap::new()),
            accessed: AccessClock::now(),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_accessed(&self) -> DateTime<Utc> {
        self.accessed.get()
    }

    fn set_last_accessed(&self, at: DateTime<Utc>) {
        self.accessed.set(at);
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        Ok(self.entries.read().clone())
    }

    async fn visit_all(
        &self,
        visitor: &mut (dyn for<'a> FnMut(&'a str, &'a Value) + Send),
    ) -> Result<()> {
        for (key, value) in self.entries.read().iter() {
            visitor(key, value);
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

/// Backend that opens [`MemoryStore`]s.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend;

impl Backend for MemoryBackend {
    fn open(&self, id: &str) -> Arc<dyn SessionStore> {
        Arc::new(MemoryStore::new(id))
    }
}
