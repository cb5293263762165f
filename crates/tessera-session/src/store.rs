//! The per-session key/value contract shared by every backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// A value held in a session.
///
/// Strings, integers, floats, booleans and nested maps/sequences of these
/// all round-trip through the record codec.
pub type Value = serde_json::Value;

/// Last-access timestamp of a store, shared between the store and the
/// registry's recency bookkeeping.
#[derive(Debug)]
pub struct AccessClock(Mutex<DateTime<Utc>>);

impl AccessClock {
    /// Create a clock reading the given time.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    /// Create a clock reading the current time.
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn get(&self) -> DateTime<Utc> {
        *self.0.lock()
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock() = at;
    }
}

/// Key/value state bound to one session identifier.
///
/// Both backends honour the same contract: a missing key is `Ok(None)`,
/// deleting a missing key is a no-op, and a write is visible to the next
/// read through the same store even when the remote side is unreachable.
/// Remote failures surface as `Err` for that one call only.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The identifier this store is bound to. Never changes.
    fn id(&self) -> &str;

    /// When the session was last resolved.
    fn last_accessed(&self) -> DateTime<Utc>;

    /// Overwrite the last-access timestamp.
    fn set_last_accessed(&self, at: DateTime<Utc>);

    /// Read one value.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Insert or replace a value. Marks the store dirty.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a value if present.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every value. The identifier stays valid.
    async fn clear(&self) -> Result<()>;

    /// Snapshot of all values.
    async fn get_all(&self) -> Result<HashMap<String, Value>>;

    /// Call `visitor` once per entry, in no particular order.
    ///
    /// The store must not be mutated from inside the visitor.
    async fn visit_all(
        &self,
        visitor: &mut (dyn for<'a> FnMut(&'a str, &'a Value) + Send),
    ) -> Result<()>;

    /// Whether there are writes not yet pushed to the backing system.
    fn is_dirty(&self) -> bool {
        false
    }

    /// Push pending writes to the backing system.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Called under the registry lock when the session is removed, before
    /// [`destroy`](Self::destroy) runs. Must not block.
    ///
    /// A store for the same identifier opened after this point belongs to a
    /// new session and must not see this session's persisted values.
    fn retire(&self) {}

    /// Release backend resources held for this session.
    async fn destroy(&self) -> Result<()>;
}

/// Typed accessors over [`SessionStore`], going through `serde`.
#[async_trait]
pub trait SessionStoreExt: SessionStore {
    /// Read a value and deserialize it into `T`.
    async fn get_as<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` and store it under `key`.
    async fn set_as<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.set(key, value).await
    }
}

impl<S: SessionStore + ?Sized> SessionStoreExt for S {}
