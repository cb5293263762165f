//! Live session registry with recency-ordered idle eviction.
//!
//! Sessions are kept in a slot table. A doubly-linked recency list runs
//! through the slots by index (front = most recently resolved, tail = least),
//! and a hash map points each identifier at its slot. Map and list are only
//! ever touched together under one lock, so every identifier in the map has
//! exactly one list node and the other way round.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::backend::Backend;
use crate::store::SessionStore;

/// Sentinel for "no slot".
const NIL: usize = usize::MAX;

struct Slot {
    store: Arc<dyn SessionStore>,
    prev: usize,
    next: usize,
}

/// Slot table plus the recency list threaded through it.
#[derive(Default)]
struct RecencyList {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl RecencyList {
    fn slot(&self, idx: usize) -> Option<&Slot> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, idx: usize) -> Option<&mut Slot> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn store(&self, idx: usize) -> Option<Arc<dyn SessionStore>> {
        self.slot(idx).map(|slot| Arc::clone(&slot.store))
    }

    fn next_of(&self, idx: usize) -> Option<usize> {
        self.slot(idx)
            .map(|slot| slot.next)
            .filter(|&next| next != NIL)
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        let Some(slot) = self.slot_mut(idx) else {
            return;
        };
        slot.prev = NIL;
        slot.next = old_head.unwrap_or(NIL);

        match old_head.and_then(|head| self.slot_mut(head)) {
            Some(head) => head.prev = idx,
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.slot(idx).map(|slot| (slot.prev, slot.next)) else {
            return;
        };
        match self.slot_mut(prev) {
            Some(slot) => slot.next = next,
            None => self.head = (next != NIL).then_some(next),
        }
        match self.slot_mut(next) {
            Some(slot) => slot.prev = prev,
            None => self.tail = (prev != NIL).then_some(prev),
        }
    }

    fn insert_front(&mut self, store: Arc<dyn SessionStore>) {
        let id = store.id().to_string();
        let slot = Some(Slot {
            store,
            prev: NIL,
            next: NIL,
        });
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.push_front(idx);
        self.index.insert(id, idx);
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    /// Unlink and free `idx`, retiring its store.
    fn remove(&mut self, idx: usize) -> Option<Arc<dyn SessionStore>> {
        self.unlink(idx);
        let slot = self.slots.get_mut(idx)?.take()?;
        self.index.remove(slot.store.id());
        self.free.push(idx);
        slot.store.retire();
        Some(slot.store)
    }
}

/// Snapshot of registry occupancy.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Number of live sessions.
    pub sessions: usize,

    /// Idle time of the least recently used session, if any.
    pub oldest_idle: Option<Duration>,
}

/// Owner of every live session store.
///
/// All operations take the same lock, so resolution, destruction, touches
/// and each GC step are atomic with respect to one another. Lock hold time
/// is a hash lookup plus a few index relinks.
pub struct Registry {
    list: Mutex<RecencyList>,
    backend: Arc<dyn Backend>,
}

impl Registry {
    /// Create an empty registry whose stores come from `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            list: Mutex::new(RecencyList::default()),
            backend,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.list.lock().index.len()
    }

    /// Whether there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.list.lock().index.is_empty()
    }

    /// Whether `id` is live. Does not count as an access.
    pub fn contains(&self, id: &str) -> bool {
        self.list.lock().index.contains_key(id)
    }

    /// Live identifiers from most to least recently used.
    pub fn ids_by_recency(&self) -> Vec<String> {
        let list = self.list.lock();
        let mut ids = Vec::with_capacity(list.index.len());
        let mut cursor = list.head;
        while let Some(idx) = cursor {
            if let Some(slot) = list.slot(idx) {
                ids.push(slot.store.id().to_string());
            }
            cursor = list.next_of(idx);
        }
        ids
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> RegistryStats {
        let list = self.list.lock();
        let oldest_idle = list
            .tail
            .and_then(|idx| list.slot(idx))
            .map(|slot| idle_for(slot.store.last_accessed(), Utc::now()));
        RegistryStats {
            sessions: list.index.len(),
            oldest_idle,
        }
    }

    /// Return the store for `id`, creating an empty one if it is not live.
    ///
    /// Never fails: an unknown or stale identifier yields a fresh store bound
    /// to that same identifier. Either way the session becomes the most
    /// recently used.
    pub fn resolve(&self, id: &str) -> Arc<dyn SessionStore> {
        self.resolve_at(id, Utc::now())
    }

    /// [`resolve`](Self::resolve) with an explicit access time.
    pub fn resolve_at(&self, id: &str, now: DateTime<Utc>) -> Arc<dyn SessionStore> {
        let mut list = self.list.lock();

        if let Some(&idx) = list.index.get(id) {
            list.move_to_front(idx);
            if let Some(store) = list.store(idx) {
                store.set_last_accessed(now);
                trace!(sessions = list.index.len(), "Resolved live session");
                return store;
            }
        }

        let store = self.backend.open(id);
        store.set_last_accessed(now);
        list.insert_front(Arc::clone(&store));
        debug!(sessions = list.index.len(), "Created session");
        store
    }

    /// Mark `id` as accessed now. Returns false if it is not live.
    pub fn touch(&self, id: &str) -> bool {
        self.touch_at(id, Utc::now())
    }

    /// [`touch`](Self::touch) with an explicit access time.
    pub fn touch_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        let mut list = self.list.lock();
        let Some(idx) = list.index.get(id).copied() else {
            return false;
        };
        list.move_to_front(idx);
        match list.store(idx) {
            Some(store) => {
                store.set_last_accessed(now);
                true
            }
            None => false,
        }
    }

    /// Remove `id` and release its backend resources.
    ///
    /// Destroying an identifier that is not live does nothing. Returns
    /// whether a session was removed.
    pub async fn destroy(&self, id: &str) -> bool {
        let removed = {
            let mut list = self.list.lock();
            list.index.get(id).copied().and_then(|idx| list.remove(idx))
        };

        match removed {
            Some(store) => {
                release(store).await;
                debug!("Destroyed session");
                true
            }
            None => false,
        }
    }

    /// Destroy every session idle for at least `max_idle`.
    ///
    /// Walks from the tail and stops at the first session still in use,
    /// so a sweep costs one step per expired session. Returns the number
    /// of sessions removed.
    pub async fn collect_expired(&self, max_idle: Duration) -> usize {
        self.collect_expired_at(max_idle, Utc::now()).await
    }

    /// [`collect_expired`](Self::collect_expired) as of `now`.
    pub async fn collect_expired_at(&self, max_idle: Duration, now: DateTime<Utc>) -> usize {
        let mut collected = 0;

        loop {
            let expired = {
                let mut list = self.list.lock();
                let tail = list
                    .tail
                    .and_then(|idx| list.slot(idx).map(|slot| (idx, slot.store.last_accessed())));
                match tail {
                    Some((idx, last)) if idle_for(last, now) >= max_idle => list.remove(idx),
                    _ => None,
                }
            };

            match expired {
                Some(store) => {
                    release(store).await;
                    collected += 1;
                }
                None => break,
            }
        }

        if collected > 0 {
            debug!(count = collected, remaining = self.len(), "Collected idle sessions");
        }

        collected
    }
}

/// Time elapsed between `last` and `now`, clamped at zero.
fn idle_for(last: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(last)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

async fn release(store: Arc<dyn SessionStore>) {
    if let Err(e) = store.destroy().await {
        warn!(error = %e, "Failed to release session backend resources");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use chrono::TimeDelta;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::new(Arc::new(MemoryBackend))
    }

    fn secs(n: i64) -> TimeDelta {
        TimeDelta::seconds(n)
    }

    #[tokio::test]
    async fn test_resolve_unknown_creates_empty_store() {
        let registry = registry();
        let store = registry.resolve("never-seen");

        assert_eq!(store.id(), "never-seen");
        assert!(store.get_all().await.unwrap().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_returns_same_store() {
        let registry = registry();
        let first = registry.resolve("s1");
        first.set("name", json!("alice")).await.unwrap();

        let second = registry.resolve("s1");
        assert_eq!(second.get("name").await.unwrap(), Some(json!("alice")));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_moves_to_front() {
        let registry = registry();
        let t0 = Utc::now();
        registry.resolve_at("a", t0);
        registry.resolve_at("b", t0 + secs(1));
        registry.resolve_at("c", t0 + secs(2));
        assert_eq!(registry.ids_by_recency(), vec!["c", "b", "a"]);

        registry.resolve_at("a", t0 + secs(3));
        assert_eq!(registry.ids_by_recency(), vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_collect_expires_least_recently_used() {
        let registry = registry();
        let t0 = Utc::now();
        registry.resolve_at("a", t0);
        registry.resolve_at("b", t0 + secs(1));
        registry.resolve_at("c", t0 + secs(2));
        registry.resolve_at("a", t0 + secs(3));

        // Only "b" (last seen at t0+1) has been idle for 10s at t0+11.
        let collected = registry
            .collect_expired_at(Duration::from_secs(10), t0 + secs(11))
            .await;

        assert_eq!(collected, 1);
        assert!(!registry.contains("b"));
        assert_eq!(registry.ids_by_recency(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_idle_scenario() {
        let registry = registry();
        let idle = Duration::from_secs(2);
        let t0 = Utc::now();

        let store = registry.resolve_at("s1", t0);
        store.set("name", json!("alice")).await.unwrap();

        // Reading through the held store is not an access.
        assert_eq!(registry.collect_expired_at(idle, t0 + secs(1)).await, 0);
        assert_eq!(store.get("name").await.unwrap(), Some(json!("alice")));
        assert_eq!(store.last_accessed(), t0);

        assert_eq!(registry.collect_expired_at(idle, t0 + secs(3)).await, 1);
        assert!(registry.is_empty());

        let store = registry.resolve_at("s1", t0 + secs(4));
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collect_leaves_only_fresh_sessions() {
        let registry = registry();
        let idle = Duration::from_secs(5);
        let t0 = Utc::now();
        for i in 0..10 {
            registry.resolve_at(&format!("s{i}"), t0 + secs(i));
        }

        let now = t0 + secs(12);
        assert_eq!(registry.collect_expired_at(idle, now).await, 8);
        for id in registry.ids_by_recency() {
            let store = registry.resolve_at(&id, now);
            // resolve_at just reset the clock, so check the survivors by name
            assert!(id == "s8" || id == "s9", "unexpected survivor {id}");
            assert_eq!(store.last_accessed(), now);
        }
    }

    #[tokio::test]
    async fn test_destroy_then_resolve_gives_fresh_store() {
        let registry = registry();
        let store = registry.resolve("s1");
        store.set("k", json!(1)).await.unwrap();

        assert!(registry.destroy("s1").await);
        assert!(!registry.contains("s1"));

        let fresh = registry.resolve("s1");
        assert!(fresh.get_all().await.unwrap().is_empty());
        assert!(!Arc::ptr_eq(&store, &fresh));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let registry = registry();
        registry.resolve("s1");
        assert!(registry.destroy("s1").await);
        assert!(!registry.destroy("s1").await);
        assert!(!registry.destroy("never-seen").await);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_slots_are_reused() {
        let registry = registry();
        let t0 = Utc::now();
        registry.resolve_at("a", t0);
        registry.resolve_at("b", t0);
        {
            let mut list = registry.list.lock();
            let idx = list.index["a"];
            list.remove(idx);
        }
        registry.resolve_at("c", t0);

        let list = registry.list.lock();
        assert_eq!(list.slots.len(), 2);
        assert!(list.free.is_empty());
        drop(list);
        assert_eq!(registry.ids_by_recency(), vec!["c", "b"]);
    }

    #[test]
    fn test_touch() {
        let registry = registry();
        let t0 = Utc::now();
        registry.resolve_at("a", t0);
        registry.resolve_at("b", t0);

        assert!(registry.touch_at("a", t0 + secs(5)));
        assert!(!registry.touch("missing"));
        assert_eq!(registry.ids_by_recency(), vec!["a", "b"]);
        assert_eq!(registry.resolve_at("a", t0 + secs(5)).last_accessed(), t0 + secs(5));
    }

    #[test]
    fn test_stats() {
        let registry = registry();
        assert_eq!(registry.stats().sessions, 0);
        assert!(registry.stats().oldest_idle.is_none());

        registry.resolve_at("a", Utc::now() - secs(30));
        registry.resolve("b");
        let stats = registry.stats();
        assert_eq!(stats.sessions, 2);
        assert!(stats.oldest_idle.unwrap() >= Duration::from_secs(29));
    }

    /// Memory store that counts how often it was retired.
    struct Retiring {
        inner: crate::memory::MemoryStore,
        retired: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SessionStore for Retiring {
        fn id(&self) -> &str {
            self.inner.id()
        }
        fn last_accessed(&self) -> DateTime<Utc> {
            self.inner.last_accessed()
        }
        fn set_last_accessed(&self, at: DateTime<Utc>) {
            self.inner.set_last_accessed(at)
        }
        async fn get(&self, key: &str) -> crate::Result<Option<crate::Value>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: crate::Value) -> crate::Result<()> {
            self.inner.set(key, value).await
        }
        async fn delete(&self, key: &str) -> crate::Result<()> {
            self.inner.delete(key).await
        }
        async fn clear(&self) -> crate::Result<()> {
            self.inner.clear().await
        }
        async fn get_all(&self) -> crate::Result<HashMap<String, crate::Value>> {
            self.inner.get_all().await
        }
        async fn visit_all(
            &self,
            visitor: &mut (dyn for<'a> FnMut(&'a str, &'a crate::Value) + Send),
        ) -> crate::Result<()> {
            self.inner.visit_all(visitor).await
        }
        fn retire(&self) {
            self.retired
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        async fn destroy(&self) -> crate::Result<()> {
            self.inner.destroy().await
        }
    }

    struct RetiringBackend(Arc<std::sync::atomic::AtomicUsize>);

    impl Backend for RetiringBackend {
        fn open(&self, id: &str) -> Arc<dyn SessionStore> {
            Arc::new(Retiring {
                inner: crate::memory::MemoryStore::new(id),
                retired: Arc::clone(&self.0),
            })
        }
    }

    #[tokio::test]
    async fn test_removal_retires_store_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let retired = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new(Arc::new(RetiringBackend(Arc::clone(&retired))));
        let t0 = Utc::now();
        registry.resolve_at("a", t0);
        registry.resolve_at("b", t0 + secs(10));
        registry.touch_at("b", t0 + secs(11));
        assert_eq!(retired.load(Ordering::SeqCst), 0);

        assert!(registry.destroy("b").await);
        assert!(!registry.destroy("b").await);
        assert_eq!(retired.load(Ordering::SeqCst), 1);

        assert_eq!(
            registry
                .collect_expired_at(Duration::from_secs(5), t0 + secs(6))
                .await,
            1
        );
        assert_eq!(retired.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
    }
}
