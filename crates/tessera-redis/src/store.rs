//! Session store mirrored into Redis.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tessera_session::{AccessClock, Result, SessionRecord, SessionStore, Value};
use tracing::{trace, warn};

use crate::pool::Pool;

/// Per-key state shared by every store opened for the same Redis key.
///
/// Each time a session is retired the key moves to a new generation; a
/// store belongs to the generation current when it was opened. All remote
/// traffic for the key goes through `ledger`, so loads, whole-record writes
/// and deletes land in Redis in the order they took the gate.
#[derive(Default)]
pub(crate) struct KeyState {
    generation: AtomicU64,
    ledger: tokio::sync::Mutex<KeyLedger>,
}

#[derive(Default)]
struct KeyLedger {
    /// Every generation below this has had its record deleted.
    settled: u64,

    /// Highest generation that has written the record.
    written_by: u64,
}

/// Local view of the session, reconciled with Redis on first use.
#[derive(Default)]
struct Mirror {
    entries: HashMap<String, Value>,

    /// Whether the remote record has been merged in.
    loaded: bool,

    /// Keys deleted locally before the remote record was loaded.
    tombstones: HashSet<String>,

    /// Bumped on every local mutation.
    version: u64,

    /// Version last written to Redis.
    flushed: u64,
}

impl Mirror {
    fn mutated(&mut self) {
        self.version += 1;
    }

    fn merge_remote(&mut self, remote: HashMap<String, Value>) {
        for (key, value) in remote {
            if !self.tombstones.contains(&key) {
                self.entries.entry(key).or_insert(value);
            }
        }
        self.tombstones.clear();
        self.loaded = true;
    }
}

/// Session values held locally and written through to Redis.
///
/// The remote record is fetched lazily on the first operation and merged
/// under any values already written locally. Every mutation re-writes the
/// whole record with the configured expiry. When Redis cannot be reached
/// the mutation still applies locally, the store stays dirty, and the call
/// returns the error; reads of keys written by this process keep working.
pub struct RedisStore {
    id: String,
    key: String,
    pool: Arc<Pool>,
    max_age_secs: u64,
    shared: Arc<KeyState>,
    generation: u64,
    mirror: Mutex<Mirror>,
    accessed: AccessClock,
}

impl RedisStore {
    pub(crate) fn new(
        id: &str,
        key: String,
        pool: Arc<Pool>,
        max_age_secs: u64,
        shared: Arc<KeyState>,
    ) -> Self {
        let generation = shared.generation.load(Ordering::Acquire);
        Self {
            id: id.to_string(),
            key,
            pool,
            max_age_secs,
            shared,
            generation,
            mirror: Mutex::new(Mirror::default()),
            accessed: AccessClock::now(),
        }
    }

    /// Redis key holding this session.
    pub fn key(&self) -> &str {
        &self.key
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if self.mirror.lock().loaded {
            return Ok(());
        }
        let ledger = self.shared.ledger.lock().await;
        self.load(&ledger).await
    }

    /// Fetch and merge the remote record. Caller holds the key gate.
    async fn load(&self, ledger: &KeyLedger) -> Result<()> {
        if self.mirror.lock().loaded {
            return Ok(());
        }

        // A retired session's delete is still pending; its record is not ours.
        let remote = if ledger.settled < self.generation {
            HashMap::new()
        } else {
            match self.pool.fetch(&self.key).await? {
                Some(blob) => match SessionRecord::decode(&blob) {
                    Ok(record) => record.entries,
                    Err(e) => {
                        warn!(error = %e, "Discarding undecodable session record");
                        HashMap::new()
                    }
                },
                None => HashMap::new(),
            }
        };

        let mut mirror = self.mirror.lock();
        if !mirror.loaded {
            mirror.merge_remote(remote);
            trace!(entries = mirror.entries.len(), "Loaded session record");
        }
        Ok(())
    }

    /// Load if needed, then push the current entries if they changed.
    ///
    /// Snapshot, `SETEX` and the clean mark happen under the key gate, so a
    /// slower write can never overwrite a newer one.
    async fn write_through(&self) -> Result<()> {
        let mut ledger = self.shared.ledger.lock().await;
        self.load(&ledger).await?;

        let (blob, version) = {
            let mirror = self.mirror.lock();
            if mirror.version == mirror.flushed {
                return Ok(());
            }
            let record = SessionRecord::new(mirror.entries.clone());
            (record.encode()?, mirror.version)
        };

        self.pool.store(&self.key, blob, self.max_age_secs).await?;
        ledger.written_by = ledger.written_by.max(self.generation);

        let mut mirror = self.mirror.lock();
        mirror.flushed = mirror.flushed.max(version);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedisStore {
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
        match self.ensure_loaded().await {
            Ok(()) => Ok(self.mirror.lock().entries.get(key).cloned()),
            Err(e) => match self.mirror.lock().entries.get(key) {
                Some(value) => Ok(Some(value.clone())),
                None => Err(e),
            },
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        {
            let mut mirror = self.mirror.lock();
            mirror.entries.insert(key.to_string(), value);
            mirror.tombstones.remove(key);
            mirror.mutated();
        }
        self.write_through().await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        {
            let mut mirror = self.mirror.lock();
            mirror.entries.remove(key);
            if !mirror.loaded {
                mirror.tombstones.insert(key.to_string());
            }
            mirror.mutated();
        }
        self.write_through().await
    }

    async fn clear(&self) -> Result<()> {
        {
            let mut mirror = self.mirror.lock();
            mirror.entries.clear();
            mirror.tombstones.clear();
            // Nothing remote can survive a clear, so there is nothing left to load.
            mirror.loaded = true;
            mirror.mutated();
        }
        self.write_through().await
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        self.ensure_loaded().await?;
        Ok(self.mirror.lock().entries.clone())
    }

    async fn visit_all(
        &self,
        visitor: &mut (dyn for<'a> FnMut(&'a str, &'a Value) + Send),
    ) -> Result<()> {
        for (key, value) in self.get_all().await? {
            visitor(&key, &value);
        }
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        let mirror = self.mirror.lock();
        mirror.version != mirror.flushed
    }

    async fn flush(&self) -> Result<()> {
        self.write_through().await
    }

    fn retire(&self) {
        self.shared
            .generation
            .fetch_max(self.generation + 1, Ordering::AcqRel);
    }

    async fn destroy(&self) -> Result<()> {
        {
            let mut mirror = self.mirror.lock();
            *mirror = Mirror {
                loaded: true,
                ..Mirror::default()
            };
        }

        let mut ledger = self.shared.ledger.lock().await;
        // A newer session already replaced the whole record.
        if ledger.written_by <= self.generation {
            self.pool.remove(&self.key).await?;
        }
        ledger.settled = ledger.settled.max(self.generation + 1);
        Ok(())
    }
}
