//! The Redis backend as seen by the session registry.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tessera_session::{Backend, Result, SessionStore};

use crate::config::RedisConfig;
use crate::pool::Pool;
use crate::store::{KeyState, RedisStore};

/// Conventional registration name for the Redis backend.
pub const REDIS_BACKEND: &str = "redis";

/// Dead entries are pruned once the key table reaches this size.
const KEY_TABLE_PRUNE_MIN: usize = 64;

/// Key states of stores that are still alive.
#[derive(Default)]
struct KeyTable {
    states: HashMap<String, Weak<KeyState>>,
    prune_at: usize,
}

impl KeyTable {
    fn state_for(&mut self, key: &str) -> Arc<KeyState> {
        if let Some(state) = self.states.get(key).and_then(Weak::upgrade) {
            return state;
        }

        if self.states.len() >= self.prune_at.max(KEY_TABLE_PRUNE_MIN) {
            self.states.retain(|_, state| state.strong_count() > 0);
            self.prune_at = self.states.len() * 2;
        }

        let state = Arc::new(KeyState::default());
        self.states.insert(key.to_string(), Arc::downgrade(&state));
        state
    }
}

/// Opens [`RedisStore`]s sharing one connection pool.
pub struct RedisBackend {
    config: RedisConfig,
    pool: Arc<Pool>,
    keys: Mutex<KeyTable>,
}

impl RedisBackend {
    /// Create the backend. No connection is made until first use.
    ///
    /// Fails only if the configuration cannot form a valid connection URL.
    pub fn new(config: RedisConfig) -> Result<Self> {
        let pool = Arc::new(Pool::new(&config)?);
        Ok(Self {
            config,
            pool,
            keys: Mutex::new(KeyTable::default()),
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

#[async_trait]
impl Backend for RedisBackend {
    fn is_remote(&self) -> bool {
        true
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    fn open(&self, id: &str) -> Arc<dyn SessionStore> {
        let key = self.config.key_for(id);
        let shared = self.keys.lock().state_for(&key);
        Arc::new(RedisStore::new(
            id,
            key,
            Arc::clone(&self.pool),
            self.config.max_age_secs(),
            shared,
        ))
    }
}
