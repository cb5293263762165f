//! Redis-backed session storage.
//!
//! Each session is stored as one blob under `<prefix><identifier>` with a
//! remote-side expiry. Stores keep a local mirror of their entries and
//! write the whole record through on every mutation, so a process always
//! reads its own writes even while Redis is unreachable.
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_redis::{REDIS_BACKEND, RedisBackend, RedisConfig};
//!
//! let config = RedisConfig::new()
//!     .with_address("cache.internal:6379")
//!     .with_prefix("sess:");
//! backends.register(REDIS_BACKEND, Arc::new(RedisBackend::new(config)?));
//! ```

mod backend;
mod config;
mod pool;
mod store;

pub use backend::{REDIS_BACKEND, RedisBackend};
pub use config::{
    DEFAULT_ADDRESS, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_ACTIVE, DEFAULT_MAX_AGE, DEFAULT_MAX_IDLE,
    DEFAULT_TIMEOUT, Network, RedisConfig,
};
pub use store::RedisStore;
