//! Server-side sessions with recency-ordered idle eviction.
//!
//! This crate provides the session lifecycle engine:
//! - A registry of live sessions with an O(1) recency list for idle GC
//! - A storage-backend contract so sessions can live in process memory
//!   or in a remote key/value store
//! - A manager that binds an inbound identifier to exactly one session
//!   and owns the periodic GC task
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_session::{BackendRegistry, Manager, ManagerConfig, MemoryCarrier};
//!
//! let backends = BackendRegistry::with_defaults();
//! let manager = Manager::new(&backends, ManagerConfig::new()).await?;
//! manager.spawn_gc();
//!
//! let mut carrier = MemoryCarrier::new();
//! let session = manager.start_session(&mut carrier);
//! session.set("name", "alice".into()).await?;
//! ```

mod backend;
mod carrier;
mod codec;
mod config;
mod error;
mod id;
mod manager;
mod memory;
mod registry;
mod store;

pub use backend::{Backend, BackendRegistry};
pub use carrier::{CarrierCookie, IdentifierCarrier, MemoryCarrier};
pub use codec::SessionRecord;
pub use config::{DEFAULT_COOKIE_NAME, DEFAULT_IDLE, MIN_IDLE, ManagerConfig};
pub use error::{Error, Result};
pub use id::{decode_identifier, generate_identifier};
pub use manager::Manager;
pub use memory::{MEMORY_BACKEND, MemoryBackend, MemoryStore};
pub use registry::{Registry, RegistryStats};
pub use store::{AccessClock, SessionStore, SessionStoreExt, Value};
