//! Binds inbound identifiers to sessions and runs idle GC.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendRegistry};
use crate::carrier::{CarrierCookie, IdentifierCarrier};
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::id::{decode_identifier, generate_identifier};
use crate::memory::{MEMORY_BACKEND, MemoryBackend};
use crate::registry::Registry;
use crate::store::SessionStore;

/// How far in the past a removal cookie's expiry is set, in seconds.
const REMOVAL_BACKDATE_SECS: i64 = 60;

/// Session manager.
///
/// Reads the identifier from the request carrier (minting one when absent),
/// resolves it through the [`Registry`], and owns the periodic GC task.
/// Safe to share across request handlers; the registry serializes access.
pub struct Manager {
    config: ManagerConfig,
    backend: String,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
}

impl Manager {
    /// Build a manager using the backend named in `config`.
    ///
    /// Fails only if no backend is registered under that name. A remote
    /// backend that does not answer its health check is replaced by the
    /// in-process backend for the lifetime of this manager.
    pub async fn new(backends: &BackendRegistry, config: ManagerConfig) -> Result<Self> {
        let config = config.normalized();
        let requested = backends
            .get(&config.backend)
            .ok_or_else(|| Error::UnknownBackend(config.backend.clone()))?;

        let (backend, store): (String, Arc<dyn Backend>) = if requested.is_remote() {
            match requested.ping().await {
                Ok(()) => (config.backend.clone(), requested),
                Err(e) => {
                    warn!(
                        backend = %config.backend,
                        error = %e,
                        "Session backend unreachable, falling back to in-process storage"
                    );
                    (MEMORY_BACKEND.to_string(), Arc::new(MemoryBackend))
                }
            }
        } else {
            (config.backend.clone(), requested)
        };

        info!(
            backend = %backend,
            cookie = %config.cookie_name,
            idle_secs = config.idle.as_secs(),
            "Session manager ready"
        );

        Ok(Self {
            config,
            backend,
            registry: Arc::new(Registry::new(store)),
            shutdown: CancellationToken::new(),
        })
    }

    /// Effective configuration, after defaults were applied.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Name of the backend in use, which differs from the configured one
    /// after a fallback.
    pub fn backend_name(&self) -> &str {
        &self.backend
    }

    /// Whether construction fell back to the in-process backend.
    pub fn is_fallback(&self) -> bool {
        self.backend != self.config.backend
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Return the session for this request, issuing an identifier if needed.
    ///
    /// A missing or malformed identifier gets a freshly minted one, written
    /// back through the carrier. A well-formed but unknown identifier is
    /// resolved to a new empty session under that identifier. Either way the
    /// session counts as accessed now.
    pub fn start_session<C>(&self, carrier: &mut C) -> Arc<dyn SessionStore>
    where
        C: IdentifierCarrier + ?Sized,
    {
        if let Some(raw) = carrier.read(&self.config.cookie_name) {
            match decode_identifier(&raw) {
                Some(id) => return self.registry.resolve(&id),
                None => warn!(
                    cookie = %self.config.cookie_name,
                    "Malformed session identifier, issuing a new one"
                ),
            }
        }

        let id = generate_identifier();
        let store = self.registry.resolve(&id);
        let cookie = self.cookie(&*carrier, id, expires_after(self.config.idle));
        carrier.write(cookie);
        store
    }

    /// End the session named by the request carrier and tell the client to
    /// forget its identifier. Does nothing if the request carries none.
    pub async fn destroy_session<C>(&self, carrier: &mut C)
    where
        C: IdentifierCarrier + ?Sized,
    {
        let Some(raw) = carrier.read(&self.config.cookie_name) else {
            return;
        };

        if let Some(id) = decode_identifier(&raw) {
            self.registry.destroy(&id).await;
        }

        let expires = Utc::now() - TimeDelta::seconds(REMOVAL_BACKDATE_SECS);
        let cookie = self.cookie(&*carrier, String::new(), expires);
        carrier.write(cookie);
    }

    /// Run one GC sweep now. Returns the number of sessions reclaimed.
    pub async fn run_gc(&self) -> usize {
        self.registry.collect_expired(self.config.idle).await
    }

    /// Start the periodic GC task on the current tokio runtime.
    ///
    /// Sweeps immediately and then once per idle duration until
    /// [`shutdown`](Self::shutdown) is called or the manager is dropped.
    pub fn spawn_gc(&self) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let idle = self.config.idle;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = interval(idle);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.collect_expired(idle).await;
                    }
                }
            }

            debug!("Session GC task stopped");
        })
    }

    /// Stop the GC task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn cookie<C>(&self, carrier: &C, value: String, expires: DateTime<Utc>) -> CarrierCookie
    where
        C: IdentifierCarrier + ?Sized,
    {
        CarrierCookie {
            name: self.config.cookie_name.clone(),
            value,
            path: "/".to_string(),
            http_only: true,
            secure: self.config.secure.unwrap_or_else(|| carrier.is_encrypted()),
            expires,
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Now plus `idle`, saturating at the latest representable time.
fn expires_after(idle: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(idle)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::MemoryCarrier;
    use crate::config::DEFAULT_COOKIE_NAME;
    use serde_json::json;

    async fn manager() -> Manager {
        Manager::new(&BackendRegistry::with_defaults(), ManagerConfig::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_backend_is_an_error() {
        let config = ManagerConfig::new().with_backend("nope");
        let result = Manager::new(&BackendRegistry::with_defaults(), config).await;
        assert!(matches!(result, Err(Error::UnknownBackend(name)) if name == "nope"));
    }

    #[tokio::test]
    async fn test_new_session_issues_cookie() {
        let manager = manager().await;
        let mut carrier = MemoryCarrier::new();

        let before = Utc::now();
        let session = manager.start_session(&mut carrier);

        let cookie = carrier.last_written(DEFAULT_COOKIE_NAME).unwrap();
        assert_eq!(cookie.value, session.id());
        assert_eq!(cookie.path, "/");
        assert!(cookie.http_only);
        assert!(!cookie.secure);
        assert!(cookie.expires >= before + TimeDelta::minutes(59));
        assert_eq!(manager.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_secure_follows_transport() {
        let manager = manager().await;
        let mut carrier = MemoryCarrier::new().with_encryption(true);
        manager.start_session(&mut carrier);
        assert!(carrier.written()[0].secure);
    }

    #[tokio::test]
    async fn test_existing_identifier_resolves_same_session() {
        let manager = manager().await;
        let mut first = MemoryCarrier::new();
        let session = manager.start_session(&mut first);
        session.set("name", json!("alice")).await.unwrap();

        let mut second = first.follow_up();
        let again = manager.start_session(&mut second);

        assert_eq!(again.id(), session.id());
        assert_eq!(again.get("name").await.unwrap(), Some(json!("alice")));
        assert!(second.written().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_identifier_gets_new_session() {
        let manager = manager().await;
        let mut carrier = MemoryCarrier::new().with_value(DEFAULT_COOKIE_NAME, "bad value;");

        let session = manager.start_session(&mut carrier);

        let cookie = carrier.last_written(DEFAULT_COOKIE_NAME).unwrap();
        assert_eq!(cookie.value, session.id());
        assert_ne!(session.id(), "bad value;");
    }

    #[tokio::test]
    async fn test_destroy_session_clears_cookie() {
        let manager = manager().await;
        let mut carrier = MemoryCarrier::new();
        let session = manager.start_session(&mut carrier);
        session.set("k", json!(1)).await.unwrap();

        let mut logout = carrier.follow_up();
        manager.destroy_session(&mut logout).await;

        let cookie = logout.last_written(DEFAULT_COOKIE_NAME).unwrap();
        assert!(cookie.is_removal());
        assert!(cookie.http_only);
        assert!(manager.registry().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_without_identifier_is_noop() {
        let manager = manager().await;
        let mut carrier = MemoryCarrier::new();
        manager.destroy_session(&mut carrier).await;
        assert!(carrier.written().is_empty());
    }

    #[tokio::test]
    async fn test_run_gc_keeps_fresh_sessions() {
        let manager = manager().await;
        manager.start_session(&mut MemoryCarrier::new());
        assert_eq!(manager.run_gc().await, 0);
        assert_eq!(manager.registry().len(), 1);
    }
}
