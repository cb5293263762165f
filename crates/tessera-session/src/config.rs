//! Configuration for the session manager.

use std::time::Duration;

use crate::memory::MEMORY_BACKEND;

/// Default idle duration (60 minutes).
///
/// Doubles as the GC sweep interval and the expiry advertised on the
/// identifier cookie.
pub const DEFAULT_IDLE: Duration = Duration::from_secs(60 * 60);

/// Smallest idle duration accepted; anything shorter falls back to [`DEFAULT_IDLE`].
pub const MIN_IDLE: Duration = Duration::from_secs(1);

/// Cookie name used when none is configured.
pub const DEFAULT_COOKIE_NAME: &str = "tessera_sid";

/// Configuration for a [`Manager`](crate::Manager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Name of the registered backend to use.
    pub backend: String,

    /// Name of the cookie carrying the session identifier.
    pub cookie_name: String,

    /// How long a session may go unaccessed before GC reclaims it.
    pub idle: Duration,

    /// Force the `Secure` cookie attribute on or off.
    /// `None` follows the transport (set when the request was encrypted).
    pub secure: Option<bool>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            backend: MEMORY_BACKEND.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            idle: DEFAULT_IDLE,
            secure: None,
        }
    }
}

impl ManagerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the backend by its registered name.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Set the cookie name. An empty name keeps [`DEFAULT_COOKIE_NAME`].
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the idle duration.
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Force the `Secure` cookie attribute.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Apply the fallback rules for out-of-range values.
    pub(crate) fn normalized(mut self) -> Self {
        if self.idle < MIN_IDLE {
            self.idle = DEFAULT_IDLE;
        }
        if self.cookie_name.is_empty() {
            self.cookie_name = DEFAULT_COOKIE_NAME.to_string();
        }
        self
    }
}
