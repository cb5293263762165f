//! Connection and retention settings for the Redis backend.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default server address.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:6379";

/// Default number of idle connections kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 10;

/// Default cap on connections in use at once. Zero means unbounded.
pub const DEFAULT_MAX_ACTIVE: usize = 100;

/// Default time an idle connection is kept before being closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(240);

/// Default remote-side retention for a session record (31 days).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// Default bound on each round-trip, connection setup included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Transport used to reach Redis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Tcp,
    /// `address` is a filesystem path to a Unix domain socket.
    Unix,
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Network::Tcp),
            "unix" => Ok(Network::Unix),
            other => Err(format!("unsupported network '{other}' (expected tcp or unix)")),
        }
    }
}

/// Redis backend configuration.
///
/// Everything has a default; adjust with the builder methods before the
/// backend is created.
#[derive(Clone)]
pub struct RedisConfig {
    pub network: Network,

    /// `host:port` for TCP, socket path for Unix.
    pub address: String,

    pub password: Option<String>,

    /// Logical database index.
    pub database: i64,

    /// Idle connections kept for reuse.
    pub max_idle: usize,

    /// Connections in use at once (0 = unbounded).
    pub max_active: usize,

    /// Idle connections older than this are closed instead of reused.
    pub idle_timeout: Duration,

    /// Prepended to the session identifier to form the Redis key.
    pub prefix: String,

    /// Remote-side expiry set on every write.
    pub max_age: Duration,

    /// Bound on each round-trip.
    pub timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            address: DEFAULT_ADDRESS.to_string(),
            password: None,
            database: 0,
            max_idle: DEFAULT_MAX_IDLE,
            max_active: DEFAULT_MAX_ACTIVE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            prefix: String::new(),
            max_age: DEFAULT_MAX_AGE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("max_idle", &self.max_idle)
            .field("max_active", &self.max_active)
            .field("idle_timeout", &self.idle_timeout)
            .field("prefix", &self.prefix)
            .field("max_age", &self.max_age)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Redis key for a session identifier.
    pub fn key_for(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Expiry in whole seconds, never less than one.
    pub fn max_age_secs(&self) -> u64 {
        self.max_age.as_secs().max(1)
    }

    /// Connection URL understood by the `redis` crate.
    pub fn connection_url(&self) -> String {
        match self.network {
            Network::Tcp => {
                let auth = match &self.password {
                    Some(password) => format!(":{}@", urlencoding::encode(password)),
                    None => String::new(),
                };
                format!("redis://{}{}/{}", auth, self.address, self.database)
            }
            Network::Unix => {
                let mut url = format!("redis+unix://{}?db={}", self.address, self.database);
                if let Some(password) = &self.password {
                    url.push_str("&pass=");
                    url.push_str(&urlencoding::encode(password));
                }
                url
            }
        }
    }
}
