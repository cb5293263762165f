//! Configuration types.
//!
//! Every field is optional; anything left unset keeps the library default
//! of the crate that consumes it.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Root configuration.
///
/// ```toml
/// [session]
/// backend = "redis"
/// cookie_name = "sid"
/// idle_secs = 1800
///
/// [redis]
/// address = "127.0.0.1:6379"
/// prefix = "sess:"
/// timeout_ms = 500
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    pub session: Option<SessionSection>,
    pub redis: Option<RedisSection>,
}

impl TesseraConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections merge field by field, so a project file can override a
    /// single setting from the user file.
    pub fn merge(&mut self, other: TesseraConfig) {
        if let Some(layer) = other.session {
            match &mut self.session {
                Some(base) => base.merge(layer),
                None => self.session = Some(layer),
            }
        }
        if let Some(layer) = other.redis {
            match &mut self.redis {
                Some(base) => base.merge(layer),
                None => self.redis = Some(layer),
            }
        }
    }

    /// Reject values no consumer could use.
    pub fn validate(&self) -> Result<()> {
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        Ok(())
    }

    /// Set the redis password, creating the `[redis]` section if needed.
    pub fn set_redis_password(&mut self, password: impl Into<String>) {
        self.redis.get_or_insert_with(RedisSection::default).password = Some(password.into());
    }
}

/// `[session]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Registered backend name (`memory`, `redis`).
    pub backend: Option<String>,
    pub cookie_name: Option<String>,
    /// Idle lifetime in seconds.
    pub idle_secs: Option<u64>,
    /// Force the cookie `Secure` attribute on or off.
    pub secure: Option<bool>,
}

impl SessionSection {
    fn merge(&mut self, other: SessionSection) {
        merge_field(&mut self.backend, other.backend);
        merge_field(&mut self.cookie_name, other.cookie_name);
        merge_field(&mut self.idle_secs, other.idle_secs);
        merge_field(&mut self.secure, other.secure);
    }
}

/// `[redis]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSection {
    /// `tcp` or `unix`.
    pub network: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
    pub database: Option<i64>,
    pub max_idle: Option<usize>,
    pub max_active: Option<usize>,
    pub idle_timeout_secs: Option<u64>,
    pub prefix: Option<String>,
    pub max_age_secs: Option<u64>,
    pub timeout_ms: Option<u64>,
}

impl RedisSection {
    fn merge(&mut self, other: RedisSection) {
        merge_field(&mut self.network, other.network);
        merge_field(&mut self.address, other.address);
        merge_field(&mut self.password, other.password);
        merge_field(&mut self.database, other.database);
        merge_field(&mut self.max_idle, other.max_idle);
        merge_field(&mut self.max_active, other.max_active);
        merge_field(&mut self.idle_timeout_secs, other.idle_timeout_secs);
        merge_field(&mut self.prefix, other.prefix);
        merge_field(&mut self.max_age_secs, other.max_age_secs);
        merge_field(&mut self.timeout_ms, other.timeout_ms);
    }

    fn validate(&self) -> Result<()> {
        if let Some(network) = &self.network
            && !matches!(network.to_ascii_lowercase().as_str(), "tcp" | "unix")
        {
            return Err(ConfigError::Invalid {
                field: "redis.network".to_string(),
                reason: format!("expected tcp or unix, got '{network}'"),
            });
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "redis.timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.database.is_some_and(|db| db < 0) {
            return Err(ConfigError::Invalid {
                field: "redis.database".to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

fn merge_field<T>(base: &mut Option<T>, layer: Option<T>) {
    if layer.is_some() {
        *base = layer;
    }
}
