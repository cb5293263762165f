//! Turning loaded configuration into library types.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use tessera_config::{LoadedConfig, RedisSection, SessionSection, TesseraConfig};
use tessera_redis::{Network, REDIS_BACKEND, RedisBackend, RedisConfig};
use tessera_session::{BackendRegistry, ManagerConfig};
use tracing::warn;

use crate::commands::Context;

/// Load the explicit config file, or discover the layered one.
pub fn load(ctx: &Context) -> Result<TesseraConfig> {
    match &ctx.config_path {
        Some(path) => tessera_config::load_config_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => {
            let LoadedConfig {
                config, warnings, ..
            } = tessera_config::load_config(None)?;
            for warning in warnings {
                warn!("{warning}");
            }
            Ok(config)
        }
    }
}

pub fn manager_config(section: Option<&SessionSection>) -> ManagerConfig {
    let mut config = ManagerConfig::new();
    let Some(section) = section else {
        return config;
    };

    if let Some(backend) = &section.backend {
        config = config.with_backend(backend.as_str());
    }
    if let Some(name) = &section.cookie_name {
        config = config.with_cookie_name(name.as_str());
    }
    if let Some(secs) = section.idle_secs {
        config = config.with_idle(Duration::from_secs(secs));
    }
    if let Some(secure) = section.secure {
        config = config.with_secure(secure);
    }
    config
}

pub fn redis_config(section: Option<&RedisSection>) -> Result<RedisConfig> {
    let mut config = RedisConfig::new();
    let Some(section) = section else {
        return Ok(config);
    };

    if let Some(network) = &section.network {
        let network: Network = network.parse().map_err(|e: String| anyhow!(e))?;
        config = config.with_network(network);
    }
    if let Some(address) = &section.address {
        config = config.with_address(address.as_str());
    }
    if let Some(password) = &section.password {
        config = config.with_password(password.as_str());
    }
    if let Some(database) = section.database {
        config = config.with_database(database);
    }
    if let Some(max_idle) = section.max_idle {
        config = config.with_max_idle(max_idle);
    }
    if let Some(max_active) = section.max_active {
        config = config.with_max_active(max_active);
    }
    if let Some(secs) = section.idle_timeout_secs {
        config = config.with_idle_timeout(Duration::from_secs(secs));
    }
    if let Some(prefix) = &section.prefix {
        config = config.with_prefix(prefix.as_str());
    }
    if let Some(secs) = section.max_age_secs {
        config = config.with_max_age(Duration::from_secs(secs));
    }
    if let Some(ms) = section.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    Ok(config)
}

/// Built-in backends: `memory` always, `redis` configured from `[redis]`.
pub fn backends(config: &TesseraConfig) -> Result<BackendRegistry> {
    let mut backends = BackendRegistry::with_defaults();
    let redis = RedisBackend::new(redis_config(config.redis.as_ref())?)?;
    backends.register(REDIS_BACKEND, Arc::new(redis));
    Ok(backends)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_session::{DEFAULT_COOKIE_NAME, DEFAULT_IDLE};

    #[test]
    fn test_manager_config_defaults() {
        let config = manager_config(None);
        assert_eq!(config.backend, "memory");
        assert_eq!(config.cookie_name, DEFAULT_COOKIE_NAME);
        assert_eq!(config.idle, DEFAULT_IDLE);
        assert_eq!(config.secure, None);
    }

    #[test]
    fn test_manager_config_from_section() {
        let section = SessionSection {
            backend: Some("redis".to_string()),
            cookie_name: Some("sid".to_string()),
            idle_secs: Some(90),
            secure: Some(true),
        };
        let config = manager_config(Some(&section));
        assert_eq!(config.backend, "redis");
        assert_eq!(config.cookie_name, "sid");
        assert_eq!(config.idle, Duration::from_secs(90));
        assert_eq!(config.secure, Some(true));
    }

    #[test]
    fn test_redis_config_from_section() {
        let section = RedisSection {
            network: Some("unix".to_string()),
            address: Some("/run/redis.sock".to_string()),
            prefix: Some("sess:".to_string()),
            timeout_ms: Some(250),
            max_active: Some(0),
            ..RedisSection::default()
        };
        let config = redis_config(Some(&section)).unwrap();
        assert_eq!(config.network, Network::Unix);
        assert_eq!(config.address, "/run/redis.sock");
        assert_eq!(config.key_for("x"), "sess:x");
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.max_active, 0);
    }

    #[test]
    fn test_backends_register_both() {
        let backends = backends(&TesseraConfig::new()).unwrap();
        assert_eq!(backends.names(), vec!["memory", "redis"]);
    }
}
