//! Configuration for Tessera.
//!
//! Provides TOML-based configuration with:
//! - A `[session]` table for the session manager
//! - A `[redis]` table for the remote backend
//! - Config file layering (user config dir + project-local overrides)
//! - Redis password from the `TESSERA_REDIS_PASSWORD` environment variable

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, xdg_config_dir,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
