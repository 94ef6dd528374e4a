//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{ApiError, Result};
use std::path::Path;

/// Environment variables that override file settings.
pub const ENV_HOST: &str = "TABLE_API_HOST";
pub const ENV_PORT: &str = "TABLE_API_PORT";
pub const ENV_DATABASE: &str = "TABLE_API_DATABASE";
pub const ENV_USER: &str = "TABLE_API_USER";
pub const ENV_PASSWORD: &str = "TABLE_API_PASSWORD";
pub const ENV_BIND: &str = "TABLE_API_BIND";

impl Config {
    /// Load configuration from a YAML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise build purely from the
    /// environment.
    pub fn load_or_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Self::from_lookup(|key| std::env::var(key).ok())
        }
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from environment-style lookups only.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config {
            database: DatabaseConfig {
                host: String::new(),
                port: 1433,
                database: String::new(),
                user: String::new(),
                password: String::new(),
                schema: "dbo".to_string(),
                encrypt: "true".to_string(),
                trust_server_cert: false,
                max_connections: None,
            },
            server: ServerConfig::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TABLE_API_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.database.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.database.port = port
                .parse()
                .map_err(|_| ApiError::Config(format!("{} must be a port number, got {:?}", ENV_PORT, port)))?;
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database.database = database;
        }
        if let Some(user) = lookup(ENV_USER) {
            self.database.user = user;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.database.password = password;
        }
        if let Some(bind) = lookup(ENV_BIND) {
            let (host, port) = bind
                .rsplit_once(':')
                .ok_or_else(|| ApiError::Config(format!("{} must be host:port, got {:?}", ENV_BIND, bind)))?;
            self.server.host = host.to_string();
            self.server.port = port
                .parse()
                .map_err(|_| ApiError::Config(format!("{} has an invalid port: {:?}", ENV_BIND, bind)))?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
