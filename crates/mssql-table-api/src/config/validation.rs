//! Configuration validation.

use super::Config;
use crate::error::{ApiError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Database validation
    if config.database.host.is_empty() {
        return Err(ApiError::Config("database.host is required".into()));
    }
    if config.database.database.is_empty() {
        return Err(ApiError::Config("database.database is required".into()));
    }
    if config.database.user.is_empty() {
        return Err(ApiError::Config("database.user is required".into()));
    }
    if config.database.schema.is_empty() {
        return Err(ApiError::Config("database.schema cannot be empty".into()));
    }
    if config.database.port == 0 {
        return Err(ApiError::Config("database.port must be non-zero".into()));
    }
    if let Some(0) = config.database.max_connections {
        return Err(ApiError::Config(
            "database.max_connections must be at least 1".into(),
        ));
    }

    // Server validation
    if config.server.max_limit == 0 {
        return Err(ApiError::Config(
            "server.max_limit must be at least 1".into(),
        ));
    }
    if config.server.default_limit == 0 || config.server.default_limit > config.server.max_limit {
        return Err(ApiError::Config(format!(
            "server.default_limit must be between 1 and server.max_limit ({})",
            config.server.max_limit
        )));
    }
    if config.server.query_timeout_secs == 0 {
        return Err(ApiError::Config(
            "server.query_timeout_secs must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, ServerConfig};

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "sales".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                schema: "dbo".to_string(),
                encrypt: "false".to_string(),
                trust_server_cert: true,
                max_connections: None,
            },
            server: ServerConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.database.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_connections() {
        let mut config = valid_config();
        config.database.max_connections = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_default_limit_above_max() {
        let mut config = valid_config();
        config.server.default_limit = 5000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = valid_config();
        config.server.query_timeout_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_database_config_debug_redacts_password() {
        let mut config = valid_config();
        config.database.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.database);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
