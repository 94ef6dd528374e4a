//! Configuration type definitions with auto-tuning based on system resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use sysinfo::System;
use tracing::info;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len();

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection settings (MSSQL).
    pub database: DatabaseConfig,

    /// HTTP server behavior.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.database = self.database.with_auto_tuning(&resources);
        self
    }
}

/// Database (MSSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema whose tables are exposed (default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Encrypt connection (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Maximum pooled connections. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl DatabaseConfig {
    /// Fill in the pool size from the number of CPU cores when unset.
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        if self.max_connections.is_none() {
            let conns = (resources.cpu_cores * 2).clamp(4, 64) as u32;
            self.max_connections = Some(conns);
            info!("Auto-tuned config: max_connections={}", conns);
        }
        self
    }

    pub fn get_max_connections(&self) -> u32 {
        self.max_connections.unwrap_or(8)
    }

    /// Whether the connection should negotiate TLS.
    pub fn encryption_enabled(&self) -> bool {
        !matches!(
            self.encrypt.to_lowercase().as_str(),
            "false" | "no" | "0" | "disable"
        )
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 8080).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Page size used when a request gives none or zero (default: 100).
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Largest page size a request may ask for (default: 1000).
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,

    /// Deadline for a single database call in seconds (default: 30).
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_limit() -> u32 {
    100
}

fn default_max_limit() -> u32 {
    1000
}

fn default_query_timeout() -> u64 {
    30
}
