//! # mssql-table-api
//!
//! Schema-driven generic data API over Microsoft SQL Server tables.
//!
//! Given only a table name, the library discovers the table's columns and
//! keys from the catalog and serves list, filter, count, create, update,
//! upsert and delete over it without any per-table code:
//!
//! - **Introspection** of columns, primary keys and foreign keys
//! - **Single-flight caches** for table schemas and foreign key targets
//! - **Two filter dialects** (structured grid conditions and `$filter`
//!   expressions) compiled into one parameterized predicate form
//! - **Generic records** standing in for per-table row types
//! - **HTTP surface** built on axum
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mssql_table_api::{Config, MssqlPool, TableService};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mssql_table_api::Result<()> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let pool = MssqlPool::new(&config.database).await?;
//!     let service = Arc::new(TableService::new(
//!         Arc::new(pool),
//!         config.database.schema.clone(),
//!         (&config.server).into(),
//!     ));
//!     mssql_table_api::http::serve(service, &config.server.socket_addr(), CancellationToken::new()).await
//! }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod executor;
pub mod filter;
pub mod http;
pub mod introspect;
pub mod sql;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, ServerConfig};
pub use core::{ColumnMetadata, FieldValue, ForeignKeyMapping, GenericRecord, TableSchema};
pub use db::{Database, MssqlPool, Statement};
pub use error::{ApiError, Result};
pub use executor::{ForeignKeyOption, Limits, Page, TableService};
pub use filter::{Filter, FilterCondition};
pub use typemap::SemanticType;
