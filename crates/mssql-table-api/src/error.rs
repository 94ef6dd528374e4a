//! Error types for the table API library.

use thiserror::Error;

/// Main error type for table API operations.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request rejected before any statement was issued (bad pagination,
    /// unknown column, incomplete range, unrecognized payload field).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The catalog has no columns for the requested table.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The catalog has no referential constraint with this name.
    #[error("Foreign key not found: {0}")]
    ForeignKeyNotFound(String),

    /// Catalog query failed while introspecting a table
    #[error("Schema introspection failed for table {table}: {source}")]
    Schema {
        table: String,
        #[source]
        source: Box<ApiError>,
    },

    /// Statement execution failed against the database
    #[error("Database error: {0}")]
    Storage(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A database call exceeded the configured deadline
    #[error("Database call timed out after {0}s")]
    Timeout(u64),

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations, socket binding)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        ApiError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Wrap a catalog failure for `table`. Not-found errors pass through
    /// unchanged so callers can still tell them apart.
    pub fn schema(table: impl Into<String>, source: ApiError) -> Self {
        match source {
            ApiError::TableNotFound(_) | ApiError::Schema { .. } => source,
            other => ApiError::Schema {
                table: table.into(),
                source: Box::new(other),
            },
        }
    }

    /// True for errors caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ApiError::Validation(_) | ApiError::TableNotFound(_) | ApiError::ForeignKeyNotFound(_)
        )
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ApiError::Config(_) | ApiError::Yaml(_) => 2,
            ApiError::Validation(_)
            | ApiError::TableNotFound(_)
            | ApiError::ForeignKeyNotFound(_) => 3,
            ApiError::Storage(_) | ApiError::Pool { .. } | ApiError::Timeout(_) => 4,
            ApiError::Schema { .. } => 5,
            ApiError::Io(_) | ApiError::Json(_) => 1,
        }
    }
}

/// Result type alias for table API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_wrapper_keeps_not_found() {
        let err = ApiError::schema("orders", ApiError::TableNotFound("orders".into()));
        assert!(matches!(err, ApiError::TableNotFound(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_schema_wrapper_chains_source() {
        let err = ApiError::schema("orders", ApiError::Timeout(30));
        assert!(matches!(err, ApiError::Schema { .. }));
        assert!(!err.is_client_error());

        let detailed = err.format_detailed();
        assert!(detailed.contains("Schema introspection failed for table orders"));
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("timed out after 30s"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ApiError::Config("x".into()).exit_code(), 2);
        assert_eq!(ApiError::validation("x").exit_code(), 3);
        assert_eq!(ApiError::pool("boom", "ctx").exit_code(), 4);
    }
}
