//! Identifier validation and quoting for SQL injection prevention.
//!
//! SQL identifiers (table names, column names, schema names) cannot be passed as
//! parameters in prepared statements - only data values can be parameterized.
//! Every identifier that reaches generated T-SQL goes through this module:
//!
//! 1. Validate identifiers for suspicious patterns (null bytes, excessive length)
//! 2. Wrap in brackets
//! 3. Escape closing brackets within the quotes
//!
//! Callers additionally only pass names that were discovered through the
//! catalog, so a user-supplied string never becomes an identifier on its own.

use crate::error::{ApiError, Result};

/// Maximum identifier length (SQL Server `sysname` is 128 characters).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ApiError::validation("Identifier cannot be empty"));
    }

    if name.contains('\0') {
        return Err(ApiError::validation(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(ApiError::validation(format!(
            "Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_mssql("users")?, "[users]");
/// assert_eq!(quote_mssql("table]name")?, "[table]]name]");
/// ```
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Qualify a SQL Server table name with schema.
pub fn qualify_mssql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(table)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_simple() {
        assert_eq!(quote_mssql("orders").unwrap(), "[orders]");
        assert_eq!(quote_mssql("order items").unwrap(), "[order items]");
    }

    #[test]
    fn test_quote_escapes_closing_bracket() {
        assert_eq!(quote_mssql("a]b").unwrap(), "[a]]b]");
        assert_eq!(
            quote_mssql("x]; DROP TABLE users; --").unwrap(),
            "[x]]; DROP TABLE users; --]"
        );
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify_mssql("dbo", "orders").unwrap(), "[dbo].[orders]");
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        assert!(quote_mssql("").is_err());
        assert!(quote_mssql("a\0b").is_err());
        assert!(quote_mssql(&"x".repeat(129)).is_err());
        assert!(quote_mssql(&"x".repeat(128)).is_ok());
    }
}
