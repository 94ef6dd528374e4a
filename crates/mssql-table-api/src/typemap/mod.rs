//! Type normalization from SQL Server native types to semantic types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a column as exposed through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    /// Integer, exact and approximate numeric, and money types.
    Number,
    /// Character and Unicode character types.
    Text,
    /// Everything else (dates, GUIDs, binary, xml, spatial, ...).
    Opaque,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Number => "number",
            SemanticType::Text => "text",
            SemanticType::Opaque => "opaque",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an MSSQL data type (as reported by `INFORMATION_SCHEMA.COLUMNS.DATA_TYPE`)
/// to its semantic type. Unknown types degrade to [`SemanticType::Opaque`].
pub fn normalize(native_type: &str) -> SemanticType {
    match native_type.trim().to_lowercase().as_str() {
        // Integer types
        "int" | "bigint" | "smallint" | "tinyint" => SemanticType::Number,

        // Decimal/numeric and money
        "decimal" | "numeric" | "money" | "smallmoney" => SemanticType::Number,

        // Floating point
        "float" | "real" => SemanticType::Number,

        // String types
        "char" | "varchar" | "text" | "nchar" | "nvarchar" | "ntext" => SemanticType::Text,

        _ => SemanticType::Opaque,
    }
}

/// Columns the grid front end may offer a filter for.
pub fn is_filterable(native_type: &str) -> bool {
    matches!(native_type.trim().to_lowercase().as_str(), "int" | "varchar")
}
