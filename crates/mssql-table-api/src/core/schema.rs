//! Discovered table metadata.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::typemap::SemanticType;

/// Column metadata as discovered from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Column name.
    pub name: String,

    /// Native data type (e.g., "int", "nvarchar", "datetime2").
    pub native_type: String,

    /// Normalized semantic type.
    pub semantic_type: SemanticType,

    /// Whether the column belongs to the primary key.
    pub is_primary_key: bool,

    /// Name of the foreign key constraint covering this column, if any.
    pub foreign_key: Option<String>,

    /// Whether the grid front end offers a filter on this column.
    pub filterable: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

/// Table metadata: ordered columns plus derived primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Schema name (e.g., "dbo").
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Columns in ordinal order.
    pub columns: Vec<ColumnMetadata>,

    /// Primary key column names in ordinal order.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Build a schema, deriving the primary key from the column flags.
    pub fn new(schema: impl Into<String>, name: impl Into<String>, mut columns: Vec<ColumnMetadata>) -> Self {
        columns.sort_by_key(|c| c.ordinal_pos);
        let primary_key = columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect();
        Self {
            schema: schema.into(),
            name: name.into(),
            columns,
            primary_key,
        }
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column a request refers to, rejecting unknown names.
    pub fn require_column(&self, name: &str) -> Result<&ColumnMetadata> {
        self.column(name).ok_or_else(|| {
            ApiError::validation(format!(
                "unknown column '{}' for table {}",
                name, self.name
            ))
        })
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// First non-key text column, used as a display label for lookups.
    pub fn label_column(&self) -> Option<&ColumnMetadata> {
        self.columns
            .iter()
            .find(|c| !c.is_primary_key && c.semantic_type == SemanticType::Text)
    }
}

/// Resolved target of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyMapping {
    /// Constraint name.
    pub constraint: String,

    /// Referenced table name.
    pub referenced_table: String,

    /// Referenced column name.
    pub referenced_column: String,
}
