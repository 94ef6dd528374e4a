//! Catalog introspection: table listings, column metadata and foreign keys.
//!
//! Every call goes straight to `INFORMATION_SCHEMA`; memoization lives in
//! [`crate::cache`].

use std::sync::Arc;

use tracing::debug;

use crate::core::{ColumnMetadata, FieldValue, ForeignKeyMapping, TableSchema};
use crate::db::{Database, Statement};
use crate::error::{ApiError, Result};
use crate::typemap::{is_filterable, normalize};

const COLUMNS_QUERY: &str = r#"
    SELECT
        c.COLUMN_NAME,
        c.DATA_TYPE,
        MAX(CASE WHEN tc.CONSTRAINT_TYPE = 'PRIMARY KEY' THEN 1 ELSE 0 END),
        MAX(CASE WHEN tc.CONSTRAINT_TYPE = 'FOREIGN KEY' THEN k.CONSTRAINT_NAME END),
        MIN(c.ORDINAL_POSITION)
    FROM INFORMATION_SCHEMA.COLUMNS c
    LEFT JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
        ON c.TABLE_NAME = k.TABLE_NAME
        AND c.COLUMN_NAME = k.COLUMN_NAME
        AND c.TABLE_SCHEMA = k.TABLE_SCHEMA
    LEFT JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
        ON k.TABLE_NAME = tc.TABLE_NAME
        AND k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
        AND k.TABLE_SCHEMA = tc.TABLE_SCHEMA
        AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'FOREIGN KEY')
    WHERE c.TABLE_SCHEMA = @P1 AND c.TABLE_NAME = @P2
    GROUP BY c.COLUMN_NAME, c.DATA_TYPE
    ORDER BY MIN(c.ORDINAL_POSITION)
"#;

const COLUMN_TYPES: &[&str] = &["nvarchar", "nvarchar", "int", "nvarchar", "int"];

const TABLES_QUERY: &str = r#"
    SELECT t.TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES t
    WHERE t.TABLE_TYPE = 'BASE TABLE'
      AND t.TABLE_SCHEMA = @P1
    ORDER BY t.TABLE_NAME
"#;

const FOREIGN_KEY_QUERY: &str = r#"
    SELECT
        pk.TABLE_NAME,
        pk.COLUMN_NAME
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE fk
    JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
        ON fk.CONSTRAINT_NAME = rc.CONSTRAINT_NAME
        AND fk.CONSTRAINT_SCHEMA = rc.CONSTRAINT_SCHEMA
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE pk
        ON pk.CONSTRAINT_NAME = rc.UNIQUE_CONSTRAINT_NAME
        AND pk.CONSTRAINT_SCHEMA = rc.UNIQUE_CONSTRAINT_SCHEMA
        AND pk.ORDINAL_POSITION = fk.ORDINAL_POSITION
    WHERE fk.CONSTRAINT_SCHEMA = @P1
        AND fk.CONSTRAINT_NAME = @P2
        AND pk.TABLE_SCHEMA = @P1
    ORDER BY fk.ORDINAL_POSITION
"#;

/// Reads table metadata from the catalog of one database schema.
#[derive(Clone)]
pub struct Introspector {
    db: Arc<dyn Database>,
    schema: String,
}

impl Introspector {
    pub fn new(db: Arc<dyn Database>, schema: impl Into<String>) -> Self {
        Self {
            db,
            schema: schema.into(),
        }
    }

    /// The database schema this introspector is scoped to.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Discover a table's columns, primary key and foreign key constraints.
    ///
    /// An empty column listing means the table does not exist.
    pub async fn introspect(&self, table: &str) -> Result<TableSchema> {
        let stmt = Statement::new(COLUMNS_QUERY)
            .bind(self.schema.as_str())
            .bind(table);

        let rows = self
            .db
            .query(&stmt, COLUMN_TYPES)
            .await
            .map_err(|e| ApiError::schema(table, e))?;

        if rows.is_empty() {
            return Err(ApiError::TableNotFound(table.to_string()));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let native_type = text_at(row, 1);
            columns.push(ColumnMetadata {
                name: text_at(row, 0),
                semantic_type: normalize(&native_type),
                filterable: is_filterable(&native_type),
                is_primary_key: int_at(row, 2) == 1,
                foreign_key: match row.get(3) {
                    Some(FieldValue::Null) | None => None,
                    Some(v) => Some(v.to_string()),
                },
                ordinal_pos: int_at(row, 4) as i32,
                native_type,
            });
        }

        let schema = TableSchema::new(self.schema.clone(), table, columns);
        debug!(
            "Loaded {} columns for {} (pk={:?})",
            schema.columns.len(),
            schema.full_name(),
            schema.primary_key
        );
        Ok(schema)
    }

    /// List base tables in the configured schema, sorted by name.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let stmt = Statement::new(TABLES_QUERY).bind(self.schema.as_str());
        let rows = self.db.query(&stmt, &["nvarchar"]).await?;
        let tables: Vec<String> = rows.iter().map(|row| text_at(row, 0)).collect();
        debug!("Found {} tables in schema {}", tables.len(), self.schema);
        Ok(tables)
    }

    /// Resolve the table and column a foreign key constraint points at.
    ///
    /// Both the constraint and the referenced table must live in the
    /// configured schema.
    pub async fn resolve_foreign_key(&self, constraint: &str) -> Result<ForeignKeyMapping> {
        let stmt = Statement::new(FOREIGN_KEY_QUERY)
            .bind(self.schema.as_str())
            .bind(constraint);
        let rows = self.db.query(&stmt, &["nvarchar", "nvarchar"]).await?;

        let row = rows
            .first()
            .ok_or_else(|| ApiError::ForeignKeyNotFound(constraint.to_string()))?;

        let mapping = ForeignKeyMapping {
            constraint: constraint.to_string(),
            referenced_table: text_at(row, 0),
            referenced_column: text_at(row, 1),
        };
        debug!(
            "Foreign key {} references {}.{}",
            constraint, mapping.referenced_table, mapping.referenced_column
        );
        Ok(mapping)
    }
}

fn text_at(row: &[FieldValue], idx: usize) -> String {
    match row.get(idx) {
        Some(FieldValue::Null) | None => String::new(),
        Some(v) => v.to_string(),
    }
}

fn int_at(row: &[FieldValue], idx: usize) -> i64 {
    match row.get(idx) {
        Some(FieldValue::Integer(i)) => *i,
        _ => 0,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Catalog rows for `orders(id int PK, status varchar, total decimal)`.
    pub fn orders_rows() -> Vec<Vec<FieldValue>> {
        vec![
            catalog_row("id", "int", true, None, 1),
            catalog_row("status", "varchar", false, None, 2),
            catalog_row("total", "decimal", false, None, 3),
        ]
    }

    pub fn catalog_row(
        name: &str,
        native: &str,
        pk: bool,
        fk: Option<&str>,
        pos: i64,
    ) -> Vec<FieldValue> {
        vec![
            FieldValue::from(name),
            FieldValue::from(native),
            FieldValue::Integer(pk as i64),
            fk.map(FieldValue::from).unwrap_or(FieldValue::Null),
            FieldValue::Integer(pos),
        ]
    }
}
