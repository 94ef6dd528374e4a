//! Generic CRUD over any discovered table.
//!
//! [`TableService`] resolves the table through the schema cache, validates
//! the caller's input against it, and only then builds and runs statements.
//! Validation failures therefore never reach the database.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{ForeignKeyCache, SchemaCache};
use crate::config::ServerConfig;
use crate::core::identifier::validate_identifier;
use crate::core::{FieldValue, GenericRecord, TableSchema};
use crate::db::{Database, Statement};
use crate::error::{ApiError, Result};
use crate::filter::{self, Filter, FilterCondition};
use crate::introspect::Introspector;
use crate::sql;

/// One page of rows plus the number of rows matching the filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    #[serde(rename = "data")]
    pub records: Vec<GenericRecord>,
    #[serde(rename = "count")]
    pub total: i64,
}

/// Entry of a foreign key lookup list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyOption {
    pub id: FieldValue,
    pub name: FieldValue,
}

/// Paging and deadline settings.
#[derive(Debug, Clone)]
pub struct Limits {
    pub default_limit: u32,
    pub max_limit: u32,
    pub query_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for Limits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        }
    }
}

/// Schema-driven CRUD executor shared by all requests.
pub struct TableService {
    db: Arc<dyn Database>,
    introspector: Introspector,
    schemas: SchemaCache,
    foreign_keys: ForeignKeyCache,
    limits: Limits,
}

impl TableService {
    /// Build the service and its caches over `db`, scoped to `schema`.
    pub fn new(db: Arc<dyn Database>, schema: impl Into<String>, limits: Limits) -> Self {
        let introspector = Introspector::new(db.clone(), schema);
        Self {
            schemas: SchemaCache::new(introspector.clone()),
            foreign_keys: ForeignKeyCache::new(introspector.clone()),
            introspector,
            db,
            limits,
        }
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Run a database call under the configured deadline.
    async fn deadline<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.limits.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.limits.query_timeout.as_secs())),
        }
    }

    async fn query(&self, stmt: &Statement, column_types: &[&str]) -> Result<Vec<Vec<FieldValue>>> {
        debug!("query: {} ({} params)", stmt.sql, stmt.params.len());
        self.deadline(self.db.query(stmt, column_types)).await
    }

    async fn execute(&self, stmt: &Statement) -> Result<u64> {
        debug!("execute: {} ({} params)", stmt.sql, stmt.params.len());
        self.deadline(self.db.execute(stmt)).await
    }

    /// The table's schema, introspected on first use.
    pub async fn describe(&self, table: &str) -> Result<Arc<TableSchema>> {
        validate_identifier(table)?;
        self.deadline(self.schemas.get(table)).await
    }

    /// Base tables in the configured schema.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.deadline(self.introspector.list_tables()).await
    }

    /// Normalize paging input: absent or zero limit means the default,
    /// larger limits are capped, negatives are rejected.
    pub fn page_bounds(&self, limit: Option<i64>, offset: Option<i64>) -> Result<(i64, i64)> {
        let limit = match limit {
            Some(l) if l < 0 => {
                return Err(ApiError::validation(format!("limit must not be negative, got {}", l)))
            }
            None | Some(0) => self.limits.default_limit as i64,
            Some(l) => l.min(self.limits.max_limit as i64),
        };
        let offset = match offset {
            Some(o) if o < 0 => {
                return Err(ApiError::validation(format!("offset must not be negative, got {}", o)))
            }
            Some(o) => o,
            None => 0,
        };
        Ok((limit, offset))
    }

    /// Count the rows matching `filter`, then fetch one page of them.
    pub async fn list(
        &self,
        table: &str,
        limit: Option<i64>,
        offset: Option<i64>,
        filter: &Filter,
    ) -> Result<Page> {
        let (limit, offset) = self.page_bounds(limit, offset)?;
        let schema = self.describe(table).await?;
        self.page(&schema, filter, limit, offset).await
    }

    /// Fetch one page without counting.
    pub async fn fetch_page(
        &self,
        table: &str,
        limit: Option<i64>,
        offset: Option<i64>,
        filter: &Filter,
    ) -> Result<Vec<GenericRecord>> {
        let (limit, offset) = self.page_bounds(limit, offset)?;
        let schema = self.describe(table).await?;
        self.fetch(&schema, filter, limit, offset).await
    }

    /// [`list`](Self::list) with a structured filter.
    pub async fn query_structured(
        &self,
        table: &str,
        conditions: &[FilterCondition],
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Page> {
        let (limit, offset) = self.page_bounds(limit, offset)?;
        let schema = self.describe(table).await?;
        let filter = filter::structured::compile(conditions, &schema)?;
        self.page(&schema, &filter, limit, offset).await
    }

    /// One page filtered by a `$filter` expression.
    pub async fn query_expression(
        &self,
        table: &str,
        expression: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<GenericRecord>> {
        let (limit, offset) = self.page_bounds(limit, offset)?;
        let schema = self.describe(table).await?;
        let filter = match expression {
            Some(expr) => filter::expression::parse(expr, &schema)?,
            None => Filter::new(),
        };
        self.fetch(&schema, &filter, limit, offset).await
    }

    /// Total rows in the table.
    pub async fn count(&self, table: &str) -> Result<i64> {
        let schema = self.describe(table).await?;
        self.count_matching(&schema, &Filter::new()).await
    }

    async fn count_matching(&self, schema: &TableSchema, filter: &Filter) -> Result<i64> {
        let stmt = sql::count(schema, filter)?;
        let rows = self.query(&stmt, &["bigint"]).await?;
        match rows.first().and_then(|r| r.first()) {
            Some(FieldValue::Integer(n)) => Ok(*n),
            _ => Ok(0),
        }
    }

    async fn page(&self, schema: &TableSchema, filter: &Filter, limit: i64, offset: i64) -> Result<Page> {
        let total = self.count_matching(schema, filter).await?;
        let records = self.fetch(schema, filter, limit, offset).await?;
        Ok(Page { records, total })
    }

    async fn fetch(
        &self,
        schema: &TableSchema,
        filter: &Filter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GenericRecord>> {
        let stmt = sql::select_page(schema, filter, limit, offset)?;
        let types: Vec<&str> = schema.columns.iter().map(|c| c.native_type.as_str()).collect();
        let rows = self.query(&stmt, &types).await?;

        let records = rows
            .into_iter()
            .map(|row| {
                schema
                    .columns
                    .iter()
                    .map(|c| c.name.clone())
                    .zip(row)
                    .collect::<GenericRecord>()
            })
            .collect();
        Ok(records)
    }

    /// Insert the supplied record.
    pub async fn create(&self, table: &str, record: GenericRecord) -> Result<u64> {
        let schema = self.describe(table).await?;
        let record = checked_record(&schema, record)?;
        if record.is_empty() {
            return Err(ApiError::validation(format!("no columns supplied for {}", table)));
        }

        let stmt = sql::insert(&schema, &record)?;
        let affected = self.execute(&stmt).await?;
        report_affected("create", &schema, affected);
        Ok(affected)
    }

    /// Update the row identified by the record's primary key columns with
    /// the remaining supplied columns.
    pub async fn update(&self, table: &str, record: GenericRecord) -> Result<u64> {
        let schema = self.describe(table).await?;
        let record = checked_record(&schema, record)?;
        let (keys, values) = split_keys(&schema, record)?;
        if values.is_empty() {
            return Err(ApiError::validation(format!(
                "no non-key columns supplied to update in {}",
                table
            )));
        }

        let stmt = sql::update(&schema, &values, &keys)?;
        let affected = self.execute(&stmt).await?;
        report_affected("update", &schema, affected);
        Ok(affected)
    }

    /// Insert the record, or replace every non-key column of the row with
    /// the same primary key.
    pub async fn upsert(&self, table: &str, record: GenericRecord) -> Result<u64> {
        let schema = self.describe(table).await?;
        let record = checked_record(&schema, record)?;
        require_full_key(&schema, &record)?;

        let stmt = sql::merge(&schema, &record)?;
        let affected = self.execute(&stmt).await?;
        report_affected("upsert", &schema, affected);
        Ok(affected)
    }

    /// Upsert when the record carries the whole primary key, insert
    /// otherwise.
    pub async fn save(&self, table: &str, record: GenericRecord) -> Result<u64> {
        let schema = self.describe(table).await?;
        let has_key = schema.has_pk() && schema.primary_key.iter().all(|k| record.contains(k));
        if has_key {
            self.upsert(table, record).await
        } else {
            self.create(table, record).await
        }
    }

    /// Delete the row identified by the record's primary key columns.
    pub async fn delete(&self, table: &str, record: GenericRecord) -> Result<u64> {
        let schema = self.describe(table).await?;
        let record = checked_record(&schema, record)?;
        let (keys, _) = split_keys(&schema, record)?;

        let stmt = sql::delete(&schema, &keys)?;
        let affected = self.execute(&stmt).await?;
        report_affected("delete", &schema, affected);
        Ok(affected)
    }

    /// `{id, name}` pairs from the table a foreign key constraint references.
    pub async fn foreign_key_options(
        &self,
        constraint: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ForeignKeyOption>> {
        let limit = match limit {
            None => self.limits.max_limit as i64,
            some => self.page_bounds(some, None)?.0,
        };
        let mapping = self.deadline(self.foreign_keys.get(constraint)).await?;
        let schema = self.describe(&mapping.referenced_table).await?;

        let id = schema.require_column(&mapping.referenced_column)?;
        let label = schema.label_column().unwrap_or(id);

        let stmt = sql::select_options(&schema, &id.name, &label.name, limit)?;
        let rows = self
            .query(&stmt, &[id.native_type.as_str(), label.native_type.as_str()])
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut values = row.into_iter();
                ForeignKeyOption {
                    id: values.next().unwrap_or(FieldValue::Null),
                    name: values.next().unwrap_or(FieldValue::Null),
                }
            })
            .collect())
    }
}

/// Reject unknown columns and coerce every value to its column's type.
fn checked_record(schema: &TableSchema, record: GenericRecord) -> Result<GenericRecord> {
    let mut checked = GenericRecord::with_capacity(record.len());
    for (name, value) in record {
        let column = schema.require_column(&name)?;
        let value = value.coerce(&column.name, column.semantic_type)?;
        checked.insert(name, value);
    }
    Ok(checked)
}

fn require_full_key(schema: &TableSchema, record: &GenericRecord) -> Result<()> {
    if !schema.has_pk() {
        return Err(ApiError::validation(format!(
            "table {} has no primary key",
            schema.name
        )));
    }
    let missing: Vec<&str> = schema
        .primary_key
        .iter()
        .filter(|k| !record.contains(k))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::validation(format!(
            "missing primary key column(s) for {}: {}",
            schema.name,
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Split into (primary key fields, other fields). Every primary key column
/// must be present so a write never targets more than one row.
fn split_keys(schema: &TableSchema, record: GenericRecord) -> Result<(GenericRecord, GenericRecord)> {
    require_full_key(schema, &record)?;
    let mut keys = GenericRecord::new();
    let mut values = GenericRecord::new();
    for (name, value) in record {
        if schema.is_primary_key(&name) {
            keys.insert(name, value);
        } else {
            values.insert(name, value);
        }
    }
    Ok((keys, values))
}

fn report_affected(op: &str, schema: &TableSchema, affected: u64) {
    if affected == 0 {
        warn!("{} on {} affected no rows", op, schema.full_name());
    } else {
        debug!("{} on {} affected {} row(s)", op, schema.full_name(), affected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeDatabase;
    use crate::introspect::fixtures::{catalog_row, orders_rows};
    use serde_json::json;

    fn service(db: &Arc<FakeDatabase>) -> TableService {
        TableService::new(db.clone(), "dbo", Limits::default())
    }

    fn with_orders() -> Arc<FakeDatabase> {
        let db = Arc::new(FakeDatabase::new());
        db.push_rows(orders_rows());
        db
    }

    fn order_row(id: i64, status: &str) -> Vec<FieldValue> {
        vec![
            FieldValue::Integer(id),
            FieldValue::from(status),
            FieldValue::Opaque(json!(12.5)),
        ]
    }

    #[tokio::test]
    async fn test_list_counts_then_fetches() {
        let db = with_orders();
        db.push_rows(vec![vec![FieldValue::Integer(2)]]);
        db.push_rows(vec![order_row(1, "shipped"), order_row(4, "shipped")]);
        let svc = service(&db);

        let mut filter = Filter::new();
        filter.push(crate::filter::Predicate::eq("status", "shipped".into()));
        let page = svc.list("orders", None, None, &filter).await.unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].get("status"), Some(&FieldValue::from("shipped")));

        let stmts = db.statements();
        assert_eq!(stmts.len(), 3);
        assert!(stmts[1].sql.starts_with("SELECT COUNT_BIG(*)"));
        assert_eq!(stmts[1].params, vec![FieldValue::from("shipped")]);
        // offset then limit
        assert_eq!(
            stmts[2].params[1..],
            [FieldValue::Integer(0), FieldValue::Integer(100)]
        );
    }

    #[tokio::test]
    async fn test_query_structured_counts_then_fetches() {
        let db = with_orders();
        db.push_rows(vec![vec![FieldValue::Integer(1)]]);
        db.push_rows(vec![order_row(1, "shipped")]);
        let svc = service(&db);

        let conds = vec![FilterCondition::new("status", "equals", json!("shipped"))];
        let page = svc
            .query_structured("orders", &conds, Some(25), Some(5))
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.records.len(), 1);
        let stmts = db.statements();
        assert_eq!(stmts.len(), 3);
        assert!(stmts[1].sql.starts_with("SELECT COUNT_BIG(*)"));
        assert_eq!(
            stmts[2].params,
            vec![
                FieldValue::from("shipped"),
                FieldValue::Integer(5),
                FieldValue::Integer(25)
            ]
        );
    }

    #[tokio::test]
    async fn test_limit_zero_means_default() {
        let db = Arc::new(FakeDatabase::new());
        let svc = service(&db);
        assert_eq!(svc.page_bounds(Some(0), None).unwrap(), (100, 0));
        assert_eq!(svc.page_bounds(None, None).unwrap(), (100, 0));
        assert_eq!(svc.page_bounds(Some(5000), Some(10)).unwrap(), (1000, 10));
        assert!(svc.page_bounds(Some(-1), None).is_err());
        assert!(svc.page_bounds(None, Some(-5)).is_err());
    }

    #[tokio::test]
    async fn test_unknown_filter_field_issues_no_data_statement() {
        let db = with_orders();
        let svc = service(&db);

        let conds = vec![
            FilterCondition::new("status", "equals", json!("shipped")),
            FilterCondition::new("colour", "equals", json!("red")),
        ];
        let err = svc.query_structured("orders", &conds, None, None).await.unwrap_err();

        assert!(matches!(err, ApiError::Validation(_)));
        // only the catalog lookup ran
        assert_eq!(db.statement_count(), 1);
    }

    #[tokio::test]
    async fn test_query_expression() {
        let db = with_orders();
        db.push_rows(vec![order_row(3, "shipped")]);
        let svc = service(&db);

        let rows = svc
            .query_expression("orders", Some("status eq 'shipped' and total gt 100"), Some(10), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let stmt = &db.statements()[1];
        assert!(stmt.sql.contains("WHERE [status] = @P1 AND [total] > @P2"));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_column() {
        let db = with_orders();
        let svc = service(&db);

        let record = GenericRecord::new().with("id", 1i64).with("colour", "red");
        let err = svc.create("orders", record).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref m) if m.contains("colour")));
        assert_eq!(db.statement_count(), 1);
    }

    #[tokio::test]
    async fn test_create_coerces_values() {
        let db = with_orders();
        let svc = service(&db);

        let record = GenericRecord::new().with("id", "7").with("status", "new");
        svc.create("orders", record).await.unwrap();

        let stmt = &db.statements()[1];
        assert!(stmt.sql.starts_with("INSERT INTO [dbo].[orders]"));
        assert_eq!(stmt.params[0], FieldValue::Integer(7));
    }

    #[tokio::test]
    async fn test_create_keeps_decimal_precision() {
        let db = with_orders();
        let svc = service(&db);

        let record = GenericRecord::new()
            .with("id", 8i64)
            .with("total", "12345678901234567.89");
        svc.create("orders", record).await.unwrap();

        let stmt = &db.statements()[1];
        assert_eq!(stmt.params[1].to_string(), "12345678901234567.89");
        assert!(matches!(stmt.params[1], FieldValue::Decimal(_)));
    }

    #[tokio::test]
    async fn test_update_requires_primary_key() {
        let db = with_orders();
        let svc = service(&db);

        let err = svc
            .update("orders", GenericRecord::new().with("status", "paid"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = svc
            .update("orders", GenericRecord::new().with("id", 1i64))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(db.statement_count(), 1);
    }

    #[tokio::test]
    async fn test_update_zero_rows_is_success() {
        let db = with_orders();
        db.push_affected(0);
        let svc = service(&db);

        let affected = svc
            .update("orders", GenericRecord::new().with("id", 99i64).with("status", "paid"))
            .await
            .unwrap();
        assert_eq!(affected, 0);
        assert_eq!(
            db.statements()[1].sql,
            "UPDATE [dbo].[orders] SET [status] = @P1 WHERE [id] = @P2"
        );
    }

    #[tokio::test]
    async fn test_save_picks_upsert_or_insert() {
        let db = with_orders();
        let svc = service(&db);

        svc.save("orders", GenericRecord::new().with("id", 1i64).with("status", "new"))
            .await
            .unwrap();
        svc.save("orders", GenericRecord::new().with("status", "new"))
            .await
            .unwrap();

        let stmts = db.statements();
        assert!(stmts[1].sql.starts_with("MERGE INTO"));
        assert!(stmts[2].sql.starts_with("INSERT INTO"));
    }

    #[tokio::test]
    async fn test_delete_targets_key_only() {
        let db = with_orders();
        let svc = service(&db);

        svc.delete("orders", GenericRecord::new().with("id", 5i64).with("status", "x"))
            .await
            .unwrap();
        let stmt = &db.statements()[1];
        assert_eq!(stmt.sql, "DELETE FROM [dbo].[orders] WHERE [id] = @P1");
        assert_eq!(stmt.params, vec![FieldValue::Integer(5)]);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let db = Arc::new(FakeDatabase::new());
        let svc = service(&db);
        let err = svc.count("ghosts").await.unwrap_err();
        assert!(matches!(err, ApiError::TableNotFound(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_count() {
        let db = with_orders();
        db.push_rows(vec![vec![FieldValue::Integer(42)]]);
        assert_eq!(service(&db).count("orders").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_foreign_key_options() {
        let db = Arc::new(FakeDatabase::new());
        db.push_rows(vec![vec![FieldValue::from("customers"), FieldValue::from("id")]]);
        db.push_rows(vec![
            catalog_row("id", "int", true, None, 1),
            catalog_row("name", "nvarchar", false, None, 2),
        ]);
        db.push_rows(vec![vec![FieldValue::Integer(1), FieldValue::from("Acme")]]);
        let svc = service(&db);

        let options = svc.foreign_key_options("FK_orders_customers", None).await.unwrap();
        assert_eq!(
            options,
            vec![ForeignKeyOption {
                id: FieldValue::Integer(1),
                name: FieldValue::from("Acme")
            }]
        );
        assert_eq!(
            db.statements()[2].sql,
            "SELECT TOP (@P1) [id], [name] FROM [dbo].[customers] ORDER BY [name]"
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let db = Arc::new(FakeDatabase::new().with_delay(Duration::from_millis(200)));
        let svc = TableService::new(
            db.clone(),
            "dbo",
            Limits {
                query_timeout: Duration::from_millis(20),
                ..Limits::default()
            },
        );
        let err = svc.describe("orders").await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout(_)));
    }
}
