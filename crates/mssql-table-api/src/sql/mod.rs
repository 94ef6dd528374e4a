//! T-SQL statement builders.
//!
//! Builders take a resolved [`TableSchema`] and only ever emit identifiers
//! taken from it, bracket-quoted. Every value becomes an `@Pn` parameter.

use crate::core::identifier::{qualify_mssql, quote_mssql};
use crate::core::{FieldValue, GenericRecord, TableSchema};
use crate::db::Statement;
use crate::error::Result;
use crate::filter::Filter;

fn table_ref(schema: &TableSchema) -> Result<String> {
    qualify_mssql(&schema.schema, &schema.name)
}

fn column_list(names: &[&str]) -> Result<String> {
    let quoted: Result<Vec<String>> = names.iter().map(|c| quote_mssql(c)).collect();
    Ok(quoted?.join(", "))
}

fn order_by(schema: &TableSchema) -> Result<String> {
    if schema.has_pk() {
        let pk: Vec<&str> = schema.primary_key.iter().map(String::as_str).collect();
        column_list(&pk)
    } else {
        Ok("(SELECT NULL)".to_string())
    }
}

fn push_where(stmt: &mut Statement, filter: &Filter) -> Result<()> {
    if let Some(cond) = filter.render(stmt)? {
        stmt.sql.push_str(" WHERE ");
        stmt.sql.push_str(&cond);
    }
    Ok(())
}

/// Equality on every field of `keys`, ANDed.
fn key_condition(stmt: &mut Statement, keys: &GenericRecord) -> Result<String> {
    let mut parts = Vec::with_capacity(keys.len());
    for (name, value) in keys.iter() {
        let p = stmt.push_param(value.clone());
        parts.push(format!("{} = {}", quote_mssql(name)?, p));
    }
    Ok(parts.join(" AND "))
}

/// `SELECT <all columns> ... ORDER BY <pk> OFFSET .. FETCH NEXT ..`
pub fn select_page(schema: &TableSchema, filter: &Filter, limit: i64, offset: i64) -> Result<Statement> {
    let mut stmt = Statement::new(format!(
        "SELECT {} FROM {}",
        column_list(&schema.column_names())?,
        table_ref(schema)?
    ));
    push_where(&mut stmt, filter)?;

    let order = order_by(schema)?;
    let offset_param = stmt.push_param(FieldValue::Integer(offset));
    let limit_param = stmt.push_param(FieldValue::Integer(limit));
    stmt.sql.push_str(&format!(
        " ORDER BY {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
        order, offset_param, limit_param
    ));
    Ok(stmt)
}

/// `SELECT COUNT_BIG(*)` over the rows matching `filter`.
pub fn count(schema: &TableSchema, filter: &Filter) -> Result<Statement> {
    let mut stmt = Statement::new(format!("SELECT COUNT_BIG(*) FROM {}", table_ref(schema)?));
    push_where(&mut stmt, filter)?;
    Ok(stmt)
}

pub fn insert(schema: &TableSchema, record: &GenericRecord) -> Result<Statement> {
    let names: Vec<&str> = record.keys().collect();
    let mut stmt = Statement::new("");
    let placeholders: Vec<String> = record
        .iter()
        .map(|(_, v)| stmt.push_param(v.clone()))
        .collect();

    stmt.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_ref(schema)?,
        column_list(&names)?,
        placeholders.join(", ")
    );
    Ok(stmt)
}

/// `UPDATE .. SET <values> WHERE <keys>`.
pub fn update(schema: &TableSchema, values: &GenericRecord, keys: &GenericRecord) -> Result<Statement> {
    let mut stmt = Statement::new("");
    let mut sets = Vec::with_capacity(values.len());
    for (name, value) in values.iter() {
        let p = stmt.push_param(value.clone());
        sets.push(format!("{} = {}", quote_mssql(name)?, p));
    }
    let cond = key_condition(&mut stmt, keys)?;

    stmt.sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table_ref(schema)?,
        sets.join(", "),
        cond
    );
    Ok(stmt)
}

/// Insert-or-replace keyed on the primary key.
///
/// On a match every non-key column is overwritten: supplied columns take the
/// supplied value, the rest become NULL. `record` must carry every primary
/// key column.
pub fn merge(schema: &TableSchema, record: &GenericRecord) -> Result<Statement> {
    let names: Vec<&str> = record.keys().collect();
    let mut stmt = Statement::new("");
    let placeholders: Vec<String> = record
        .iter()
        .map(|(_, v)| stmt.push_param(v.clone()))
        .collect();

    let join_condition: Result<Vec<String>> = schema
        .primary_key
        .iter()
        .map(|pk| {
            let q = quote_mssql(pk)?;
            Ok(format!("target.{0} = source.{0}", q))
        })
        .collect();

    let update_cols: Result<Vec<String>> = schema
        .columns
        .iter()
        .filter(|c| !c.is_primary_key)
        .map(|c| {
            let q = quote_mssql(&c.name)?;
            if record.contains(&c.name) {
                Ok(format!("{0} = source.{0}", q))
            } else {
                Ok(format!("{} = NULL", q))
            }
        })
        .collect();
    let update_cols = update_cols?;

    let source_cols: Result<Vec<String>> = names
        .iter()
        .map(|c| Ok(format!("source.{}", quote_mssql(c)?)))
        .collect();

    let matched = if update_cols.is_empty() {
        String::new()
    } else {
        format!(" WHEN MATCHED THEN UPDATE SET {}", update_cols.join(", "))
    };

    stmt.sql = format!(
        "MERGE INTO {} WITH (HOLDLOCK) AS target \
         USING (VALUES ({})) AS source ({}) \
         ON {}{} \
         WHEN NOT MATCHED THEN INSERT ({}) VALUES ({});",
        table_ref(schema)?,
        placeholders.join(", "),
        column_list(&names)?,
        join_condition?.join(" AND "),
        matched,
        column_list(&names)?,
        source_cols?.join(", ")
    );
    Ok(stmt)
}

pub fn delete(schema: &TableSchema, keys: &GenericRecord) -> Result<Statement> {
    let mut stmt = Statement::new("");
    let cond = key_condition(&mut stmt, keys)?;
    stmt.sql = format!("DELETE FROM {} WHERE {}", table_ref(schema)?, cond);
    Ok(stmt)
}

/// `SELECT TOP (n) <id>, <label>` for lookup lists, ordered by label.
pub fn select_options(schema: &TableSchema, id: &str, label: &str, limit: i64) -> Result<Statement> {
    let id_col = quote_mssql(id)?;
    let label_col = quote_mssql(label)?;
    Ok(Statement::new(format!(
        "SELECT TOP (@P1) {}, {} FROM {} ORDER BY {}",
        id_col,
        label_col,
        table_ref(schema)?,
        label_col
    ))
    .bind(limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::fixtures::{column, orders};
    use crate::filter::Predicate;

    #[test]
    fn test_select_page_orders_by_pk() {
        let mut filter = Filter::new();
        filter.push(Predicate::eq("status", "shipped".into()));

        let stmt = select_page(&orders(), &filter, 100, 0).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT [id], [status], [total] FROM [dbo].[orders] WHERE [status] = @P1 \
             ORDER BY [id] OFFSET @P2 ROWS FETCH NEXT @P3 ROWS ONLY"
        );
        assert_eq!(
            stmt.params,
            vec![FieldValue::from("shipped"), FieldValue::Integer(0), FieldValue::Integer(100)]
        );
    }

    #[test]
    fn test_select_page_without_pk() {
        let heap = TableSchema::new("dbo", "events", vec![column("payload", "nvarchar", 1, false)]);
        let stmt = select_page(&heap, &Filter::new(), 10, 20).unwrap();
        assert!(stmt.sql.ends_with("ORDER BY (SELECT NULL) OFFSET @P1 ROWS FETCH NEXT @P2 ROWS ONLY"));
        assert!(!stmt.sql.contains("WHERE"));
    }

    #[test]
    fn test_count() {
        let stmt = count(&orders(), &Filter::new()).unwrap();
        assert_eq!(stmt.sql, "SELECT COUNT_BIG(*) FROM [dbo].[orders]");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_insert_keeps_record_order() {
        let record = GenericRecord::new().with("status", "new").with("id", 7i64);
        let stmt = insert(&orders(), &record).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO [dbo].[orders] ([status], [id]) VALUES (@P1, @P2)"
        );
        assert_eq!(stmt.params, vec![FieldValue::from("new"), FieldValue::Integer(7)]);
    }

    #[test]
    fn test_update_sets_then_keys() {
        let values = GenericRecord::new().with("status", "paid");
        let keys = GenericRecord::new().with("id", 7i64);
        let stmt = update(&orders(), &values, &keys).unwrap();
        assert_eq!(stmt.sql, "UPDATE [dbo].[orders] SET [status] = @P1 WHERE [id] = @P2");
        assert_eq!(stmt.params, vec![FieldValue::from("paid"), FieldValue::Integer(7)]);
    }

    #[test]
    fn test_merge_replaces_unsupplied_columns() {
        let record = GenericRecord::new().with("id", 7i64).with("status", "paid");
        let stmt = merge(&orders(), &record).unwrap();

        assert!(stmt.sql.starts_with("MERGE INTO [dbo].[orders] WITH (HOLDLOCK) AS target"));
        assert!(stmt.sql.contains("USING (VALUES (@P1, @P2)) AS source ([id], [status])"));
        assert!(stmt.sql.contains("ON target.[id] = source.[id]"));
        assert!(stmt
            .sql
            .contains("WHEN MATCHED THEN UPDATE SET [status] = source.[status], [total] = NULL"));
        assert!(stmt
            .sql
            .contains("WHEN NOT MATCHED THEN INSERT ([id], [status]) VALUES (source.[id], source.[status]);"));
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_merge_key_only_table() {
        let lookup = TableSchema::new("dbo", "tags", vec![column("tag", "varchar", 1, true)]);
        let stmt = merge(&lookup, &GenericRecord::new().with("tag", "red")).unwrap();
        assert!(!stmt.sql.contains("WHEN MATCHED"));
        assert!(stmt.sql.contains("WHEN NOT MATCHED THEN INSERT"));
    }

    #[test]
    fn test_delete() {
        let keys = GenericRecord::new().with("id", 7i64);
        let stmt = delete(&orders(), &keys).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM [dbo].[orders] WHERE [id] = @P1");
    }

    #[test]
    fn test_select_options() {
        let stmt = select_options(&orders(), "id", "status", 50).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT TOP (@P1) [id], [status] FROM [dbo].[orders] ORDER BY [status]"
        );
        assert_eq!(stmt.params, vec![FieldValue::Integer(50)]);
    }
}
