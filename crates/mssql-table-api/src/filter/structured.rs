//! Structured filter dialect: grid filter conditions sent as JSON.
//!
//! ```json
//! {"field": "total", "type": "inRange", "filter": 10, "filterTo": 20}
//! {"field": "status", "operator": "OR", "conditions": [
//!     {"type": "equals", "filter": "new"},
//!     {"type": "equals", "filter": "open"}
//! ]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Clause, Comparison, Filter, Predicate};
use crate::core::{ColumnMetadata, FieldValue, TableSchema};
use crate::error::{ApiError, Result};

/// One condition of the structured dialect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    /// Column the condition applies to. Sub-conditions may omit it and
    /// inherit the parent's field.
    #[serde(default, alias = "colId")]
    pub field: Option<String>,

    /// Operator name (`equals`, `contains`, `inRange`, ...).
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Primary comparison value.
    #[serde(default, alias = "value", alias = "dateFrom")]
    pub filter: Option<Value>,

    /// Upper bound for `inRange`.
    #[serde(default, alias = "valueTo", alias = "dateTo")]
    pub filter_to: Option<Value>,

    /// Logical combinator (`AND` / `OR`) joining exactly two `conditions`.
    #[serde(default)]
    pub operator: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<FilterCondition>,
}

impl FilterCondition {
    /// Leaf condition with a single value.
    pub fn new(field: impl Into<String>, kind: impl Into<String>, value: Value) -> Self {
        Self {
            field: Some(field.into()),
            kind: Some(kind.into()),
            filter: Some(value),
            ..Default::default()
        }
    }

    /// Leaf condition with no field, for use inside a combinator.
    pub fn leaf(kind: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            kind: Some(kind.into()),
            filter: value,
            ..Default::default()
        }
    }

    /// Two conditions joined by `operator`.
    pub fn combine(
        field: impl Into<String>,
        operator: impl Into<String>,
        first: FilterCondition,
        second: FilterCondition,
    ) -> Self {
        Self {
            field: Some(field.into()),
            operator: Some(operator.into()),
            conditions: vec![first, second],
            ..Default::default()
        }
    }

    pub fn with_filter_to(mut self, value: Value) -> Self {
        self.filter_to = Some(value);
        self
    }
}

/// Compile a condition list against `schema`.
///
/// Conditions combine with AND. Any invalid condition fails the whole list.
pub fn compile(conditions: &[FilterCondition], schema: &TableSchema) -> Result<Filter> {
    conditions
        .iter()
        .map(|c| compile_condition(c, None, schema))
        .collect()
}

fn compile_condition(
    cond: &FilterCondition,
    parent_field: Option<&str>,
    schema: &TableSchema,
) -> Result<Clause> {
    let field = cond.field.as_deref().or(parent_field);

    if cond.operator.is_some() || !cond.conditions.is_empty() {
        let operator = cond.operator.as_deref().unwrap_or_default();
        if cond.conditions.len() != 2 {
            return Err(ApiError::validation(format!(
                "combinator '{}' requires exactly two conditions, got {}",
                operator,
                cond.conditions.len()
            )));
        }
        let first = compile_condition(&cond.conditions[0], field, schema)?;
        let second = compile_condition(&cond.conditions[1], field, schema)?;

        return match operator.to_ascii_uppercase().as_str() {
            "OR" => Ok(Clause::or(first, second)),
            "AND" => Ok(Clause::and(first, second)),
            _ => Err(ApiError::validation(format!(
                "unknown filter combinator '{}'",
                operator
            ))),
        };
    }

    let field = field.ok_or_else(|| ApiError::validation("filter condition is missing a field"))?;
    let column = schema.require_column(field)?;
    let kind = cond
        .kind
        .as_deref()
        .ok_or_else(|| ApiError::validation(format!("filter on '{}' is missing a type", field)))?;

    let predicate = match kind.to_ascii_lowercase().as_str() {
        "equals" => compare(column, Comparison::Eq, cond)?,
        "notequal" => compare(column, Comparison::Ne, cond)?,
        "greaterthan" => compare(column, Comparison::Gt, cond)?,
        "lessthan" => compare(column, Comparison::Lt, cond)?,
        "greaterthanorequal" => compare(column, Comparison::Ge, cond)?,
        "lessthanorequal" => compare(column, Comparison::Le, cond)?,
        "contains" => {
            let value = required(column, kind, cond.filter.as_ref())?;
            Predicate::new(&column.name, Comparison::Like, vec![contains_pattern(column, value)?])
        }
        "inrange" => {
            let low = required(column, kind, cond.filter.as_ref())?;
            let high = cond.filter_to.as_ref().filter(|v| !v.is_null()).ok_or_else(|| {
                ApiError::validation(format!(
                    "inRange filter on '{}' requires filterTo",
                    column.name
                ))
            })?;
            Predicate::new(
                &column.name,
                Comparison::Between,
                vec![coerce(column, low)?, coerce(column, high)?],
            )
        }
        "blank" => Predicate::new(&column.name, Comparison::IsNull, Vec::new()),
        "notblank" => Predicate::new(&column.name, Comparison::IsNotNull, Vec::new()),
        _ => {
            return Err(ApiError::validation(format!(
                "unknown filter type '{}' on '{}'",
                kind, column.name
            )))
        }
    };

    Ok(Clause::Single(predicate))
}

fn compare(column: &ColumnMetadata, comparison: Comparison, cond: &FilterCondition) -> Result<Predicate> {
    let kind = cond.kind.as_deref().unwrap_or_default();
    let value = required(column, kind, cond.filter.as_ref())?;
    Ok(Predicate::new(&column.name, comparison, vec![coerce(column, value)?]))
}

fn required<'a>(column: &ColumnMetadata, kind: &str, value: Option<&'a Value>) -> Result<&'a Value> {
    value.filter(|v| !v.is_null()).ok_or_else(|| {
        ApiError::validation(format!(
            "{} filter on '{}' requires a value",
            kind, column.name
        ))
    })
}

fn coerce(column: &ColumnMetadata, value: &Value) -> Result<FieldValue> {
    FieldValue::from_json(value.clone()).coerce(&column.name, column.semantic_type)
}

fn contains_pattern(column: &ColumnMetadata, value: &Value) -> Result<FieldValue> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            return Err(ApiError::validation(format!(
                "contains filter on '{}' expects a scalar, got {}",
                column.name, other
            )))
        }
    };
    Ok(FieldValue::Text(format!("%{}%", text)))
}
