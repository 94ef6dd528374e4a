//! Tagged field values carried by generic records.
//!
//! Every cell read from or written to a table is one of five tags. The tag
//! set is deliberately small: the semantic type of the column (see
//! [`crate::typemap`]) decides how a value is coerced on the way in, and the
//! driver decides how it is decoded on the way out.

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{ApiError, Result};
use crate::typemap::SemanticType;

/// One cell of a [`GenericRecord`](super::GenericRecord).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// SQL NULL.
    Null,

    /// Whole number (int, bigint, smallint, tinyint).
    Integer(i64),

    /// Exact fractional number for number columns.
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// Anything else, kept as raw JSON: floats, dates rendered
    /// as ISO strings, GUIDs, binary as hex, booleans.
    Opaque(Value),
}

impl FieldValue {
    /// Build a value from decoded JSON without any schema knowledge.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::String(s) => FieldValue::Text(s),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Opaque(Value::Number(n)),
            },
            other => FieldValue::Opaque(other),
        }
    }

    /// Convert to JSON for responses.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Decimal(d) => decimal_json(d),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Opaque(v) => v.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Coerce the value so it matches a column's semantic type.
    ///
    /// Number columns accept integers, fractional numbers and numeric
    /// strings. Text columns accept any scalar and stringify it. Opaque
    /// columns accept anything; the database performs the final conversion.
    pub fn coerce(self, column: &str, semantic: SemanticType) -> Result<FieldValue> {
        match (semantic, self) {
            (_, FieldValue::Null) => Ok(FieldValue::Null),

            (SemanticType::Number, FieldValue::Integer(i)) => Ok(FieldValue::Integer(i)),
            (SemanticType::Number, FieldValue::Decimal(d)) => Ok(FieldValue::Decimal(d)),
            (SemanticType::Number, FieldValue::Text(s)) => parse_number(column, &s),
            (SemanticType::Number, FieldValue::Opaque(Value::Number(n))) => Ok(json_number(n)),
            (SemanticType::Number, FieldValue::Opaque(other)) => Err(ApiError::validation(
                format!("column '{}' expects a number, got {}", column, other),
            )),

            (SemanticType::Text, FieldValue::Text(s)) => Ok(FieldValue::Text(s)),
            (SemanticType::Text, FieldValue::Integer(i)) => Ok(FieldValue::Text(i.to_string())),
            (SemanticType::Text, FieldValue::Decimal(d)) => Ok(FieldValue::Text(d.to_string())),
            (SemanticType::Text, FieldValue::Opaque(v)) => match v {
                Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
                Value::Bool(b) => Ok(FieldValue::Text(b.to_string())),
                other => Err(ApiError::validation(format!(
                    "column '{}' expects text, got {}",
                    column, other
                ))),
            },

            (SemanticType::Opaque, value) => Ok(value),
        }
    }

    /// Parse a literal from a query string against a column's semantic type.
    pub fn from_literal(column: &str, literal: &str, semantic: SemanticType) -> Result<FieldValue> {
        match semantic {
            SemanticType::Number => parse_number(column, literal),
            SemanticType::Text => Ok(FieldValue::Text(literal.to_string())),
            SemanticType::Opaque => Ok(FieldValue::Text(literal.to_string())),
        }
    }
}

/// Render a decimal as a JSON number when `f64` carries it exactly, and as a
/// string otherwise.
pub fn decimal_json(d: &Decimal) -> Value {
    if d.fract().is_zero() {
        if let Ok(i) = i64::try_from(*d) {
            return Value::from(i);
        }
    }
    let exact = d.normalize().to_string();
    exact
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .filter(|n| n.to_string() == exact)
        .map(Value::Number)
        .unwrap_or(Value::String(exact))
}

fn json_number(n: serde_json::Number) -> FieldValue {
    if let Some(i) = n.as_i64() {
        return FieldValue::Integer(i);
    }
    let repr = n.to_string();
    Decimal::from_str(&repr)
        .or_else(|_| Decimal::from_scientific(&repr))
        .map(FieldValue::Decimal)
        .unwrap_or(FieldValue::Opaque(Value::Number(n)))
}

fn parse_number(column: &str, raw: &str) -> Result<FieldValue> {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(FieldValue::Integer(i));
    }
    if let Ok(d) = Decimal::from_str_exact(trimmed).or_else(|_| Decimal::from_scientific(trimmed)) {
        return Ok(FieldValue::Decimal(d));
    }
    // Out of decimal range: only a float column can hold it
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(|n| FieldValue::Opaque(Value::Number(n)))
        .ok_or_else(|| {
            ApiError::validation(format!(
                "column '{}' expects a number, got {:?}",
                column, raw
            ))
        })
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_none(),
            FieldValue::Integer(i) => serializer.serialize_i64(*i),
            FieldValue::Decimal(d) => decimal_json(d).serialize(serializer),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Opaque(v) => v.serialize(serializer),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("NULL"),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Decimal(d) => write!(f, "{}", d),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Opaque(Value::String(s)) => f.write_str(s),
            FieldValue::Opaque(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        FieldValue::Decimal(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}
