//! Generic row representation shared by every table.

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

use super::value::FieldValue;

/// Ordered column name to value mapping.
///
/// Reads return one entry per projected column in ordinal order. Writes may
/// carry any subset of the table's columns; keys are checked against the
/// schema by the executor before any statement is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenericRecord {
    fields: Vec<(String, FieldValue)>,
}

impl GenericRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Set a field, replacing any existing value while keeping its position.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for GenericRecord {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl FromIterator<(String, FieldValue)> for GenericRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        let mut record = GenericRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for GenericRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for GenericRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = GenericRecord;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object of column values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut record = GenericRecord::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    record.insert(key, FieldValue::from_json(value));
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preserves_insertion_order() {
        let record = GenericRecord::new()
            .with("zeta", 1i64)
            .with("alpha", "a")
            .with("mid", 2i64);
        let keys: Vec<_> = record.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);

        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"zeta":1,"alpha":"a","mid":2}"#);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut record = GenericRecord::new().with("id", 1i64).with("status", "new");
        record.insert("id", FieldValue::Integer(2));
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("id"), Some(&FieldValue::Integer(2)));
        assert_eq!(record.keys().next(), Some("id"));
    }

    #[test]
    fn test_deserialize_keeps_document_order() {
        let record: GenericRecord =
            serde_json::from_str(r#"{"total": 12.5, "id": 7, "status": null, "note": "x"}"#)
                .unwrap();
        let keys: Vec<_> = record.keys().collect();
        assert_eq!(keys, vec!["total", "id", "status", "note"]);
        assert_eq!(record.get("total"), Some(&FieldValue::Opaque(json!(12.5))));
        assert_eq!(record.get("id"), Some(&FieldValue::Integer(7)));
        assert_eq!(record.get("status"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_deserialize_rejects_non_object() {
        assert!(serde_json::from_str::<GenericRecord>("[1,2]").is_err());
    }
}
