//! Core types shared by every layer of the table API.
//!
//! - [`schema`]: discovered table, column and foreign key metadata
//! - [`value`]: tagged cell values
//! - [`record`]: the generic row representation
//! - [`identifier`]: identifier validation and bracket quoting

pub mod identifier;
pub mod record;
pub mod schema;
pub mod value;

pub use record::GenericRecord;
pub use schema::{ColumnMetadata, ForeignKeyMapping, TableSchema};
pub use value::FieldValue;
