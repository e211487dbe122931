//! # Driftsync Schema
//!
//! In-memory representation of tables, columns, and keys, plus the
//! deterministic wire serialization of a database's schema.
//!
//! The model is pure data with equality semantics chosen for schema
//! matching: column equality ignores filter expressions, keys order
//! unique-first then by name, tables order by name. Introspection helpers
//! live here too, notably surrogate primary-key election for tables that
//! declare no primary key.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod model;
mod serialize;

pub use error::{SchemaError, SchemaResult};
pub use model::{
    choose_surrogate_key, Column, ColumnIndices, ColumnType, ColumnValues, Database, Key, Row,
    Table,
};
pub use serialize::SCHEMA_FORMAT_VERSION;
