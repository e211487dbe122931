//! # Driftsync Adapter
//!
//! The per-backend contract and the SQL templates that sit behind it.
//!
//! [`DatabaseAdapter`] captures everything the sync engine needs from a
//! backend: execution, transactions, snapshot export/import, schema
//! introspection, and structured row/DDL operations. The structured
//! operations default to composing the templates in [`sql`] with
//! `execute`/`query`, so a SQL-speaking backend only implements the raw
//! entry points and its [`SqlPolicy`]; [`MemoryAdapter`] overrides them to
//! work on in-process storage instead.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod memory;
mod order;
pub mod sql;

pub use adapter::{
    strip_quoted_default, widen_integer_size, ConnectionParams, DatabaseAdapter, RowHandler,
};
pub use error::{AdapterError, AdapterResult};
pub use memory::{MemoryAdapter, MemoryDatabase};
pub use order::{compare_keys, compare_values, OrderedKey};
pub use sql::SqlPolicy;
