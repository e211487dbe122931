//! Error types for the schema crate.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised by schema lookups, validation, and (de)serialization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A table name that does not exist in the database.
    #[error("no such table {table}")]
    NoSuchTable {
        /// The missing table.
        table: String,
    },

    /// A column name that does not exist in the table.
    #[error("no such column {column} on table {table}")]
    NoSuchColumn {
        /// The owning table.
        table: String,
        /// The missing column.
        column: String,
    },

    /// A key or primary-key column index past the end of the column list.
    #[error("column index out of range on table {table}")]
    ColumnIndexOutOfRange {
        /// The owning table.
        table: String,
    },

    /// A key with an empty name.
    #[error("key with empty name on table {table}")]
    EmptyKeyName {
        /// The owning table.
        table: String,
    },

    /// An unrecognized column type tag.
    #[error("unknown column type tag {tag}")]
    UnknownTypeTag {
        /// The offending tag string.
        tag: String,
    },

    /// A serialized schema that does not have the expected structure.
    #[error("malformed schema: {message}")]
    Malformed {
        /// Description of the structural problem.
        message: String,
    },

    /// A serialized schema from an unsupported format version.
    #[error("unsupported schema format version {version}")]
    UnsupportedVersion {
        /// The version the peer sent.
        version: i64,
    },
}

impl SchemaError {
    /// Create a no-such-table error.
    pub fn no_such_table(table: impl Into<String>) -> Self {
        Self::NoSuchTable {
            table: table.into(),
        }
    }

    /// Create a no-such-column error.
    pub fn no_such_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::NoSuchColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a column-index-out-of-range error.
    pub fn column_index_out_of_range(table: impl Into<String>) -> Self {
        Self::ColumnIndexOutOfRange {
            table: table.into(),
        }
    }

    /// Create an empty-key-name error.
    pub fn empty_key_name(table: impl Into<String>) -> Self {
        Self::EmptyKeyName {
            table: table.into(),
        }
    }

    /// Create an unknown-type-tag error.
    pub fn unknown_type_tag(tag: impl Into<String>) -> Self {
        Self::UnknownTypeTag { tag: tag.into() }
    }

    /// Create a malformed-schema error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}
