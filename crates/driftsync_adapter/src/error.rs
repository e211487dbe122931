//! Error types for the adapter crate.

use thiserror::Error;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors raised by database adapters.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Connection could not be established. Fatal at session start.
    #[error("connect error: {message}")]
    Connect {
        /// The driver's message.
        message: String,
    },

    /// A statement failed. Carries the failing SQL alongside the driver's
    /// message.
    #[error("{message}\n{sql}")]
    Driver {
        /// The driver's message.
        message: String,
        /// The SQL that failed.
        sql: String,
    },

    /// A query returned a shape the caller cannot accept (for example,
    /// `select_one` over a result that is not exactly one row and column).
    #[error("{message}\n{sql}")]
    QueryShape {
        /// Description of the shape problem.
        message: String,
        /// The SQL that produced the result.
        sql: String,
    },

    /// Introspection could not produce a usable schema.
    #[error("{message}")]
    Introspection {
        /// Description of the problem.
        message: String,
    },

    /// A value or type the adapter cannot express.
    #[error("unsupported: {message}")]
    Unsupported {
        /// Description of what was unsupported.
        message: String,
    },

    /// Schema model error surfaced through an adapter operation.
    #[error(transparent)]
    Schema(#[from] driftsync_schema::SchemaError),
}

impl AdapterError {
    /// Create a connect error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Create a driver error carrying the failing SQL.
    pub fn driver(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
            sql: sql.into(),
        }
    }

    /// Create a query-shape error.
    pub fn query_shape(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::QueryShape {
            message: message.into(),
            sql: sql.into(),
        }
    }

    /// Create an introspection error.
    pub fn introspection(message: impl Into<String>) -> Self {
        Self::Introspection {
            message: message.into(),
        }
    }

    /// Create an unsupported error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}
