//! Error types for the sync engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that end a sync session. There are no retries within a session;
/// the caller detects the failure and re-runs.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad first verb, unknown verb, or malformed arguments.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Schema differences that cannot be reconciled by drop/add alone.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Internal invariant violation in the range algorithm.
    #[error("sync error: {0}")]
    Sync(String),

    /// Database adapter failure.
    #[error(transparent)]
    Adapter(#[from] driftsync_adapter::AdapterError),

    /// Wire encoding or stream failure.
    #[error(transparent)]
    Codec(#[from] driftsync_codec::CodecError),

    /// Schema model failure.
    #[error(transparent)]
    Schema(#[from] driftsync_schema::SchemaError),
}

impl EngineError {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a schema-mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch(message.into())
    }

    /// Create a sync error.
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync(message.into())
    }
}
