//! # Driftsync Engine
//!
//! The range-hashing synchronization engine: converges a destination
//! database's table data to match a source's over a pair of byte streams,
//! exchanging hashes over primary-key ranges and streaming only the rows
//! that differ.
//!
//! One worker runs at each end of the pipe:
//!
//! - [`SourceWorker`] (the "from" role) answers commands against a
//!   read-only snapshot of the source database.
//! - [`DestWorker`] (the "to" role) drives the session: protocol
//!   handshake, snapshot sharing, schema alignment, then one
//!   divide-and-conquer pass per table.
//!
//! Both ends run the same range algorithm in [`algorithm`]; the engine is
//! generic over the [`driftsync_adapter::DatabaseAdapter`] backing each
//! side. Sessions are stateless: nothing persists between runs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithm;
mod applier;
pub mod command;
mod dest;
mod error;
mod hasher;
mod matcher;
pub mod pipe;
mod source;

pub use applier::TableRowApplier;
pub use dest::{
    sync_to, DestOptions, DestWorker, SnapshotRole, SyncReport, TableReport,
};
pub use error::{EngineError, EngineResult};
pub use hasher::{hash_next_rows, hash_of_range, RangeHash, RowHasher};
pub use matcher::{plan_changes, SchemaChange, SchemaMatcher};
pub use source::{sync_from, SourceWorker, PROTOCOL_VERSION};
