//! Range hashing.
//!
//! A range hash is the digest of the canonical encoding of every row in a
//! primary-key range, rows in key order and cells in declaration order.
//! Both peers compute it independently over their own storage; equal
//! digests mean the ranges hold identical data.

use crate::error::EngineResult;
use driftsync_adapter::DatabaseAdapter;
use driftsync_codec::CanonicalEncoder;
use driftsync_codec::PackedValue;
use driftsync_schema::{ColumnValues, Row, Table};
use md5::{Digest, Md5};

/// Incrementally hashes rows in arrival order.
pub struct RowHasher {
    digest: Md5,
    /// Rows hashed so far.
    pub row_count: usize,
}

impl RowHasher {
    /// Create an empty hasher.
    pub fn new() -> Self {
        Self {
            digest: Md5::new(),
            row_count: 0,
        }
    }

    /// Feed one row's canonical bytes into the digest.
    pub fn push_row(&mut self, row: &Row) {
        let mut encoder = CanonicalEncoder::with_capacity(64);
        encoder.encode_array_header(row.len());
        for value in row {
            encoder.encode(value);
        }
        self.digest.update(encoder.as_bytes());
        self.row_count += 1;
    }

    /// Finish, returning the digest bytes.
    pub fn finish(self) -> Vec<u8> {
        self.digest.finalize().to_vec()
    }
}

impl Default for RowHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// The result of hashing a range.
pub struct RangeHash {
    /// Digest over the rows observed.
    pub hash: Vec<u8>,
    /// How many rows were observed; may be less than the requested count
    /// at end of table.
    pub row_count: usize,
    /// Primary key of the last row observed; empty if none were.
    pub last_key: ColumnValues,
}

/// Hash every row in `(prev_key, last_key]`.
pub fn hash_of_range<A: DatabaseAdapter>(
    adapter: &mut A,
    table: &Table,
    prev_key: &[PackedValue],
    last_key: &[PackedValue],
) -> EngineResult<RangeHash> {
    let mut hasher = RowHasher::new();
    let mut observed_last: ColumnValues = Vec::new();
    adapter.retrieve_rows(table, prev_key, last_key, None, &mut |row| {
        hasher.push_row(&row);
        observed_last = table.key_of(&row);
        Ok(())
    })?;
    let row_count = hasher.row_count;
    Ok(RangeHash {
        hash: hasher.finish(),
        row_count,
        last_key: observed_last,
    })
}

/// Hash up to `rows_to_hash` rows after `prev_key`, reporting the key of
/// the last row hashed so the caller knows where the range ended.
pub fn hash_next_rows<A: DatabaseAdapter>(
    adapter: &mut A,
    table: &Table,
    prev_key: &[PackedValue],
    rows_to_hash: usize,
) -> EngineResult<RangeHash> {
    let mut hasher = RowHasher::new();
    let mut observed_last: ColumnValues = Vec::new();
    adapter.retrieve_rows(table, prev_key, &[], Some(rows_to_hash), &mut |row| {
        hasher.push_row(&row);
        observed_last = table.key_of(&row);
        Ok(())
    })?;
    let row_count = hasher.row_count;
    Ok(RangeHash {
        hash: hasher.finish(),
        row_count,
        last_key: observed_last,
    })
}
