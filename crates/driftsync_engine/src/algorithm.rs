//! The divide-and-conquer range algorithm.
//!
//! Both peers run the same decision procedure over their own storage: when
//! a hash for a range arrives, compute the local hash of the same range,
//! then either advance (match), re-hash a smaller range (mismatch, still
//! wide), or switch to trading rows (mismatch, down to one row). What
//! differs between the two roles is only how the resulting hash and rows
//! commands are sent, which is what [`RangePeer`] abstracts.
//!
//! Each step either advances `prev_key` or strictly shrinks the disputed
//! range, so a table converges in O(D log N) hash exchanges for D
//! differing rows.

use crate::command::{verbs, Verb};
use crate::error::{EngineError, EngineResult};
use crate::hasher::{hash_next_rows, hash_of_range};
use driftsync_adapter::DatabaseAdapter;
use driftsync_schema::{ColumnValues, Table};

/// Ceiling on the adaptive row-count target. Growth doubles on every
/// matching range and stops here.
pub const MAX_HASH_ROW_COUNT: usize = 10_000;

/// The sending half of a peer: how hash and rows commands leave this end.
///
/// The source's rows command streams the data and immediately follows with
/// the next hash; the destination's is a plain request. Both feed the same
/// algorithm.
pub trait RangePeer {
    /// The adapter over this peer's own database.
    type Adapter: DatabaseAdapter;

    /// This peer's database connection.
    fn adapter(&mut self) -> &mut Self::Adapter;

    /// Send a hash command for `(prev_key, last_key]`.
    fn send_hash_command(
        &mut self,
        table: &Table,
        verb: Verb,
        prev_key: &ColumnValues,
        last_key: &ColumnValues,
        hash: &[u8],
    ) -> EngineResult<()>;

    /// Send a rows command for `(prev_key, last_key]`. May advance the
    /// cursor (the source streams the rows and moves straight on).
    fn send_rows_command(
        &mut self,
        table: &Table,
        verb: Verb,
        prev_key: &mut ColumnValues,
        last_key: &mut ColumnValues,
    ) -> EngineResult<()>;
}

/// The peer has sent its hash for `(prev_key, last_key]`; compare against
/// ours and choose what happens next.
pub fn check_hash_and_choose_next_range<P: RangePeer>(
    peer: &mut P,
    table: &Table,
    prev_key: &mut ColumnValues,
    last_key: &mut ColumnValues,
    hash: &[u8],
) -> EngineResult<()> {
    if hash.is_empty() {
        return Err(EngineError::sync("no hash to check given"));
    }
    if last_key.is_empty() {
        return Err(EngineError::sync("no range end given"));
    }

    let ours = hash_of_range(peer.adapter(), table, prev_key, last_key)?;

    if ours.hash == hash {
        // match; move on to the next set of rows, optimistically doubling
        // the row count
        *prev_key = std::mem::take(last_key);
        let next_count = (ours.row_count.max(1) * 2).min(MAX_HASH_ROW_COUNT);
        find_hash_of_next_range(peer, table, next_count, prev_key, last_key, verbs::HASH_NEXT)
    } else if ours.row_count > 1 {
        // no match; try again from the same start row over half as many
        find_hash_of_next_range(
            peer,
            table,
            ours.row_count / 2,
            prev_key,
            last_key,
            verbs::HASH_CURR,
        )
    } else {
        // the discriminating range is down to 0 or 1 rows on our side, so
        // it's time to trade rows instead of hashes. don't advance
        // prev_key, but if we have no rows at all in the range, extend
        // last_key past our next row; otherwise an end that deleted a run
        // of keys would request each deleted row one by one.
        if ours.row_count == 0 && !last_key.is_empty() {
            extend_last_key(peer.adapter(), table, last_key)?;
        }
        peer.send_rows_command(table, verbs::ROWS_CURR, prev_key, last_key)
    }
}

/// Hash the next `rows_to_hash` rows after `prev_key` and send the result
/// to the peer; at end of table, send a rows command for the remainder so
/// the other end clears out anything it still holds past our last row.
pub fn find_hash_of_next_range<P: RangePeer>(
    peer: &mut P,
    table: &Table,
    rows_to_hash: usize,
    prev_key: &mut ColumnValues,
    last_key: &mut ColumnValues,
    hash_verb: Verb,
) -> EngineResult<()> {
    if rows_to_hash == 0 {
        return Err(EngineError::sync("can't hash 0 rows"));
    }

    let ours = hash_next_rows(peer.adapter(), table, prev_key, rows_to_hash)?;
    *last_key = ours.last_key;

    if ours.row_count == 0 {
        peer.send_rows_command(table, verbs::ROWS_NEXT, prev_key, last_key)
    } else {
        peer.send_hash_command(table, hash_verb, prev_key, last_key, &ours.hash)
    }
}

/// Extend `last_key` to cover our next row past it, or to the end of the
/// table (empty) when there is none.
pub fn extend_last_key<A: DatabaseAdapter>(
    adapter: &mut A,
    table: &Table,
    last_key: &mut ColumnValues,
) -> EngineResult<()> {
    let mut extended: ColumnValues = Vec::new();
    adapter.retrieve_rows(table, last_key, &[], Some(1), &mut |row| {
        extended = table.key_of(&row);
        Ok(())
    })?;
    *last_key = extended;
    Ok(())
}
