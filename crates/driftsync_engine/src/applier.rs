//! Destination-side row application.

use crate::error::{EngineError, EngineResult};
use driftsync_adapter::DatabaseAdapter;
use driftsync_codec::{PackedValue, ValueReader};
use driftsync_schema::Table;
use std::io::Read;

/// Applies a streamed rows response to the local table.
///
/// Rows arrive only for ranges known to differ, so application replaces
/// the whole range: every local row in `(prev_key, last_key]` is deleted,
/// then the supplied rows are inserted. Rows the source did not supply
/// within the range are therefore gone afterwards, which is the only place
/// the engine deletes rows.
pub struct TableRowApplier<'a, A: DatabaseAdapter> {
    adapter: &'a mut A,
    table: &'a Table,
    /// Rows written while applying.
    pub rows_changed: usize,
}

impl<'a, A: DatabaseAdapter> TableRowApplier<'a, A> {
    /// Create an applier for one table.
    pub fn new(adapter: &'a mut A, table: &'a Table) -> Self {
        Self {
            adapter,
            table,
            rows_changed: 0,
        }
    }

    /// Read rows off the input until the end sentinel (an empty array),
    /// applying them in place of whatever the range held. Applying happens
    /// in-context for flow control: if this end can't write as fast as the
    /// other end sends, the pipe fills and the sender blocks.
    pub fn stream_from_input<R: Read>(
        &mut self,
        input: &mut ValueReader<R>,
        prev_key: &[PackedValue],
        last_key: &[PackedValue],
    ) -> EngineResult<()> {
        self.adapter.delete_range(self.table, prev_key, last_key)?;

        loop {
            let row = match input.read_value()? {
                PackedValue::Array(row) => row,
                other => {
                    return Err(EngineError::protocol(format!(
                        "expected a row or end-of-rows, got {other:?}"
                    )))
                }
            };
            if row.is_empty() {
                break;
            }
            if row.len() != self.table.columns.len() {
                return Err(EngineError::protocol(format!(
                    "row for table {} has {} values, expected {}",
                    self.table.name,
                    row.len(),
                    self.table.columns.len()
                )));
            }
            self.adapter.insert_row(self.table, &row)?;
            self.rows_changed += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_adapter::MemoryDatabase;
    use driftsync_codec::ValueWriter;
    use driftsync_schema::{Column, ColumnType};

    fn footbl() -> Table {
        Table {
            name: "footbl".into(),
            columns: vec![
                Column::new("col1", ColumnType::SignedInt, false).with_size(4),
                Column::new("col3", ColumnType::Varchar, true).with_size(10),
            ],
            primary_key_columns: vec![0],
            keys: vec![],
            where_conditions: None,
        }
    }

    fn row(key: i64, text: &str) -> Vec<PackedValue> {
        vec![PackedValue::Int(key), PackedValue::from(text)]
    }

    fn rows_stream(rows: &[Vec<PackedValue>]) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut writer = ValueWriter::new(&mut buffer);
        for r in rows {
            writer.write_value(&PackedValue::Array(r.clone())).unwrap();
        }
        writer.write_value(&PackedValue::Array(vec![])).unwrap();
        writer.flush().unwrap();
        drop(writer);
        buffer
    }

    #[test]
    fn replaces_rows_within_the_range() {
        let db = MemoryDatabase::new();
        db.create_table(footbl());
        db.insert("footbl", row(2, "old"));
        db.insert("footbl", row(3, "keep"));
        db.insert("footbl", row(5, "stale"));

        let mut adapter = db.connect();
        adapter.start_write_transaction().unwrap();
        let table = footbl();

        // replace (2, 5] with just a new row 4: rows 3 and 5 are in the
        // range and unsupplied, so they go; row 2 is outside and stays
        let stream = rows_stream(&[row(4, "new")]);
        let mut reader = ValueReader::new(&stream[..]);
        let mut applier = TableRowApplier::new(&mut adapter, &table);
        applier
            .stream_from_input(&mut reader, &[PackedValue::Int(2)], &[PackedValue::Int(5)])
            .unwrap();
        assert_eq!(applier.rows_changed, 1);

        adapter.commit_transaction().unwrap();
        let keys: Vec<i64> = db
            .rows("footbl")
            .iter()
            .map(|r| r[0].as_int().unwrap())
            .collect();
        assert_eq!(keys, [2, 4]);
    }

    #[test]
    fn empty_response_clears_the_range() {
        let db = MemoryDatabase::new();
        db.create_table(footbl());
        db.insert("footbl", row(1, "a"));
        db.insert("footbl", row(2, "b"));

        let mut adapter = db.connect();
        adapter.start_write_transaction().unwrap();
        let table = footbl();

        let stream = rows_stream(&[]);
        let mut reader = ValueReader::new(&stream[..]);
        TableRowApplier::new(&mut adapter, &table)
            .stream_from_input(&mut reader, &[], &[])
            .unwrap();

        adapter.commit_transaction().unwrap();
        assert!(db.rows("footbl").is_empty());
    }

    #[test]
    fn rejects_rows_of_the_wrong_width() {
        let db = MemoryDatabase::new();
        db.create_table(footbl());
        let mut adapter = db.connect();
        adapter.start_write_transaction().unwrap();
        let table = footbl();

        let stream = rows_stream(&[vec![PackedValue::Int(1)]]);
        let mut reader = ValueReader::new(&stream[..]);
        let result = TableRowApplier::new(&mut adapter, &table)
            .stream_from_input(&mut reader, &[], &[]);
        assert!(matches!(result, Err(EngineError::Protocol(_))));
    }
}
