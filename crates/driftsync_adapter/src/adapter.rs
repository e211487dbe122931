//! The per-backend adapter contract.

use crate::error::{AdapterError, AdapterResult};
use crate::sql;
use crate::sql::SqlPolicy;
use driftsync_codec::PackedValue;
use driftsync_schema::{Database, Row, Table};

/// Connection parameters supplied by the caller. How each field is used is
/// up to the backend.
#[derive(Debug, Clone, Default)]
pub struct ConnectionParams {
    /// Host name or address.
    pub host: String,
    /// Port, as a string so backends with socket paths can reuse it.
    pub port: String,
    /// Database name.
    pub database: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// A callback invoked once per retrieved row, in primary-key order.
///
/// Rows arrive as one `PackedValue` per column in declaration order, so
/// handlers can stream them into a digest or straight onto the wire
/// without materializing the result set.
pub type RowHandler<'a> = dyn FnMut(Row) -> AdapterResult<()> + 'a;

/// The contract every backend implements.
///
/// Construction (connecting) is backend-specific and takes a
/// [`ConnectionParams`]; a failed connect is fatal to the session. The
/// structured operations all have default implementations that compose the
/// SQL templates in [`crate::sql`] with [`execute`](Self::execute) /
/// [`query`](Self::query), which is the right path for SQL-speaking
/// backends; non-SQL backends override them directly.
pub trait DatabaseAdapter: SqlPolicy {
    /// Execute a statement that returns no rows. Any rows in the result
    /// are an error.
    fn execute(&mut self, sql: &str) -> AdapterResult<()>;

    /// Execute a query, streaming each result row through the handler in
    /// order. Returns the number of rows seen.
    fn query(&mut self, sql: &str, handler: &mut RowHandler) -> AdapterResult<usize>;

    /// Execute a query expected to return exactly one row with one column,
    /// returning that scalar's text form. Anything else is fatal.
    fn select_one(&mut self, sql: &str) -> AdapterResult<String> {
        let mut rows: Vec<Row> = Vec::new();
        self.query(sql, &mut |row| {
            rows.push(row);
            Ok(())
        })?;
        if rows.len() != 1 || rows[0].len() != 1 {
            return Err(AdapterError::query_shape(
                "expected query to return only one row with only one column",
                sql,
            ));
        }
        match &rows[0][0] {
            PackedValue::Text(s) => Ok(s.clone()),
            PackedValue::Int(n) => Ok(n.to_string()),
            PackedValue::Uint(n) => Ok(n.to_string()),
            other => Err(AdapterError::query_shape(
                format!("expected a scalar result, got {other:?}"),
                sql,
            )),
        }
    }

    /// Start a snapshot-capable read transaction (repeatable read).
    fn start_read_transaction(&mut self) -> AdapterResult<()>;

    /// Start a write transaction (read committed).
    fn start_write_transaction(&mut self) -> AdapterResult<()>;

    /// Commit the current transaction.
    fn commit_transaction(&mut self) -> AdapterResult<()>;

    /// Roll back the current transaction.
    fn rollback_transaction(&mut self) -> AdapterResult<()>;

    /// Begin a read transaction and return an opaque snapshot identifier
    /// that other connections can join.
    fn export_snapshot(&mut self) -> AdapterResult<String>;

    /// Join the snapshot exported by another connection, starting this
    /// connection's read transaction against it.
    fn import_snapshot(&mut self, snapshot: &str) -> AdapterResult<()>;

    /// Release any locks held to keep the exported snapshot importable.
    /// A no-op on backends with real snapshot adoption.
    fn unhold_snapshot(&mut self) -> AdapterResult<()> {
        Ok(())
    }

    /// Stop enforcing referential integrity for this session, to the
    /// extent the backend allows (deferring constraints is the portable
    /// behavior).
    fn disable_referential_integrity(&mut self) -> AdapterResult<()> {
        Ok(())
    }

    /// Resume enforcing referential integrity.
    fn enable_referential_integrity(&mut self) -> AdapterResult<()> {
        Ok(())
    }

    /// List the user tables and their columns, primary key, and secondary
    /// keys, mapping native types onto the portable tags. Tables may come
    /// back in discovery order; the consumer re-sorts. Tables without a
    /// declared primary key get a surrogate elected per
    /// [`driftsync_schema::choose_surrogate_key`], or introspection fails.
    fn populate_database_schema(&mut self) -> AdapterResult<Database>;

    /// Stream the rows of a primary-key range in key order. Empty bound
    /// tuples mean unbounded. Returns the number of rows streamed.
    fn retrieve_rows(
        &mut self,
        table: &Table,
        prev_key: &[PackedValue],
        last_key: &[PackedValue],
        row_count: Option<usize>,
        handler: &mut RowHandler,
    ) -> AdapterResult<usize> {
        let sql = sql::retrieve_rows_sql(self, table, prev_key, last_key, row_count)?;
        self.query(&sql, handler)
    }

    /// Count the rows of a primary-key range.
    fn count_rows(
        &mut self,
        table: &Table,
        prev_key: &[PackedValue],
        last_key: &[PackedValue],
    ) -> AdapterResult<u64> {
        let sql = sql::count_rows_sql(self, table, prev_key, last_key)?;
        let count = self.select_one(&sql)?;
        count
            .parse()
            .map_err(|_| AdapterError::query_shape("COUNT(*) did not return an integer", sql))
    }

    /// Insert one row.
    fn insert_row(&mut self, table: &Table, row: &[PackedValue]) -> AdapterResult<()> {
        let sql = sql::insert_row_sql(self, table, row)?;
        self.execute(&sql)
    }

    /// Delete every row in a primary-key range.
    fn delete_range(
        &mut self,
        table: &Table,
        prev_key: &[PackedValue],
        last_key: &[PackedValue],
    ) -> AdapterResult<()> {
        let sql = sql::delete_range_sql(self, table, prev_key, last_key)?;
        self.execute(&sql)
    }

    /// Create a table with all its columns and primary key.
    fn create_table(&mut self, table: &Table) -> AdapterResult<()> {
        let sql = sql::create_table_sql(self, table)?;
        self.execute(&sql)
    }

    /// Drop a table.
    fn drop_table(&mut self, table_name: &str) -> AdapterResult<()> {
        let sql = sql::drop_table_sql(self, table_name);
        self.execute(&sql)
    }

    /// Add a secondary key.
    fn add_key(&mut self, table: &Table, key: &driftsync_schema::Key) -> AdapterResult<()> {
        let sql = sql::add_key_sql(self, table, key);
        self.execute(&sql)
    }

    /// Drop a secondary key.
    fn drop_key(&mut self, table: &Table, key: &driftsync_schema::Key) -> AdapterResult<()> {
        let sql = sql::drop_key_sql(self, table, key);
        self.execute(&sql)
    }

    /// Drop the named columns.
    fn drop_columns(&mut self, table: &Table, column_names: &[String]) -> AdapterResult<()> {
        let sql = sql::drop_columns_sql(self, table, column_names);
        self.execute(&sql)
    }
}

/// Widen integer byte-widths no backend stores natively: 1 widens to 2 and
/// 3 to 4.
pub fn widen_integer_size(size: u32) -> u32 {
    match size {
        1 => 2,
        3 => 4,
        other => other,
    }
}

/// Strip one outer layer of single quotes from a column default read back
/// from the catalog, un-doubling any embedded quotes. Defaults whose
/// textual form is not a simple quoted literal pass through unchanged;
/// that path is known-lossy for complex expressions.
pub fn strip_quoted_default(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('\'') {
        if let Some(end) = raw.rfind('\'') {
            if end > 0 {
                return raw[1..end].replace("''", "'");
            }
        }
    }
    raw.to_string()
}
