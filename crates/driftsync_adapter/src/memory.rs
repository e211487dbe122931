//! In-memory reference adapter.
//!
//! A complete, non-SQL implementation of the adapter contract over shared
//! in-process storage. It backs the integration tests and the demo binary,
//! and doubles as the reference for what each contract method must do.
//!
//! The structured operations are overridden to work on the store directly;
//! the raw SQL entry points are unsupported (there is no SQL engine here),
//! and Driver errors carry a description of the failed operation in place
//! of statement text.

use crate::adapter::{widen_integer_size, DatabaseAdapter, RowHandler};
use crate::error::{AdapterError, AdapterResult};
use crate::order::OrderedKey;
use crate::sql::{quote_ident, SqlPolicy};
use driftsync_codec::PackedValue;
use driftsync_schema::{choose_surrogate_key, Column, ColumnType, Database, Key, Row, Table};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
struct MemoryTable {
    schema: Table,
    rows: BTreeMap<OrderedKey, Row>,
}

struct Store {
    tables: Vec<MemoryTable>,
    snapshots: HashMap<String, Vec<MemoryTable>>,
    snapshot_counter: u64,
}

/// A shared in-memory database. Cheap to clone; all clones see the same
/// storage. Open connections with [`MemoryDatabase::connect`].
#[derive(Clone)]
pub struct MemoryDatabase {
    shared: Arc<RwLock<Store>>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(RwLock::new(Store {
                tables: Vec::new(),
                snapshots: HashMap::new(),
                snapshot_counter: 0,
            })),
        }
    }

    /// Open a connection.
    pub fn connect(&self) -> MemoryAdapter {
        MemoryAdapter {
            shared: Arc::clone(&self.shared),
            snapshot: None,
            work: None,
        }
    }

    /// Define a table directly in storage (seeding helper).
    pub fn create_table(&self, schema: Table) {
        self.shared.write().tables.push(MemoryTable {
            schema,
            rows: BTreeMap::new(),
        });
    }

    /// Insert a row directly into storage (seeding helper). Replaces any
    /// existing row with the same primary key.
    pub fn insert(&self, table_name: &str, row: Row) {
        let mut store = self.shared.write();
        let table = store
            .tables
            .iter_mut()
            .find(|t| t.schema.name == table_name)
            .unwrap_or_else(|| panic!("no such table {table_name}"));
        let key = table.schema.key_of(&row);
        table.rows.insert(OrderedKey(key), row);
    }

    /// All rows of a table in primary-key order (assertion helper).
    pub fn rows(&self, table_name: &str) -> Vec<Row> {
        let store = self.shared.read();
        store
            .tables
            .iter()
            .find(|t| t.schema.name == table_name)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The stored schema of a table, if it exists (assertion helper).
    pub fn schema_of(&self, table_name: &str) -> Option<Table> {
        let store = self.shared.read();
        store
            .tables
            .iter()
            .find(|t| t.schema.name == table_name)
            .map(|t| t.schema.clone())
    }

    /// Names of all tables in discovery order (assertion helper).
    pub fn table_names(&self) -> Vec<String> {
        let store = self.shared.read();
        store
            .tables
            .iter()
            .map(|t| t.schema.name.clone())
            .collect()
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// One connection to a [`MemoryDatabase`].
///
/// Read transactions and snapshots freeze a copy of the store; write
/// transactions stage changes in a working copy that only reaches shared
/// storage on commit.
pub struct MemoryAdapter {
    shared: Arc<RwLock<Store>>,
    snapshot: Option<Vec<MemoryTable>>,
    work: Option<Vec<MemoryTable>>,
}

impl MemoryAdapter {
    fn with_tables<T>(
        &self,
        f: impl FnOnce(&[MemoryTable]) -> AdapterResult<T>,
    ) -> AdapterResult<T> {
        if let Some(ref view) = self.snapshot {
            f(view)
        } else if let Some(ref work) = self.work {
            f(work)
        } else {
            let store = self.shared.read();
            f(&store.tables)
        }
    }

    fn with_tables_mut<T>(
        &mut self,
        operation: &str,
        f: impl FnOnce(&mut Vec<MemoryTable>) -> AdapterResult<T>,
    ) -> AdapterResult<T> {
        match self.work {
            Some(ref mut work) => f(work),
            None => Err(AdapterError::driver(
                "no write transaction in progress",
                operation,
            )),
        }
    }

    fn range_bounds(
        prev_key: &[PackedValue],
        last_key: &[PackedValue],
    ) -> (Bound<OrderedKey>, Bound<OrderedKey>) {
        let lower = if prev_key.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(OrderedKey(prev_key.to_vec()))
        };
        let upper = if last_key.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(OrderedKey(last_key.to_vec()))
        };
        (lower, upper)
    }
}

fn find_table<'a>(tables: &'a [MemoryTable], name: &str) -> AdapterResult<&'a MemoryTable> {
    tables
        .iter()
        .find(|t| t.schema.name == name)
        .ok_or_else(|| AdapterError::driver(format!("no such table {name}"), "lookup"))
}

fn find_table_mut<'a>(
    tables: &'a mut [MemoryTable],
    name: &str,
) -> AdapterResult<&'a mut MemoryTable> {
    tables
        .iter_mut()
        .find(|t| t.schema.name == name)
        .ok_or_else(|| AdapterError::driver(format!("no such table {name}"), "lookup"))
}

impl SqlPolicy for MemoryAdapter {
    fn quote_char(&self) -> Option<char> {
        Some('"')
    }

    fn index_names_are_global(&self) -> bool {
        true
    }

    fn escape_string(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        format!("X'{hex}'")
    }

    fn column_definition(&self, column: &Column) -> AdapterResult<String> {
        let mut result = quote_ident(self, &column.name);
        result.push(' ');

        match column.column_type {
            ColumnType::Blob => result.push_str("BLOB"),
            ColumnType::Text => result.push_str("TEXT"),
            ColumnType::Varchar => result.push_str(&format!("VARCHAR({})", column.size)),
            ColumnType::FixedChar => result.push_str(&format!("CHAR({})", column.size)),
            ColumnType::Bool => result.push_str("BOOLEAN"),
            // unsigned columns are expressed as their signed equivalent;
            // the introspection path makes the same downgrade
            ColumnType::SignedInt | ColumnType::UnsignedInt => {
                result.push_str(match widen_integer_size(column.size) {
                    2 => "SMALLINT",
                    4 => "INTEGER",
                    _ => "BIGINT",
                })
            }
            ColumnType::Real => {
                result.push_str(if column.size == 4 { "FLOAT" } else { "DOUBLE PRECISION" })
            }
            ColumnType::Decimal => {
                result.push_str(&format!("DECIMAL({},{})", column.size, column.scale))
            }
            ColumnType::Date => result.push_str("DATE"),
            ColumnType::Time => result.push_str("TIME"),
            ColumnType::DateTime => result.push_str("TIMESTAMP"),
        }

        if !column.nullable {
            result.push_str(" NOT NULL");
        }
        if let Some(ref default_value) = column.default_value {
            result.push_str(&format!(" DEFAULT '{}'", self.escape_string(default_value)));
        }
        Ok(result)
    }
}

impl DatabaseAdapter for MemoryAdapter {
    fn execute(&mut self, sql: &str) -> AdapterResult<()> {
        Err(AdapterError::driver(
            "the memory adapter does not execute SQL",
            sql,
        ))
    }

    fn query(&mut self, sql: &str, _handler: &mut RowHandler) -> AdapterResult<usize> {
        Err(AdapterError::driver(
            "the memory adapter does not execute SQL",
            sql,
        ))
    }

    fn start_read_transaction(&mut self) -> AdapterResult<()> {
        let store = self.shared.read();
        self.snapshot = Some(store.tables.clone());
        Ok(())
    }

    fn start_write_transaction(&mut self) -> AdapterResult<()> {
        let store = self.shared.read();
        self.work = Some(store.tables.clone());
        Ok(())
    }

    fn commit_transaction(&mut self) -> AdapterResult<()> {
        if let Some(work) = self.work.take() {
            self.shared.write().tables = work;
        }
        self.snapshot = None;
        Ok(())
    }

    fn rollback_transaction(&mut self) -> AdapterResult<()> {
        self.work = None;
        self.snapshot = None;
        Ok(())
    }

    fn export_snapshot(&mut self) -> AdapterResult<String> {
        let mut store = self.shared.write();
        store.snapshot_counter += 1;
        let id = format!("memsnap-{}", store.snapshot_counter);
        let frozen = store.tables.clone();
        store.snapshots.insert(id.clone(), frozen.clone());
        drop(store);

        self.snapshot = Some(frozen);
        Ok(id)
    }

    fn import_snapshot(&mut self, snapshot: &str) -> AdapterResult<()> {
        let store = self.shared.read();
        let frozen = store.snapshots.get(snapshot).cloned().ok_or_else(|| {
            AdapterError::driver(format!("unknown snapshot {snapshot}"), "import snapshot")
        })?;
        drop(store);

        self.snapshot = Some(frozen);
        Ok(())
    }

    fn populate_database_schema(&mut self) -> AdapterResult<Database> {
        self.with_tables(|tables| {
            let mut database = Database::default();

            // tables come back in discovery order; the consumer re-sorts
            for table in tables {
                let mut schema = table.schema.clone();

                for column in &mut schema.columns {
                    match column.column_type {
                        ColumnType::SignedInt => column.size = widen_integer_size(column.size),
                        ColumnType::UnsignedInt => {
                            // no unsigned storage here; downgrade to the
                            // signed equivalent, which loses the tag
                            warn!(
                                table = %schema.name,
                                column = %column.name,
                                "unsigned column downgraded to signed"
                            );
                            column.column_type = ColumnType::SignedInt;
                            column.size = widen_integer_size(column.size);
                        }
                        _ => {}
                    }
                }

                schema.keys.sort();

                if schema.primary_key_columns.is_empty() {
                    match choose_surrogate_key(&schema.columns, &schema.keys) {
                        Some(key) => schema.primary_key_columns = key.columns.clone(),
                        None => {
                            return Err(AdapterError::introspection(format!(
                                "Couldn't find a primary or non-nullable unique key on table {}",
                                schema.name
                            )))
                        }
                    }
                }

                schema.validate()?;
                database.tables.push(schema);
            }

            Ok(database)
        })
    }

    fn retrieve_rows(
        &mut self,
        table: &Table,
        prev_key: &[PackedValue],
        last_key: &[PackedValue],
        row_count: Option<usize>,
        handler: &mut RowHandler,
    ) -> AdapterResult<usize> {
        let rows: Vec<Row> = self.with_tables(|tables| {
            let t = find_table(tables, &table.name)?;
            let bounds = Self::range_bounds(prev_key, last_key);
            let limit = row_count.unwrap_or(usize::MAX);
            Ok(t.rows.range(bounds).take(limit).map(|(_, r)| r.clone()).collect())
        })?;

        let count = rows.len();
        for row in rows {
            handler(row)?;
        }
        Ok(count)
    }

    fn count_rows(
        &mut self,
        table: &Table,
        prev_key: &[PackedValue],
        last_key: &[PackedValue],
    ) -> AdapterResult<u64> {
        self.with_tables(|tables| {
            let t = find_table(tables, &table.name)?;
            let bounds = Self::range_bounds(prev_key, last_key);
            Ok(t.rows.range(bounds).count() as u64)
        })
    }

    fn insert_row(&mut self, table: &Table, row: &[PackedValue]) -> AdapterResult<()> {
        let name = table.name.clone();
        self.with_tables_mut("insert row", |tables| {
            let t = find_table_mut(tables, &name)?;
            let key = t.schema.key_of(row);
            t.rows.insert(OrderedKey(key), row.to_vec());
            Ok(())
        })
    }

    fn delete_range(
        &mut self,
        table: &Table,
        prev_key: &[PackedValue],
        last_key: &[PackedValue],
    ) -> AdapterResult<()> {
        let name = table.name.clone();
        let bounds = Self::range_bounds(prev_key, last_key);
        self.with_tables_mut("delete range", |tables| {
            let t = find_table_mut(tables, &name)?;
            let doomed: Vec<OrderedKey> = t.rows.range(bounds).map(|(k, _)| k.clone()).collect();
            for key in doomed {
                t.rows.remove(&key);
            }
            Ok(())
        })
    }

    fn create_table(&mut self, table: &Table) -> AdapterResult<()> {
        let mut table = table.clone();
        // creating a table covers columns and the primary key; secondary
        // keys arrive through add_key, as they do on SQL backends
        table.keys.clear();
        self.with_tables_mut("create table", |tables| {
            if tables.iter().any(|t| t.schema.name == table.name) {
                return Err(AdapterError::driver(
                    format!("table {} already exists", table.name),
                    "create table",
                ));
            }
            tables.push(MemoryTable {
                schema: table,
                rows: BTreeMap::new(),
            });
            Ok(())
        })
    }

    fn drop_table(&mut self, table_name: &str) -> AdapterResult<()> {
        let name = table_name.to_string();
        self.with_tables_mut("drop table", |tables| {
            let before = tables.len();
            tables.retain(|t| t.schema.name != name);
            if tables.len() == before {
                return Err(AdapterError::driver(
                    format!("no such table {name}"),
                    "drop table",
                ));
            }
            Ok(())
        })
    }

    fn add_key(&mut self, table: &Table, key: &Key) -> AdapterResult<()> {
        let name = table.name.clone();
        let key = key.clone();
        self.with_tables_mut("add key", |tables| {
            let t = find_table_mut(tables, &name)?;
            t.schema.keys.push(key);
            Ok(())
        })
    }

    fn drop_key(&mut self, table: &Table, key: &Key) -> AdapterResult<()> {
        let name = table.name.clone();
        let key_name = key.name.clone();
        self.with_tables_mut("drop key", |tables| {
            let t = find_table_mut(tables, &name)?;
            t.schema.keys.retain(|k| k.name != key_name);
            Ok(())
        })
    }

    fn drop_columns(&mut self, table: &Table, column_names: &[String]) -> AdapterResult<()> {
        let name = table.name.clone();
        let column_names = column_names.to_vec();
        self.with_tables_mut("drop columns", |tables| {
            let t = find_table_mut(tables, &name)?;

            let mut doomed: Vec<usize> = column_names
                .iter()
                .map(|n| t.schema.index_of_column(n))
                .collect::<Result<_, _>>()?;
            doomed.sort_unstable();

            // removing from the highest index down keeps the remaining
            // indices valid while we go
            for &index in doomed.iter().rev() {
                t.schema.columns.remove(index);
                for row in t.rows.values_mut() {
                    row.remove(index);
                }
            }

            let remap = |i: usize| -> usize { i - doomed.iter().filter(|&&d| d < i).count() };
            t.schema.primary_key_columns = t
                .schema
                .primary_key_columns
                .iter()
                .map(|&i| remap(i))
                .collect();
            // keys over a dropped column go with it
            t.schema.keys.retain(|k| !k.columns.iter().any(|i| doomed.contains(i)));
            for key in &mut t.schema.keys {
                key.columns = key.columns.iter().map(|&i| remap(i)).collect();
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footbl() -> Table {
        Table {
            name: "footbl".into(),
            columns: vec![
                Column::new("col1", ColumnType::SignedInt, false).with_size(4),
                Column::new("another_col", ColumnType::SignedInt, true).with_size(2),
                Column::new("col3", ColumnType::Varchar, true).with_size(10),
            ],
            primary_key_columns: vec![0],
            keys: vec![],
            where_conditions: None,
        }
    }

    fn int_row(key: i64, text: &str) -> Row {
        vec![
            PackedValue::Int(key),
            PackedValue::Nil,
            PackedValue::from(text),
        ]
    }

    fn seeded() -> (MemoryDatabase, Table) {
        let db = MemoryDatabase::new();
        let table = footbl();
        db.create_table(table.clone());
        for key in [2, 4, 5, 8, 100] {
            db.insert("footbl", int_row(key, &format!("row{key}")));
        }
        (db, table)
    }

    #[test]
    fn retrieves_ranges_in_key_order() {
        let (db, table) = seeded();
        let mut adapter = db.connect();

        let mut keys = Vec::new();
        let count = adapter
            .retrieve_rows(&table, &[], &[], None, &mut |row| {
                keys.push(row[0].as_int().unwrap());
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 5);
        assert_eq!(keys, [2, 4, 5, 8, 100]);

        // (2, 8] with a limit
        let mut keys = Vec::new();
        adapter
            .retrieve_rows(
                &table,
                &[PackedValue::Int(2)],
                &[PackedValue::Int(8)],
                Some(2),
                &mut |row| {
                    keys.push(row[0].as_int().unwrap());
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(keys, [4, 5]);
    }

    #[test]
    fn counts_ranges() {
        let (db, table) = seeded();
        let mut adapter = db.connect();
        assert_eq!(adapter.count_rows(&table, &[], &[]).unwrap(), 5);
        assert_eq!(
            adapter
                .count_rows(&table, &[PackedValue::Int(4)], &[PackedValue::Int(100)])
                .unwrap(),
            3
        );
    }

    #[test]
    fn snapshot_is_frozen_against_later_writes() {
        let (db, table) = seeded();
        let mut reader = db.connect();
        let id = reader.export_snapshot().unwrap();

        db.insert("footbl", int_row(50, "late"));
        assert_eq!(reader.count_rows(&table, &[], &[]).unwrap(), 5);

        // a second connection importing the snapshot sees the same view
        let mut sibling = db.connect();
        sibling.import_snapshot(&id).unwrap();
        assert_eq!(sibling.count_rows(&table, &[], &[]).unwrap(), 5);

        // a fresh read transaction sees the later write
        let mut fresh = db.connect();
        fresh.start_read_transaction().unwrap();
        assert_eq!(fresh.count_rows(&table, &[], &[]).unwrap(), 6);

        assert!(db.connect().import_snapshot("memsnap-999").is_err());
    }

    #[test]
    fn write_transaction_stages_until_commit() {
        let (db, table) = seeded();
        let mut writer = db.connect();
        writer.start_write_transaction().unwrap();
        writer.insert_row(&table, &int_row(9, "staged")).unwrap();

        // not visible outside the transaction yet
        assert_eq!(db.rows("footbl").len(), 5);
        // but visible to the writer's own reads
        assert_eq!(writer.count_rows(&table, &[], &[]).unwrap(), 6);

        writer.commit_transaction().unwrap();
        assert_eq!(db.rows("footbl").len(), 6);
    }

    #[test]
    fn rollback_discards_staged_writes() {
        let (db, table) = seeded();
        let mut writer = db.connect();
        writer.start_write_transaction().unwrap();
        writer.delete_range(&table, &[], &[]).unwrap();
        assert_eq!(writer.count_rows(&table, &[], &[]).unwrap(), 0);

        writer.rollback_transaction().unwrap();
        assert_eq!(db.rows("footbl").len(), 5);
    }

    #[test]
    fn writes_require_a_transaction() {
        let (db, table) = seeded();
        let mut adapter = db.connect();
        assert!(adapter.insert_row(&table, &int_row(1, "x")).is_err());
    }

    #[test]
    fn delete_range_respects_bounds() {
        let (db, table) = seeded();
        let mut writer = db.connect();
        writer.start_write_transaction().unwrap();
        writer
            .delete_range(&table, &[PackedValue::Int(4)], &[PackedValue::Int(8)])
            .unwrap();
        writer.commit_transaction().unwrap();

        let keys: Vec<i64> = db
            .rows("footbl")
            .iter()
            .map(|r| r[0].as_int().unwrap())
            .collect();
        assert_eq!(keys, [2, 100]);
    }

    #[test]
    fn ddl_operations_reshape_the_schema() {
        let (db, table) = seeded();
        let mut writer = db.connect();
        writer.start_write_transaction().unwrap();

        let key = Key::new("idx_col3", false, vec![2]);
        writer.add_key(&table, &key).unwrap();
        writer.drop_columns(&table, &["another_col".to_string()]).unwrap();
        writer.commit_transaction().unwrap();

        let schema = db.schema_of("footbl").unwrap();
        assert_eq!(schema.columns.len(), 2);
        assert_eq!(schema.columns[1].name, "col3");
        // the index followed its column down one position
        assert_eq!(schema.keys[0].columns, vec![1]);
        assert_eq!(db.rows("footbl")[0].len(), 2);

        let mut writer = db.connect();
        writer.start_write_transaction().unwrap();
        writer.drop_table("footbl").unwrap();
        writer.commit_transaction().unwrap();
        assert!(db.schema_of("footbl").is_none());
    }

    #[test]
    fn introspection_normalizes_types_and_elects_surrogates() {
        let db = MemoryDatabase::new();
        let mut table = Table::new("odd");
        table.columns = vec![
            Column::new("tiny", ColumnType::SignedInt, false).with_size(1),
            Column::new("medium", ColumnType::UnsignedInt, false).with_size(3),
        ];
        table.keys = vec![
            Key::new("z_unique", true, vec![0]),
            Key::new("a_unique", true, vec![1]),
        ];
        db.create_table(table);

        let mut adapter = db.connect();
        let database = adapter.populate_database_schema().unwrap();
        let introspected = &database.tables[0];

        assert_eq!(introspected.columns[0].size, 2);
        assert_eq!(introspected.columns[1].column_type, ColumnType::SignedInt);
        assert_eq!(introspected.columns[1].size, 4);
        // surrogate: the lexicographically smallest eligible unique key
        assert_eq!(introspected.primary_key_columns, vec![1]);
    }

    #[test]
    fn introspection_fails_without_any_usable_key() {
        let db = MemoryDatabase::new();
        let mut table = Table::new("keyless");
        table.columns = vec![Column::new("v", ColumnType::Text, true)];
        table.keys = vec![Key::new("nullable_unique", true, vec![0])];
        db.create_table(table);

        let mut adapter = db.connect();
        let err = adapter.populate_database_schema().unwrap_err();
        assert!(err.to_string().contains("keyless"));
    }

    #[test]
    fn raw_sql_is_refused() {
        let db = MemoryDatabase::new();
        let mut adapter = db.connect();
        assert!(adapter.execute("DROP TABLE x").is_err());
        assert!(adapter.select_one("SELECT 1").is_err());
    }
}
