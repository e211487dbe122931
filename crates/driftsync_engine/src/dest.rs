//! The destination ("to") worker.
//!
//! Drives the session: handshake, snapshot choreography, schema align,
//! then one divide-and-conquer pass per table until each converges.

use crate::algorithm::{check_hash_and_choose_next_range, RangePeer};
use crate::applier::TableRowApplier;
use crate::command::{key_value, verbs, Command, Verb};
use crate::error::{EngineError, EngineResult};
use crate::matcher::SchemaMatcher;
use crate::source::PROTOCOL_VERSION;
use driftsync_adapter::DatabaseAdapter;
use driftsync_codec::{PackedValue, ValueReader, ValueWriter};
use driftsync_schema::{ColumnValues, Database, Table};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use tracing::{debug, info};

/// How this worker participates in snapshot sharing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SnapshotRole {
    /// Ask the source to export a snapshot, then release any holding
    /// locks once our transaction is in place. The exported identifier
    /// lands in the report for the caller to hand to sibling workers on
    /// other pipes.
    Export,
    /// Join a snapshot some sibling worker already exported.
    Import(String),
    /// Plain read transaction, no snapshot sharing.
    #[default]
    None,
}

/// Session options for the destination worker.
#[derive(Debug, Clone, Default)]
pub struct DestOptions {
    /// Tables to skip entirely.
    pub ignore_tables: BTreeSet<String>,
    /// When non-empty, the only tables to sync.
    pub only_tables: BTreeSet<String>,
    /// Snapshot participation.
    pub snapshot: SnapshotRole,
    /// Roll back at session end instead of committing (dry run).
    pub rollback_after: bool,
}

impl DestOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the named table.
    pub fn ignoring(mut self, table: impl Into<String>) -> Self {
        self.ignore_tables.insert(table.into());
        self
    }

    /// Restrict the session to the named table.
    pub fn only(mut self, table: impl Into<String>) -> Self {
        self.only_tables.insert(table.into());
        self
    }

    /// Set the snapshot role.
    pub fn with_snapshot(mut self, snapshot: SnapshotRole) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Roll back at session end instead of committing.
    pub fn with_rollback_after(mut self) -> Self {
        self.rollback_after = true;
        self
    }

    fn wants(&self, table_name: &str) -> bool {
        if self.ignore_tables.contains(table_name) {
            return false;
        }
        self.only_tables.is_empty() || self.only_tables.contains(table_name)
    }
}

/// Per-table counters from one session.
#[derive(Debug, Clone)]
pub struct TableReport {
    /// The table.
    pub table: String,
    /// Hash commands received for this table.
    pub hash_commands: usize,
    /// Rows commands received for this table.
    pub rows_commands: usize,
    /// Rows written while applying rows responses.
    pub rows_changed: usize,
}

/// What a destination session did.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Negotiated protocol version.
    pub protocol_version: i64,
    /// Snapshot identifier exported by the source, when this worker asked
    /// for one.
    pub snapshot: Option<String>,
    /// Per-table counters, in sync order.
    pub tables: Vec<TableReport>,
}

/// The destination-side worker for one pipe.
pub struct DestWorker<A: DatabaseAdapter, R: Read, W: Write> {
    adapter: A,
    input: ValueReader<R>,
    output: ValueWriter<W>,
    options: DestOptions,
}

impl<A: DatabaseAdapter, R: Read, W: Write> DestWorker<A, R, W> {
    /// Create a worker over a connected adapter and the pipe to the peer.
    pub fn new(adapter: A, options: DestOptions, input: R, output: W) -> Self {
        Self {
            adapter,
            input: ValueReader::new(input),
            output: ValueWriter::new(output),
            options,
        }
    }

    /// Run the session to completion and report what happened.
    pub fn run(&mut self) -> EngineResult<SyncReport> {
        let mut report = SyncReport::default();

        report.protocol_version = self.negotiate_protocol()?;
        report.snapshot = self.share_snapshot()?;

        self.adapter.start_write_transaction()?;
        // workers that joined a sibling's snapshot ride on the schema
        // alignment the exporting worker already did
        if !matches!(self.options.snapshot, SnapshotRole::Import(_)) {
            self.match_schema()?;
        }

        let tables = self.tables_to_sync()?;
        self.adapter.disable_referential_integrity()?;
        for table in &tables {
            report.tables.push(self.sync_table(table)?);
        }
        self.adapter.enable_referential_integrity()?;

        if self.options.rollback_after {
            self.adapter.rollback_transaction()?;
        } else {
            self.adapter.commit_transaction()?;
        }

        // a quit lets the other end close its output and exit cleanly;
        // failure to send it can't change the outcome now
        let _ = self.send_command(Command::new(verbs::QUIT, vec![]));

        Ok(report)
    }

    fn send_command(&mut self, command: Command) -> EngineResult<()> {
        command.write_to(&mut self.output)?;
        self.output.flush()?;
        Ok(())
    }

    fn read_nil(&mut self) -> EngineResult<()> {
        match self.input.read_value()? {
            PackedValue::Nil => Ok(()),
            other => Err(EngineError::protocol(format!(
                "expected nil acknowledgement, got {other:?}"
            ))),
        }
    }

    fn negotiate_protocol(&mut self) -> EngineResult<i64> {
        self.send_command(Command::new(
            verbs::PROTOCOL,
            vec![PackedValue::Int(PROTOCOL_VERSION)],
        ))?;

        match self.input.read_value()? {
            PackedValue::Int(version) => Ok(version),
            other => Err(EngineError::protocol(format!(
                "expected a protocol version, got {other:?}"
            ))),
        }
    }

    fn share_snapshot(&mut self) -> EngineResult<Option<String>> {
        match self.options.snapshot.clone() {
            SnapshotRole::Export => {
                self.send_command(Command::new(verbs::EXPORT_SNAPSHOT, vec![]))?;
                let snapshot = match self.input.read_value()? {
                    PackedValue::Text(snapshot) => snapshot,
                    other => {
                        return Err(EngineError::protocol(format!(
                            "expected a snapshot identifier, got {other:?}"
                        )))
                    }
                };
                // on lock-based backends the source holds locks until the
                // snapshot has been adopted everywhere; coordinating
                // sibling imports before this release is the caller's
                // concern, so a single-pipe session releases straight away
                self.send_command(Command::new(verbs::UNHOLD_SNAPSHOT, vec![]))?;
                self.read_nil()?;
                Ok(Some(snapshot))
            }
            SnapshotRole::Import(snapshot) => {
                self.send_command(Command::new(
                    verbs::IMPORT_SNAPSHOT,
                    vec![PackedValue::Text(snapshot)],
                ))?;
                self.read_nil()?;
                Ok(None)
            }
            SnapshotRole::None => {
                self.send_command(Command::new(verbs::WITHOUT_SNAPSHOT, vec![]))?;
                self.read_nil()?;
                Ok(None)
            }
        }
    }

    fn match_schema(&mut self) -> EngineResult<()> {
        self.send_command(Command::new(verbs::SCHEMA, vec![]))?;
        let packed = self.input.read_value()?;
        let mut from_database = Database::from_packed(&packed)?;

        let mut to_database = self.adapter.populate_database_schema()?;
        from_database
            .tables
            .retain(|t| self.options.wants(&t.name));
        to_database.tables.retain(|t| self.options.wants(&t.name));

        SchemaMatcher::new(&mut self.adapter).match_schemas(&from_database, &to_database)
    }

    /// The tables this session will sync, introspected after DDL so the
    /// aligned schema is what row sync sees, in canonical name order.
    fn tables_to_sync(&mut self) -> EngineResult<Vec<Table>> {
        let mut database = self.adapter.populate_database_schema()?;
        database.sort_tables();
        Ok(database
            .tables
            .into_iter()
            .filter(|t| self.options.wants(&t.name))
            .collect())
    }

    fn sync_table(&mut self, table: &Table) -> EngineResult<TableReport> {
        let mut report = TableReport {
            table: table.name.clone(),
            hash_commands: 0,
            rows_commands: 0,
            rows_changed: 0,
        };
        let mut prev_key: ColumnValues = Vec::new();
        let mut last_key: ColumnValues = Vec::new();

        debug!(table = %table.name, "starting");
        self.send_command(Command::new(
            verbs::OPEN,
            vec![PackedValue::from(table.name.as_str())],
        ))?;

        loop {
            let command = Command::read_from(&mut self.input)?;

            match command.verb {
                verbs::ROWS_CURR | verbs::ROWS_NEXT => {
                    // ROWS_CURR: the range became too small to keep
                    // splitting, so here comes the data. ROWS_NEXT: the
                    // range after the last matched key was empty on their
                    // end, typically the tail of the table.
                    if command.verb == verbs::ROWS_NEXT {
                        prev_key = std::mem::take(&mut last_key);
                    }
                    last_key = command.key_arg(0)?;
                    report.rows_commands += 1;

                    let mut applier = TableRowApplier::new(&mut self.adapter, table);
                    applier.stream_from_input(&mut self.input, &prev_key, &last_key)?;
                    report.rows_changed += applier.rows_changed;

                    // a range extending to the end of their table means
                    // this table is done; otherwise another command
                    // follows immediately
                    if last_key.is_empty() {
                        break;
                    }
                }
                verbs::HASH_CURR | verbs::HASH_NEXT => {
                    // HASH_CURR: our hash didn't match, so they re-hashed
                    // a smaller range. HASH_NEXT: it matched and they
                    // moved on.
                    if command.verb == verbs::HASH_NEXT {
                        prev_key = std::mem::take(&mut last_key);
                    }
                    last_key = command.key_arg(0)?;
                    let hash = command.bytes_arg(1)?;
                    report.hash_commands += 1;

                    check_hash_and_choose_next_range(
                        self,
                        table,
                        &mut prev_key,
                        &mut last_key,
                        &hash,
                    )?;
                }
                other => {
                    return Err(EngineError::protocol(format!("unknown command {other}")))
                }
            }
        }

        info!(
            table = %table.name,
            hash_commands = report.hash_commands,
            rows_commands = report.rows_commands,
            rows_changed = report.rows_changed,
            "finished"
        );
        Ok(report)
    }
}

impl<A: DatabaseAdapter, R: Read, W: Write> RangePeer for DestWorker<A, R, W> {
    type Adapter = A;

    fn adapter(&mut self) -> &mut A {
        &mut self.adapter
    }

    fn send_hash_command(
        &mut self,
        _table: &Table,
        verb: Verb,
        _prev_key: &ColumnValues,
        last_key: &ColumnValues,
        hash: &[u8],
    ) -> EngineResult<()> {
        self.send_command(Command::new(
            verb,
            vec![key_value(last_key), PackedValue::Bytes(hash.to_vec())],
        ))
    }

    fn send_rows_command(
        &mut self,
        _table: &Table,
        verb: Verb,
        _prev_key: &mut ColumnValues,
        last_key: &mut ColumnValues,
    ) -> EngineResult<()> {
        // ask the other end for the rows in this range; the data comes
        // back as the next command
        self.send_command(Command::new(verb, vec![key_value(last_key)]))
    }
}

/// Run a complete destination session over the given streams, reporting
/// any failure on standard error the way the endpoint wrapper expects.
pub fn sync_to<A: DatabaseAdapter, R: Read, W: Write>(
    adapter: A,
    options: DestOptions,
    input: R,
    output: W,
) -> EngineResult<SyncReport> {
    let mut worker = DestWorker::new(adapter, options, input, output);
    let result = worker.run();
    if let Err(ref e) = result {
        eprintln!("{e}");
    }
    result
}
