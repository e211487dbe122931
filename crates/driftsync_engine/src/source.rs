//! The source ("from") worker.
//!
//! An event loop over the command stream: the destination drives, the
//! source answers. Range state lives in a cursor that the hash/rows verbs
//! move exactly the way the destination's own cursor moves, so both ends
//! agree on what "current range" means without ever exchanging it.

use crate::algorithm::{check_hash_and_choose_next_range, find_hash_of_next_range, RangePeer};
use crate::command::{key_value, verbs, Command, Verb};
use crate::error::{EngineError, EngineResult};
use driftsync_adapter::{AdapterError, DatabaseAdapter};
use driftsync_codec::{PackedValue, ValueReader, ValueWriter};
use driftsync_schema::{ColumnValues, Database, Table};
use std::io::{Read, Write};
use tracing::debug;

/// Highest protocol version this build speaks.
pub const PROTOCOL_VERSION: i64 = 1;

/// The source-side worker for one pipe.
pub struct SourceWorker<A: DatabaseAdapter, R: Read, W: Write> {
    adapter: A,
    input: ValueReader<R>,
    output: ValueWriter<W>,
    schema: Option<Database>,
    protocol_version: i64,
}

impl<A: DatabaseAdapter, R: Read, W: Write> SourceWorker<A, R, W> {
    /// Create a worker over a connected adapter and the pipe to the peer.
    pub fn new(adapter: A, input: R, output: W) -> Self {
        Self {
            adapter,
            input: ValueReader::new(input),
            output: ValueWriter::new(output),
            schema: None,
            protocol_version: 0,
        }
    }

    /// Run the session to completion: handshake, then serve commands until
    /// QUIT or the peer closes the pipe.
    pub fn run(&mut self) -> EngineResult<()> {
        self.negotiate_protocol_version()?;
        self.command_loop()
    }

    fn negotiate_protocol_version(&mut self) -> EngineResult<()> {
        // every conversation starts by agreeing what language to speak
        let command = Command::read_from(&mut self.input)?;
        if command.verb != verbs::PROTOCOL {
            return Err(EngineError::protocol(format!(
                "expected a protocol command before {}",
                command.verb
            )));
        }

        self.protocol_version = PROTOCOL_VERSION.min(command.int_arg(0)?);
        self.output
            .write_value(&PackedValue::Int(self.protocol_version))?;
        self.output.flush()?;
        Ok(())
    }

    fn command_loop(&mut self) -> EngineResult<()> {
        let mut current_table: Option<Table> = None;
        let mut prev_key: ColumnValues = Vec::new();
        let mut last_key: ColumnValues = Vec::new();

        loop {
            let command = match Command::read_from(&mut self.input) {
                Ok(command) => command,
                Err(EngineError::Codec(e)) if e.is_eof() => {
                    // the pipe closing is the peer's way of cancelling;
                    // dropping the adapter rolls our transaction back
                    debug!("peer closed the pipe");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            match command.verb {
                verbs::OPEN => {
                    let table = self.table_by_name(&command.text_arg(0)?)?;
                    prev_key.clear();
                    last_key.clear();
                    find_hash_of_next_range(
                        self,
                        &table,
                        1,
                        &mut prev_key,
                        &mut last_key,
                        verbs::HASH_NEXT,
                    )?;
                    current_table = Some(table);
                }
                verbs::HASH_CURR | verbs::HASH_NEXT => {
                    if command.verb == verbs::HASH_NEXT {
                        prev_key = std::mem::take(&mut last_key);
                    }
                    last_key = command.key_arg(0)?;
                    let hash = command.bytes_arg(1)?;
                    let table = current_table
                        .clone()
                        .ok_or_else(|| EngineError::protocol("hash command before open"))?;
                    check_hash_and_choose_next_range(
                        self,
                        &table,
                        &mut prev_key,
                        &mut last_key,
                        &hash,
                    )?;
                }
                verbs::ROWS_CURR | verbs::ROWS_NEXT => {
                    if command.verb == verbs::ROWS_NEXT {
                        prev_key = std::mem::take(&mut last_key);
                    }
                    last_key = command.key_arg(0)?;
                    let table = current_table
                        .clone()
                        .ok_or_else(|| EngineError::protocol("rows command before open"))?;
                    // respond as if the range is current on both ends; the
                    // requester already advanced its own cursor
                    self.send_rows_command(
                        &table,
                        verbs::ROWS_CURR,
                        &mut prev_key,
                        &mut last_key,
                    )?;
                }
                verbs::EXPORT_SNAPSHOT => {
                    let snapshot = self.adapter.export_snapshot()?;
                    self.output.write_value(&PackedValue::Text(snapshot))?;
                }
                verbs::IMPORT_SNAPSHOT => {
                    self.adapter.import_snapshot(&command.text_arg(0)?)?;
                    // sent to indicate we've started our transaction
                    self.output.write_value(&PackedValue::Nil)?;
                }
                verbs::UNHOLD_SNAPSHOT => {
                    self.adapter.unhold_snapshot()?;
                    self.output.write_value(&PackedValue::Nil)?;
                }
                verbs::WITHOUT_SNAPSHOT => {
                    self.adapter.start_read_transaction()?;
                    self.output.write_value(&PackedValue::Nil)?;
                }
                verbs::SCHEMA => {
                    let packed = self.database_schema()?.to_packed();
                    self.output.write_value(&packed)?;
                }
                verbs::QUIT => break,
                other => {
                    return Err(EngineError::protocol(format!("unknown command {other}")))
                }
            }

            self.output.flush()?;
        }

        Ok(())
    }

    fn database_schema(&mut self) -> EngineResult<&Database> {
        let schema = match self.schema.take() {
            Some(schema) => schema,
            None => self.adapter.populate_database_schema()?,
        };
        Ok(self.schema.insert(schema))
    }

    fn table_by_name(&mut self, name: &str) -> EngineResult<Table> {
        Ok(self.database_schema()?.table_by_name(name)?.clone())
    }

    fn send_rows_response(
        &mut self,
        table: &Table,
        verb: Verb,
        prev_key: &ColumnValues,
        last_key: &ColumnValues,
    ) -> EngineResult<()> {
        Command::new(verb, vec![key_value(last_key)]).write_to(&mut self.output)?;

        let output = &mut self.output;
        self.adapter
            .retrieve_rows(table, prev_key, last_key, None, &mut |row| {
                output
                    .write_value(&PackedValue::Array(row))
                    .map_err(|e| AdapterError::driver(e.to_string(), "streaming rows to peer"))
            })?;

        // end-of-rows sentinel
        self.output.write_value(&PackedValue::Array(Vec::new()))?;
        Ok(())
    }
}

impl<A: DatabaseAdapter, R: Read, W: Write> RangePeer for SourceWorker<A, R, W> {
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
        // key ranges rather than row counts, to improve the chance the
        // other end's range lines up with ours
        Command::new(verb, vec![key_value(last_key), PackedValue::Bytes(hash.to_vec())])
            .write_to(&mut self.output)
    }

    fn send_rows_command(
        &mut self,
        table: &Table,
        verb: Verb,
        prev_key: &mut ColumnValues,
        last_key: &mut ColumnValues,
    ) -> EngineResult<()> {
        // the range is too small to keep trading hashes over, so stream
        // the rows straight across as if they had been requested
        self.send_rows_response(table, verb, prev_key, last_key)?;

        // if that range extended to the end of the table, we're done
        if last_key.is_empty() {
            return Ok(());
        }

        // otherwise follow up immediately with the next range's hash
        *prev_key = std::mem::take(last_key);
        find_hash_of_next_range(self, table, 1, prev_key, last_key, verbs::HASH_NEXT)
    }
}

/// Run a complete source session over the given streams, reporting any
/// failure on standard error the way the endpoint wrapper expects.
pub fn sync_from<A: DatabaseAdapter, R: Read, W: Write>(
    adapter: A,
    input: R,
    output: W,
) -> EngineResult<()> {
    let mut worker = SourceWorker::new(adapter, input, output);
    let result = worker.run();
    if let Err(ref e) = result {
        eprintln!("{e}");
    }
    result
}
