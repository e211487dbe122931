//! Wire commands.
//!
//! Each command travels as `array(1+k)`: a small unsigned verb followed by
//! its arguments. Responses that are not commands (the protocol version,
//! the serialized schema, snapshot identifiers, acknowledgement nils) are
//! bare values; only range traffic uses full commands in both directions.

use crate::error::{EngineError, EngineResult};
use driftsync_codec::{PackedValue, ValueReader, ValueWriter};
use driftsync_schema::ColumnValues;
use std::io::{Read, Write};

/// A protocol verb.
pub type Verb = u8;

/// The protocol verbs.
pub mod verbs {
    use super::Verb;

    /// Clean shutdown.
    pub const QUIT: Verb = 0;
    /// Open a table and hash its first range.
    pub const OPEN: Verb = 1;
    /// Rows for the current range.
    pub const ROWS_CURR: Verb = 2;
    /// Advance, then rows for the next range.
    pub const ROWS_NEXT: Verb = 3;
    /// Hash of the current range, re-hashed at finer granularity.
    pub const HASH_CURR: Verb = 4;
    /// Advance, then hash of the next range.
    pub const HASH_NEXT: Verb = 5;

    /// Protocol version handshake.
    pub const PROTOCOL: Verb = 32;
    /// Begin a read transaction and export its snapshot.
    pub const EXPORT_SNAPSHOT: Verb = 33;
    /// Join a previously exported snapshot.
    pub const IMPORT_SNAPSHOT: Verb = 34;
    /// Release locks held for snapshot sharing.
    pub const UNHOLD_SNAPSHOT: Verb = 35;
    /// Begin a plain read transaction with no snapshot sharing.
    pub const WITHOUT_SNAPSHOT: Verb = 36;
    /// Request the serialized database schema.
    pub const SCHEMA: Verb = 37;
}

/// A decoded command: verb plus arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// The verb.
    pub verb: Verb,
    /// Verb-specific arguments.
    pub args: Vec<PackedValue>,
}

impl Command {
    /// Create a command.
    pub fn new(verb: Verb, args: Vec<PackedValue>) -> Self {
        Self { verb, args }
    }

    /// Read the next command off the stream.
    pub fn read_from<R: Read>(input: &mut ValueReader<R>) -> EngineResult<Self> {
        let value = input.read_value()?;
        let mut items = match value {
            PackedValue::Array(items) => items,
            other => {
                return Err(EngineError::protocol(format!(
                    "expected a command array, got {other:?}"
                )))
            }
        };
        if items.is_empty() {
            return Err(EngineError::protocol(
                "expected at least one element when reading command",
            ));
        }

        let verb = items
            .remove(0)
            .as_uint()
            .and_then(|n| Verb::try_from(n).ok())
            .ok_or_else(|| EngineError::protocol("command verb should be a small integer"))?;

        Ok(Command { verb, args: items })
    }

    /// Write this command to the stream. The caller flushes once the
    /// complete response has been written.
    pub fn write_to<W: Write>(&self, output: &mut ValueWriter<W>) -> EngineResult<()> {
        output.write_array_header(1 + self.args.len())?;
        output.write_value(&PackedValue::Int(i64::from(self.verb)))?;
        for arg in &self.args {
            output.write_value(arg)?;
        }
        Ok(())
    }

    fn arg(&self, index: usize) -> EngineResult<&PackedValue> {
        self.args.get(index).ok_or_else(|| {
            EngineError::protocol(format!(
                "command {} is missing argument {index}",
                self.verb
            ))
        })
    }

    /// A key-tuple argument.
    pub fn key_arg(&self, index: usize) -> EngineResult<ColumnValues> {
        self.arg(index)?
            .as_array()
            .map(<[PackedValue]>::to_vec)
            .ok_or_else(|| {
                EngineError::protocol(format!(
                    "command {} argument {index} should be a key tuple",
                    self.verb
                ))
            })
    }

    /// A text argument.
    pub fn text_arg(&self, index: usize) -> EngineResult<String> {
        self.arg(index)?
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::protocol(format!(
                    "command {} argument {index} should be a string",
                    self.verb
                ))
            })
    }

    /// A raw-bytes argument.
    pub fn bytes_arg(&self, index: usize) -> EngineResult<Vec<u8>> {
        self.arg(index)?
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                EngineError::protocol(format!(
                    "command {} argument {index} should be raw bytes",
                    self.verb
                ))
            })
    }

    /// An integer argument.
    pub fn int_arg(&self, index: usize) -> EngineResult<i64> {
        self.arg(index)?.as_int().ok_or_else(|| {
            EngineError::protocol(format!(
                "command {} argument {index} should be an integer",
                self.verb
            ))
        })
    }
}

/// Wrap a key tuple for the wire.
pub fn key_value(key: &[PackedValue]) -> PackedValue {
    PackedValue::Array(key.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(command: &Command) -> Command {
        let mut buffer = Vec::new();
        {
            let mut writer = ValueWriter::new(&mut buffer);
            command.write_to(&mut writer).unwrap();
            writer.flush().unwrap();
        }
        let mut reader = ValueReader::new(&buffer[..]);
        Command::read_from(&mut reader).unwrap()
    }

    #[test]
    fn command_roundtrip() {
        let command = Command::new(
            verbs::HASH_NEXT,
            vec![
                key_value(&[PackedValue::Int(3)]),
                PackedValue::Bytes(vec![0xde, 0xad]),
            ],
        );
        let decoded = roundtrip(&command);
        assert_eq!(decoded, command);
        assert_eq!(decoded.key_arg(0).unwrap(), vec![PackedValue::Int(3)]);
        assert_eq!(decoded.bytes_arg(1).unwrap(), vec![0xde, 0xad]);
    }

    #[test]
    fn bare_command_roundtrip() {
        let decoded = roundtrip(&Command::new(verbs::QUIT, vec![]));
        assert_eq!(decoded.verb, verbs::QUIT);
        assert!(decoded.args.is_empty());
    }

    #[test]
    fn argument_type_errors() {
        let command = Command::new(verbs::OPEN, vec![PackedValue::Int(1)]);
        assert!(command.text_arg(0).is_err());
        assert!(command.key_arg(0).is_err());
        assert!(command.text_arg(5).is_err());
        assert_eq!(command.int_arg(0).unwrap(), 1);
    }

    #[test]
    fn rejects_non_command_values() {
        let mut buffer = Vec::new();
        {
            let mut writer = ValueWriter::new(&mut buffer);
            writer.write_value(&PackedValue::Int(1)).unwrap();
            writer.write_value(&PackedValue::Array(vec![])).unwrap();
            writer.flush().unwrap();
        }
        let mut reader = ValueReader::new(&buffer[..]);
        assert!(matches!(
            Command::read_from(&mut reader),
            Err(EngineError::Protocol(_))
        ));
        assert!(matches!(
            Command::read_from(&mut reader),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn commands_stream_back_to_back() {
        let mut buffer = Vec::new();
        {
            let mut writer = ValueWriter::new(&mut buffer);
            Command::new(verbs::OPEN, vec![PackedValue::from("footbl")])
                .write_to(&mut writer)
                .unwrap();
            Command::new(verbs::QUIT, vec![]).write_to(&mut writer).unwrap();
            writer.flush().unwrap();
        }

        let mut reader = ValueReader::new(&buffer[..]);
        assert_eq!(
            Command::read_from(&mut reader).unwrap().verb,
            verbs::OPEN
        );
        assert_eq!(
            Command::read_from(&mut reader).unwrap().verb,
            verbs::QUIT
        );
    }
}
