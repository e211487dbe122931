//! Streaming canonical writer.

use crate::encoder::CanonicalEncoder;
use crate::error::CodecResult;
use crate::value::PackedValue;
use std::io::Write;

/// A streaming writer that appends canonical values to a byte stream.
///
/// Output is buffered; the protocol requires a `flush` after each complete
/// logical response so the peer is never left waiting on bytes sitting in
/// the buffer.
pub struct ValueWriter<W: Write> {
    output: std::io::BufWriter<W>,
}

impl<W: Write> ValueWriter<W> {
    /// Create a writer over the given stream.
    pub fn new(output: W) -> Self {
        Self {
            output: std::io::BufWriter::new(output),
        }
    }

    /// Write a single value.
    pub fn write_value(&mut self, value: &PackedValue) -> CodecResult<()> {
        let mut encoder = CanonicalEncoder::with_capacity(64);
        encoder.encode(value);
        self.output.write_all(encoder.as_bytes())?;
        Ok(())
    }

    /// Write an array header; the caller must follow with exactly `len`
    /// values.
    pub fn write_array_header(&mut self, len: usize) -> CodecResult<()> {
        let mut encoder = CanonicalEncoder::with_capacity(9);
        encoder.encode_array_header(len);
        self.output.write_all(encoder.as_bytes())?;
        Ok(())
    }

    /// Flush buffered bytes through to the underlying stream.
    pub fn flush(&mut self) -> CodecResult<()> {
        self.output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ValueReader;

    #[test]
    fn writes_values_reader_can_stream() {
        let mut buffer = Vec::new();
        {
            let mut writer = ValueWriter::new(&mut buffer);
            writer.write_value(&PackedValue::Int(7)).unwrap();
            writer
                .write_value(&PackedValue::Array(vec![
                    PackedValue::from("a"),
                    PackedValue::Nil,
                ]))
                .unwrap();
            writer.flush().unwrap();
        }

        let mut reader = ValueReader::new(&buffer[..]);
        assert_eq!(reader.read_value().unwrap(), PackedValue::Int(7));
        assert_eq!(
            reader.read_value().unwrap(),
            PackedValue::Array(vec![PackedValue::from("a"), PackedValue::Nil])
        );
    }

    #[test]
    fn array_header_then_elements() {
        let mut buffer = Vec::new();
        {
            let mut writer = ValueWriter::new(&mut buffer);
            writer.write_array_header(2).unwrap();
            writer.write_value(&PackedValue::Int(1)).unwrap();
            writer.write_value(&PackedValue::Int(2)).unwrap();
            writer.flush().unwrap();
        }

        let mut reader = ValueReader::new(&buffer[..]);
        assert_eq!(
            reader.read_value().unwrap(),
            PackedValue::Array(vec![PackedValue::Int(1), PackedValue::Int(2)])
        );
    }
}
