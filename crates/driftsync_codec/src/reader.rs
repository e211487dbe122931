//! Streaming canonical decoder.

use crate::encoder::to_canonical_bytes;
use crate::error::{CodecError, CodecResult};
use crate::value::PackedValue;
use std::io::Read;

/// Maximum allowed element count for arrays and maps, preventing
/// allocation-based DoS from untrusted input.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum allowed byte/string length, preventing allocation-based DoS
/// from untrusted input.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Decode a single value from a byte slice.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid canonical encoding.
pub fn from_canonical_bytes(bytes: &[u8]) -> CodecResult<PackedValue> {
    let mut reader = ValueReader::new(bytes);
    reader.read_value()
}

/// A streaming decoder that pulls values one at a time off a byte stream.
///
/// The protocol is a plain concatenation of values with no outer framing,
/// so this reader is the unit of framing: each `read_value` call consumes
/// exactly one complete value. Input that violates the canonical encoding
/// rules (non-shortest integers, unsorted map keys, indefinite lengths) is
/// rejected rather than silently accepted, since both peers must agree on
/// a single byte form for hashing to work.
pub struct ValueReader<R: Read> {
    input: R,
}

impl<R: Read> ValueReader<R> {
    /// Create a reader over the given stream.
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Consume the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.input
    }

    /// Decode the next value from the stream.
    pub fn read_value(&mut self) -> CodecResult<PackedValue> {
        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => self.read_unsigned(additional_info).map(|n| {
                // decode to the signed variant whenever the value fits, so
                // both peers agree on which variant a wire integer becomes
                match i64::try_from(n) {
                    Ok(signed) => PackedValue::Int(signed),
                    Err(_) => PackedValue::Uint(n),
                }
            }),
            1 => {
                let n = self.read_unsigned(additional_info)?;
                let magnitude = i64::try_from(n).map_err(|_| CodecError::IntegerOverflow)?;
                Ok(PackedValue::Int(-magnitude - 1))
            }
            2 => self.read_byte_string(additional_info).map(PackedValue::Bytes),
            3 => {
                let bytes = self.read_byte_string(additional_info)?;
                let text = String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(PackedValue::Text(text))
            }
            4 => self.read_array(additional_info),
            5 => self.read_map(additional_info),
            7 => self.read_simple(additional_info),
            _ => Err(CodecError::UnsupportedTag { tag: initial_byte }),
        }
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let mut byte = [0u8; 1];
        self.input
            .read_exact(&mut byte)
            .map_err(Self::map_read_error)?;
        Ok(byte[0])
    }

    #[inline]
    fn read_exact(&mut self, buf: &mut [u8]) -> CodecResult<()> {
        self.input.read_exact(buf).map_err(Self::map_read_error)
    }

    fn map_read_error(e: std::io::Error) -> CodecError {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CodecError::UnexpectedEof
        } else {
            CodecError::Io(e)
        }
    }

    fn read_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        match additional_info {
            0..=23 => Ok(u64::from(additional_info)),
            24 => {
                let byte = self.read_byte()?;
                if byte < 24 {
                    return Err(CodecError::non_canonical("integer not shortest encoding"));
                }
                Ok(u64::from(byte))
            }
            25 => {
                let mut bytes = [0u8; 2];
                self.read_exact(&mut bytes)?;
                let value = u16::from_be_bytes(bytes);
                if u8::try_from(value).is_ok() {
                    return Err(CodecError::non_canonical("integer not shortest encoding"));
                }
                Ok(u64::from(value))
            }
            26 => {
                let mut bytes = [0u8; 4];
                self.read_exact(&mut bytes)?;
                let value = u32::from_be_bytes(bytes);
                if u16::try_from(value).is_ok() {
                    return Err(CodecError::non_canonical("integer not shortest encoding"));
                }
                Ok(u64::from(value))
            }
            27 => {
                let mut bytes = [0u8; 8];
                self.read_exact(&mut bytes)?;
                let value = u64::from_be_bytes(bytes);
                if u32::try_from(value).is_ok() {
                    return Err(CodecError::non_canonical("integer not shortest encoding"));
                }
                Ok(value)
            }
            28..=30 => Err(CodecError::non_canonical("reserved additional info")),
            31 => Err(CodecError::non_canonical("indefinite lengths are forbidden")),
            _ => unreachable!(),
        }
    }

    fn read_byte_string(&mut self, additional_info: u8) -> CodecResult<Vec<u8>> {
        let len = self.read_unsigned(additional_info)?;
        if len > MAX_BYTES_LENGTH {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_BYTES_LENGTH,
            });
        }
        let mut bytes = vec![0u8; len as usize];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_array(&mut self, additional_info: u8) -> CodecResult<PackedValue> {
        let len = self.read_unsigned(additional_info)?;
        if len > MAX_CONTAINER_ELEMENTS {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_CONTAINER_ELEMENTS,
            });
        }
        let mut items = Vec::with_capacity(len.min(4096) as usize);
        for _ in 0..len {
            items.push(self.read_value()?);
        }
        Ok(PackedValue::Array(items))
    }

    fn read_map(&mut self, additional_info: u8) -> CodecResult<PackedValue> {
        let len = self.read_unsigned(additional_info)?;
        if len > MAX_CONTAINER_ELEMENTS {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_CONTAINER_ELEMENTS,
            });
        }
        let mut pairs = Vec::with_capacity(len.min(4096) as usize);
        let mut prev_key_bytes: Option<Vec<u8>> = None;

        for _ in 0..len {
            let key = self.read_value()?;
            // a decoded key re-encodes to exactly the bytes it arrived as,
            // so the ordering check can work from the re-encoded form
            let key_bytes = to_canonical_bytes(&key);
            if let Some(ref prev) = prev_key_bytes {
                if compare_encoded(prev, &key_bytes) != std::cmp::Ordering::Less {
                    return Err(CodecError::non_canonical("map keys not in sorted order"));
                }
            }
            prev_key_bytes = Some(key_bytes);

            let value = self.read_value()?;
            pairs.push((key, value));
        }

        Ok(PackedValue::Map(pairs))
    }

    fn read_simple(&mut self, additional_info: u8) -> CodecResult<PackedValue> {
        match additional_info {
            20 => Ok(PackedValue::Bool(false)),
            21 => Ok(PackedValue::Bool(true)),
            22 => Ok(PackedValue::Nil),
            25 | 26 => Err(CodecError::non_canonical(
                "floats must be encoded full-width",
            )),
            27 => {
                let mut bytes = [0u8; 8];
                self.read_exact(&mut bytes)?;
                Ok(PackedValue::Float(f64::from_bits(u64::from_be_bytes(
                    bytes,
                ))))
            }
            31 => Err(CodecError::non_canonical("break without indefinite")),
            other => Err(CodecError::UnsupportedTag {
                tag: (7 << 5) | other,
            }),
        }
    }
}

/// Compare two encoded values canonically: length-first, then bytewise.
fn compare_encoded(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Equal => a.cmp(b),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_nil() {
        assert_eq!(from_canonical_bytes(&[0xf6]).unwrap(), PackedValue::Nil);
    }

    #[test]
    fn decode_bool() {
        assert_eq!(
            from_canonical_bytes(&[0xf4]).unwrap(),
            PackedValue::Bool(false)
        );
        assert_eq!(
            from_canonical_bytes(&[0xf5]).unwrap(),
            PackedValue::Bool(true)
        );
    }

    #[test]
    fn decode_integers() {
        assert_eq!(from_canonical_bytes(&[0x00]).unwrap(), PackedValue::Int(0));
        assert_eq!(from_canonical_bytes(&[0x17]).unwrap(), PackedValue::Int(23));
        assert_eq!(
            from_canonical_bytes(&[0x18, 24]).unwrap(),
            PackedValue::Int(24)
        );
        assert_eq!(
            from_canonical_bytes(&[0x19, 0x01, 0x00]).unwrap(),
            PackedValue::Int(256)
        );
        assert_eq!(from_canonical_bytes(&[0x20]).unwrap(), PackedValue::Int(-1));
        assert_eq!(
            from_canonical_bytes(&[0x38, 99]).unwrap(),
            PackedValue::Int(-100)
        );
    }

    #[test]
    fn decode_large_unsigned_keeps_uint_variant() {
        let mut bytes = vec![0x1b];
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(
            from_canonical_bytes(&bytes).unwrap(),
            PackedValue::Uint(u64::MAX)
        );
    }

    #[test]
    fn decode_float() {
        let mut bytes = vec![0xfb];
        bytes.extend_from_slice(&2.25f64.to_bits().to_be_bytes());
        assert_eq!(
            from_canonical_bytes(&bytes).unwrap(),
            PackedValue::Float(2.25)
        );
    }

    #[test]
    fn reject_short_floats() {
        assert!(matches!(
            from_canonical_bytes(&[0xf9, 0x00, 0x00]),
            Err(CodecError::NonCanonical { .. })
        ));
        assert!(matches!(
            from_canonical_bytes(&[0xfa, 0x00, 0x00, 0x00, 0x00]),
            Err(CodecError::NonCanonical { .. })
        ));
    }

    #[test]
    fn decode_bytes_and_text() {
        assert_eq!(
            from_canonical_bytes(&[0x43, 1, 2, 3]).unwrap(),
            PackedValue::Bytes(vec![1, 2, 3])
        );
        assert_eq!(
            from_canonical_bytes(&[0x61, b'a']).unwrap(),
            PackedValue::from("a")
        );
    }

    #[test]
    fn decode_array() {
        assert_eq!(
            from_canonical_bytes(&[0x80]).unwrap(),
            PackedValue::Array(vec![])
        );
        assert_eq!(
            from_canonical_bytes(&[0x82, 0x01, 0x02]).unwrap(),
            PackedValue::Array(vec![PackedValue::Int(1), PackedValue::Int(2)])
        );
    }

    #[test]
    fn decode_map() {
        assert_eq!(
            from_canonical_bytes(&[0xa1, 0x61, b'a', 0x01]).unwrap(),
            PackedValue::Map(vec![(PackedValue::from("a"), PackedValue::Int(1))])
        );
    }

    #[test]
    fn reject_unsorted_map_keys() {
        assert!(matches!(
            from_canonical_bytes(&[0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02]),
            Err(CodecError::NonCanonical { .. })
        ));
    }

    #[test]
    fn reject_non_shortest_encoding() {
        assert!(matches!(
            from_canonical_bytes(&[0x18, 23]),
            Err(CodecError::NonCanonical { .. })
        ));
        assert!(matches!(
            from_canonical_bytes(&[0x19, 0x00, 0xff]),
            Err(CodecError::NonCanonical { .. })
        ));
    }

    #[test]
    fn reject_indefinite_length() {
        assert!(matches!(
            from_canonical_bytes(&[0x5f, 0x41, b'a', 0xff]),
            Err(CodecError::NonCanonical { .. })
        ));
        assert!(matches!(
            from_canonical_bytes(&[0x9f, 0x01, 0xff]),
            Err(CodecError::NonCanonical { .. })
        ));
    }

    #[test]
    fn unexpected_eof() {
        assert!(matches!(
            from_canonical_bytes(&[]),
            Err(CodecError::UnexpectedEof)
        ));
        assert!(matches!(
            from_canonical_bytes(&[0x18]),
            Err(CodecError::UnexpectedEof)
        ));
        assert!(matches!(
            from_canonical_bytes(&[0x19, 0x01]),
            Err(CodecError::UnexpectedEof)
        ));
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert!(matches!(
            from_canonical_bytes(&[0x62, 0xff, 0xfe]),
            Err(CodecError::InvalidUtf8)
        ));
    }

    #[test]
    fn streaming_concatenation() {
        // two values back to back with no framing between them
        let mut bytes = to_canonical_bytes(&PackedValue::Int(1));
        bytes.extend(to_canonical_bytes(&PackedValue::from("next")));

        let mut reader = ValueReader::new(&bytes[..]);
        assert_eq!(reader.read_value().unwrap(), PackedValue::Int(1));
        assert_eq!(reader.read_value().unwrap(), PackedValue::from("next"));
        assert!(reader.read_value().unwrap_err().is_eof());
    }
}
