//! Canonical encoder.

use crate::value::PackedValue;

/// Encode a value to its canonical byte form.
///
/// The output is deterministic: map keys are sorted by their encoded form
/// (length-first, then bytewise), integers use the shortest possible
/// encoding, floats are always full-width doubles, and no indefinite-length
/// constructs exist. Identical values therefore always produce identical
/// bytes, which is what lets both peers hash row ranges independently and
/// compare the digests.
pub fn to_canonical_bytes(value: &PackedValue) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value);
    encoder.into_bytes()
}

/// A canonical encoder accumulating into a byte buffer.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value onto the end of the buffer.
    pub fn encode(&mut self, value: &PackedValue) {
        match value {
            PackedValue::Nil => self.buffer.push(0xf6),
            PackedValue::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            PackedValue::Int(n) => self.encode_int(*n),
            PackedValue::Uint(n) => self.encode_unsigned(0, *n),
            PackedValue::Float(f) => {
                self.buffer.push(0xfb);
                self.buffer.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            PackedValue::Bytes(b) => {
                self.encode_unsigned(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            PackedValue::Text(s) => {
                self.encode_unsigned(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            PackedValue::Array(items) => {
                self.encode_array_header(items.len());
                for item in items {
                    self.encode(item);
                }
            }
            PackedValue::Map(pairs) => self.encode_map(pairs),
        }
    }

    /// Encode just an array header for the given element count. The caller
    /// is responsible for encoding exactly that many values afterwards.
    pub fn encode_array_header(&mut self, len: usize) {
        self.encode_unsigned(4, len as u64);
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_int(&mut self, n: i64) {
        if n >= 0 {
            self.encode_unsigned(0, n as u64);
        } else {
            // negative integers encode the magnitude -(n+1), so -1 encodes
            // as argument 0, -2 as 1, and so on; safe for all of i64
            self.encode_unsigned(1, (-(n + 1)) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_unsigned(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.push(mt | (value as u8));
        } else if u8::try_from(value).is_ok() {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if u16::try_from(value).is_ok() {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if u32::try_from(value).is_ok() {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(PackedValue, PackedValue)]) {
        // sort by encoded key so logically-equal maps encode identically
        // regardless of construction order
        let mut encoded_pairs: Vec<(Vec<u8>, &PackedValue)> = pairs
            .iter()
            .map(|(key, value)| (to_canonical_bytes(key), value))
            .collect();
        encoded_pairs.sort_by(|a, b| match a.0.len().cmp(&b.0.len()) {
            std::cmp::Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });

        self.encode_unsigned(5, pairs.len() as u64);
        for (encoded_key, value) in encoded_pairs {
            self.buffer.extend_from_slice(&encoded_key);
            self.encode(value);
        }
    }
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_nil() {
        assert_eq!(to_canonical_bytes(&PackedValue::Nil), vec![0xf6]);
    }

    #[test]
    fn encode_bool() {
        assert_eq!(to_canonical_bytes(&PackedValue::Bool(false)), vec![0xf4]);
        assert_eq!(to_canonical_bytes(&PackedValue::Bool(true)), vec![0xf5]);
    }

    #[test]
    fn encode_small_positive_integers() {
        // 0-23 encode in one byte
        assert_eq!(to_canonical_bytes(&PackedValue::Int(0)), vec![0x00]);
        assert_eq!(to_canonical_bytes(&PackedValue::Int(1)), vec![0x01]);
        assert_eq!(to_canonical_bytes(&PackedValue::Int(23)), vec![0x17]);
    }

    #[test]
    fn encode_wider_integers() {
        assert_eq!(to_canonical_bytes(&PackedValue::Int(24)), vec![0x18, 24]);
        assert_eq!(to_canonical_bytes(&PackedValue::Int(255)), vec![0x18, 255]);
        assert_eq!(
            to_canonical_bytes(&PackedValue::Int(256)),
            vec![0x19, 0x01, 0x00]
        );
        assert_eq!(
            to_canonical_bytes(&PackedValue::Int(65536)),
            vec![0x1a, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn encode_negative_integers() {
        assert_eq!(to_canonical_bytes(&PackedValue::Int(-1)), vec![0x20]);
        assert_eq!(to_canonical_bytes(&PackedValue::Int(-24)), vec![0x37]);
        assert_eq!(to_canonical_bytes(&PackedValue::Int(-25)), vec![0x38, 24]);
        assert_eq!(to_canonical_bytes(&PackedValue::Int(-100)), vec![0x38, 99]);
    }

    #[test]
    fn int_and_uint_encode_identically() {
        assert_eq!(
            to_canonical_bytes(&PackedValue::Int(1000)),
            to_canonical_bytes(&PackedValue::Uint(1000))
        );
    }

    #[test]
    fn encode_large_unsigned() {
        let mut expected = vec![0x1b];
        expected.extend_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(to_canonical_bytes(&PackedValue::Uint(u64::MAX)), expected);
    }

    #[test]
    fn encode_float_is_always_double() {
        let mut expected = vec![0xfb];
        expected.extend_from_slice(&1.5f64.to_bits().to_be_bytes());
        assert_eq!(to_canonical_bytes(&PackedValue::Float(1.5)), expected);
    }

    #[test]
    fn encode_bytes() {
        assert_eq!(to_canonical_bytes(&PackedValue::Bytes(vec![])), vec![0x40]);
        assert_eq!(
            to_canonical_bytes(&PackedValue::Bytes(vec![1, 2, 3])),
            vec![0x43, 1, 2, 3]
        );
    }

    #[test]
    fn encode_text() {
        assert_eq!(
            to_canonical_bytes(&PackedValue::Text(String::new())),
            vec![0x60]
        );
        assert_eq!(
            to_canonical_bytes(&PackedValue::from("hello")),
            vec![0x65, b'h', b'e', b'l', b'l', b'o']
        );
    }

    #[test]
    fn encode_array() {
        assert_eq!(to_canonical_bytes(&PackedValue::Array(vec![])), vec![0x80]);
        assert_eq!(
            to_canonical_bytes(&PackedValue::Array(vec![
                PackedValue::Int(1),
                PackedValue::Int(2)
            ])),
            vec![0x82, 0x01, 0x02]
        );
    }

    #[test]
    fn encode_map_sorted() {
        // keys sort length-first, then bytewise, whatever the input order
        let map = PackedValue::Map(vec![
            (PackedValue::from("bb"), PackedValue::Int(2)),
            (PackedValue::from("a"), PackedValue::Int(1)),
        ]);
        assert_eq!(
            to_canonical_bytes(&map),
            vec![0xa2, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]
        );
    }

    #[test]
    fn deterministic_map_encoding() {
        let map1 = PackedValue::Map(vec![
            (PackedValue::from("z"), PackedValue::Int(1)),
            (PackedValue::from("a"), PackedValue::Int(2)),
        ]);
        let map2 = PackedValue::Map(vec![
            (PackedValue::from("a"), PackedValue::Int(2)),
            (PackedValue::from("z"), PackedValue::Int(1)),
        ]);
        assert_eq!(to_canonical_bytes(&map1), to_canonical_bytes(&map2));
    }
}
