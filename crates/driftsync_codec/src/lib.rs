//! # Driftsync Codec
//!
//! Canonical wire-value encoding for driftsync.
//!
//! Every key, row cell, and protocol command travels as a [`PackedValue`]
//! in a self-describing tag-length-value encoding. The encoding is
//! deterministic:
//!
//! - Integers use the shortest possible encoding
//! - Floats are always full-width doubles
//! - Map keys are sorted by their encoded form
//! - No indefinite-length items
//!
//! Determinism matters beyond the wire: both peers feed the canonical bytes
//! of each row into a digest and compare the results, so any two equal rows
//! must produce identical bytes on both ends.
//!
//! ## Usage
//!
//! ```
//! use driftsync_codec::{from_canonical_bytes, to_canonical_bytes, PackedValue};
//!
//! let value = PackedValue::Int(42);
//! let bytes = to_canonical_bytes(&value);
//! let decoded = from_canonical_bytes(&bytes).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod encoder;
mod error;
mod reader;
mod value;
mod writer;

pub use encoder::{to_canonical_bytes, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use reader::{from_canonical_bytes, ValueReader};
pub use value::PackedValue;
pub use writer::ValueWriter;

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: PackedValue) {
        let bytes = to_canonical_bytes(&value);
        let decoded = from_canonical_bytes(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn roundtrip_scalars() {
        roundtrip(PackedValue::Nil);
        roundtrip(PackedValue::Bool(true));
        roundtrip(PackedValue::Bool(false));
        roundtrip(PackedValue::Int(0));
        roundtrip(PackedValue::Int(i64::MIN));
        roundtrip(PackedValue::Int(i64::MAX));
        roundtrip(PackedValue::Uint(u64::MAX));
        roundtrip(PackedValue::Float(0.0));
        roundtrip(PackedValue::Float(-1.5e300));
        roundtrip(PackedValue::Float(f64::NAN));
        roundtrip(PackedValue::Text("hello world".into()));
        roundtrip(PackedValue::Bytes(vec![0x00, 0x27, 0x5c, 0xff]));
    }

    #[test]
    fn roundtrip_row_shaped_array() {
        roundtrip(PackedValue::Array(vec![
            PackedValue::Int(2),
            PackedValue::Nil,
            PackedValue::Text("test".into()),
            PackedValue::Bytes(vec![0, 1, 2]),
        ]));
    }

    #[test]
    fn roundtrip_nested_map() {
        roundtrip(PackedValue::map(vec![
            (
                PackedValue::from("tables"),
                PackedValue::Array(vec![PackedValue::map(vec![
                    (PackedValue::from("name"), PackedValue::from("footbl")),
                    (PackedValue::from("rows"), PackedValue::Int(5)),
                ])]),
            ),
            (PackedValue::from("version"), PackedValue::Int(1)),
        ]));
    }
}
