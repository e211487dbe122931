//! Value ordering for primary-key tuples.
//!
//! Key tuples compare lexicographically per column by VALUE — numeric for
//! integers, bytewise for text and binary — which is the order SQL
//! `ORDER BY` produces. This is deliberately not the codec's
//! encoded-bytes order: `10` must sort after `9`, and `"ab"` between
//! `"aa"` and `"b"`.

use driftsync_codec::PackedValue;
use driftsync_schema::ColumnValues;
use std::cmp::Ordering;

/// Rank used to give mixed-variant comparisons a stable total order.
/// Values in one key column share a variant in practice, so the rank only
/// matters as a tiebreak against malformed input.
fn variant_rank(value: &PackedValue) -> u8 {
    match value {
        PackedValue::Nil => 0,
        PackedValue::Bool(_) => 1,
        PackedValue::Int(_) | PackedValue::Uint(_) => 2,
        PackedValue::Float(_) => 3,
        PackedValue::Bytes(_) => 4,
        PackedValue::Text(_) => 5,
        PackedValue::Array(_) => 6,
        PackedValue::Map(_) => 7,
    }
}

/// Compare two values the way a database orders them.
pub fn compare_values(a: &PackedValue, b: &PackedValue) -> Ordering {
    use PackedValue::*;
    match (a, b) {
        (Nil, Nil) => Ordering::Equal,
        (Bool(x), Bool(y)) => x.cmp(y),
        (Int(x), Int(y)) => x.cmp(y),
        (Uint(x), Uint(y)) => x.cmp(y),
        (Int(x), Uint(y)) => {
            if *x < 0 {
                Ordering::Less
            } else {
                (*x as u64).cmp(y)
            }
        }
        (Uint(x), Int(y)) => {
            if *y < 0 {
                Ordering::Greater
            } else {
                x.cmp(&(*y as u64))
            }
        }
        (Float(x), Float(y)) => x.total_cmp(y),
        (Bytes(x), Bytes(y)) => x.cmp(y),
        (Text(x), Text(y)) => x.cmp(y),
        (Array(x), Array(y)) => compare_keys(x, y),
        _ => variant_rank(a).cmp(&variant_rank(b)),
    }
}

/// Compare two key tuples lexicographically across their columns.
pub fn compare_keys(a: &[PackedValue], b: &[PackedValue]) -> Ordering {
    for (av, bv) in a.iter().zip(b.iter()) {
        match compare_values(av, bv) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// A key tuple wrapper ordered by [`compare_keys`], usable as an ordered
/// map key.
#[derive(Debug, Clone)]
pub struct OrderedKey(pub ColumnValues);

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        compare_keys(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.0, &other.0)
    }
}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_compare_numerically() {
        assert_eq!(
            compare_values(&PackedValue::Int(9), &PackedValue::Int(10)),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&PackedValue::Int(-1), &PackedValue::Uint(0)),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&PackedValue::Uint(u64::MAX), &PackedValue::Int(5)),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&PackedValue::Int(5), &PackedValue::Uint(5)),
            Ordering::Equal
        );
    }

    #[test]
    fn text_compares_bytewise_not_length_first() {
        assert_eq!(
            compare_values(&PackedValue::from("ab"), &PackedValue::from("b")),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&PackedValue::from("aa"), &PackedValue::from("ab")),
            Ordering::Less
        );
    }

    #[test]
    fn composite_keys_compare_per_column() {
        let a = vec![PackedValue::from("aa"), PackedValue::Int(100)];
        let b = vec![PackedValue::from("aa"), PackedValue::Int(968116383)];
        let c = vec![PackedValue::from("ab"), PackedValue::Int(1)];
        assert_eq!(compare_keys(&a, &b), Ordering::Less);
        assert_eq!(compare_keys(&b, &c), Ordering::Less);
    }

    #[test]
    fn ordered_key_sorts_in_a_map() {
        use std::collections::BTreeMap;
        let mut map = BTreeMap::new();
        map.insert(OrderedKey(vec![PackedValue::Int(10)]), "ten");
        map.insert(OrderedKey(vec![PackedValue::Int(2)]), "two");
        map.insert(OrderedKey(vec![PackedValue::Int(100)]), "hundred");

        let order: Vec<&str> = map.values().copied().collect();
        assert_eq!(order, ["two", "ten", "hundred"]);
    }
}
