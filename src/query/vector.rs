//! Field ranges laid out along one index's key pattern.

use serde_json::Value;

use crate::index::{CompositeKey, KeyPattern, KeyValue};

use super::ranges::{FieldRange, FieldRangeSet};

struct FrvField {
    name: String,
    range: FieldRange,
    key_direction: i32,
}

/// The scan bounds of one index under a predicate and traversal direction.
pub struct FieldRangeVector {
    fields: Vec<FrvField>,
    direction: i32,
}

impl FieldRangeVector {
    /// Lays the set's ranges out along `key_pattern`. `direction` is the
    /// traversal direction relative to index order; `0` scans forward.
    pub fn new(frs: &FieldRangeSet, key_pattern: &KeyPattern, direction: i32) -> Self {
        let fields = key_pattern
            .fields()
            .iter()
            .map(|kf| FrvField {
                name: kf.name.clone(),
                range: frs.range(&kf.name).clone(),
                key_direction: kf.direction,
            })
            .collect();
        FieldRangeVector {
            fields,
            direction: if direction < 0 { -1 } else { 1 },
        }
    }

    pub fn direction(&self) -> i32 {
        self.direction
    }

    /// The first key in traversal order.
    pub fn start_key(&self) -> CompositeKey {
        self.extreme(self.direction)
    }

    /// The last key in traversal order.
    pub fn end_key(&self) -> CompositeKey {
        self.extreme(-self.direction)
    }

    fn extreme(&self, toward: i32) -> CompositeKey {
        self.fields
            .iter()
            .map(|f| {
                if toward * f.key_direction > 0 {
                    f.range.min_bound()
                } else {
                    f.range.max_bound()
                }
            })
            .collect()
    }

    /// Whether a composite key falls inside every field's range.
    pub fn matches(&self, key: &CompositeKey) -> bool {
        if key.len() != self.fields.len() {
            return false;
        }
        self.fields
            .iter()
            .zip(key.iter())
            .all(|(f, kv)| f.range.contains(kv))
    }

    /// Bounds for explain output: `{field: [[low, high], ...], ...}`.
    pub fn pretty_bounds(&self) -> Value {
        let mut map = serde_json::Map::new();
        for f in &self.fields {
            map.insert(f.name.clone(), f.range.bounds_json());
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(query: Value) -> FieldRangeSet {
        FieldRangeSet::new("test.c", &query, true)
    }

    #[test]
    fn test_forward_keys() {
        let frs = set(json!({"a": {"$gte": 1, "$lte": 9}}));
        let kp = KeyPattern::new([("a", 1)]);
        let frv = FieldRangeVector::new(&frs, &kp, 1);
        assert_eq!(frv.start_key(), vec![KeyValue::number(1.0)]);
        assert_eq!(frv.end_key(), vec![KeyValue::number(9.0)]);
    }

    #[test]
    fn test_reverse_keys_swap() {
        let frs = set(json!({"a": {"$gte": 1, "$lte": 9}}));
        let kp = KeyPattern::new([("a", 1)]);
        let frv = FieldRangeVector::new(&frs, &kp, -1);
        assert_eq!(frv.start_key(), vec![KeyValue::number(9.0)]);
        assert_eq!(frv.end_key(), vec![KeyValue::number(1.0)]);
    }

    #[test]
    fn test_descending_field_forward() {
        let frs = set(json!({"a": {"$gte": 1, "$lte": 9}}));
        let kp = KeyPattern::new([("a", -1)]);
        let frv = FieldRangeVector::new(&frs, &kp, 1);
        // Forward traversal of a descending index starts at the high end.
        assert_eq!(frv.start_key(), vec![KeyValue::number(9.0)]);
    }

    #[test]
    fn test_unconstrained_field_spans_everything() {
        let frs = set(json!({"a": 5}));
        let kp = KeyPattern::new([("a", 1), ("b", 1)]);
        let frv = FieldRangeVector::new(&frs, &kp, 1);
        assert_eq!(
            frv.start_key(),
            vec![KeyValue::number(5.0), KeyValue::MinKey]
        );
        assert_eq!(
            frv.end_key(),
            vec![KeyValue::number(5.0), KeyValue::MaxKey]
        );
    }

    #[test]
    fn test_matches_filters_in_gaps() {
        let frs = set(json!({"a": {"$in": [1, 5]}}));
        let kp = KeyPattern::new([("a", 1)]);
        let frv = FieldRangeVector::new(&frs, &kp, 1);
        assert!(frv.matches(&vec![KeyValue::number(1.0)]));
        assert!(!frv.matches(&vec![KeyValue::number(3.0)]));
        assert!(frv.matches(&vec![KeyValue::number(5.0)]));
    }
}
