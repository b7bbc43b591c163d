//! Resolution of caller-supplied min/max key bounds to an index.
//!
//! The audit walks the two bounds documents in parallel to infer a scan
//! direction and the first position where they diverge, then picks an
//! index whose key pattern carries the same fields in order with a
//! compatible direction sign at that position. A missing side is filled
//! with per-field extreme keys and both sides are truncated to the
//! selected pattern.

use serde_json::Value;

use crate::catalog::Collection;
use crate::index::{CompositeKey, KeyPattern, KeyValue};

use super::errors::{PlannerResult, QueryError};

/// The outcome: a concrete index plus completed, pattern-aligned bounds.
#[derive(Debug, Clone)]
pub struct ResolvedRange {
    pub idx_no: usize,
    pub key_pattern: KeyPattern,
    pub start: CompositeKey,
    pub end: CompositeKey,
}

type KeyDoc = Vec<(String, KeyValue)>;

fn key_doc(doc: Option<&Value>) -> PlannerResult<KeyDoc> {
    let obj = match doc {
        None => return Ok(Vec::new()),
        Some(Value::Object(obj)) => obj,
        Some(_) => {
            return Err(QueryError::NoIndexForRange(
                "min/max must be documents".into(),
            ))
        }
    };
    let mut out = Vec::with_capacity(obj.len());
    for (name, v) in obj {
        let kv = KeyValue::from_json(v).ok_or_else(|| {
            QueryError::NoIndexForRange(format!("unrepresentable bound value for field '{}'", name))
        })?;
        out.push((name.clone(), kv));
    }
    Ok(out)
}

/// Direction and first significant position of a min/max pair sharing a
/// field pattern. `None` when the patterns differ.
fn key_audit(min: &KeyDoc, max: &KeyDoc) -> Option<(i32, i32)> {
    if min.len() != max.len() {
        return None;
    }
    let mut direction = 0;
    let mut first_significant_field = 0i32;
    for ((min_name, min_v), (max_name, max_v)) in min.iter().zip(max.iter()) {
        if min_name != max_name {
            return None;
        }
        match min_v.cmp(max_v) {
            std::cmp::Ordering::Less => direction = 1,
            std::cmp::Ordering::Greater => direction = -1,
            std::cmp::Ordering::Equal => {}
        }
        if direction != 0 {
            break;
        }
        first_significant_field += 1;
    }
    Some((direction, first_significant_field))
}

fn flexible_key_audit(min: &KeyDoc, max: &KeyDoc) -> Option<(i32, i32)> {
    if min.is_empty() || max.is_empty() {
        // A single-sided bound tolerates any field order.
        Some((1, -1))
    } else {
        key_audit(min, max)
    }
}

/// Whether an index pattern carries the sample's fields in order with a
/// compatible direction sign at the first significant position.
fn index_works(
    pattern: &KeyPattern,
    sample: &KeyDoc,
    direction: i32,
    first_significant_field: i32,
) -> bool {
    if pattern.n_fields() != sample.len() {
        return false;
    }
    for (i, (pf, (sample_name, _))) in pattern.fields().iter().zip(sample.iter()).enumerate() {
        if pf.name != *sample_name {
            return false;
        }
        if i as i32 == first_significant_field && (direction > 0) != (pf.direction > 0) {
            return false;
        }
    }
    true
}

/// The extreme key of an index in the given base direction: the largest
/// key for `+1`, the smallest for `-1`, accounting for per-field signs.
fn extreme_key_for_index(pattern: &KeyPattern, base_direction: i32) -> CompositeKey {
    pattern
        .fields()
        .iter()
        .map(|f| {
            if f.direction * base_direction > 0 {
                KeyValue::MaxKey
            } else {
                KeyValue::MinKey
            }
        })
        .collect()
}

fn truncate_to_pattern(doc: &KeyDoc, pattern: &KeyPattern) -> CompositeKey {
    pattern
        .fields()
        .iter()
        .map(|f| {
            doc.iter()
                .find(|(name, _)| *name == f.name)
                .map(|(_, v)| v.clone())
                .unwrap_or(KeyValue::MinKey)
        })
        .collect()
}

/// Resolves min/max bounds to an index, validating a requested key
/// pattern when one was supplied (a hint). Plugin-less indexes are
/// preferred when searching; the `_id` singleton index is accepted for
/// the `_id` pattern.
pub fn index_for_range(
    collection: &Collection,
    min: Option<&Value>,
    max: Option<&Value>,
    key_pattern: Option<&KeyPattern>,
) -> PlannerResult<ResolvedRange> {
    let min_doc = key_doc(min)?;
    let max_doc = key_doc(max)?;
    if min_doc.is_empty() && max_doc.is_empty() {
        return Err(QueryError::NoIndexForRange(
            "one of min or max must be specified".into(),
        ));
    }

    let (direction, first_significant_field) = flexible_key_audit(&min_doc, &max_doc)
        .ok_or_else(|| {
            QueryError::NoIndexForRange("min and max keys do not share pattern".into())
        })?;
    let sample = if min_doc.is_empty() {
        &max_doc
    } else {
        &min_doc
    };

    let (idx_no, pattern) = match key_pattern {
        None => {
            let found = collection.indexes().iter().enumerate().find(|(_, ii)| {
                ii.spec().plugin().is_none()
                    && index_works(ii.key_pattern(), sample, direction, first_significant_field)
            });
            match found {
                Some((no, ii)) => (no, ii.key_pattern().clone()),
                None => {
                    return Err(QueryError::NoIndexForRange(
                        "no index found for specified keyPattern".into(),
                    ))
                }
            }
        }
        Some(requested) => {
            if !index_works(requested, sample, direction, first_significant_field) {
                return Err(QueryError::NoIndexForRange(
                    "requested keyPattern does not match specified keys".into(),
                ));
            }
            let found = collection.indexes().iter().enumerate().find(|(_, ii)| {
                ii.key_pattern() == requested
                    || (requested.is_id_pattern() && ii.is_id_index())
            });
            match found {
                Some((no, ii)) => (no, ii.key_pattern().clone()),
                None => {
                    return Err(QueryError::NoIndexForRange(format!(
                        "no index found for specified keyPattern: {}",
                        requested
                    )))
                }
            }
        }
    };

    let start = if min_doc.is_empty() {
        extreme_key_for_index(&pattern, -1)
    } else {
        truncate_to_pattern(&min_doc, &pattern)
    };
    let end = if max_doc.is_empty() {
        extreme_key_for_index(&pattern, 1)
    } else {
        truncate_to_pattern(&max_doc, &pattern)
    };

    Ok(ResolvedRange {
        idx_no,
        key_pattern: pattern,
        start,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexDetails, IndexSpec};
    use serde_json::json;

    fn collection() -> Collection {
        Collection::new("test.c")
            .with_index(IndexDetails::new(
                "_id_",
                IndexSpec::new(KeyPattern::new([("_id", 1)])),
            ))
            .with_index(IndexDetails::new(
                "a_1",
                IndexSpec::new(KeyPattern::new([("a", 1)])),
            ))
            .with_index(IndexDetails::new(
                "b_-1",
                IndexSpec::new(KeyPattern::new([("b", -1)])),
            ))
    }

    #[test]
    fn test_neither_bound_rejected() {
        let coll = collection();
        let err = index_for_range(&coll, None, None, None).unwrap_err();
        assert_eq!(err.code(), "VELLUM_QUERY_NO_INDEX_FOR_RANGE");
    }

    #[test]
    fn test_resolves_forward_range() {
        let coll = collection();
        let min = json!({"a": 1});
        let max = json!({"a": 9});
        let r = index_for_range(&coll, Some(&min), Some(&max), None).unwrap();
        assert_eq!(r.idx_no, 1);
        assert_eq!(r.start, vec![KeyValue::number(1.0)]);
        assert_eq!(r.end, vec![KeyValue::number(9.0)]);
    }

    #[test]
    fn test_descending_direction_picks_descending_index() {
        let coll = collection();
        let min = json!({"b": 9});
        let max = json!({"b": 1});
        let r = index_for_range(&coll, Some(&min), Some(&max), None).unwrap();
        assert_eq!(r.idx_no, 2);
    }

    #[test]
    fn test_mismatched_patterns_rejected() {
        let coll = collection();
        let min = json!({"a": 1});
        let max = json!({"b": 9});
        let err = index_for_range(&coll, Some(&min), Some(&max), None).unwrap_err();
        assert!(err.to_string().contains("do not share pattern"));
    }

    #[test]
    fn test_missing_side_filled_with_extremes() {
        let coll = collection();
        let min = json!({"a": 5});
        let r = index_for_range(&coll, Some(&min), None, None).unwrap();
        assert_eq!(r.start, vec![KeyValue::number(5.0)]);
        assert_eq!(r.end, vec![KeyValue::MaxKey]);

        let max = json!({"a": 5});
        let r = index_for_range(&coll, None, Some(&max), None).unwrap();
        assert_eq!(r.start, vec![KeyValue::MinKey]);
        assert_eq!(r.end, vec![KeyValue::number(5.0)]);
    }

    #[test]
    fn test_requested_pattern_must_match_keys() {
        let coll = collection();
        let min = json!({"a": 1});
        let kp = KeyPattern::new([("b", -1)]);
        let err = index_for_range(&coll, Some(&min), None, Some(&kp)).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_id_singleton_accepted() {
        let coll = collection();
        let min = json!({"_id": "m"});
        let kp = KeyPattern::new([("_id", 1)]);
        let r = index_for_range(&coll, Some(&min), None, Some(&kp)).unwrap();
        assert_eq!(r.idx_no, 0);
    }

    #[test]
    fn test_no_matching_index() {
        let coll = collection();
        let min = json!({"zzz": 1});
        let err = index_for_range(&coll, Some(&min), None, None).unwrap_err();
        assert!(err.to_string().contains("no index found"));
    }
}
