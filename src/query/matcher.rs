//! Document matching.
//!
//! Evaluates a predicate document against candidate documents: implicit
//! AND across fields, comparison operators, `$in`, `$ne`, `$exists`, and
//! top-level `$or`. No type coercion beyond numeric widening: strings
//! never match numbers, and null field values never match.
//!
//! For `$or` execution the matcher additionally carries deduplication
//! constraints: a document inside a previously scanned clause range is
//! rejected, since the earlier clause already returned it.

use serde_json::Value;

use super::ranges::RangeConstraint;

/// A reusable predicate evaluator with `$or` dedup state.
#[derive(Debug, Clone)]
pub struct Matcher {
    query: Value,
    exclusions: Vec<RangeConstraint>,
}

impl Matcher {
    pub fn new(query: &Value) -> Self {
        Matcher {
            query: query.clone(),
            exclusions: Vec::new(),
        }
    }

    /// Registers the range scanned by a finished `$or` clause; documents
    /// inside it are excluded from later clauses.
    pub fn advance_or_clause(&mut self, constraint: RangeConstraint) {
        self.exclusions.push(constraint);
    }

    /// The matcher for the next `$or` clause, carrying accumulated
    /// exclusions.
    pub fn next_clause_matcher(&self) -> Matcher {
        self.clone()
    }

    pub fn matches(&self, doc: &Value) -> bool {
        if !matches_query(&self.query, doc) {
            return false;
        }
        !self.exclusions.iter().any(|c| c.contains_doc(doc))
    }
}

fn matches_query(query: &Value, doc: &Value) -> bool {
    let obj = match query {
        Value::Object(obj) => obj,
        _ => return false,
    };
    for (field, operand) in obj {
        if field == "$or" {
            match operand {
                Value::Array(clauses) if !clauses.is_empty() => {
                    if !clauses.iter().any(|c| matches_query(c, doc)) {
                        return false;
                    }
                }
                _ => return false,
            }
            continue;
        }
        if field.starts_with('$') {
            continue;
        }
        if !matches_field(doc.get(field.as_str()), operand) {
            return false;
        }
    }
    true
}

fn matches_field(actual: Option<&Value>, operand: &Value) -> bool {
    match operand {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            ops.iter().all(|(op, v)| matches_op(actual, op, v))
        }
        expected => match actual {
            Some(actual) => eq_match(actual, expected),
            None => false,
        },
    }
}

fn matches_op(actual: Option<&Value>, op: &str, operand: &Value) -> bool {
    if op == "$exists" {
        return operand.as_bool().unwrap_or(true) == actual.is_some();
    }
    let actual = match actual {
        Some(v) => v,
        None => return false,
    };
    if actual.is_null() {
        return false;
    }
    match op {
        "$eq" => eq_match(actual, operand),
        "$ne" => !eq_match(actual, operand),
        "$gt" => any_element(actual, |v| compare(v, operand) == Some(std::cmp::Ordering::Greater)),
        "$gte" => any_element(actual, |v| {
            matches!(
                compare(v, operand),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            )
        }),
        "$lt" => any_element(actual, |v| compare(v, operand) == Some(std::cmp::Ordering::Less)),
        "$lte" => any_element(actual, |v| {
            matches!(
                compare(v, operand),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            )
        }),
        "$in" => match operand {
            Value::Array(candidates) => candidates.iter().any(|c| eq_match(actual, c)),
            _ => false,
        },
        "$regex" => match (actual, operand) {
            (Value::String(s), Value::String(p)) => match p.strip_prefix('^') {
                Some(prefix) => s.starts_with(prefix),
                None => s.contains(p.as_str()),
            },
            _ => false,
        },
        _ => true,
    }
}

fn any_element(actual: &Value, pred: impl Fn(&Value) -> bool) -> bool {
    match actual {
        Value::Array(elems) => elems.iter().any(pred),
        v => pred(v),
    }
}

/// Equality with array-element semantics: an array field matches a scalar
/// when any element equals it.
fn eq_match(actual: &Value, expected: &Value) -> bool {
    if actual.is_null() {
        return false;
    }
    if values_equal(actual, expected) {
        return true;
    }
    match actual {
        Value::Array(elems) => elems.iter().any(|e| values_equal(e, expected)),
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Type-strict comparison: numbers widen, strings compare
/// lexicographically, anything else is incomparable.
fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ranges::{FieldRangeSet, RangeConstraint};
    use serde_json::json;

    fn matches(query: Value, doc: Value) -> bool {
        Matcher::new(&query).matches(&doc)
    }

    #[test]
    fn test_equality() {
        assert!(matches(json!({"name": "Alice"}), json!({"name": "Alice"})));
        assert!(!matches(json!({"name": "Bob"}), json!({"name": "Alice"})));
    }

    #[test]
    fn test_no_string_number_coercion() {
        assert!(!matches(json!({"v": "123"}), json!({"v": 123})));
        assert!(matches(json!({"v": 123}), json!({"v": 123.0})));
    }

    #[test]
    fn test_range_operators() {
        let doc = json!({"age": 25});
        assert!(matches(json!({"age": {"$gte": 18}}), doc.clone()));
        assert!(matches(json!({"age": {"$lt": 30}}), doc.clone()));
        assert!(!matches(json!({"age": {"$gt": 25}}), doc.clone()));
        assert!(matches(json!({"age": {"$gt": 18, "$lte": 25}}), doc));
    }

    #[test]
    fn test_in_and_ne() {
        let doc = json!({"a": 3});
        assert!(matches(json!({"a": {"$in": [1, 3]}}), doc.clone()));
        assert!(!matches(json!({"a": {"$in": [1, 2]}}), doc.clone()));
        assert!(matches(json!({"a": {"$ne": 4}}), doc.clone()));
        assert!(!matches(json!({"a": {"$ne": 3}}), doc));
    }

    #[test]
    fn test_exists() {
        assert!(matches(json!({"a": {"$exists": true}}), json!({"a": 1})));
        assert!(!matches(json!({"a": {"$exists": true}}), json!({"b": 1})));
        assert!(matches(json!({"a": {"$exists": false}}), json!({"b": 1})));
    }

    #[test]
    fn test_missing_and_null_never_match() {
        assert!(!matches(json!({"a": 1}), json!({"b": 1})));
        assert!(!matches(json!({"a": 1}), json!({"a": null})));
    }

    #[test]
    fn test_array_element_equality() {
        assert!(matches(json!({"a": 2}), json!({"a": [1, 2, 3]})));
        assert!(!matches(json!({"a": 9}), json!({"a": [1, 2, 3]})));
    }

    #[test]
    fn test_top_level_or() {
        let q = json!({"$or": [{"a": 1}, {"b": 2}]});
        assert!(matches(q.clone(), json!({"a": 1})));
        assert!(matches(q.clone(), json!({"b": 2})));
        assert!(!matches(q, json!({"a": 2, "b": 1})));
    }

    #[test]
    fn test_or_with_outer_constraint() {
        let q = json!({"x": 7, "$or": [{"a": 1}, {"b": 2}]});
        assert!(matches(q.clone(), json!({"x": 7, "a": 1})));
        assert!(!matches(q, json!({"x": 8, "a": 1})));
    }

    #[test]
    fn test_regex_prefix() {
        assert!(matches(json!({"s": {"$regex": "^ab"}}), json!({"s": "abc"})));
        assert!(!matches(json!({"s": {"$regex": "^ab"}}), json!({"s": "xabc"})));
        assert!(matches(json!({"s": {"$regex": "bc"}}), json!({"s": "xbcd"})));
    }

    #[test]
    fn test_dedup_exclusion() {
        let q = json!({"$or": [{"a": 1}, {"b": 2}]});
        let mut m = Matcher::new(&q);

        // Clause one scanned a == 1 on an {a: 1} index.
        let scanned = FieldRangeSet::new("test.c", &json!({"a": 1}), true);
        m.advance_or_clause(RangeConstraint::new(vec![(
            "a".into(),
            scanned.range("a").clone(),
        )]));

        // A doc the first clause already returned is now excluded.
        assert!(!m.matches(&json!({"a": 1, "b": 2})));
        // Docs outside the scanned range still match.
        assert!(m.matches(&json!({"a": 2, "b": 2})));
        // Docs without the scanned field were never in that index.
        assert!(m.matches(&json!({"b": 2})));
    }
}
