//! Clause-by-clause range generation for `$or` queries.
//!
//! Each disjunct becomes an independent range-set pair (conjoined with any
//! constraints outside the `$or`). Popping a finished clause eliminates its
//! scanned range from the clauses that follow, when that range is exactly
//! representable; clauses proven impossible by elimination are dropped.

use std::collections::VecDeque;

use serde_json::Value;

use crate::index::KeyPattern;

use super::ranges::{FieldRangeSet, FieldRangeSetPair};

#[derive(Debug)]
struct OrClause {
    current: FieldRangeSetPair,
    original: FieldRangeSetPair,
}

/// Iterates the disjuncts of a top-level `$or` query.
#[derive(Debug)]
pub struct OrRangeGenerator {
    ns: String,
    clauses: VecDeque<OrClause>,
    original_sets: Vec<FieldRangeSetPair>,
    special: Option<String>,
}

impl OrRangeGenerator {
    /// Builds clause range pairs from a query with a top-level `$or`.
    ///
    /// Returns `None` when the `$or` value is not a non-empty array of
    /// documents.
    pub fn new(ns: impl Into<String>, query: &Value) -> Option<Self> {
        let ns = ns.into();
        let clause_docs = match query.get("$or") {
            Some(Value::Array(arr)) if !arr.is_empty() => arr,
            _ => return None,
        };
        if !clause_docs.iter().all(|c| c.is_object()) {
            return None;
        }

        // Constraints outside the $or apply to every clause.
        let base = FieldRangeSetPair::new(ns.clone(), query);

        let mut clauses = VecDeque::new();
        let mut original_sets = Vec::new();
        let mut special = base.special().map(str::to_string);
        for doc in clause_docs {
            let clause = FieldRangeSetPair::new(ns.clone(), doc);
            if special.is_none() {
                special = clause.special().map(str::to_string);
            }
            let merged = FieldRangeSetPair::from_sets(
                base.single().intersect(clause.single()),
                base.multi().intersect(clause.multi()),
            );
            original_sets.push(merged.clone());
            clauses.push_back(OrClause {
                current: merged.clone(),
                original: merged,
            });
        }
        Some(OrRangeGenerator {
            ns,
            clauses,
            original_sets,
            special,
        })
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// The plugin requirement carried by the query or any clause.
    pub fn special(&self) -> Option<&str> {
        self.special.as_deref()
    }

    /// True when no clauses remain.
    pub fn or_ranges_exhausted(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The current clause's (possibly eliminated) range pair.
    pub fn top_frsp(&self) -> Option<FieldRangeSetPair> {
        self.clauses.front().map(|c| c.current.clone())
    }

    /// The current clause's pre-elimination range pair.
    pub fn top_frsp_original(&self) -> Option<FieldRangeSetPair> {
        self.clauses.front().map(|c| c.original.clone())
    }

    /// All clause pairs as built, for usefulness screening.
    pub fn original_or_sets(&self) -> &[FieldRangeSetPair] {
        &self.original_sets
    }

    /// Pops the finished clause. When `index_key` is given and the popped
    /// clause constrains exactly one of its fields, that range is removed
    /// from every remaining clause; clauses left unsatisfiable are dropped.
    pub fn pop_or_clause(&mut self, index_key: Option<&KeyPattern>) {
        let popped = match self.clauses.pop_front() {
            Some(c) => c,
            None => return,
        };
        let kp = match index_key {
            Some(kp) => kp,
            None => return,
        };

        let constrained: Vec<&str> = popped.current.single().non_universal_fields().collect();
        let field = match constrained.as_slice() {
            [f] => *f,
            _ => return,
        };
        let single_range = popped.current.single().range(field).clone();
        if single_range.is_pattern() {
            return;
        }
        if !kp.fields().iter().any(|kf| kf.name == field) {
            return;
        }
        let multi_range = popped.current.multi().range(field).clone();

        for clause in &mut self.clauses {
            let s = clause.current.single().range(field).subtract(&single_range);
            clause.current.single_mut().set_range(field, s);
            let m = clause.current.multi().range(field).subtract(&multi_range);
            clause.current.multi_mut().set_range(field, m);
        }
        self.clauses
            .retain(|c| c.current.single().match_possible() && c.current.multi().match_possible());
    }
}

/// Builds the range set for a query without clause separation.
pub fn whole_query_set(ns: &str, query: &Value, single_key: bool) -> FieldRangeSet {
    FieldRangeSet::new(ns, query, single_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KeyValue;
    use serde_json::json;

    #[test]
    fn test_rejects_bad_or_specs() {
        assert!(OrRangeGenerator::new("test.c", &json!({"a": 1})).is_none());
        assert!(OrRangeGenerator::new("test.c", &json!({"$or": []})).is_none());
        assert!(OrRangeGenerator::new("test.c", &json!({"$or": [1, 2]})).is_none());
    }

    #[test]
    fn test_clause_iteration() {
        let org =
            OrRangeGenerator::new("test.c", &json!({"$or": [{"a": 1}, {"b": 2}]})).unwrap();
        assert!(!org.or_ranges_exhausted());
        let top = org.top_frsp().unwrap();
        assert!(top.single().range("a").equality());
        assert!(top.single().range("b").universal());
    }

    #[test]
    fn test_outer_constraints_apply_to_clauses() {
        let org =
            OrRangeGenerator::new("test.c", &json!({"x": 9, "$or": [{"a": 1}, {"b": 2}]}))
                .unwrap();
        let top = org.top_frsp().unwrap();
        assert!(top.single().range("x").equality());
        assert!(top.single().range("a").equality());
    }

    #[test]
    fn test_pop_eliminates_scanned_range() {
        let mut org =
            OrRangeGenerator::new("test.c", &json!({"$or": [{"a": 1}, {"a": {"$lte": 5}}]}))
                .unwrap();
        org.pop_or_clause(Some(&KeyPattern::new([("a", 1)])));

        let top = org.top_frsp().unwrap();
        let r = top.single().range("a");
        assert!(!r.contains(&KeyValue::number(1.0)));
        assert!(r.contains(&KeyValue::number(0.0)));
        assert!(r.contains(&KeyValue::number(5.0)));
    }

    #[test]
    fn test_pop_drops_fully_covered_clause() {
        let mut org =
            OrRangeGenerator::new("test.c", &json!({"$or": [{"a": {"$lte": 10}}, {"a": 4}]}))
                .unwrap();
        org.pop_or_clause(Some(&KeyPattern::new([("a", 1)])));
        // The second clause's a=4 lies inside the scanned a<=10 range.
        assert!(org.or_ranges_exhausted());
    }

    #[test]
    fn test_pop_without_index_key_skips_elimination() {
        let mut org =
            OrRangeGenerator::new("test.c", &json!({"$or": [{"a": 1}, {"a": 1}]})).unwrap();
        org.pop_or_clause(None);
        let top = org.top_frsp().unwrap();
        assert!(top.single().range("a").equality());
    }

    #[test]
    fn test_multi_field_clause_not_representable() {
        let mut org = OrRangeGenerator::new(
            "test.c",
            &json!({"$or": [{"a": 1, "b": 2}, {"a": 1}]}),
        )
        .unwrap();
        org.pop_or_clause(Some(&KeyPattern::new([("a", 1), ("b", 1)])));
        // Two constrained fields: not single-field representable, no
        // elimination.
        let top = org.top_frsp().unwrap();
        assert!(top.single().range("a").equality());
    }
}
