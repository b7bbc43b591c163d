//! Canonical query shapes — the plan-cache key.
//!
//! A shape abstracts a predicate to its constrained fields and the class of
//! constraint on each, plus the requested order. Two predicates with the
//! same fields and operator classes share a shape regardless of key order
//! or literal values.

use std::collections::BTreeMap;

use super::ranges::{FieldRange, FieldRangeSet};
use super::spec::SortSpec;
use crate::index::KeyValue;

/// The class of constraint a field's range expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundClass {
    Equality,
    LowerBound,
    UpperBound,
    UpperAndLowerBound,
    /// A constraint exists but supplies no classified bounds
    /// (regex, `$ne`, container equality).
    ConstraintPresent,
}

fn classify(range: &FieldRange) -> BoundClass {
    if range.is_pattern() {
        return BoundClass::ConstraintPresent;
    }
    if range.equality() {
        return BoundClass::Equality;
    }
    let lower = range.min_bound() != KeyValue::MinKey;
    let upper = range.max_bound() != KeyValue::MaxKey;
    match (lower, upper) {
        (true, true) => BoundClass::UpperAndLowerBound,
        (true, false) => BoundClass::LowerBound,
        (false, true) => BoundClass::UpperBound,
        (false, false) => BoundClass::ConstraintPresent,
    }
}

/// A canonical (predicate shape, order) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryPattern {
    fields: BTreeMap<String, BoundClass>,
    sort: Vec<(String, i32)>,
}

impl QueryPattern {
    pub fn new(set: &FieldRangeSet, order: &SortSpec) -> Self {
        let mut fields = BTreeMap::new();
        for field in set.non_universal_fields() {
            fields.insert(field.to_string(), classify(set.range(field)));
        }
        QueryPattern {
            fields,
            sort: order.as_pairs(),
        }
    }
}
