//! Per-field value ranges extracted from predicate documents.
//!
//! A `FieldRange` is an ordered set of disjoint intervals over key values.
//! A `FieldRangeSet` holds one range per constrained field of a conjunctive
//! predicate. The pair type carries both the single-key and multikey
//! interpretations; multikey indexes cannot intersect constraints that may
//! have been satisfied by different array elements.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::catalog::Collection;
use crate::index::{KeyPattern, KeyValue};

/// One closed-open-flagged interval over key values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub low: KeyValue,
    pub low_inclusive: bool,
    pub high: KeyValue,
    pub high_inclusive: bool,
}

impl Interval {
    fn full() -> Self {
        Interval {
            low: KeyValue::MinKey,
            low_inclusive: true,
            high: KeyValue::MaxKey,
            high_inclusive: true,
        }
    }

    fn point(v: KeyValue) -> Self {
        Interval {
            low: v.clone(),
            low_inclusive: true,
            high: v,
            high_inclusive: true,
        }
    }

    fn is_valid(&self) -> bool {
        match self.low.cmp(&self.high) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => self.low_inclusive && self.high_inclusive,
            std::cmp::Ordering::Greater => false,
        }
    }

    fn contains(&self, v: &KeyValue) -> bool {
        let above_low = match v.cmp(&self.low) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => self.low_inclusive,
            std::cmp::Ordering::Less => false,
        };
        let below_high = match v.cmp(&self.high) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => self.high_inclusive,
            std::cmp::Ordering::Greater => false,
        };
        above_low && below_high
    }

    fn intersect(&self, other: &Interval) -> Option<Interval> {
        let (low, low_inclusive) = match self.low.cmp(&other.low) {
            std::cmp::Ordering::Greater => (self.low.clone(), self.low_inclusive),
            std::cmp::Ordering::Less => (other.low.clone(), other.low_inclusive),
            std::cmp::Ordering::Equal => {
                (self.low.clone(), self.low_inclusive && other.low_inclusive)
            }
        };
        let (high, high_inclusive) = match self.high.cmp(&other.high) {
            std::cmp::Ordering::Less => (self.high.clone(), self.high_inclusive),
            std::cmp::Ordering::Greater => (other.high.clone(), other.high_inclusive),
            std::cmp::Ordering::Equal => (
                self.high.clone(),
                self.high_inclusive && other.high_inclusive,
            ),
        };
        let candidate = Interval {
            low,
            low_inclusive,
            high,
            high_inclusive,
        };
        candidate.is_valid().then_some(candidate)
    }

    /// Subtracts `other`, returning the surviving pieces.
    fn subtract(&self, other: &Interval) -> Vec<Interval> {
        if other.intersect(self).is_none() {
            return vec![self.clone()];
        }
        let mut out = Vec::new();
        let left = Interval {
            low: self.low.clone(),
            low_inclusive: self.low_inclusive,
            high: other.low.clone(),
            high_inclusive: !other.low_inclusive,
        };
        if left.is_valid() {
            out.push(left);
        }
        let right = Interval {
            low: other.high.clone(),
            low_inclusive: !other.high_inclusive,
            high: self.high.clone(),
            high_inclusive: self.high_inclusive,
        };
        if right.is_valid() {
            out.push(right);
        }
        out
    }
}

/// The ordered interval set for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRange {
    intervals: Vec<Interval>,
    /// A constraint exists that is not representable as intervals
    /// (regex, container equality). The field counts as constrained but
    /// supplies no usable bounds.
    pattern: bool,
}

impl FieldRange {
    /// The unconstrained range.
    pub fn universal_range() -> Self {
        FieldRange {
            intervals: vec![Interval::full()],
            pattern: false,
        }
    }

    fn pattern_range() -> Self {
        FieldRange {
            intervals: vec![Interval::full()],
            pattern: true,
        }
    }

    fn from_intervals(mut intervals: Vec<Interval>) -> Self {
        intervals.retain(Interval::is_valid);
        intervals.sort_by(|a, b| a.low.cmp(&b.low));
        FieldRange {
            intervals,
            pattern: false,
        }
    }

    /// True iff the range is `(-inf, +inf)` with no pattern constraint.
    pub fn universal(&self) -> bool {
        !self.pattern
            && self.intervals.len() == 1
            && self.intervals[0] == Interval::full()
    }

    /// True iff the range pins a single value.
    pub fn equality(&self) -> bool {
        self.intervals.len() == 1
            && self.intervals[0].low == self.intervals[0].high
            && self.intervals[0].low_inclusive
            && self.intervals[0].high_inclusive
    }

    /// True iff no value can satisfy the range.
    pub fn empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Whether an interval-unrepresentable constraint exists.
    pub fn is_pattern(&self) -> bool {
        self.pattern
    }

    /// Smallest admissible value (lower bound of the first interval).
    pub fn min_bound(&self) -> KeyValue {
        self.intervals
            .first()
            .map(|i| i.low.clone())
            .unwrap_or(KeyValue::MaxKey)
    }

    /// Largest admissible value (upper bound of the last interval).
    pub fn max_bound(&self) -> KeyValue {
        self.intervals
            .last()
            .map(|i| i.high.clone())
            .unwrap_or(KeyValue::MinKey)
    }

    /// The pinned value of an equality range.
    pub fn equality_value(&self) -> Option<&KeyValue> {
        self.equality().then(|| &self.intervals[0].low)
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn contains(&self, v: &KeyValue) -> bool {
        self.intervals.iter().any(|i| i.contains(v))
    }

    pub fn intersect(&self, other: &FieldRange) -> FieldRange {
        let mut intervals = Vec::new();
        for a in &self.intervals {
            for b in &other.intervals {
                if let Some(i) = a.intersect(b) {
                    intervals.push(i);
                }
            }
        }
        let mut r = FieldRange::from_intervals(intervals);
        r.pattern = self.pattern || other.pattern;
        r
    }

    /// Removes `other`'s intervals from this range.
    pub fn subtract(&self, other: &FieldRange) -> FieldRange {
        let mut current = self.intervals.clone();
        for b in &other.intervals {
            let mut next = Vec::new();
            for a in &current {
                next.extend(a.subtract(b));
            }
            current = next;
        }
        let mut r = FieldRange::from_intervals(current);
        r.pattern = self.pattern;
        r
    }

    /// Renders the intervals as a JSON bounds array: `[[low, high], ...]`.
    pub fn bounds_json(&self) -> Value {
        Value::Array(
            self.intervals
                .iter()
                .map(|i| Value::Array(vec![i.low.to_json(), i.high.to_json()]))
                .collect(),
        )
    }
}

/// Parses the range for one field operand. `intersect_ops` is false for
/// the multikey interpretation, where only the first range-producing
/// operator binds.
fn parse_constraint(operand: &Value, intersect_ops: bool, special: &mut Option<String>) -> FieldRange {
    let obj = match operand {
        Value::Object(obj) if obj.keys().any(|k| k.starts_with('$')) => obj,
        Value::Object(_) | Value::Array(_) => return FieldRange::pattern_range(),
        scalar => {
            return match KeyValue::from_json(scalar) {
                Some(kv) => FieldRange::from_intervals(vec![Interval::point(kv)]),
                None => FieldRange::pattern_range(),
            };
        }
    };

    let mut range = FieldRange::universal_range();
    let mut bound = false;
    for (op, v) in obj {
        let piece = match op.as_str() {
            "$eq" => KeyValue::from_json(v)
                .map(|kv| FieldRange::from_intervals(vec![Interval::point(kv)]))
                .unwrap_or_else(FieldRange::pattern_range),
            "$gt" => match KeyValue::from_json(v) {
                Some(kv) => FieldRange::from_intervals(vec![Interval {
                    low: kv,
                    low_inclusive: false,
                    high: KeyValue::MaxKey,
                    high_inclusive: true,
                }]),
                None => continue,
            },
            "$gte" => match KeyValue::from_json(v) {
                Some(kv) => FieldRange::from_intervals(vec![Interval {
                    low: kv,
                    low_inclusive: true,
                    high: KeyValue::MaxKey,
                    high_inclusive: true,
                }]),
                None => continue,
            },
            "$lt" => match KeyValue::from_json(v) {
                Some(kv) => FieldRange::from_intervals(vec![Interval {
                    low: KeyValue::MinKey,
                    low_inclusive: true,
                    high: kv,
                    high_inclusive: false,
                }]),
                None => continue,
            },
            "$lte" => match KeyValue::from_json(v) {
                Some(kv) => FieldRange::from_intervals(vec![Interval {
                    low: KeyValue::MinKey,
                    low_inclusive: true,
                    high: kv,
                    high_inclusive: true,
                }]),
                None => continue,
            },
            "$in" => match v {
                Value::Array(elems) => {
                    let mut intervals = Vec::new();
                    let mut unrepresentable = false;
                    for e in elems {
                        match KeyValue::from_json(e) {
                            Some(kv) => intervals.push(Interval::point(kv)),
                            None => unrepresentable = true,
                        }
                    }
                    if unrepresentable {
                        FieldRange::pattern_range()
                    } else {
                        FieldRange::from_intervals(intervals)
                    }
                }
                _ => continue,
            },
            "$ne" => match KeyValue::from_json(v) {
                Some(kv) => FieldRange::from_intervals(vec![
                    Interval {
                        low: KeyValue::MinKey,
                        low_inclusive: true,
                        high: kv.clone(),
                        high_inclusive: false,
                    },
                    Interval {
                        low: kv,
                        low_inclusive: false,
                        high: KeyValue::MaxKey,
                        high_inclusive: true,
                    },
                ]),
                None => continue,
            },
            "$regex" => FieldRange::pattern_range(),
            "$near" | "$within" => {
                *special = Some("geo".to_string());
                continue;
            }
            _ => continue,
        };
        if intersect_ops || !bound {
            range = range.intersect(&piece);
            bound = true;
        }
    }
    range
}

/// Per-field ranges for one conjunctive predicate.
#[derive(Debug, Clone)]
pub struct FieldRangeSet {
    ns: String,
    ranges: BTreeMap<String, FieldRange>,
    universal: FieldRange,
    special: Option<String>,
    single_key: bool,
}

impl FieldRangeSet {
    /// Extracts ranges from a predicate document.
    ///
    /// Top-level `$`-prefixed fields (`$or` among them) carry no range
    /// information here; disjunction handling lives above this layer.
    pub fn new(ns: impl Into<String>, query: &Value, single_key: bool) -> Self {
        let mut set = FieldRangeSet {
            ns: ns.into(),
            ranges: BTreeMap::new(),
            universal: FieldRange::universal_range(),
            special: None,
            single_key,
        };
        if let Value::Object(obj) = query {
            for (field, operand) in obj {
                if field.starts_with('$') {
                    continue;
                }
                let mut special = None;
                let parsed = parse_constraint(operand, single_key, &mut special);
                if special.is_some() {
                    set.special = special;
                }
                set.apply(field, parsed);
            }
        }
        set
    }

    fn apply(&mut self, field: &str, range: FieldRange) {
        match self.ranges.get_mut(field) {
            Some(existing) => {
                if self.single_key {
                    *existing = existing.intersect(&range);
                }
                // Multikey: the first constraint binds; later constraints
                // may have been satisfied by different array elements.
            }
            None => {
                if !range.universal() {
                    self.ranges.insert(field.to_string(), range);
                }
            }
        }
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    pub fn is_single_key(&self) -> bool {
        self.single_key
    }

    /// The range for a field; unconstrained fields are universal.
    pub fn range(&self, field: &str) -> &FieldRange {
        self.ranges.get(field).unwrap_or(&self.universal)
    }

    /// Replaces a field's range.
    pub fn set_range(&mut self, field: &str, range: FieldRange) {
        if range.universal() {
            self.ranges.remove(field);
        } else {
            self.ranges.insert(field.to_string(), range);
        }
    }

    /// The index plugin required by the predicate, if any.
    pub fn special(&self) -> Option<&str> {
        self.special.as_deref()
    }

    /// False when some range is provably empty.
    pub fn match_possible(&self) -> bool {
        self.ranges.values().all(|r| !r.empty())
    }

    pub fn num_non_universal_ranges(&self) -> usize {
        self.ranges.values().filter(|r| !r.universal()).count()
    }

    pub fn no_non_universal_ranges(&self) -> bool {
        self.num_non_universal_ranges() == 0
    }

    /// Constrained field names.
    pub fn non_universal_fields(&self) -> impl Iterator<Item = &str> {
        self.ranges
            .iter()
            .filter(|(_, r)| !r.universal())
            .map(|(f, _)| f.as_str())
    }

    /// Conjunction of two sets over the same namespace.
    pub fn intersect(&self, other: &FieldRangeSet) -> FieldRangeSet {
        let mut out = self.clone();
        for (field, range) in &other.ranges {
            match out.ranges.get_mut(field) {
                Some(existing) => {
                    if self.single_key {
                        *existing = existing.intersect(range);
                    }
                }
                None => {
                    out.ranges.insert(field.clone(), range.clone());
                }
            }
        }
        if out.special.is_none() {
            out.special = other.special.clone();
        }
        out
    }

    /// True when the document's values fall inside every constrained
    /// range. Missing fields fail non-universal ranges; array values are
    /// contained when any element is.
    pub fn matches_doc(&self, doc: &Value) -> bool {
        for (field, range) in &self.ranges {
            if range.universal() {
                continue;
            }
            if !value_in_range(doc.get(field.as_str()), range) {
                return false;
            }
        }
        true
    }

    /// Rebuilds a predicate document restricted to the given index's
    /// fields, for plugin suitability checks.
    pub fn simplified_query_for_index(&self, key_pattern: &KeyPattern) -> Value {
        let mut out = serde_json::Map::new();
        for kf in key_pattern.fields() {
            let range = self.range(&kf.name);
            if range.universal() {
                continue;
            }
            let v = if let Some(kv) = range.equality_value() {
                kv.to_json()
            } else {
                let mut bounds = serde_json::Map::new();
                bounds.insert("$gte".into(), range.min_bound().to_json());
                bounds.insert("$lte".into(), range.max_bound().to_json());
                Value::Object(bounds)
            };
            out.insert(kf.name.clone(), v);
        }
        Value::Object(out)
    }
}

fn value_in_range(value: Option<&Value>, range: &FieldRange) -> bool {
    match value {
        None => false,
        Some(Value::Array(elems)) => elems.iter().any(|e| {
            KeyValue::from_json(e)
                .map(|kv| range.contains(&kv))
                .unwrap_or(false)
        }),
        Some(v) => KeyValue::from_json(v)
            .map(|kv| range.contains(&kv))
            .unwrap_or(false),
    }
}

/// A scanned-range exclusion used for `$or` clause deduplication: a
/// document is inside the constraint when every listed field is present
/// and contained.
#[derive(Debug, Clone)]
pub struct RangeConstraint {
    fields: Vec<(String, FieldRange)>,
}

impl RangeConstraint {
    pub fn new(fields: Vec<(String, FieldRange)>) -> Self {
        Self { fields }
    }

    pub fn contains_doc(&self, doc: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, range)| value_in_range(doc.get(field.as_str()), range))
    }
}

/// The single-key and multikey interpretations of one predicate.
#[derive(Debug, Clone)]
pub struct FieldRangeSetPair {
    single: FieldRangeSet,
    multi: FieldRangeSet,
}

impl FieldRangeSetPair {
    pub fn new(ns: impl Into<String>, query: &Value) -> Self {
        let ns = ns.into();
        FieldRangeSetPair {
            single: FieldRangeSet::new(ns.clone(), query, true),
            multi: FieldRangeSet::new(ns, query, false),
        }
    }

    pub fn from_sets(single: FieldRangeSet, multi: FieldRangeSet) -> Self {
        FieldRangeSetPair { single, multi }
    }

    pub fn ns(&self) -> &str {
        self.single.ns()
    }

    pub fn single(&self) -> &FieldRangeSet {
        &self.single
    }

    pub fn multi(&self) -> &FieldRangeSet {
        &self.multi
    }

    pub fn single_mut(&mut self) -> &mut FieldRangeSet {
        &mut self.single
    }

    pub fn multi_mut(&mut self) -> &mut FieldRangeSet {
        &mut self.multi
    }

    /// The interpretation an index must use: multikey indexes cannot rely
    /// on intersected bounds. Natural-order access (`idx_no == None`) uses
    /// the looser multikey interpretation.
    pub fn frs_for_index(
        &self,
        collection: Option<&Collection>,
        idx_no: Option<usize>,
    ) -> &FieldRangeSet {
        match (collection, idx_no) {
            (Some(c), Some(no)) if !c.is_multikey(no) => &self.single,
            _ => &self.multi,
        }
    }

    pub fn match_possible(&self) -> bool {
        self.single.match_possible() && self.multi.match_possible()
    }

    pub fn match_possible_for_index(
        &self,
        collection: Option<&Collection>,
        idx_no: Option<usize>,
    ) -> bool {
        self.frs_for_index(collection, idx_no).match_possible()
    }

    pub fn no_non_universal_ranges(&self) -> bool {
        self.single.no_non_universal_ranges()
    }

    pub fn special(&self) -> Option<&str> {
        self.single.special()
    }
}
