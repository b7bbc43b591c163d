//! Plan characterization: one access path judged against one predicate
//! and order.
//!
//! A plan is immutable once built. Characterization decides, per index:
//! whether a match is statically impossible, whether the index returns
//! documents in the requested order (and in which traversal direction),
//! whether the index covers the predicate optimally, whether a key alone
//! proves a match exactly, and whether the index is altogether unhelpful.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::catalog::{Collection, DocLoc};
use crate::cursor::{BtreeCursor, Cursor, EmptyCursor, TableScanCursor};
use crate::index::{CompositeKey, IndexPlugin, KeyPattern, Suitability};
use crate::query::{
    FieldRangeSet, FieldRangeSetPair, FieldRangeVector, KeyFieldsOnly, Projection, QueryPattern,
    RangeConstraint, SortSpec,
};

use super::errors::{PlannerResult, QueryError};
use super::PlannerContext;

/// Explicit scan bounds requested by the caller (`min`/`max`).
#[derive(Debug, Clone, Default)]
pub struct PlanBounds {
    pub start: Option<CompositeKey>,
    pub end: Option<CompositeKey>,
}

/// A characterized access path over one collection.
pub struct QueryPlan<'a> {
    collection: Option<&'a Collection>,
    ctx: PlannerContext<'a>,
    ns: String,
    idx_no: Option<usize>,
    frs: FieldRangeSet,
    original_frs: FieldRangeSet,
    original_query: Value,
    order: SortSpec,
    optimal: bool,
    scan_and_order_required: bool,
    exact_key_match: bool,
    direction: i32,
    start_key: Option<CompositeKey>,
    end_key: Option<CompositeKey>,
    end_key_inclusive: bool,
    start_or_end_spec: bool,
    unhelpful: bool,
    impossible: bool,
    special: Option<String>,
    plugin: Option<Arc<dyn IndexPlugin>>,
    frv: Option<Arc<FieldRangeVector>>,
    key_fields_only: Option<KeyFieldsOnly>,
    pattern_single: QueryPattern,
    pattern_multi: QueryPattern,
}

/// True for a flat equality-only document: the expected number of fields,
/// no reserved (`$`-prefixed) names, no container values.
fn exact_key_match_simple_query(query: &Value, expected_field_count: usize) -> bool {
    let obj = match query {
        Value::Object(obj) => obj,
        _ => return false,
    };
    if obj.len() != expected_field_count {
        return false;
    }
    for (name, value) in obj {
        if name.starts_with('$') {
            return false;
        }
        if value.is_object() || value.is_array() {
            return false;
        }
    }
    true
}

impl<'a> QueryPlan<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        collection: Option<&'a Collection>,
        idx_no: Option<usize>,
        frsp: &FieldRangeSetPair,
        original_frsp: Option<&FieldRangeSetPair>,
        original_query: &Value,
        fields: Option<&Projection>,
        order: &SortSpec,
        bounds: PlanBounds,
        special: Option<String>,
        ctx: PlannerContext<'a>,
    ) -> PlannerResult<Self> {
        let frs = frsp.frs_for_index(collection, idx_no).clone();
        let original_frs = original_frsp
            .map(|p| p.frs_for_index(collection, idx_no).clone())
            .unwrap_or_else(|| frs.clone());

        let mut plan = QueryPlan {
            collection,
            ctx,
            ns: frsp.ns().to_string(),
            idx_no,
            original_query: original_query.clone(),
            order: order.clone(),
            optimal: false,
            scan_and_order_required: true,
            exact_key_match: false,
            direction: 0,
            start_key: None,
            end_key: None,
            end_key_inclusive: bounds.end.is_none(),
            start_or_end_spec: bounds.start.is_some() || bounds.end.is_some(),
            unhelpful: false,
            impossible: false,
            special: None,
            plugin: None,
            frv: None,
            key_fields_only: None,
            pattern_single: QueryPattern::new(frsp.single(), order),
            pattern_multi: QueryPattern::new(frsp.multi(), order),
            frs,
            original_frs,
        };

        let (collection, idx_no) = match (collection, idx_no) {
            (Some(c), Some(no)) => (c, no),
            _ => {
                // Natural-order access. An empty result can't be proven
                // here; the matcher simply rejects everything.
                plan.scan_and_order_required =
                    !(order.is_empty() || order.natural_direction().is_some());
                return Ok(plan);
            }
        };

        if !plan.frs.match_possible() {
            plan.impossible = true;
            plan.scan_and_order_required = false;
            return Ok(plan);
        }

        let index = collection.idx(idx_no);
        let key_pattern = index.key_pattern().clone();

        let plugin_claims = index
            .spec()
            .plugin()
            .map(|p| p.suitability(original_query, order) != Suitability::Useless)
            .unwrap_or(false);
        if special.is_some() || plugin_claims {
            let plugin = index.spec().plugin().cloned().ok_or_else(|| {
                QueryError::Internal(format!(
                    "no plugin for special: {}",
                    special.as_deref().unwrap_or("?")
                ))
            })?;
            if special.is_some() {
                plan.optimal = true;
            }
            plan.special = special.or_else(|| Some(plugin.name().to_string()));
            plan.scan_and_order_required = plugin.scan_and_order_required(original_query, order);
            plan.plugin = Some(plugin);
            return Ok(plan);
        }

        // Order compatibility: walk the requested order and the key
        // pattern in parallel. Key fields before a name match must be
        // equality-constrained; the per-field direction is the product of
        // the two signs, and a later conflict leaves the order unserved.
        let mut scan_and_order_required = true;
        let mut direction = 0i32;
        'order_walk: {
            if order.is_empty() {
                scan_and_order_required = false;
                break 'order_walk;
            }
            let mut key_fields = key_pattern.fields().iter();
            for oe in order.fields() {
                let ke = loop {
                    match key_fields.next() {
                        None => break 'order_walk,
                        Some(ke) if ke.name == oe.name => break ke,
                        Some(ke) => {
                            if !plan.frs.range(&ke.name).equality() {
                                break 'order_walk;
                            }
                        }
                    }
                };
                let d = if oe.direction == ke.direction { 1 } else { -1 };
                if direction == 0 {
                    direction = d;
                } else if direction != d {
                    break 'order_walk;
                }
            }
            scan_and_order_required = false;
        }
        if scan_and_order_required {
            direction = 0;
        }
        plan.scan_and_order_required = scan_and_order_required;
        plan.direction = direction;

        // Optimality and exactness. The optimal prefix is equalities
        // followed by at most one range field; any constrained field after
        // the tail invalidates optimality. Exactness wants every key field
        // pinned to a provable scalar with no leftover order fields.
        let mut optimal_count: i64 = 0;
        let mut exact_count: usize = 0;
        let mut awaiting_last_optimal_field = true;
        let mut order_fields_unindexed: BTreeSet<&str> = order.field_names().collect();
        for kf in key_pattern.fields() {
            let fr = plan.frs.range(&kf.name);
            if awaiting_last_optimal_field {
                if !fr.universal() {
                    optimal_count += 1;
                }
                if !fr.equality() {
                    awaiting_last_optimal_field = false;
                }
            } else if !fr.universal() {
                optimal_count = -1;
            }
            if let Some(v) = fr.equality_value() {
                // Scalars only; null is excluded because a null key cannot
                // prove a match here (null field values never match).
                if matches!(
                    v,
                    crate::index::KeyValue::Number(_)
                        | crate::index::KeyValue::String(_)
                        | crate::index::KeyValue::Bool(_)
                ) {
                    exact_count += 1;
                }
            }
            order_fields_unindexed.remove(kf.name.as_str());
        }
        if !plan.scan_and_order_required
            && optimal_count == plan.frs.num_non_universal_ranges() as i64
        {
            plan.optimal = true;
        }
        if exact_count == plan.frs.num_non_universal_ranges()
            && order_fields_unindexed.is_empty()
            && exact_count == key_pattern.n_fields()
            && exact_key_match_simple_query(original_query, exact_count)
        {
            plan.exact_key_match = true;
        }

        let frv = Arc::new(FieldRangeVector::new(&plan.frs, &key_pattern, direction));
        if plan.start_or_end_spec {
            plan.start_key = Some(bounds.start.unwrap_or_else(|| frv.start_key()));
            plan.end_key = Some(bounds.end.unwrap_or_else(|| frv.end_key()));
        }
        plan.frv = Some(frv);

        if (plan.scan_and_order_required || order.is_empty())
            && key_pattern
                .first_field_name()
                .map(|f| plan.frs.range(f).universal())
                .unwrap_or(true)
        {
            plan.unhelpful = true;
        }

        if let Some(fields) = fields {
            if !collection.is_multikey(idx_no) {
                plan.key_fields_only = fields.check_key(&key_pattern);
            }
        }

        Ok(plan)
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    pub fn collection(&self) -> Option<&'a Collection> {
        self.collection
    }

    pub fn idx_no(&self) -> Option<usize> {
        self.idx_no
    }

    pub fn indexed(&self) -> bool {
        self.idx_no.is_some()
    }

    pub fn will_scan_table(&self) -> bool {
        self.idx_no.is_none()
    }

    pub fn is_multikey(&self) -> bool {
        match (self.collection, self.idx_no) {
            (Some(c), Some(no)) => c.is_multikey(no),
            _ => false,
        }
    }

    pub fn optimal(&self) -> bool {
        self.optimal
    }

    pub fn scan_and_order_required(&self) -> bool {
        self.scan_and_order_required
    }

    pub fn exact_key_match(&self) -> bool {
        self.exact_key_match
    }

    pub fn direction(&self) -> i32 {
        self.direction
    }

    pub fn unhelpful(&self) -> bool {
        self.unhelpful
    }

    pub fn impossible(&self) -> bool {
        self.impossible
    }

    pub fn special(&self) -> Option<&str> {
        self.special.as_deref()
    }

    pub fn start_key(&self) -> Option<&CompositeKey> {
        self.start_key.as_ref()
    }

    pub fn end_key(&self) -> Option<&CompositeKey> {
        self.end_key.as_ref()
    }

    pub fn end_key_inclusive(&self) -> bool {
        self.end_key_inclusive
    }

    pub fn key_fields_only(&self) -> Option<&KeyFieldsOnly> {
        self.key_fields_only.as_ref()
    }

    pub fn original_query(&self) -> &Value {
        &self.original_query
    }

    pub fn order(&self) -> &SortSpec {
        &self.order
    }

    pub fn range_set(&self) -> &FieldRangeSet {
        &self.frs
    }

    /// The access path's key pattern; `{$natural: 1}` for a table scan.
    pub fn index_key(&self) -> KeyPattern {
        match (self.collection, self.idx_no) {
            (Some(c), Some(no)) => c.idx(no).key_pattern().clone(),
            _ => KeyPattern::natural(1),
        }
    }

    /// The scanned-range constraint used to exclude this clause's
    /// documents from later `$or` clauses. Indexed, possible, non-special
    /// plans only.
    pub fn or_constraint(&self) -> Option<RangeConstraint> {
        let (collection, idx_no) = match (self.collection, self.idx_no) {
            (Some(c), Some(no)) => (c, no),
            _ => return None,
        };
        if self.impossible || self.special.is_some() {
            return None;
        }
        let fields = collection
            .idx(idx_no)
            .key_pattern()
            .fields()
            .iter()
            .map(|kf| (kf.name.clone(), self.original_frs.range(&kf.name).clone()))
            .collect();
        Some(RangeConstraint::new(fields))
    }

    /// Records this plan as the winner for its query shapes.
    pub fn register_self(&self, nscanned: u64) {
        // Impossible constraints are detected before scanning and have no
        // shape class of their own.
        if self.impossible {
            return;
        }
        let key = self.index_key();
        self.ctx.cache.register_index_for_pattern(
            &self.ns,
            &self.pattern_single,
            Some(key.clone()),
            nscanned,
        );
        self.ctx
            .cache
            .register_index_for_pattern(&self.ns, &self.pattern_multi, Some(key), nscanned);
    }

    /// Invalidates the cache entries for this plan's query shapes.
    pub fn clear_recorded_self(&self) {
        self.ctx
            .cache
            .clear_indexes_for_patterns(&self.ns, &self.pattern_single, &self.pattern_multi);
    }

    fn is_exempt_namespace(&self) -> bool {
        self.ns.contains(".system.") || self.ns.starts_with("local.")
    }

    fn check_table_scan_allowed(&self) -> PlannerResult<()> {
        if !self.ctx.config.no_table_scan {
            return Ok(());
        }
        if self.frs.num_non_universal_ranges() == 0 {
            return Ok(());
        }
        if self.is_exempt_namespace() {
            return Ok(());
        }
        if self.collection.is_none() {
            return Ok(());
        }
        Err(QueryError::TableScanForbidden(self.ns.clone()))
    }

    fn warn_on_capped_id_table_scan(&self) {
        let capped = self.collection.map(|c| c.is_capped()).unwrap_or(false);
        if capped && !self.frs.range("_id").universal() && !self.is_exempt_namespace() {
            warn!(
                namespace = %self.ns,
                "_id query on capped collection without an _id index, \
                 performance will be poor"
            );
        }
    }

    /// Opens this plan's cursor.
    pub fn new_cursor(
        &self,
        start_loc: Option<DocLoc>,
        num_wanted: usize,
    ) -> PlannerResult<Box<dyn Cursor + 'a>> {
        if let Some(plugin) = &self.plugin {
            let collection = self
                .collection
                .ok_or_else(|| QueryError::Internal("special plan without collection".into()))?;
            return Ok(plugin.new_cursor(collection, &self.original_query, &self.order, num_wanted));
        }

        if self.impossible {
            // Dummy scan returning no results; allowed even under
            // no_table_scan.
            return Ok(Box::new(EmptyCursor));
        }

        if self.will_scan_table() {
            self.check_table_scan_allowed()?;
            self.warn_on_capped_id_table_scan();
            let collection = match self.collection {
                Some(c) => c,
                None => return Ok(Box::new(EmptyCursor)),
            };
            let direction = self.order.natural_direction().unwrap_or(1);
            return Ok(Box::new(TableScanCursor::new(
                collection, direction, start_loc,
            )));
        }

        if start_loc.is_some() {
            return Err(QueryError::Internal(
                "start location not implemented for indexed plans".into(),
            ));
        }

        let collection = self
            .collection
            .ok_or_else(|| QueryError::Internal("indexed plan without collection".into()))?;
        let idx_no = self.idx_no.expect("indexed plan");
        let cursor_direction = if self.direction >= 0 { 1 } else { -1 };

        if self.start_or_end_spec {
            let start = self.start_key.clone().expect("explicit bounds");
            let end = self.end_key.clone().expect("explicit bounds");
            return Ok(Box::new(BtreeCursor::new_bounded(
                collection,
                idx_no,
                start,
                end,
                self.end_key_inclusive,
                cursor_direction,
            )));
        }

        let frv = self.frv.clone().expect("indexed plan has range vector");
        if collection.idx(idx_no).spec().plugin().is_some() {
            // A plugin index scanned as a plain btree: simple outer bounds.
            return Ok(Box::new(BtreeCursor::new_bounded(
                collection,
                idx_no,
                frv.start_key(),
                frv.end_key(),
                true,
                cursor_direction,
            )));
        }
        Ok(Box::new(BtreeCursor::new_with_vector(
            collection, idx_no, frv,
        )))
    }

    /// Reverse natural-order cursor; defined for table-scan plans only.
    pub fn new_reverse_cursor(&self) -> PlannerResult<Box<dyn Cursor + 'a>> {
        if !self.will_scan_table() {
            return Err(QueryError::Internal(
                "reverse cursor not implemented for indexed plans".into(),
            ));
        }
        let collection = match self.collection {
            Some(c) => c,
            None => return Ok(Box::new(EmptyCursor)),
        };
        let direction = -self.order.natural_direction().unwrap_or(1);
        Ok(Box::new(TableScanCursor::new(collection, direction, None)))
    }

    /// Short display form for warnings and explain output.
    pub fn summary(&self) -> String {
        format!("index: {}", self.index_key())
    }
}

impl std::fmt::Debug for QueryPlan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPlan")
            .field("idx_no", &self.idx_no)
            .field("index_key", &self.index_key())
            .field("optimal", &self.optimal)
            .field("scan_and_order_required", &self.scan_and_order_required)
            .field("exact_key_match", &self.exact_key_match)
            .field("direction", &self.direction)
            .field("unhelpful", &self.unhelpful)
            .field("impossible", &self.impossible)
            .field("special", &self.special)
            .finish()
    }
}
