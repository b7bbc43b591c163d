//! Candidate plan construction for a single predicate.
//!
//! Build order (first rule that matches wins): missing collection or
//! impossible match, hint, min/max bounds, simple `_id` equality, empty
//! query and order, special predicate, recorded plan, all viable plans.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::catalog::Collection;
use crate::query::{
    FieldRangeSetPair, Hint, Projection, QueryPattern, SortSpec,
};

use super::auditor;
use super::errors::{PlannerResult, QueryError};
use super::plan::{PlanBounds, QueryPlan};
use super::useful;
use super::PlannerContext;

/// How the plan cache may influence planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedPlanPolicy {
    /// Never consult the cache.
    Ignore,
    /// Use a recorded plan whenever one exists.
    Use,
    /// Use a recorded plan only if it serves the requested order.
    UseIfInOrder,
}

/// The candidate plans for one predicate, in preference order.
pub struct QueryPlanSet<'a> {
    collection: Option<&'a Collection>,
    ctx: PlannerContext<'a>,
    ns: String,
    original_query: Value,
    fields: Option<Projection>,
    frsp: FieldRangeSetPair,
    original_frsp: Option<FieldRangeSetPair>,
    may_record_plan: bool,
    using_cached_plan: bool,
    hint: Option<Hint>,
    order: SortSpec,
    old_nscanned: u64,
    recorded_plan_policy: RecordedPlanPolicy,
    min: Option<Value>,
    max: Option<Value>,
    special: Option<String>,
    plans: Vec<Arc<QueryPlan<'a>>>,
    fallback_plans: Vec<Arc<QueryPlan<'a>>>,
}

/// A single `_id` equality against a scalar: `{_id: <scalar>}`.
pub fn is_simple_id_query(query: &Value) -> bool {
    let obj = match query {
        Value::Object(obj) => obj,
        _ => return false,
    };
    if obj.len() != 1 {
        return false;
    }
    match obj.get("_id") {
        Some(v) => !v.is_object() && !v.is_array(),
        None => false,
    }
}

impl<'a> QueryPlanSet<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        collection: Option<&'a Collection>,
        ctx: PlannerContext<'a>,
        frsp: FieldRangeSetPair,
        original_frsp: Option<FieldRangeSetPair>,
        original_query: &Value,
        fields: Option<Projection>,
        order: SortSpec,
        hint: Option<Hint>,
        recorded_plan_policy: RecordedPlanPolicy,
        min: Option<Value>,
        max: Option<Value>,
    ) -> PlannerResult<Self> {
        let mut set = QueryPlanSet {
            collection,
            ctx,
            ns: frsp.ns().to_string(),
            original_query: original_query.clone(),
            fields,
            frsp,
            original_frsp,
            may_record_plan: false,
            using_cached_plan: false,
            hint,
            order,
            old_nscanned: 0,
            recorded_plan_policy,
            min,
            max,
            special: None,
            plans: Vec::new(),
            fallback_plans: Vec::new(),
        };
        set.init()?;
        Ok(set)
    }

    fn make_plan(
        &self,
        idx_no: Option<usize>,
        bounds: PlanBounds,
        special: Option<String>,
    ) -> PlannerResult<Arc<QueryPlan<'a>>> {
        Ok(Arc::new(QueryPlan::new(
            self.collection,
            idx_no,
            &self.frsp,
            self.original_frsp.as_ref(),
            &self.original_query,
            self.fields.as_ref(),
            &self.order,
            bounds,
            special,
            self.ctx,
        )?))
    }

    fn table_scan_plan(&self) -> PlannerResult<Arc<QueryPlan<'a>>> {
        self.make_plan(None, PlanBounds::default(), None)
    }

    /// Resolves a hint to an index ordinal; `None` means natural order.
    fn parse_hint(hint: &Hint, collection: &Collection) -> PlannerResult<Option<usize>> {
        match hint {
            Hint::Natural => Ok(None),
            Hint::Index(name) => collection
                .find_index_by_name(name)
                .map(Some)
                .ok_or_else(|| QueryError::BadHint(format!("unknown index name '{}'", name))),
            Hint::KeyPattern(kp) => {
                if kp.is_natural() {
                    return Ok(None);
                }
                collection
                    .find_index_by_key_pattern(kp)
                    .map(Some)
                    .ok_or_else(|| QueryError::BadHint(format!("no index with key {}", kp)))
            }
        }
    }

    fn add_hinted_plan(&mut self, collection: &Collection, idx_no: usize) -> PlannerResult<()> {
        let bounds = if self.min.is_some() || self.max.is_some() {
            // Validate and complete the bounds against the hinted index.
            let resolved = auditor::index_for_range(
                collection,
                self.min.as_ref(),
                self.max.as_ref(),
                Some(collection.idx(idx_no).key_pattern()),
            )?;
            PlanBounds {
                start: Some(resolved.start),
                end: Some(resolved.end),
            }
        } else {
            PlanBounds::default()
        };
        let plan = self.make_plan(Some(idx_no), bounds, None)?;
        self.plans.push(plan);
        Ok(())
    }

    fn init(&mut self) -> PlannerResult<()> {
        self.plans.clear();
        self.fallback_plans.clear();
        self.using_cached_plan = false;
        self.may_record_plan = false;
        self.special = None;
        self.old_nscanned = 0;

        // Rule 1: nothing to plan against.
        let collection = match self.collection {
            Some(c) if self.frsp.match_possible() => c,
            _ => {
                let plan = self.table_scan_plan()?;
                self.plans.push(plan);
                return Ok(());
            }
        };

        // Rule 2: hint.
        if let Some(hint) = self.hint.clone() {
            match Self::parse_hint(&hint, collection)? {
                Some(idx_no) => self.add_hinted_plan(collection, idx_no)?,
                None => {
                    if self.min.is_some() || self.max.is_some() {
                        return Err(QueryError::BadHint(
                            "natural order cannot be specified with min/max keys".into(),
                        ));
                    }
                    let plan = self.table_scan_plan()?;
                    self.plans.push(plan);
                }
            }
            return Ok(());
        }

        // Rule 3: min/max bounds resolve to a single index.
        if self.min.is_some() || self.max.is_some() {
            let resolved = auditor::index_for_range(
                collection,
                self.min.as_ref(),
                self.max.as_ref(),
                None,
            )?;
            let plan = self.make_plan(
                Some(resolved.idx_no),
                PlanBounds {
                    start: Some(resolved.start),
                    end: Some(resolved.end),
                },
                None,
            )?;
            self.plans.push(plan);
            return Ok(());
        }

        // Rule 4: simple _id equality.
        if is_simple_id_query(&self.original_query) {
            if let Some(idx_no) = collection.find_id_index() {
                let plan = self.make_plan(Some(idx_no), PlanBounds::default(), None)?;
                self.plans.push(plan);
                return Ok(());
            }
        }

        // Rule 5: empty predicate, no order.
        if self
            .original_query
            .as_object()
            .map(|o| o.is_empty())
            .unwrap_or(false)
            && self.order.is_empty()
        {
            let plan = self.table_scan_plan()?;
            self.plans.push(plan);
            return Ok(());
        }

        // Rule 6: the predicate demands an index plugin.
        if let Some(special) = self.frsp.special().map(str::to_string) {
            for (j, index) in collection.indexes().iter().enumerate() {
                let claims = index.spec().plugin().map_or(false, |p| {
                    p.name() == special
                        && p.suitability(&self.original_query, &self.order)
                            != crate::index::Suitability::Useless
                });
                if claims {
                    let plan =
                        self.make_plan(Some(j), PlanBounds::default(), Some(special.clone()))?;
                    self.plans.push(plan);
                    self.special = Some(special);
                    return Ok(());
                }
            }
            return Err(QueryError::SpecialIndexMissing(special));
        }

        // Rule 7: recorded plan.
        if self.recorded_plan_policy != RecordedPlanPolicy::Ignore {
            let single = QueryPattern::new(self.frsp.single(), &self.order);
            let multi = QueryPattern::new(self.frsp.multi(), &self.order);
            if let Some(cached) = self
                .ctx
                .cache
                .best_index_for_patterns(&self.ns, &single, &multi)
            {
                self.old_nscanned = cached.nscanned;
                let plan = if cached.index_key.is_natural() {
                    Some(self.table_scan_plan()?)
                } else {
                    match collection.find_index_by_key_pattern(&cached.index_key) {
                        Some(idx_no) => {
                            Some(self.make_plan(Some(idx_no), PlanBounds::default(), None)?)
                        }
                        // The recorded index no longer exists; plan from
                        // scratch and let the next winner overwrite the
                        // entry.
                        None => None,
                    }
                };
                if let Some(plan) = plan {
                    let in_order_ok = !(self.recorded_plan_policy
                        == RecordedPlanPolicy::UseIfInOrder
                        && plan.scan_and_order_required());
                    if !plan.unhelpful() && in_order_ok {
                        self.using_cached_plan = true;
                        self.plans.push(plan);
                        self.add_other_plans(true)?;
                        return Ok(());
                    }
                }
            }
        }

        // Rule 8: all viable plans.
        self.add_other_plans(false)
    }

    /// Builds the "all viable plans" list, into the fallback list when a
    /// cached plan occupies the active slot.
    fn add_other_plans(&mut self, to_fallback: bool) -> PlannerResult<()> {
        let collection = match self.collection {
            Some(c) => c,
            None => return Ok(()),
        };

        let mut out: Vec<Arc<QueryPlan<'a>>> = Vec::new();
        let mut record_on_success = false;

        // Table scan is itself optimal when nothing is constrained, and
        // mandatory when natural order was requested.
        if !self.frsp.match_possible()
            || (self.frsp.no_non_universal_ranges() && self.order.is_empty())
            || self.order.natural_direction().is_some()
        {
            out.push(self.table_scan_plan()?);
        } else {
            let mut plans = Vec::new();
            let mut optimal_plan: Option<Arc<QueryPlan<'a>>> = None;
            let mut special_plan: Option<Arc<QueryPlan<'a>>> = None;
            let mut impossible_plan: Option<Arc<QueryPlan<'a>>> = None;

            for i in 0..collection.n_indexes() {
                if !useful::index_useful(&self.frsp, collection, i, &self.order) {
                    continue;
                }
                let p = self.make_plan(Some(i), PlanBounds::default(), None)?;
                if p.impossible() {
                    // An empty result is proven; one plan suffices.
                    impossible_plan = Some(p);
                    break;
                }
                if p.optimal() {
                    if optimal_plan.is_none() {
                        optimal_plan = Some(p);
                    }
                } else if !p.unhelpful() {
                    if p.special().is_none() {
                        plans.push(p);
                    } else {
                        special_plan = Some(p);
                    }
                }
            }

            if let Some(p) = impossible_plan {
                out.push(p);
            } else if let Some(p) = optimal_plan {
                out.push(p);
            } else if plans.is_empty() && special_plan.is_some() {
                out.push(special_plan.expect("checked above"));
            } else {
                out = plans;
                out.push(self.table_scan_plan()?);
                record_on_success = true;
            }
        }

        if to_fallback {
            // Recording stays off until the fallbacks are promoted.
            self.fallback_plans = out;
        } else {
            self.plans = out;
            if record_on_success {
                self.may_record_plan = true;
            }
        }
        Ok(())
    }

    /// Promotes the fallback list, de-duplicated against the active plan.
    pub fn add_fallback_plans(&mut self) {
        let head_key = self.plans.first().map(|p| p.index_key());
        for p in self.fallback_plans.drain(..) {
            if Some(p.index_key()) != head_key {
                self.plans.push(p);
            }
        }
        self.may_record_plan = true;
    }

    /// The first plan not requiring a buffered sort; `None` when every
    /// plan does (callers treat that as "no viable cursor").
    pub fn get_best_guess(&self) -> Option<Arc<QueryPlan<'a>>> {
        if let Some(first) = self.plans.first() {
            if !first.scan_and_order_required() {
                return Some(first.clone());
            }
        }
        if let Some(p) = self
            .plans
            .iter()
            .skip(1)
            .find(|p| !p.scan_and_order_required())
        {
            return Some(p.clone());
        }
        let choices: Vec<String> = self.plans.iter().map(|p| p.index_key().to_string()).collect();
        warn!(
            namespace = %self.ns,
            query = %self.original_query,
            choices = ?choices,
            "best guess query plan requested, but scan and order are \
             required for all plans"
        );
        None
    }

    /// When the plan set was built from a cached plan that did not
    /// survive, invalidates the cache entries and rebuilds from scratch.
    /// Returns whether a retry makes sense.
    pub fn prepare_to_retry(&mut self) -> PlannerResult<bool> {
        if !self.using_cached_plan || self.plans.len() > 1 {
            return Ok(false);
        }
        let single = QueryPattern::new(self.frsp.single(), &self.order);
        let multi = QueryPattern::new(self.frsp.multi(), &self.order);
        self.ctx
            .cache
            .clear_indexes_for_patterns(&self.ns, &single, &multi);
        self.init()?;
        Ok(true)
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    pub fn n_plans(&self) -> usize {
        self.plans.len()
    }

    pub fn plans(&self) -> &[Arc<QueryPlan<'a>>] {
        &self.plans
    }

    pub fn first_plan(&self) -> Option<Arc<QueryPlan<'a>>> {
        self.plans.first().cloned()
    }

    pub fn fallback_plans(&self) -> &[Arc<QueryPlan<'a>>] {
        &self.fallback_plans
    }

    pub fn using_cached_plan(&self) -> bool {
        self.using_cached_plan
    }

    pub(crate) fn clear_using_cached_plan(&mut self) {
        self.using_cached_plan = false;
    }

    pub fn may_record_plan(&self) -> bool {
        self.may_record_plan
    }

    pub fn old_nscanned(&self) -> u64 {
        self.old_nscanned
    }

    pub fn special(&self) -> Option<&str> {
        self.special.as_deref()
    }

    pub fn order(&self) -> &SortSpec {
        &self.order
    }

    pub fn has_multikey(&self) -> bool {
        self.plans.iter().any(|p| p.is_multikey())
    }

    pub fn have_in_order_plan(&self) -> bool {
        self.plans.iter().any(|p| !p.scan_and_order_required())
    }

    pub fn possible_in_order_plan(&self) -> bool {
        self.have_in_order_plan()
            || self
                .fallback_plans
                .iter()
                .any(|p| !p.scan_and_order_required())
    }

    pub fn possible_out_of_order_plan(&self) -> bool {
        self.plans
            .iter()
            .chain(self.fallback_plans.iter())
            .any(|p| p.scan_and_order_required())
    }
}

impl std::fmt::Debug for QueryPlanSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPlanSet")
            .field("ns", &self.ns)
            .field("plans", &self.plans)
            .field("fallback_plans", &self.fallback_plans.len())
            .field("using_cached_plan", &self.using_cached_plan)
            .field("may_record_plan", &self.may_record_plan)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::index::{IndexDetails, IndexSpec, KeyPattern};
    use crate::planner::cache::PlanCache;
    use serde_json::json;

    fn ctx<'a>(cache: &'a PlanCache, config: &'a RuntimeConfig) -> PlannerContext<'a> {
        PlannerContext { cache, config }
    }

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
                "b_1",
                IndexSpec::new(KeyPattern::new([("b", 1)])),
            ))
    }

    fn plan_set<'a>(
        coll: &'a Collection,
        ctx: PlannerContext<'a>,
        query: &Value,
        order: SortSpec,
        hint: Option<Hint>,
        policy: RecordedPlanPolicy,
    ) -> PlannerResult<QueryPlanSet<'a>> {
        QueryPlanSet::new(
            Some(coll),
            ctx,
            FieldRangeSetPair::new("test.c", query),
            None,
            query,
            None,
            order,
            hint,
            policy,
            None,
            None,
        )
    }

    #[test]
    fn test_simple_id_query_single_plan() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        let qps = plan_set(
            &coll,
            ctx(&cache, &config),
            &json!({"_id": 7}),
            SortSpec::none(),
            None,
            RecordedPlanPolicy::Use,
        )
        .unwrap();
        assert_eq!(qps.n_plans(), 1);
        let p = qps.first_plan().unwrap();
        assert_eq!(p.index_key(), KeyPattern::new([("_id", 1)]));
        assert!(p.optimal());
        assert!(!qps.may_record_plan());
    }

    #[test]
    fn test_all_viable_plans_appends_table_scan() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        // Constrains a and b but no optimal plan (range on both).
        let qps = plan_set(
            &coll,
            ctx(&cache, &config),
            &json!({"a": {"$gt": 1}, "b": {"$gt": 2}}),
            SortSpec::none(),
            None,
            RecordedPlanPolicy::Ignore,
        )
        .unwrap();
        let keys: Vec<KeyPattern> = qps.plans().iter().map(|p| p.index_key()).collect();
        assert!(keys.contains(&KeyPattern::new([("a", 1)])));
        assert!(keys.contains(&KeyPattern::new([("b", 1)])));
        assert_eq!(*keys.last().unwrap(), KeyPattern::natural(1));
        assert!(qps.may_record_plan());
    }

    #[test]
    fn test_optimal_plan_emitted_alone() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        let qps = plan_set(
            &coll,
            ctx(&cache, &config),
            &json!({"a": 5}),
            SortSpec::none(),
            None,
            RecordedPlanPolicy::Ignore,
        )
        .unwrap();
        assert_eq!(qps.n_plans(), 1);
        assert!(qps.first_plan().unwrap().optimal());
    }

    #[test]
    fn test_impossible_plan_emitted_alone() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        let qps = plan_set(
            &coll,
            ctx(&cache, &config),
            &json!({"a": {"$gt": 5, "$lt": 5}}),
            SortSpec::none(),
            None,
            RecordedPlanPolicy::Ignore,
        )
        .unwrap();
        assert_eq!(qps.n_plans(), 1);
        assert!(qps.first_plan().unwrap().impossible());
        assert!(!qps.may_record_plan());
    }

    #[test]
    fn test_hint_by_name_and_pattern() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        let qps = plan_set(
            &coll,
            ctx(&cache, &config),
            &json!({"a": 1}),
            SortSpec::none(),
            Some(Hint::Index("b_1".into())),
            RecordedPlanPolicy::Use,
        )
        .unwrap();
        assert_eq!(qps.n_plans(), 1);
        assert_eq!(
            qps.first_plan().unwrap().index_key(),
            KeyPattern::new([("b", 1)])
        );

        let err = plan_set(
            &coll,
            ctx(&cache, &config),
            &json!({"a": 1}),
            SortSpec::none(),
            Some(Hint::Index("nope".into())),
            RecordedPlanPolicy::Use,
        )
        .unwrap_err();
        assert_eq!(err.code(), "VELLUM_QUERY_BAD_HINT");
    }

    #[test]
    fn test_natural_hint_with_min_max_rejected() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        let err = QueryPlanSet::new(
            Some(&coll),
            ctx(&cache, &config),
            FieldRangeSetPair::new("test.c", &json!({})),
            None,
            &json!({}),
            None,
            SortSpec::none(),
            Some(Hint::Natural),
            RecordedPlanPolicy::Use,
            Some(json!({"a": 1})),
            None,
        )
        .unwrap_err();
        assert_eq!(err.code(), "VELLUM_QUERY_BAD_HINT");
    }

    #[test]
    fn test_min_max_resolves_single_plan() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        let qps = QueryPlanSet::new(
            Some(&coll),
            ctx(&cache, &config),
            FieldRangeSetPair::new("test.c", &json!({})),
            None,
            &json!({}),
            None,
            SortSpec::none(),
            None,
            RecordedPlanPolicy::Use,
            Some(json!({"a": 1})),
            Some(json!({"a": 9})),
        )
        .unwrap();
        assert_eq!(qps.n_plans(), 1);
        let p = qps.first_plan().unwrap();
        assert_eq!(p.index_key(), KeyPattern::new([("a", 1)]));
        assert!(p.start_key().is_some());
        assert!(p.end_key().is_some());
        assert!(!p.end_key_inclusive());
    }

    #[test]
    fn test_cached_plan_becomes_sole_active_plan() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        let query = json!({"a": {"$gt": 0}, "b": {"$gt": 0}});
        let frsp = FieldRangeSetPair::new("test.c", &query);
        let single = QueryPattern::new(frsp.single(), &SortSpec::none());
        cache.register_index_for_pattern("test.c", &single, Some(KeyPattern::new([("b", 1)])), 25);

        let qps = plan_set(
            &coll,
            ctx(&cache, &config),
            &query,
            SortSpec::none(),
            None,
            RecordedPlanPolicy::Use,
        )
        .unwrap();
        assert!(qps.using_cached_plan());
        assert_eq!(qps.n_plans(), 1);
        assert_eq!(qps.old_nscanned(), 25);
        assert_eq!(
            qps.first_plan().unwrap().index_key(),
            KeyPattern::new([("b", 1)])
        );
        assert!(!qps.fallback_plans().is_empty());
        assert!(!qps.may_record_plan());
    }

    #[test]
    fn test_add_fallback_plans_dedups_by_index_key() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        let query = json!({"a": {"$gt": 0}, "b": {"$gt": 0}});
        let frsp = FieldRangeSetPair::new("test.c", &query);
        let single = QueryPattern::new(frsp.single(), &SortSpec::none());
        cache.register_index_for_pattern("test.c", &single, Some(KeyPattern::new([("b", 1)])), 25);

        let mut qps = plan_set(
            &coll,
            ctx(&cache, &config),
            &query,
            SortSpec::none(),
            None,
            RecordedPlanPolicy::Use,
        )
        .unwrap();
        qps.add_fallback_plans();
        assert!(qps.may_record_plan());
        assert!(qps.fallback_plans().is_empty());

        let keys: Vec<KeyPattern> = qps.plans().iter().map(|p| p.index_key()).collect();
        let b_count = keys
            .iter()
            .filter(|k| **k == KeyPattern::new([("b", 1)]))
            .count();
        assert_eq!(b_count, 1);
    }

    #[test]
    fn test_use_if_in_order_skips_out_of_order_cached_plan() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        // Record index b for a query sorted by a: plan on b needs a sort.
        let query = json!({"b": {"$gt": 0}});
        let order = SortSpec::asc("a");
        let frsp = FieldRangeSetPair::new("test.c", &query);
        let single = QueryPattern::new(frsp.single(), &order);
        cache.register_index_for_pattern("test.c", &single, Some(KeyPattern::new([("b", 1)])), 5);

        let qps = plan_set(
            &coll,
            ctx(&cache, &config),
            &query,
            order,
            None,
            RecordedPlanPolicy::UseIfInOrder,
        )
        .unwrap();
        assert!(!qps.using_cached_plan());
        assert!(qps.n_plans() > 1);
    }

    #[test]
    fn test_best_guess_prefers_in_order_plan() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();

        let qps = plan_set(
            &coll,
            ctx(&cache, &config),
            &json!({"b": {"$gt": 0}}),
            SortSpec::asc("a"),
            None,
            RecordedPlanPolicy::Ignore,
        )
        .unwrap();
        let guess = qps.get_best_guess().unwrap();
        assert!(!guess.scan_and_order_required());
        assert_eq!(guess.index_key(), KeyPattern::new([("a", 1)]));
    }

    #[test]
    fn test_identical_inputs_identical_plans() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let coll = collection();
        let query = json!({"a": {"$gt": 1}, "b": {"$gt": 2}});

        let keys = |qps: &QueryPlanSet<'_>| {
            qps.plans()
                .iter()
                .map(|p| p.index_key())
                .collect::<Vec<_>>()
        };
        let a = plan_set(
            &coll,
            ctx(&cache, &config),
            &query,
            SortSpec::none(),
            None,
            RecordedPlanPolicy::Ignore,
        )
        .unwrap();
        let b = plan_set(
            &coll,
            ctx(&cache, &config),
            &query,
            SortSpec::none(),
            None,
            RecordedPlanPolicy::Ignore,
        )
        .unwrap();
        assert_eq!(keys(&a), keys(&b));
    }

    #[test]
    fn test_missing_collection_single_table_plan() {
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();

        let query = json!({"a": 1});
        let qps = QueryPlanSet::new(
            None,
            ctx(&cache, &config),
            FieldRangeSetPair::new("test.missing", &query),
            None,
            &query,
            None,
            SortSpec::none(),
            None,
            RecordedPlanPolicy::Use,
            None,
            None,
        )
        .unwrap();
        assert_eq!(qps.n_plans(), 1);
        assert!(qps.first_plan().unwrap().will_scan_table());
    }
}
