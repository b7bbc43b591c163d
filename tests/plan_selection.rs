//! Plan Selection Tests
//!
//! Tests for planner invariants:
//! - Single-plan rules (_id equality, hint, min/max, special) win before
//!   the multi-plan race
//! - Characterization flags (optimal, exactKeyMatch, impossible,
//!   scanAndOrderRequired) drive the plan list
//! - Impossible plans prove empty results without scanning

use std::sync::Arc;

use serde_json::{json, Value};
use vellumdb::catalog::Collection;
use vellumdb::config::RuntimeConfig;
use vellumdb::cursor::Cursor;
use vellumdb::index::{
    IndexDetails, IndexPlugin, IndexSpec, KeyPattern, Suitability,
};
use vellumdb::planner::{
    PlanCache, PlannerContext, QueryPlanSet, RecordedPlanPolicy,
};
use vellumdb::query::{FieldRangeSetPair, Hint, SortSpec};

// =============================================================================
// Helper Functions
// =============================================================================

fn users_collection() -> Collection {
    let coll = Collection::new("test.users")
        .with_index(IndexDetails::new(
            "_id_",
            IndexSpec::new(KeyPattern::new([("_id", 1)])),
        ))
        .with_index(IndexDetails::new(
            "a_1_b_1",
            IndexSpec::new(KeyPattern::new([("a", 1), ("b", 1)])),
        ))
        .with_index(IndexDetails::new(
            "a_1_b_-1",
            IndexSpec::new(KeyPattern::new([("a", 1), ("b", -1)])),
        ));
    for n in 0..8 {
        coll.insert(json!({"_id": n, "a": n % 4, "b": n}));
    }
    coll
}

fn plan_set<'a>(
    coll: &'a Collection,
    ctx: PlannerContext<'a>,
    query: &Value,
    order: SortSpec,
) -> QueryPlanSet<'a> {
    QueryPlanSet::new(
        Some(coll),
        ctx,
        FieldRangeSetPair::new("test.users", query),
        None,
        query,
        None,
        order,
        None,
        RecordedPlanPolicy::Use,
        None,
        None,
    )
    .unwrap()
}

// =============================================================================
// Boundary Scenarios
// =============================================================================

/// Simple _id equality: one plan on _id, optimal and exact, no cache
/// write (one plan means no competition), and only the matching doc.
#[test]
fn test_simple_id_equality() {
    let coll = users_collection();
    let cache = PlanCache::new();
    let config = RuntimeConfig::new();
    let ctx = PlannerContext {
        cache: &cache,
        config: &config,
    };

    let query = json!({"_id": 7});
    let qps = plan_set(&coll, ctx, &query, SortSpec::none());
    assert_eq!(qps.n_plans(), 1);
    let plan = qps.first_plan().unwrap();
    assert_eq!(plan.index_key(), KeyPattern::new([("_id", 1)]));
    assert!(plan.optimal());
    assert!(plan.exact_key_match());
    assert!(!qps.may_record_plan());

    let mut cursor = plan.new_cursor(None, 0).unwrap();
    let mut found = Vec::new();
    while cursor.ok() {
        found.push(cursor.curr_loc().unwrap());
        cursor.advance();
    }
    assert_eq!(found.len(), 1);
    assert_eq!(coll.doc_at(found[0]).unwrap()["_id"], json!(7));
}

/// Sort by an indexed suffix after an equality prefix is served in
/// forward order.
#[test]
fn test_sort_by_indexed_prefix() {
    let coll = users_collection();
    let cache = PlanCache::new();
    let config = RuntimeConfig::new();
    let ctx = PlannerContext {
        cache: &cache,
        config: &config,
    };

    let query = json!({"a": 5});
    let frsp = FieldRangeSetPair::new("test.users", &query);
    let qps = QueryPlanSet::new(
        Some(&coll),
        ctx,
        frsp,
        None,
        &query,
        None,
        SortSpec::asc("b"),
        Some(Hint::Index("a_1_b_1".into())),
        RecordedPlanPolicy::Use,
        None,
        None,
    )
    .unwrap();
    let plan = qps.first_plan().unwrap();
    assert!(!plan.scan_and_order_required());
    assert_eq!(plan.direction(), 1);
    assert!(plan.optimal());
}

/// A direction conflict on the second sort field leaves the order
/// unserved.
#[test]
fn test_sort_direction_conflict() {
    let coll = users_collection();
    let cache = PlanCache::new();
    let config = RuntimeConfig::new();
    let ctx = PlannerContext {
        cache: &cache,
        config: &config,
    };

    let query = json!({});
    let frsp = FieldRangeSetPair::new("test.users", &query);
    let qps = QueryPlanSet::new(
        Some(&coll),
        ctx,
        frsp,
        None,
        &query,
        None,
        SortSpec::new([("a", 1), ("b", 1)]),
        Some(Hint::Index("a_1_b_-1".into())),
        RecordedPlanPolicy::Use,
        None,
        None,
    )
    .unwrap();
    let plan = qps.first_plan().unwrap();
    assert!(plan.scan_and_order_required());
    assert_eq!(plan.direction(), 0);
}

/// A statically empty predicate yields exactly one impossible plan, an
/// empty cursor, and no cache write.
#[test]
fn test_impossible_predicate() {
    let coll = users_collection();
    let cache = PlanCache::new();
    let config = RuntimeConfig::new();
    let ctx = PlannerContext {
        cache: &cache,
        config: &config,
    };

    let query = json!({"a": {"$gt": 5, "$lt": 5}});
    let qps = plan_set(&coll, ctx, &query, SortSpec::none());
    assert_eq!(qps.n_plans(), 1);
    let plan = qps.first_plan().unwrap();
    assert!(plan.impossible());
    assert!(!plan.scan_and_order_required());
    assert!(!qps.may_record_plan());

    let cursor = plan.new_cursor(None, 0).unwrap();
    assert!(!cursor.ok());
    assert_eq!(cursor.nscanned(), 0);

    plan.register_self(0);
    let frsp = FieldRangeSetPair::new("test.users", &query);
    let single =
        vellumdb::query::QueryPattern::new(frsp.single(), &SortSpec::none());
    assert!(cache.index_for_pattern("test.users", &single).is_none());
}

// =============================================================================
// Special (Plugin) Indexes
// =============================================================================

struct GeoPlugin;

impl IndexPlugin for GeoPlugin {
    fn name(&self) -> &str {
        "geo"
    }

    fn suitability(&self, query: &Value, _order: &SortSpec) -> Suitability {
        let claims = query
            .as_object()
            .map(|o| {
                o.values().any(|v| {
                    v.as_object()
                        .map(|ops| ops.contains_key("$near"))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);
        if claims {
            Suitability::Optimal
        } else {
            Suitability::Useless
        }
    }

    fn scan_and_order_required(&self, _query: &Value, order: &SortSpec) -> bool {
        !order.is_empty()
    }

    fn new_cursor<'a>(
        &self,
        collection: &'a Collection,
        _query: &Value,
        _order: &SortSpec,
        _num_wanted: usize,
    ) -> Box<dyn Cursor + 'a> {
        Box::new(vellumdb::cursor::TableScanCursor::new(collection, 1, None))
    }
}

/// A $near predicate picks the matching plugin index as the sole plan,
/// marked optimal.
#[test]
fn test_special_predicate_selects_plugin_index() {
    let coll = Collection::new("test.places").with_index(IndexDetails::new(
        "loc_geo",
        IndexSpec::with_plugin(KeyPattern::new([("loc", 1)]), Arc::new(GeoPlugin)),
    ));
    coll.insert(json!({"loc": [1.0, 2.0]}));

    let cache = PlanCache::new();
    let config = RuntimeConfig::new();
    let ctx = PlannerContext {
        cache: &cache,
        config: &config,
    };

    let query = json!({"loc": {"$near": [1.0, 2.0]}});
    let qps = QueryPlanSet::new(
        Some(&coll),
        ctx,
        FieldRangeSetPair::new("test.places", &query),
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
    let plan = qps.first_plan().unwrap();
    assert_eq!(plan.special(), Some("geo"));
    assert!(plan.optimal());
}

/// A special predicate with no matching plugin index rejects the query.
#[test]
fn test_special_predicate_without_plugin_rejected() {
    let coll = users_collection();
    let cache = PlanCache::new();
    let config = RuntimeConfig::new();
    let ctx = PlannerContext {
        cache: &cache,
        config: &config,
    };

    let query = json!({"loc": {"$near": [1.0, 2.0]}});
    let err = QueryPlanSet::new(
        Some(&coll),
        ctx,
        FieldRangeSetPair::new("test.users", &query),
        None,
        &query,
        None,
        SortSpec::none(),
        None,
        RecordedPlanPolicy::Use,
        None,
        None,
    )
    .unwrap_err();
    assert_eq!(err.code(), "VELLUM_QUERY_SPECIAL_INDEX_MISSING");
}

// =============================================================================
// Plan Set Determinism
// =============================================================================

/// Building a plan set twice with identical inputs and an empty cache
/// produces identical plan sequences.
#[test]
fn test_plan_sequence_deterministic() {
    let coll = users_collection();
    let cache = PlanCache::new();
    let config = RuntimeConfig::new();
    let ctx = PlannerContext {
        cache: &cache,
        config: &config,
    };

    let query = json!({"a": {"$gt": 1}, "b": {"$gt": 2}});
    let keys = |qps: &QueryPlanSet<'_>| {
        qps.plans()
            .iter()
            .map(|p| p.index_key())
            .collect::<Vec<_>>()
    };

    let first = plan_set(&coll, ctx, &query, SortSpec::none());
    let second = plan_set(&coll, ctx, &query, SortSpec::none());
    assert_eq!(keys(&first), keys(&second));
}

/// The min/max auditor feeds a single bounded plan.
#[test]
fn test_min_max_bounded_plan_scans_range() {
    let coll = users_collection();
    let cache = PlanCache::new();
    let config = RuntimeConfig::new();
    let ctx = PlannerContext {
        cache: &cache,
        config: &config,
    };

    let query = json!({});
    let qps = QueryPlanSet::new(
        Some(&coll),
        ctx,
        FieldRangeSetPair::new("test.users", &query),
        None,
        &query,
        None,
        SortSpec::none(),
        None,
        RecordedPlanPolicy::Use,
        Some(json!({"_id": 2})),
        Some(json!({"_id": 5})),
    )
    .unwrap();
    assert_eq!(qps.n_plans(), 1);
    let plan = qps.first_plan().unwrap();
    assert_eq!(plan.index_key(), KeyPattern::new([("_id", 1)]));

    // max is exclusive: _id in [2, 5).
    let mut cursor = plan.new_cursor(None, 0).unwrap();
    let mut ids = Vec::new();
    while cursor.ok() {
        ids.push(coll.doc_at(cursor.curr_loc().unwrap()).unwrap()["_id"].clone());
        cursor.advance();
    }
    assert_eq!(ids, vec![json!(2), json!(3), json!(4)]);
}
