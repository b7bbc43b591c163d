//! High-level query execution entry points.
//!
//! `run_query` plans, races, and drains a query to completion, applying
//! the buffered sort when the winning plan cannot produce the requested
//! order. `best_guess_cursor` skips the race and opens the plan set's
//! first in-order plan. `or_query_cursor` exposes a `$or` query as a
//! single streaming cursor.

use std::cmp::Ordering;

use serde_json::Value;

use crate::catalog::{Collection, DocLoc};
use crate::cursor::Cursor;
use crate::index::{KeyPattern, KeyValue};
use crate::planner::{
    ExplainQueryInfo, PlannerContext, PlannerResult, QueryError, QueryPlanSet,
    RecordedPlanPolicy,
};
use crate::query::{FieldRangeSetPair, Hint, Matcher, Projection, SortSpec};

use super::multi_cursor::MultiCursor;
use super::ops::{FindOp, QueryOp};
use super::scanner::MultiPlanScanner;

/// A fully specified query request.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub query: Value,
    pub fields: Option<Projection>,
    pub order: SortSpec,
    pub hint: Option<Hint>,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub policy: RecordedPlanPolicy,
    pub limit: Option<usize>,
    pub explain: bool,
}

impl QuerySpec {
    pub fn new(query: Value) -> Self {
        QuerySpec {
            query,
            fields: None,
            order: SortSpec::none(),
            hint: None,
            min: None,
            max: None,
            policy: RecordedPlanPolicy::Use,
            limit: None,
            explain: false,
        }
    }

    pub fn with_fields(mut self, fields: Projection) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_order(mut self, order: SortSpec) -> Self {
        self.order = order;
        self
    }

    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_min(mut self, min: Value) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: Value) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_policy(mut self, policy: RecordedPlanPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_explain(mut self) -> Self {
        self.explain = true;
        self
    }
}

/// The outcome of a drained query.
#[derive(Debug)]
pub struct QueryResult {
    pub docs: Vec<Value>,
    pub locs: Vec<DocLoc>,
    pub nscanned: u64,
    /// Key pattern of the winning access path.
    pub index_key: Option<KeyPattern>,
    /// Whether the results needed a buffered sort.
    pub scan_and_order: bool,
    pub explain: Option<ExplainQueryInfo>,
}

/// Cross-type ordering for sort evaluation; mirrors index key order, with
/// missing fields sorting first.
fn sort_value(doc: &Value, field: &str) -> KeyValue {
    doc.get(field)
        .and_then(KeyValue::from_json)
        .unwrap_or(KeyValue::MinKey)
}

fn compare_docs(a: &Value, b: &Value, order: &SortSpec) -> Ordering {
    for sf in order.fields() {
        let mut c = sort_value(a, &sf.name).cmp(&sort_value(b, &sf.name));
        if sf.direction < 0 {
            c = c.reverse();
        }
        if c != Ordering::Equal {
            return c;
        }
    }
    Ordering::Equal
}

/// Buffers and sorts results for plans that cannot produce the requested
/// order.
fn sort_results(results: &mut [(DocLoc, Value)], order: &SortSpec) {
    results.sort_by(|(_, a), (_, b)| compare_docs(a, b, order));
}

/// Plans, races, and drains a query.
pub fn run_query<'a>(
    collection: Option<&'a Collection>,
    ctx: PlannerContext<'a>,
    ns: &str,
    spec: QuerySpec,
) -> PlannerResult<QueryResult> {
    let base = FindOp::new(collection, spec.limit);
    let mut scanner = MultiPlanScanner::new(
        collection,
        ctx,
        ns,
        &spec.query,
        spec.fields.clone(),
        spec.order.clone(),
        spec.hint.clone(),
        spec.policy,
        spec.min.clone(),
        spec.max.clone(),
        base,
    )?;
    if spec.explain {
        scanner = scanner.with_explain();
    }

    scanner.run_to_completion()?;
    let explain = scanner.explain_info().cloned();
    let op = scanner
        .take_final_op()
        .ok_or_else(|| QueryError::Internal("query finished without an op".into()))?;

    if let Some(e) = op.core().exception() {
        return Err(QueryError::NoViablePlan(e.message.clone()));
    }

    let plan = op.core().plan().cloned();
    let scan_and_order = plan
        .as_ref()
        .map(|p| p.scan_and_order_required())
        .unwrap_or(false);
    let index_key = plan.as_ref().map(|p| p.index_key());
    let nscanned = op.nscanned();

    let mut results = op.into_results();
    if scan_and_order {
        sort_results(&mut results, &spec.order);
        if let Some(limit) = spec.limit {
            results.truncate(limit);
        }
    }

    let (locs, docs) = results.into_iter().unzip();
    Ok(QueryResult {
        docs,
        locs,
        nscanned,
        index_key,
        scan_and_order,
        explain,
    })
}

/// Opens a cursor on the plan set's best guess without racing, with a
/// matcher attached. `None` when every plan would require a buffered
/// sort.
pub fn best_guess_cursor<'a>(
    collection: &'a Collection,
    ctx: PlannerContext<'a>,
    query: &Value,
    order: SortSpec,
) -> PlannerResult<Option<(Box<dyn Cursor + 'a>, Matcher)>> {
    let frsp = FieldRangeSetPair::new(collection.name(), query);
    let original = frsp.clone();
    let qps = QueryPlanSet::new(
        Some(collection),
        ctx,
        frsp,
        Some(original),
        query,
        None,
        order,
        None,
        RecordedPlanPolicy::UseIfInOrder,
        None,
        None,
    )?;
    let plan = match qps.get_best_guess() {
        Some(p) => p,
        None => return Ok(None),
    };
    let cursor = plan.new_cursor(None, 0)?;
    Ok(Some((cursor, Matcher::new(query))))
}

/// Exposes a `$or` query as one streaming cursor over its clauses.
pub fn or_query_cursor<'a>(
    collection: Option<&'a Collection>,
    ctx: PlannerContext<'a>,
    ns: &str,
    query: &Value,
) -> PlannerResult<MultiCursor<'a, FindOp<'a>>> {
    let base = FindOp::new(collection, None);
    let scanner = MultiPlanScanner::new(
        collection,
        ctx,
        ns,
        query,
        None,
        SortSpec::none(),
        None,
        RecordedPlanPolicy::Use,
        None,
        None,
        base,
    )?;
    MultiCursor::new(scanner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::index::{IndexDetails, IndexSpec};
    use crate::planner::PlanCache;
    use serde_json::json;

    fn collection() -> Collection {
        let coll = Collection::new("test.users")
            .with_index(IndexDetails::new(
                "_id_",
                IndexSpec::new(KeyPattern::new([("_id", 1)])),
            ))
            .with_index(IndexDetails::new(
                "age_1",
                IndexSpec::new(KeyPattern::new([("age", 1)])),
            ));
        for n in 0..10 {
            coll.insert(json!({"_id": format!("u{}", n), "age": n, "group": n % 3}));
        }
        coll
    }

    #[test]
    fn test_run_query_indexed() {
        let coll = collection();
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let ctx = PlannerContext {
            cache: &cache,
            config: &config,
        };

        let result = run_query(
            Some(&coll),
            ctx,
            "test.users",
            QuerySpec::new(json!({"age": {"$gte": 7}})),
        )
        .unwrap();
        assert_eq!(result.docs.len(), 3);
        assert_eq!(result.index_key, Some(KeyPattern::new([("age", 1)])));
        assert!(!result.scan_and_order);
    }

    #[test]
    fn test_run_query_buffered_sort() {
        let coll = collection();
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let ctx = PlannerContext {
            cache: &cache,
            config: &config,
        };

        // group is unindexed: any winning plan must buffer and sort.
        let result = run_query(
            Some(&coll),
            ctx,
            "test.users",
            QuerySpec::new(json!({"age": {"$gte": 0}})).with_order(SortSpec::desc("group")),
        )
        .unwrap();
        assert!(result.scan_and_order);
        let groups: Vec<i64> = result.docs.iter().map(|d| d["group"].as_i64().unwrap()).collect();
        let mut sorted = groups.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(groups, sorted);
    }

    #[test]
    fn test_run_query_limit() {
        let coll = collection();
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let ctx = PlannerContext {
            cache: &cache,
            config: &config,
        };

        let result = run_query(
            Some(&coll),
            ctx,
            "test.users",
            QuerySpec::new(json!({"age": {"$gte": 0}})).with_limit(4),
        )
        .unwrap();
        assert_eq!(result.docs.len(), 4);
    }

    #[test]
    fn test_best_guess_cursor_in_order() {
        let coll = collection();
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let ctx = PlannerContext {
            cache: &cache,
            config: &config,
        };

        let (cursor, _matcher) =
            best_guess_cursor(&coll, ctx, &json!({"age": {"$gte": 5}}), SortSpec::asc("age"))
                .unwrap()
                .unwrap();
        assert!(cursor.ok());
        assert!(cursor.kind().contains("age_1"));
    }

    #[test]
    fn test_or_query_cursor_streams_all_clauses() {
        let coll = collection();
        let cache = PlanCache::new();
        let config = RuntimeConfig::new();
        let ctx = PlannerContext {
            cache: &cache,
            config: &config,
        };

        let mut mc = or_query_cursor(
            Some(&coll),
            ctx,
            "test.users",
            &json!({"$or": [{"age": {"$lt": 3}}, {"age": {"$gte": 8}}]}),
        )
        .unwrap();

        let mut ages = Vec::new();
        while let Some((_, doc)) = mc.next_match().unwrap() {
            ages.push(doc["age"].as_i64().unwrap());
        }
        ages.sort();
        assert_eq!(ages, vec![0, 1, 2, 8, 9]);
    }
}
