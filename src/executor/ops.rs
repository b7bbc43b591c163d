//! The query-op contract and the document-finding op.
//!
//! A `QueryOp` is one plan's worker in the competitive race: the runner
//! clones a caller-supplied base op once per plan, initializes each child,
//! and steps them in turn. Ops never unwind the runner; step failures are
//! captured into the op's state by the runner's guard.
//!
//! When a `$or` clause finishes, the winning op becomes the base for the
//! next clause: its matcher lineage (with the finished clause's scanned
//! range registered for dedup) and accumulated results carry forward
//! through `create_child`.

use std::collections::HashSet;

use serde_json::Value;
use std::sync::Arc;

use crate::catalog::{Collection, DocLoc};
use crate::cursor::Cursor;
use crate::planner::{OpResult, PlanRuntimeError, QueryPlan};
use crate::query::{Matcher, RangeConstraint};

/// Lifecycle state of an op.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OpState {
    #[default]
    Running,
    /// Finished its scan; `stop` means the whole query is satisfied and
    /// no further `$or` clauses should run.
    Complete { stop: bool },
    Error,
}

/// State every op carries: plan assignment, matcher lineage, and the
/// captured failure, if any.
#[derive(Debug, Default)]
pub struct OpCore<'a> {
    state: OpState,
    plan: Option<Arc<QueryPlan<'a>>>,
    matcher: Option<Matcher>,
    old_matcher: Option<Matcher>,
    or_constraint: Option<RangeConstraint>,
    exception: Option<PlanRuntimeError>,
}

impl<'a> OpCore<'a> {
    pub fn state(&self) -> &OpState {
        &self.state
    }

    pub fn complete(&self) -> bool {
        matches!(self.state, OpState::Complete { .. })
    }

    /// Complete without a stop request: the clause finished but later
    /// clauses should still run.
    pub fn complete_without_stop(&self) -> bool {
        matches!(self.state, OpState::Complete { stop: false })
    }

    pub fn stop_requested(&self) -> bool {
        matches!(self.state, OpState::Complete { stop: true })
    }

    pub fn error(&self) -> bool {
        matches!(self.state, OpState::Error)
    }

    pub fn set_complete(&mut self, stop: bool) {
        self.state = OpState::Complete { stop };
    }

    /// Captures a step failure; the runner's guard is the only caller.
    pub fn set_exception(&mut self, e: PlanRuntimeError) {
        self.exception = Some(e);
        self.state = OpState::Error;
    }

    pub fn exception(&self) -> Option<&PlanRuntimeError> {
        self.exception.as_ref()
    }

    pub fn set_plan(&mut self, plan: Arc<QueryPlan<'a>>) {
        self.plan = Some(plan);
    }

    pub fn plan(&self) -> Option<&Arc<QueryPlan<'a>>> {
        self.plan.as_ref()
    }

    pub fn matcher(&self) -> Option<&Matcher> {
        self.matcher.as_ref()
    }

    /// Registers the scanned range of a finished clause; applied to the
    /// matcher lineage when the next clause's child is created.
    pub fn set_or_constraint(&mut self, constraint: RangeConstraint) {
        self.or_constraint = Some(constraint);
    }

    /// Builds this op's matcher: continuing the previous clause's lineage
    /// when one exists, fresh from the plan's query otherwise. Called by
    /// the runner before `init`.
    pub fn setup_matcher(&mut self) {
        if self.matcher.is_some() {
            return;
        }
        self.matcher = match &self.old_matcher {
            Some(old) => Some(old.next_clause_matcher()),
            None => self
                .plan
                .as_ref()
                .map(|p| Matcher::new(p.original_query())),
        };
    }

    /// Core state for a child op. Applies a pending `$or` constraint to
    /// the lineage so the next clause excludes already-returned ranges.
    pub fn child_core(&mut self) -> OpCore<'a> {
        if let Some(constraint) = self.or_constraint.take() {
            if let Some(m) = &mut self.matcher {
                m.advance_or_clause(constraint);
            }
        }
        OpCore {
            state: OpState::Running,
            plan: None,
            matcher: None,
            old_matcher: self.matcher.clone(),
            or_constraint: None,
            exception: None,
        }
    }
}

/// One plan's worker. Implementations perform the actual scan; state
/// transitions and matcher wiring live in `OpCore`.
pub trait QueryOp<'a>: Sized {
    fn core(&self) -> &OpCore<'a>;
    fn core_mut(&mut self) -> &mut OpCore<'a>;

    /// Opens the cursor and prepares to scan. Runs under the guard.
    fn perform_init(&mut self) -> OpResult<()>;

    /// Advances the scan by one step. Runs under the guard.
    fn perform_next(&mut self) -> OpResult<()>;

    /// Clones this op for another plan (or the next `$or` clause).
    fn create_child(&mut self) -> Self;

    /// Work performed so far; the runner's scheduling key.
    fn nscanned(&self) -> u64;

    /// Whether this op's victory may be recorded in the plan cache.
    fn may_record_plan(&self) -> bool {
        true
    }

    /// Documents returned so far.
    fn n_returned(&self) -> u64 {
        0
    }

    /// This op's account of itself for explain output.
    fn generate_explain_info(&self) -> crate::planner::ExplainPlanInfo {
        crate::planner::ExplainPlanInfo {
            cursor: self
                .core()
                .plan()
                .map(|p| p.summary())
                .unwrap_or_default(),
            index_bounds: Value::Null,
            nscanned: self.nscanned(),
            picked: false,
        }
    }

    fn prepare_to_yield(&mut self) -> OpResult<()> {
        Ok(())
    }

    fn recover_from_yield(&mut self) -> OpResult<()> {
        Ok(())
    }
}

/// Scans its plan's cursor, collecting matching documents up to an
/// optional limit. Reaching the limit is a terminal stop; exhausting the
/// cursor completes the clause only.
pub struct FindOp<'a> {
    core: OpCore<'a>,
    collection: Option<&'a Collection>,
    cursor: Option<Box<dyn Cursor + 'a>>,
    results: Vec<(DocLoc, Value)>,
    seen: HashSet<DocLoc>,
    limit: Option<usize>,
}

impl<'a> FindOp<'a> {
    pub fn new(collection: Option<&'a Collection>, limit: Option<usize>) -> Self {
        FindOp {
            core: OpCore::default(),
            collection,
            cursor: None,
            results: Vec::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    pub fn results(&self) -> &[(DocLoc, Value)] {
        &self.results
    }

    pub fn into_results(self) -> Vec<(DocLoc, Value)> {
        self.results
    }

    pub fn cursor(&self) -> Option<&(dyn Cursor + 'a)> {
        self.cursor.as_deref()
    }

}

impl std::fmt::Debug for FindOp<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindOp")
            .field("core", &self.core)
            .field("has_cursor", &self.cursor.is_some())
            .field("results", &self.results)
            .field("seen", &self.seen)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<'a> QueryOp<'a> for FindOp<'a> {
    fn core(&self) -> &OpCore<'a> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OpCore<'a> {
        &mut self.core
    }

    fn perform_init(&mut self) -> OpResult<()> {
        let plan = self
            .core
            .plan()
            .cloned()
            .ok_or_else(|| PlanRuntimeError::new("op initialized without a plan"))?;
        let cursor = plan.new_cursor(None, self.limit.unwrap_or(0))?;
        if !cursor.ok() {
            self.core.set_complete(false);
        }
        self.cursor = Some(cursor);
        Ok(())
    }

    fn perform_next(&mut self) -> OpResult<()> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| PlanRuntimeError::new("op stepped before init"))?;
        if !cursor.ok() {
            self.core.set_complete(false);
            return Ok(());
        }

        let loc = cursor.curr_loc();
        if let Some(loc) = loc {
            let plan = self.core.plan().cloned();
            let covered = plan
                .as_ref()
                .and_then(|p| p.key_fields_only())
                .zip(cursor.curr_key());
            let doc = match covered {
                // Covering projection: hydrate from the key, skip the fetch.
                Some((projection, key)) => Some(projection.hydrate(key)),
                None => self.collection.and_then(|c| c.doc_at(loc)),
            };
            if let Some(doc) = doc {
                let matched = self
                    .core
                    .matcher()
                    .map(|m| m.matches(&doc))
                    .unwrap_or(true);
                // Multikey scans surface a document once per key.
                if matched && self.seen.insert(loc) {
                    self.results.push((loc, doc));
                    let at_limit = self
                        .limit
                        .map(|lim| self.results.len() >= lim)
                        .unwrap_or(false);
                    if at_limit {
                        self.core.set_complete(true);
                        return Ok(());
                    }
                }
            }
        }

        if !cursor.advance() {
            self.core.set_complete(false);
        }
        Ok(())
    }

    fn create_child(&mut self) -> Self {
        FindOp {
            core: self.core.child_core(),
            collection: self.collection,
            cursor: None,
            results: self.results.clone(),
            seen: self.seen.clone(),
            limit: self.limit,
        }
    }

    fn nscanned(&self) -> u64 {
        self.cursor.as_ref().map(|c| c.nscanned()).unwrap_or(0)
    }

    fn n_returned(&self) -> u64 {
        self.results.len() as u64
    }

    fn generate_explain_info(&self) -> crate::planner::ExplainPlanInfo {
        crate::planner::ExplainPlanInfo {
            cursor: self
                .cursor
                .as_ref()
                .map(|c| c.kind())
                .unwrap_or_default(),
            index_bounds: self
                .cursor
                .as_ref()
                .map(|c| c.pretty_index_bounds())
                .unwrap_or(Value::Null),
            nscanned: self.nscanned(),
            picked: false,
        }
    }

    fn prepare_to_yield(&mut self) -> OpResult<()> {
        if let Some(c) = &mut self.cursor {
            if !c.prepare_to_yield() {
                return Err(PlanRuntimeError::new("cursor refused to yield"));
            }
        }
        Ok(())
    }

    fn recover_from_yield(&mut self) -> OpResult<()> {
        if let Some(c) = &mut self.cursor {
            c.recover_from_yield();
        }
        Ok(())
    }
}
