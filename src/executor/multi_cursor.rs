//! A single cursor view over the sequence of `$or` clause cursors.
//!
//! Each clause contributes its best-guess plan's cursor; when one is
//! exhausted the driver ends the clause (eliminating its scanned range)
//! and opens the next. The matcher advances between clauses so documents
//! already returned by an earlier clause are excluded.

use serde_json::Value;

use crate::catalog::DocLoc;
use crate::cursor::Cursor;
use crate::planner::{PlannerResult, QueryError, QueryPlan, RecordedPlanPolicy};
use crate::query::Matcher;

use std::sync::Arc;

use super::ops::QueryOp;
use super::scanner::MultiPlanScanner;

pub struct MultiCursor<'a, O: QueryOp<'a>> {
    scanner: MultiPlanScanner<'a, O>,
    plan: Arc<QueryPlan<'a>>,
    cursor: Box<dyn Cursor + 'a>,
    matcher: Matcher,
    nscanned_prior: u64,
    done: bool,
    error: Option<QueryError>,
}

impl<'a, O: QueryOp<'a>> MultiCursor<'a, O> {
    /// Takes over a scanner: later clauses use best-guess plans, and the
    /// cache may only supply plans that serve the (empty) order.
    pub fn new(mut scanner: MultiPlanScanner<'a, O>) -> PlannerResult<Self> {
        scanner.clear_runner();
        scanner.set_recorded_plan_policy(RecordedPlanPolicy::UseIfInOrder);

        let plan = scanner
            .initial_best_guess_plan()?
            .ok_or_else(|| QueryError::NoViablePlan("no in-order plan".into()))?;
        let cursor = plan.new_cursor(None, 0)?;
        if !cursor.supports_yields() {
            return Err(QueryError::Internal(
                "all sub cursors must support yields".into(),
            ));
        }
        let matcher = Matcher::new(scanner.query());

        let mut mc = MultiCursor {
            scanner,
            plan,
            cursor,
            matcher,
            nscanned_prior: 0,
            done: false,
            error: None,
        };
        if !mc.cursor.ok() {
            // The first clause's cursor may be empty; move to a live one.
            mc.advance();
        }
        Ok(mc)
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn plan(&self) -> &Arc<QueryPlan<'a>> {
        &self.plan
    }

    /// The error that ended iteration early, if any.
    pub fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    fn next_clause(&mut self) -> PlannerResult<bool> {
        self.nscanned_prior += self.cursor.nscanned();

        // Exclude this clause's scanned range from everything that
        // follows, then continue the matcher lineage.
        if let Some(constraint) = self.plan.or_constraint() {
            self.matcher.advance_or_clause(constraint);
        }
        let next_matcher = self.matcher.next_clause_matcher();

        let current = self.plan.clone();
        match self.scanner.next_clause_best_guess_plan(&current)? {
            None => {
                self.done = true;
                Ok(false)
            }
            Some(plan) => {
                let cursor = plan.new_cursor(None, 0)?;
                if !cursor.supports_yields() {
                    return Err(QueryError::Internal(
                        "all sub cursors must support yields".into(),
                    ));
                }
                self.matcher = next_matcher;
                self.plan = plan;
                self.cursor = cursor;
                Ok(true)
            }
        }
    }

    /// Advances to the next document location whose document matches,
    /// fetching and returning it.
    pub fn next_match(&mut self) -> PlannerResult<Option<(DocLoc, Value)>> {
        loop {
            if let Some(e) = &self.error {
                return Err(e.clone());
            }
            if !self.ok() {
                return Ok(None);
            }
            let loc = match self.cursor.curr_loc() {
                Some(loc) => loc,
                None => return Ok(None),
            };
            let doc = self.plan.collection().and_then(|c| c.doc_at(loc));
            self.advance();
            if let Some(doc) = doc {
                if self.matcher.matches(&doc) {
                    return Ok(Some((loc, doc)));
                }
            }
        }
    }
}

impl<'a, O: QueryOp<'a>> Cursor for MultiCursor<'a, O> {
    fn ok(&self) -> bool {
        !self.done && self.error.is_none() && self.cursor.ok()
    }

    fn advance(&mut self) -> bool {
        if self.done || self.error.is_some() {
            return false;
        }
        self.cursor.advance();
        while !self.cursor.ok() && self.scanner.may_run_more() {
            match self.next_clause() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    self.error = Some(e);
                    break;
                }
            }
        }
        if !self.cursor.ok() {
            self.done = true;
        }
        self.ok()
    }

    fn curr_loc(&self) -> Option<DocLoc> {
        if self.ok() {
            self.cursor.curr_loc()
        } else {
            None
        }
    }

    fn nscanned(&self) -> u64 {
        self.nscanned_prior + self.cursor.nscanned()
    }

    fn prepare_to_yield(&mut self) -> bool {
        self.scanner.prepare_to_yield();
        self.cursor.prepare_to_yield()
    }

    fn recover_from_yield(&mut self) {
        self.scanner.recover_from_yield();
        self.cursor.recover_from_yield();
    }

    fn pretty_index_bounds(&self) -> Value {
        self.cursor.pretty_index_bounds()
    }

    fn kind(&self) -> String {
        format!("MultiCursor {}", self.cursor.kind())
    }
}
