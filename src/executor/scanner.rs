//! The multi-plan scanner: drives one plan set per `$or` clause, or a
//! single plan set for conjunctive queries.
//!
//! `$or` handling is greedy, one clause at a time: each clause plans and
//! races independently, and a finished clause's scanned range is
//! eliminated from the clauses that follow. A clause answered by a table
//! scan ends the iteration (the collection has been visited in full).
//! Queries with a sort, explicit bounds, a special predicate, or a clause
//! no index serves degrade to a single flat plan set.

use serde_json::Value;

use crate::catalog::Collection;
use crate::planner::{
    useless_or, ExplainClauseInfo, ExplainQueryInfo, PlannerContext, PlannerResult, QueryError,
    QueryPlan, QueryPlanSet, RecordedPlanPolicy,
};
use crate::query::{FieldRangeSetPair, Hint, OrRangeGenerator, Projection, SortSpec};

use super::ops::QueryOp;
use super::runner::Runner;

use std::sync::Arc;

/// Outcome snapshot of one scanner step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpStatus {
    pub complete: bool,
    pub stop: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct MultiPlanScanner<'a, O: QueryOp<'a>> {
    collection: Option<&'a Collection>,
    ctx: PlannerContext<'a>,
    ns: String,
    or_mode: bool,
    query: Value,
    fields: Option<Projection>,
    order: SortSpec,
    hint: Option<Hint>,
    recorded_plan_policy: RecordedPlanPolicy,
    clause_index: usize,
    table_scanned: bool,
    done_ops: bool,
    org: Option<OrRangeGenerator>,
    current_qps: Option<QueryPlanSet<'a>>,
    runner: Option<Runner<'a, O>>,
    base_op: O,
    final_op: Option<O>,
    explain: Option<ExplainQueryInfo>,
}

impl<'a, O: QueryOp<'a>> MultiPlanScanner<'a, O> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        collection: Option<&'a Collection>,
        ctx: PlannerContext<'a>,
        ns: &str,
        query: &Value,
        fields: Option<Projection>,
        order: SortSpec,
        hint: Option<Hint>,
        recorded_plan_policy: RecordedPlanPolicy,
        min: Option<Value>,
        max: Option<Value>,
        base_op: O,
    ) -> PlannerResult<Self> {
        let mut scanner = MultiPlanScanner {
            collection,
            ctx,
            ns: ns.to_string(),
            or_mode: query.get("$or").is_some(),
            query: query.clone(),
            fields,
            order,
            hint,
            recorded_plan_policy,
            clause_index: 0,
            table_scanned: false,
            done_ops: false,
            org: None,
            current_qps: None,
            runner: None,
            base_op,
            final_op: None,
            explain: None,
        };

        // $or clause separation only handles plain disjunctive queries.
        if !scanner.order.is_empty() || min.is_some() || max.is_some() {
            scanner.or_mode = false;
        }
        if scanner.or_mode {
            match OrRangeGenerator::new(&scanner.ns, &scanner.query) {
                None => return Err(QueryError::InvalidOrSpec),
                Some(org) => {
                    if org.special().is_some() {
                        scanner.or_mode = false;
                    } else if scanner.have_useless_or(&org)? {
                        scanner.or_mode = false;
                    } else {
                        scanner.org = Some(org);
                    }
                }
            }
        }

        if !scanner.or_mode {
            let frsp = FieldRangeSetPair::new(&scanner.ns, &scanner.query);
            let qps = QueryPlanSet::new(
                scanner.collection,
                scanner.ctx,
                frsp,
                None,
                &scanner.query,
                scanner.fields.clone(),
                scanner.order.clone(),
                scanner.hint.clone(),
                scanner.recorded_plan_policy,
                min,
                max,
            )?;
            scanner.current_qps = Some(qps);
        }
        Ok(scanner)
    }

    fn have_useless_or(&self, org: &OrRangeGenerator) -> PlannerResult<bool> {
        let collection = match self.collection {
            Some(c) => c,
            None => return Ok(true),
        };
        let hint_idx = match &self.hint {
            None => None,
            Some(Hint::Natural) => return Ok(true),
            Some(Hint::Index(name)) => match collection.find_index_by_name(name) {
                Some(i) => Some(i),
                None => return Err(QueryError::BadHint(format!("unknown index name '{}'", name))),
            },
            Some(Hint::KeyPattern(kp)) => {
                if kp.is_natural() {
                    return Ok(true);
                }
                match collection.find_index_by_key_pattern(kp) {
                    Some(i) => Some(i),
                    None => {
                        return Err(QueryError::BadHint(format!("no index with key {}", kp)))
                    }
                }
            }
        };
        Ok(useless_or(org, collection, hint_idx))
    }

    /// Whether `$or` clause separation is active.
    pub fn or_mode(&self) -> bool {
        self.or_mode
    }

    pub fn may_run_more(&self) -> bool {
        if self.or_mode {
            !self.table_scanned
                && self
                    .org
                    .as_ref()
                    .map(|o| !o.or_ranges_exhausted())
                    .unwrap_or(false)
        } else {
            self.clause_index == 0
        }
    }

    pub fn done_ops(&self) -> bool {
        self.done_ops
    }

    /// Turns explain accumulation on.
    pub fn with_explain(mut self) -> Self {
        self.explain = Some(ExplainQueryInfo::default());
        self
    }

    pub fn explain_info(&self) -> Option<&ExplainQueryInfo> {
        self.explain.as_ref()
    }

    /// The sole plan, when there is exactly one and no cache influence.
    pub fn single_plan(&self) -> Option<Arc<QueryPlan<'a>>> {
        if self.or_mode {
            return None;
        }
        let qps = self.current_qps.as_ref()?;
        if qps.n_plans() != 1 || qps.using_cached_plan() {
            return None;
        }
        qps.first_plan()
    }

    pub fn current_n_plans(&self) -> usize {
        self.current_qps.as_ref().map(|q| q.n_plans()).unwrap_or(0)
    }

    pub fn have_in_order_plan(&self) -> bool {
        if self.or_mode {
            return true;
        }
        self.current_qps
            .as_ref()
            .map(|q| q.have_in_order_plan())
            .unwrap_or(false)
    }

    pub fn possible_in_order_plan(&self) -> bool {
        if self.or_mode {
            return true;
        }
        self.current_qps
            .as_ref()
            .map(|q| q.possible_in_order_plan())
            .unwrap_or(false)
    }

    pub fn possible_out_of_order_plan(&self) -> bool {
        if self.or_mode {
            return false;
        }
        self.current_qps
            .as_ref()
            .map(|q| q.possible_out_of_order_plan())
            .unwrap_or(false)
    }

    /// Recorded-plan policy for plan sets built from here on.
    pub fn set_recorded_plan_policy(&mut self, policy: RecordedPlanPolicy) {
        self.recorded_plan_policy = policy;
    }

    pub fn clear_runner(&mut self) {
        self.runner = None;
    }

    pub fn prepare_to_yield(&mut self) {
        if let Some(r) = &mut self.runner {
            r.prepare_to_yield();
        }
        if let Some(e) = &mut self.explain {
            e.note_yield();
        }
    }

    pub fn recover_from_yield(&mut self) {
        if let Some(r) = &mut self.runner {
            r.recover_from_yield();
        }
    }

    /// Builds the plan set for the clause at the top of the generator.
    fn handle_beginning_of_clause(&mut self) -> PlannerResult<()> {
        if !self.may_run_more() {
            return Err(QueryError::Internal("no more clauses to run".into()));
        }
        self.clause_index += 1;
        let org = self
            .org
            .as_ref()
            .ok_or_else(|| QueryError::Internal("or clause without generator".into()))?;
        let frsp = org
            .top_frsp()
            .ok_or_else(|| QueryError::Internal("or clause ranges exhausted".into()))?;
        let original_frsp = org.top_frsp_original();
        let qps = QueryPlanSet::new(
            self.collection,
            self.ctx,
            frsp,
            original_frsp,
            &self.query,
            self.fields.clone(),
            SortSpec::none(),
            self.hint.clone(),
            self.recorded_plan_policy,
            None,
            None,
        )?;
        self.current_qps = Some(qps);
        self.runner = None;
        Ok(())
    }

    /// Accounts for a finished clause: a table-scanned clause ends the
    /// iteration; an indexed clause's scanned range is eliminated from
    /// the clauses that follow.
    fn handle_end_of_clause(&mut self, clause_plan: &QueryPlan<'a>) {
        if clause_plan.will_scan_table() {
            self.table_scanned = true;
        } else if let Some(org) = &mut self.org {
            let key = clause_plan.indexed().then(|| clause_plan.index_key());
            org.pop_or_clause(key.as_ref());
        }
    }

    /// Runs the current plan set's race one step, creating the runner on
    /// first use and retrying once (after a cache clear) when the first
    /// outcome is an error on a cached plan.
    fn iterate_runner(&mut self, retried: bool) -> PlannerResult<usize> {
        if self.runner.is_none() {
            let mut runner = Runner::new();
            let qps = self
                .current_qps
                .as_mut()
                .ok_or_else(|| QueryError::Internal("no current plan set".into()))?;
            let i = runner.next(qps, &mut self.base_op)?;
            if runner.op(i).core().error() {
                let can_retry = qps.prepare_to_retry()?;
                if can_retry {
                    // This should never recurse twice.
                    if retried {
                        return Err(QueryError::RetryLoop);
                    }
                    self.runner = None;
                    return self.iterate_runner(true);
                }
            }
            self.runner = Some(runner);
            return Ok(i);
        }

        let runner = self.runner.as_mut().expect("checked above");
        let qps = self
            .current_qps
            .as_mut()
            .ok_or_else(|| QueryError::Internal("no current plan set".into()))?;
        runner.next(qps, &mut self.base_op)
    }

    fn status_of(op: &O) -> OpStatus {
        OpStatus {
            complete: op.core().complete(),
            stop: op.core().stop_requested(),
            error: op.core().exception().map(|e| e.message.clone()),
        }
    }

    /// Snapshots every raced op into a clause entry, marking the winner.
    fn note_clause_explain(&mut self, winner: usize) {
        let explain = match &mut self.explain {
            Some(e) => e,
            None => return,
        };
        let runner = match &self.runner {
            Some(r) => r,
            None => return,
        };
        let mut clause = ExplainClauseInfo::default();
        for (j, op) in runner.ops().iter().enumerate() {
            let mut info = op.generate_explain_info();
            info.picked = j == winner;
            if j == winner {
                clause.nscanned = op.nscanned();
                clause.n = op.n_returned();
            }
            clause.add_plan_info(info);
        }
        explain.add_clause_info(clause);
    }

    fn finish_with(&mut self, op_index: usize) -> OpStatus {
        self.note_clause_explain(op_index);
        let runner = self.runner.as_mut().expect("runner present");
        let op = runner.take_op(op_index);
        let status = Self::status_of(&op);
        if status.complete || status.error.is_some() {
            self.done_ops = true;
        }
        self.final_op = Some(op);
        status
    }

    fn next_op_simple(&mut self) -> PlannerResult<OpStatus> {
        if self.clause_index == 0 {
            if !self.may_run_more() {
                return Err(QueryError::Internal("query already run".into()));
            }
            self.clause_index += 1;
        }
        let i = self.iterate_runner(false)?;
        let status = {
            let runner = self.runner.as_ref().expect("runner present");
            Self::status_of(runner.op(i))
        };
        if status.complete || status.error.is_some() {
            return Ok(self.finish_with(i));
        }
        Ok(status)
    }

    fn next_op_or(&mut self) -> PlannerResult<OpStatus> {
        if self.clause_index == 0 {
            self.handle_beginning_of_clause()?;
        }
        loop {
            let i = self.iterate_runner(false)?;
            let status = {
                let runner = self.runner.as_ref().expect("runner present");
                Self::status_of(runner.op(i))
            };
            if status.error.is_some() {
                return Ok(self.finish_with(i));
            }
            if !status.complete {
                return Ok(status);
            }
            // Clause complete: account for it and either stop or move on.
            self.note_clause_explain(i);
            let runner = self.runner.as_mut().expect("runner present");
            let op = runner.take_op(i);
            let plan = op
                .core()
                .plan()
                .cloned()
                .ok_or_else(|| QueryError::Internal("completed op without plan".into()))?;
            if status.stop {
                self.done_ops = true;
                self.final_op = Some(op);
                return Ok(status);
            }
            // Register the scanned range on the winner before it becomes
            // the next clause's base op.
            self.handle_end_of_clause(&plan);
            let mut op = op;
            if let Some(constraint) = plan.or_constraint() {
                op.core_mut().set_or_constraint(constraint);
            }
            if !self.may_run_more() {
                self.done_ops = true;
                self.final_op = Some(op);
                return Ok(status);
            }
            self.base_op = op;
            self.handle_beginning_of_clause()?;
        }
    }

    /// Advances the query by one step. Terminal statuses (complete with
    /// stop, all clauses exhausted, or error) set `done_ops`.
    pub fn next_op(&mut self) -> PlannerResult<OpStatus> {
        if self.done_ops {
            return Err(QueryError::Internal("ops already done".into()));
        }
        if self.or_mode {
            self.next_op_or()
        } else {
            self.next_op_simple()
        }
    }

    /// Runs to completion and returns the final status.
    pub fn run_to_completion(&mut self) -> PlannerResult<OpStatus> {
        loop {
            let status = self.next_op()?;
            if self.done_ops {
                return Ok(status);
            }
        }
    }

    /// The winning (or failing) op, once `done_ops` is set.
    pub fn take_final_op(&mut self) -> Option<O> {
        self.final_op.take()
    }

    /// Ends the current clause and plans the next, returning its
    /// best-guess plan. `None` when no clauses remain.
    pub fn next_clause_best_guess_plan(
        &mut self,
        current_plan: &QueryPlan<'a>,
    ) -> PlannerResult<Option<Arc<QueryPlan<'a>>>> {
        if !self.or_mode {
            return Ok(None);
        }
        self.handle_end_of_clause(current_plan);
        if !self.may_run_more() {
            return Ok(None);
        }
        self.handle_beginning_of_clause()?;
        let qps = self
            .current_qps
            .as_ref()
            .ok_or_else(|| QueryError::Internal("no current plan set".into()))?;
        match qps.get_best_guess() {
            Some(plan) => Ok(Some(plan)),
            None => Err(QueryError::NoViablePlan(
                "no in-order plan for $or clause".into(),
            )),
        }
    }

    /// The first clause's best-guess plan (plans the clause if needed).
    pub fn initial_best_guess_plan(&mut self) -> PlannerResult<Option<Arc<QueryPlan<'a>>>> {
        if self.or_mode && self.clause_index == 0 {
            self.handle_beginning_of_clause()?;
        }
        let qps = self
            .current_qps
            .as_ref()
            .ok_or_else(|| QueryError::Internal("no current plan set".into()))?;
        Ok(qps.get_best_guess())
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    pub fn query(&self) -> &Value {
        &self.query
    }
}
