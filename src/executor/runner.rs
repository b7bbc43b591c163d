//! Competitive plan execution.
//!
//! The runner clones one op per candidate plan and steps them strictly
//! round-robin through a min-heap keyed by work performed plus a credit
//! offset. The first op to finish wins; its plan is recorded in the cache
//! when recording is permitted. A cached plan that overruns ten times its
//! recorded scan count forfeits its head start: the fallback plans are
//! promoted into the race and the cached op's credit is reset to the
//! negative of its scan count so the newcomers catch up.
//!
//! Every `init`/`next`/yield call runs under the guard: a step failure is
//! captured on the failing op, which drops out of the queue while the
//! race continues.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::planner::{PlannerResult, QueryError, QueryPlanSet};

use super::ops::QueryOp;

/// Overrun factor before a cached plan loses its monopoly.
const CACHED_PLAN_OVERRUN_FACTOR: u64 = 10;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct HeapKey {
    credit: i64,
    seq: u64,
    op_index: usize,
}

/// Races the plans of one plan set.
#[derive(Debug)]
pub struct Runner<'a, O: QueryOp<'a>> {
    ops: Vec<O>,
    offsets: Vec<i64>,
    queue: BinaryHeap<Reverse<HeapKey>>,
    seq: u64,
    initialized: bool,
    done: bool,
    _plans: std::marker::PhantomData<&'a ()>,
}

impl<'a, O: QueryOp<'a>> Runner<'a, O> {
    pub fn new() -> Self {
        Runner {
            ops: Vec::new(),
            offsets: Vec::new(),
            queue: BinaryHeap::new(),
            seq: 0,
            initialized: false,
            done: false,
            _plans: std::marker::PhantomData,
        }
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn ops(&self) -> &[O] {
        &self.ops
    }

    pub fn op(&self, index: usize) -> &O {
        &self.ops[index]
    }

    /// Removes an op from the runner; valid once the race is done.
    pub fn take_op(&mut self, index: usize) -> O {
        self.ops.swap_remove(index)
    }

    fn push(&mut self, op_index: usize) {
        let credit = self.ops[op_index].nscanned() as i64 + self.offsets[op_index];
        self.seq += 1;
        self.queue.push(Reverse(HeapKey {
            credit,
            seq: self.seq,
            op_index,
        }));
    }

    fn guarded_init(op: &mut O) {
        op.core_mut().setup_matcher();
        if let Err(e) = op.perform_init() {
            op.core_mut().set_exception(e);
        }
    }

    fn guarded_next(op: &mut O) {
        if op.core().error() {
            return;
        }
        if let Err(e) = op.perform_next() {
            op.core_mut().set_exception(e);
        }
    }

    /// Suspends every op ahead of a yield.
    pub fn prepare_to_yield(&mut self) {
        for op in &mut self.ops {
            if !op.core().error() {
                if let Err(e) = op.prepare_to_yield() {
                    op.core_mut().set_exception(e);
                }
            }
        }
    }

    /// Restores every op after a yield.
    pub fn recover_from_yield(&mut self) {
        for op in &mut self.ops {
            if !op.core().error() {
                if let Err(e) = op.recover_from_yield() {
                    op.core_mut().set_exception(e);
                }
            }
        }
    }

    /// Spawns and initializes one op per plan. Returns an op index when a
    /// terminal op short-circuits the race.
    fn init(&mut self, plans: &QueryPlanSet<'a>, base: &mut O) -> PlannerResult<Option<usize>> {
        if plans.n_plans() == 0 {
            return Err(QueryError::Internal("no plans".into()));
        }
        if plans.n_plans() > 1 {
            debug!(n_plans = plans.n_plans(), "running multiple plans");
        }
        for plan in plans.plans() {
            let mut op = base.create_child();
            op.core_mut().set_plan(plan.clone());
            self.ops.push(op);
            self.offsets.push(0);
        }
        for op in &mut self.ops {
            Self::guarded_init(op);
        }

        // An op may already be complete (an empty cursor, for instance).
        if let Some(i) = self.ops.iter().position(|op| op.core().complete()) {
            return Ok(Some(i));
        }

        for i in 0..self.ops.len() {
            if !self.ops[i].core().error() {
                self.push(i);
            }
        }
        if self.queue.is_empty() {
            // Everything failed on init; surface the first op.
            return Ok(Some(0));
        }
        Ok(None)
    }

    /// One scheduling round: pop the least-worked op, step it once, and
    /// handle completion, failure, or the cached-plan overrun.
    fn step(&mut self, plans: &mut QueryPlanSet<'a>, base: &mut O) -> PlannerResult<usize> {
        let Reverse(key) = self
            .queue
            .pop()
            .ok_or_else(|| QueryError::Internal("runner queue empty".into()))?;
        let i = key.op_index;
        Self::guarded_next(&mut self.ops[i]);

        if self.ops[i].core().complete() {
            if plans.may_record_plan() && self.ops[i].may_record_plan() {
                if let Some(plan) = self.ops[i].core().plan() {
                    plan.register_self(self.ops[i].nscanned());
                }
            }
            self.done = true;
            return Ok(i);
        }
        if self.ops[i].core().error() {
            return Ok(i);
        }

        if plans.using_cached_plan()
            && self.ops[i].nscanned() > plans.old_nscanned() * CACHED_PLAN_OVERRUN_FACTOR
            && plans.special().is_none()
        {
            debug!(
                nscanned = self.ops[i].nscanned(),
                old_nscanned = plans.old_nscanned(),
                "cached plan overran, promoting fallback plans"
            );
            self.offsets[i] = -(self.ops[i].nscanned() as i64);
            plans.add_fallback_plans();
            for plan in plans.plans().iter().skip(1) {
                let mut op = base.create_child();
                op.core_mut().set_plan(plan.clone());
                Self::guarded_init(&mut op);
                self.ops.push(op);
                self.offsets.push(0);
                let j = self.ops.len() - 1;
                if self.ops[j].core().complete() {
                    self.done = true;
                    return Ok(j);
                }
                if !self.ops[j].core().error() {
                    self.push(j);
                }
            }
            plans.clear_using_cached_plan();
        }

        self.push(i);
        Ok(i)
    }

    /// Advances the race by one op step (initializing on the first call)
    /// and returns the index of the op that ran. Errored ops are retried
    /// against the remaining queue within the call.
    pub fn next(&mut self, plans: &mut QueryPlanSet<'a>, base: &mut O) -> PlannerResult<usize> {
        if self.done {
            return Err(QueryError::Internal("runner already done".into()));
        }

        if !self.initialized {
            self.initialized = true;
            if let Some(i) = self.init(plans, base)? {
                self.done = true;
                return Ok(i);
            }
        }

        let mut i = self.step(plans, base)?;
        while self.ops[i].core().error() && !self.queue.is_empty() {
            i = self.step(plans, base)?;
        }
        if self.queue.is_empty() {
            self.done = true;
        }
        Ok(i)
    }
}

impl<'a, O: QueryOp<'a>> Default for Runner<'a, O> {
    fn default() -> Self {
        Self::new()
    }
}
