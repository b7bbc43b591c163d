//! Query planner subsystem.
//!
//! # Design Principles
//!
//! - Characterize, don't cost: plans carry flags (optimal, exact-key,
//!   impossible, unhelpful, scan-and-order), not cardinality estimates
//! - One predicate, one plan set; plans are immutable once built
//! - The plan cache is keyed by query shape and shared across queries
//!   under per-namespace locks; it is a registry, never a singleton

mod auditor;
mod cache;
mod errors;
mod explain;
mod plan;
mod set;
mod useful;

pub use auditor::{index_for_range, ResolvedRange};
pub use cache::{CachedPlan, PlanCache};
pub use errors::{OpResult, PlanRuntimeError, PlannerResult, QueryError};
pub use explain::{ExplainClauseInfo, ExplainPlanInfo, ExplainQueryInfo};
pub use plan::{PlanBounds, QueryPlan};
pub use set::{is_simple_id_query, QueryPlanSet, RecordedPlanPolicy};
pub use useful::{index_useful, useless_or};

use crate::config::RuntimeConfig;

/// Shared planner environment: the plan cache and process options.
#[derive(Debug, Clone, Copy)]
pub struct PlannerContext<'a> {
    pub cache: &'a PlanCache,
    pub config: &'a RuntimeConfig,
}
