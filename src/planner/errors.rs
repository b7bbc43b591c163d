//! Planner error taxonomy.
//!
//! Error codes:
//! - VELLUM_QUERY_BAD_HINT (REJECT)
//! - VELLUM_QUERY_NO_INDEX_FOR_RANGE (REJECT)
//! - VELLUM_QUERY_SPECIAL_INDEX_MISSING (REJECT)
//! - VELLUM_QUERY_TABLE_SCAN_FORBIDDEN (REJECT)
//! - VELLUM_QUERY_INVALID_OR_SPEC (REJECT)
//! - VELLUM_QUERY_NO_VIABLE_PLAN (REJECT)
//! - VELLUM_QUERY_RETRY_LOOP (FATAL)
//! - VELLUM_QUERY_INTERNAL (FATAL)
//!
//! An impossible predicate is not an error: it produces an empty cursor.
//! Failures inside a running plan are `PlanRuntimeError`s, captured per
//! op by the runner and never propagated through it.

use thiserror::Error;

/// Result type for planner operations.
pub type PlannerResult<T> = Result<T, QueryError>;

/// Errors that reject or abort a query before or during planning.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Hint names an unknown index, or an empty hint document.
    #[error("bad hint: {0}")]
    BadHint(String),

    /// Supplied min/max keys cannot be resolved to an index.
    #[error("unable to resolve min/max keys to an index: {0}")]
    NoIndexForRange(String),

    /// The predicate demands an index plugin no index provides.
    #[error("can't find special index: {0}")]
    SpecialIndexMissing(String),

    /// The table-scan gate tripped.
    #[error("table scans not allowed: {0}")]
    TableScanForbidden(String),

    /// Top-level `$or` is not a non-empty array of documents.
    #[error("invalid $or spec")]
    InvalidOrSpec,

    /// Every plan failed; the query has no usable access path.
    #[error("no viable plan: {0}")]
    NoViablePlan(String),

    /// A second planning retry was attempted for one plan set.
    #[error("multi-plan retry loop detected")]
    RetryLoop,

    /// A planner invariant was violated.
    #[error("internal planner error: {0}")]
    Internal(String),
}

impl QueryError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::BadHint(_) => "VELLUM_QUERY_BAD_HINT",
            QueryError::NoIndexForRange(_) => "VELLUM_QUERY_NO_INDEX_FOR_RANGE",
            QueryError::SpecialIndexMissing(_) => "VELLUM_QUERY_SPECIAL_INDEX_MISSING",
            QueryError::TableScanForbidden(_) => "VELLUM_QUERY_TABLE_SCAN_FORBIDDEN",
            QueryError::InvalidOrSpec => "VELLUM_QUERY_INVALID_OR_SPEC",
            QueryError::NoViablePlan(_) => "VELLUM_QUERY_NO_VIABLE_PLAN",
            QueryError::RetryLoop => "VELLUM_QUERY_RETRY_LOOP",
            QueryError::Internal(_) => "VELLUM_QUERY_INTERNAL",
        }
    }

    /// Fatal errors abort the runner; the rest reject the query.
    pub fn is_fatal(&self) -> bool {
        matches!(self, QueryError::RetryLoop | QueryError::Internal(_))
    }
}

/// A failure inside `QueryOp::init` or `QueryOp::next`.
///
/// The runner's guard captures these on the failing op; one plan's
/// failure never unwinds the race.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PlanRuntimeError {
    pub message: String,
}

impl PlanRuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<QueryError> for PlanRuntimeError {
    fn from(e: QueryError) -> Self {
        PlanRuntimeError::new(e.to_string())
    }
}

/// Result type for op steps.
pub type OpResult<T> = Result<T, PlanRuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            QueryError::BadHint("x".into()).code(),
            "VELLUM_QUERY_BAD_HINT"
        );
        assert_eq!(QueryError::RetryLoop.code(), "VELLUM_QUERY_RETRY_LOOP");
    }

    #[test]
    fn test_fatality() {
        assert!(QueryError::RetryLoop.is_fatal());
        assert!(!QueryError::BadHint("x".into()).is_fatal());
        assert!(!QueryError::NoViablePlan("x".into()).is_fatal());
    }

    #[test]
    fn test_runtime_error_from_query_error() {
        let e: PlanRuntimeError = QueryError::TableScanForbidden("test.c".into()).into();
        assert!(e.message.contains("table scans not allowed"));
    }
}
