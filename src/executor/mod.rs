//! Competitive query execution.
//!
//! The runner races one op per candidate plan, cooperatively and strictly
//! round-robin; the first to finish wins and may record itself in the
//! plan cache. The multi-plan scanner drives one race per `$or` clause
//! with progressive range elimination between clauses.

mod executor;
mod multi_cursor;
mod ops;
mod runner;
mod scanner;

pub use executor::{best_guess_cursor, or_query_cursor, run_query, QueryResult, QuerySpec};
pub use multi_cursor::MultiCursor;
pub use ops::{FindOp, OpCore, OpState, QueryOp};
pub use runner::Runner;
pub use scanner::{MultiPlanScanner, OpStatus};
