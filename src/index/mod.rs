//! Index subsystem: key values, key patterns, and index specifications.
//!
//! # Design Principles
//!
//! - Deterministic: key ordering is total across types, with sentinels
//!   (`MinKey`/`MaxKey`) for open bounds
//! - Order-aware: compound patterns carry per-field directions
//! - Pluggable: special access methods (geo, text) hang off `IndexSpec`
//!   behind the `IndexPlugin` trait

mod key;
mod pattern;
mod spec;

pub use key::{CompositeKey, KeyValue};
pub use pattern::{KeyField, KeyPattern};
pub use spec::{extract_keys, IndexDetails, IndexPlugin, IndexSpec, Suitability};
