//! Query-side collaborators: field ranges, shapes, `$or` clause ranges,
//! the document matcher, and query input types.

mod matcher;
mod or_ranges;
mod pattern;
mod ranges;
mod spec;
mod vector;

pub use matcher::Matcher;
pub use or_ranges::OrRangeGenerator;
pub use pattern::{BoundClass, QueryPattern};
pub use ranges::{FieldRange, FieldRangeSet, FieldRangeSetPair, Interval, RangeConstraint};
pub use spec::{Hint, KeyFieldsOnly, Projection, SortField, SortSpec};
pub use vector::FieldRangeVector;
