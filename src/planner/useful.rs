//! Index usefulness predicates.

use crate::catalog::Collection;
use crate::index::{KeyPattern, Suitability};
use crate::query::{FieldRangeSet, FieldRangeSetPair, OrRangeGenerator, SortSpec};

/// Suitability of a plain (plugin-less) index: helpful when the leading
/// key field is constrained or leads the requested order.
pub fn default_suitability(
    frs: &FieldRangeSet,
    key_pattern: &KeyPattern,
    order: &SortSpec,
) -> Suitability {
    let first = match key_pattern.first_field_name() {
        Some(f) => f,
        None => return Suitability::Useless,
    };
    if !frs.range(first).universal() {
        return Suitability::Helpful;
    }
    if order.field_names().next() == Some(first) {
        return Suitability::Helpful;
    }
    Suitability::Useless
}

/// Whether an index is worth planning against: a statically-empty result
/// still counts (the plan short-circuits), otherwise the access method
/// must claim non-useless suitability.
pub fn index_useful(
    frsp: &FieldRangeSetPair,
    collection: &Collection,
    idx_no: usize,
    order: &SortSpec,
) -> bool {
    if !frsp.match_possible_for_index(Some(collection), Some(idx_no)) {
        // No matches are possible in the index, so the index is useful.
        return true;
    }
    let index = collection.idx(idx_no);
    let frs = frsp.frs_for_index(Some(collection), Some(idx_no));
    match index.spec().plugin() {
        Some(plugin) => {
            let simplified = frs.simplified_query_for_index(index.key_pattern());
            plugin.suitability(&simplified, order) != Suitability::Useless
        }
        None => default_suitability(frs, index.key_pattern(), order) != Suitability::Useless,
    }
}

/// Whether some `$or` clause admits no useful index, restricted to the
/// hinted index when one was given. A useless clause degrades the whole
/// `$or` plan to a single flat scan.
pub fn useless_or(
    org: &OrRangeGenerator,
    collection: &Collection,
    hint_idx: Option<usize>,
) -> bool {
    for pair in org.original_or_sets() {
        let useful = match hint_idx {
            Some(i) => index_useful(pair, collection, i, &SortSpec::none()),
            None => (0..collection.n_indexes())
                .any(|j| index_useful(pair, collection, j, &SortSpec::none())),
        };
        if !useful {
            return true;
        }
    }
    false
}
