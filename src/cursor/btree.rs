//! Index-backed cursors.
//!
//! A `BtreeCursor` traverses one index either between explicit start/end
//! keys or driven by a `FieldRangeVector`, skipping keys that fall in the
//! vector's interval gaps. Every visited entry counts toward `nscanned`.

use std::sync::Arc;

use serde_json::Value;

use crate::catalog::{Collection, DocLoc};
use crate::index::{CompositeKey, KeyValue};
use crate::query::FieldRangeVector;

use super::Cursor;

pub struct BtreeCursor<'a> {
    collection: &'a Collection,
    idx_no: usize,
    direction: i32,
    // Tree-order bounds, normalized from traversal-order start/end.
    lower: CompositeKey,
    lower_inclusive: bool,
    upper: CompositeKey,
    upper_inclusive: bool,
    vector: Option<Arc<FieldRangeVector>>,
    pos: Option<(CompositeKey, DocLoc)>,
    nscanned: u64,
    kind: String,
}

impl<'a> BtreeCursor<'a> {
    /// Cursor over explicit `[start, end]` bounds in traversal order.
    /// The start side is always inclusive; `end_inclusive` governs the
    /// stop side.
    pub fn new_bounded(
        collection: &'a Collection,
        idx_no: usize,
        start: CompositeKey,
        end: CompositeKey,
        end_inclusive: bool,
        direction: i32,
    ) -> Self {
        let direction = if direction < 0 { -1 } else { 1 };
        let (lower, lower_inclusive, upper, upper_inclusive) = if direction >= 0 {
            (start, true, end, end_inclusive)
        } else {
            (end, end_inclusive, start, true)
        };
        let mut cursor = BtreeCursor {
            collection,
            idx_no,
            direction,
            lower,
            lower_inclusive,
            upper,
            upper_inclusive,
            vector: None,
            pos: None,
            nscanned: 0,
            kind: Self::kind_for(collection, idx_no, direction),
        };
        cursor.seek();
        cursor
    }

    /// Cursor driven by a field-range vector; keys in interval gaps are
    /// skipped but still scanned.
    pub fn new_with_vector(
        collection: &'a Collection,
        idx_no: usize,
        vector: Arc<FieldRangeVector>,
    ) -> Self {
        let direction = vector.direction();
        let start = vector.start_key();
        let end = vector.end_key();
        let (lower, upper) = if direction >= 0 {
            (start, end)
        } else {
            (end, start)
        };
        let mut cursor = BtreeCursor {
            collection,
            idx_no,
            direction,
            lower,
            lower_inclusive: true,
            upper,
            upper_inclusive: true,
            vector: Some(vector),
            pos: None,
            nscanned: 0,
            kind: Self::kind_for(collection, idx_no, direction),
        };
        cursor.seek();
        cursor
    }

    fn kind_for(collection: &Collection, idx_no: usize, direction: i32) -> String {
        let name = collection.idx(idx_no).name();
        if direction < 0 {
            format!("BtreeCursor {} reverse", name)
        } else {
            format!("BtreeCursor {}", name)
        }
    }

    /// Advances to the next admissible entry, counting every visited key.
    fn seek(&mut self) {
        loop {
            let next = self.collection.next_index_entry(
                self.idx_no,
                self.pos.as_ref(),
                &self.lower,
                self.lower_inclusive,
                &self.upper,
                self.upper_inclusive,
                self.direction,
            );
            match next {
                None => {
                    self.pos = None;
                    return;
                }
                Some(entry) => {
                    self.nscanned += 1;
                    let admissible = self
                        .vector
                        .as_ref()
                        .map(|v| v.matches(&entry.0))
                        .unwrap_or(true);
                    self.pos = Some(entry);
                    if admissible {
                        return;
                    }
                }
            }
        }
    }

    fn bound_json(key: &CompositeKey) -> Value {
        Value::Array(key.iter().map(KeyValue::to_json).collect())
    }
}

impl Cursor for BtreeCursor<'_> {
    fn ok(&self) -> bool {
        self.pos.is_some()
    }

    fn advance(&mut self) -> bool {
        if self.pos.is_some() {
            self.seek();
        }
        self.pos.is_some()
    }

    fn curr_loc(&self) -> Option<DocLoc> {
        self.pos.as_ref().map(|(_, loc)| *loc)
    }

    fn curr_key(&self) -> Option<&CompositeKey> {
        self.pos.as_ref().map(|(key, _)| key)
    }

    fn nscanned(&self) -> u64 {
        self.nscanned
    }

    fn recover_from_yield(&mut self) {
        // The saved entry may have been removed while suspended; the next
        // range probe naturally lands past it. Only the current document
        // needs re-validation.
        if let Some((_, loc)) = &self.pos {
            if self.collection.doc_at(*loc).is_none() {
                self.seek();
            }
        }
    }

    fn pretty_index_bounds(&self) -> Value {
        match &self.vector {
            Some(v) => v.pretty_bounds(),
            None => {
                let mut map = serde_json::Map::new();
                map.insert("start".into(), Self::bound_json(&self.lower));
                map.insert("end".into(), Self::bound_json(&self.upper));
                Value::Object(map)
            }
        }
    }

    fn kind(&self) -> String {
        self.kind.clone()
    }
}
