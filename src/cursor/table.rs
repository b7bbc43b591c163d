//! Natural-order table scans.

use serde_json::Value;

use crate::catalog::{Collection, DocLoc};

use super::Cursor;

/// Scans document slots in insertion (or reverse-insertion) order.
pub struct TableScanCursor<'a> {
    collection: &'a Collection,
    direction: i32,
    pos: Option<DocLoc>,
    nscanned: u64,
}

impl<'a> TableScanCursor<'a> {
    /// Positions on the first live document, or on `start_loc` when given
    /// (advancing past it if that slot is already gone).
    pub fn new(collection: &'a Collection, direction: i32, start_loc: Option<DocLoc>) -> Self {
        let direction = if direction < 0 { -1 } else { 1 };
        let pos = match start_loc {
            Some(loc) if collection.doc_at(loc).is_some() => Some(loc),
            Some(loc) => collection.next_live_loc(Some(loc), direction),
            None => collection.next_live_loc(None, direction),
        };
        let nscanned = u64::from(pos.is_some());
        TableScanCursor {
            collection,
            direction,
            pos,
            nscanned,
        }
    }
}

impl Cursor for TableScanCursor<'_> {
    fn ok(&self) -> bool {
        self.pos.is_some()
    }

    fn advance(&mut self) -> bool {
        if let Some(loc) = self.pos {
            self.pos = self.collection.next_live_loc(Some(loc), self.direction);
            if self.pos.is_some() {
                self.nscanned += 1;
            }
        }
        self.pos.is_some()
    }

    fn curr_loc(&self) -> Option<DocLoc> {
        self.pos
    }

    fn nscanned(&self) -> u64 {
        self.nscanned
    }

    fn recover_from_yield(&mut self) {
        // The current slot may have been removed while suspended.
        if let Some(loc) = self.pos {
            if self.collection.doc_at(loc).is_none() {
                self.advance();
            }
        }
    }

    fn pretty_index_bounds(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }

    fn kind(&self) -> String {
        if self.direction < 0 {
            "ReverseCursor".to_string()
        } else {
            "BasicCursor".to_string()
        }
    }
}
