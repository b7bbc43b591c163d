//! Collection metadata and the in-memory document store.
//!
//! The store keeps documents in insertion-ordered slots (offset == location)
//! and one ordered entry set per index. Writers maintain every index and the
//! per-index multikey flags.
//!
//! Lock discipline: cursors take the store read lock one step at a time.
//! Between steps the lock is free, so writers may remove documents while a
//! query is suspended; cursors re-seek past missing entries.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::index::{extract_keys, CompositeKey, IndexDetails, KeyPattern};

/// Location of a document: its slot offset in the collection.
pub type DocLoc = u64;

/// One index entry. Ordering applies the index's per-field directions so
/// that plain forward iteration visits keys in index order.
#[derive(Debug, Clone)]
struct TreeEntry {
    key: CompositeKey,
    loc: DocLoc,
    desc: Arc<[bool]>,
}

impl PartialEq for TreeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.loc == other.loc
    }
}

impl Eq for TreeEntry {}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        for (i, (a, b)) in self.key.iter().zip(other.key.iter()).enumerate() {
            let mut c = a.cmp(b);
            if self.desc.get(i).copied().unwrap_or(false) {
                c = c.reverse();
            }
            if c != Ordering::Equal {
                return c;
            }
        }
        self.key
            .len()
            .cmp(&other.key.len())
            .then(self.loc.cmp(&other.loc))
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct Store {
    docs: Vec<Option<Value>>,
    trees: Vec<BTreeSet<TreeEntry>>,
    multikey: Vec<bool>,
}

/// A collection: namespace, index definitions, and document store.
pub struct Collection {
    name: String,
    capped: bool,
    indexes: Vec<IndexDetails>,
    key_dirs: Vec<Arc<[bool]>>,
    store: RwLock<Store>,
}

impl Collection {
    /// Creates an empty collection with no indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capped: false,
            indexes: Vec::new(),
            key_dirs: Vec::new(),
            store: RwLock::new(Store {
                docs: Vec::new(),
                trees: Vec::new(),
                multikey: Vec::new(),
            }),
        }
    }

    /// Marks the collection as capped.
    pub fn capped(mut self) -> Self {
        self.capped = true;
        self
    }

    /// Adds an index. Indexes must be declared before documents are
    /// inserted.
    pub fn with_index(mut self, index: IndexDetails) -> Self {
        self.key_dirs
            .push(index.key_pattern().descending_flags().into());
        self.indexes.push(index);
        let mut store = self.store.write().expect("store lock");
        store.trees.push(BTreeSet::new());
        store.multikey.push(false);
        drop(store);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_capped(&self) -> bool {
        self.capped
    }

    pub fn n_indexes(&self) -> usize {
        self.indexes.len()
    }

    pub fn idx(&self, no: usize) -> &IndexDetails {
        &self.indexes[no]
    }

    pub fn indexes(&self) -> &[IndexDetails] {
        &self.indexes
    }

    /// Ordinal of the `_id` index, if present.
    pub fn find_id_index(&self) -> Option<usize> {
        self.indexes.iter().position(|i| i.is_id_index())
    }

    /// Ordinal of an index by name.
    pub fn find_index_by_name(&self, name: &str) -> Option<usize> {
        self.indexes.iter().position(|i| i.name() == name)
    }

    /// Ordinal of an index by exact key pattern.
    pub fn find_index_by_key_pattern(&self, kp: &KeyPattern) -> Option<usize> {
        self.indexes.iter().position(|i| i.key_pattern() == kp)
    }

    /// Whether an index has seen a document with an array value in one of
    /// its key fields.
    pub fn is_multikey(&self, no: usize) -> bool {
        self.store.read().expect("store lock").multikey[no]
    }

    /// Inserts a document, indexing it under every applicable index.
    pub fn insert(&self, doc: Value) -> DocLoc {
        let mut store = self.store.write().expect("store lock");
        let loc = store.docs.len() as DocLoc;
        for (no, index) in self.indexes.iter().enumerate() {
            let (keys, multikey) = extract_keys(index.key_pattern(), &doc);
            if multikey {
                store.multikey[no] = true;
            }
            let desc = self.key_dirs[no].clone();
            for key in keys {
                store.trees[no].insert(TreeEntry {
                    key,
                    loc,
                    desc: desc.clone(),
                });
            }
        }
        store.docs.push(Some(doc));
        loc
    }

    /// Removes a document, unindexing it everywhere. Returns the removed
    /// document.
    pub fn remove(&self, loc: DocLoc) -> Option<Value> {
        let mut store = self.store.write().expect("store lock");
        let doc = store.docs.get_mut(loc as usize)?.take()?;
        for (no, index) in self.indexes.iter().enumerate() {
            let (keys, _) = extract_keys(index.key_pattern(), &doc);
            let desc = self.key_dirs[no].clone();
            for key in keys {
                store.trees[no].remove(&TreeEntry {
                    key,
                    loc,
                    desc: desc.clone(),
                });
            }
        }
        Some(doc)
    }

    /// Reads the document at a location, if it still exists.
    pub fn doc_at(&self, loc: DocLoc) -> Option<Value> {
        self.store
            .read()
            .expect("store lock")
            .docs
            .get(loc as usize)
            .and_then(|d| d.clone())
    }

    /// Number of live documents.
    pub fn n_docs(&self) -> usize {
        self.store
            .read()
            .expect("store lock")
            .docs
            .iter()
            .filter(|d| d.is_some())
            .count()
    }

    /// Next live document location after `from` in the given direction.
    /// `from == None` starts at the corresponding end.
    pub fn next_live_loc(&self, from: Option<DocLoc>, direction: i32) -> Option<DocLoc> {
        let store = self.store.read().expect("store lock");
        let len = store.docs.len() as i64;
        let mut i = match (from, direction >= 0) {
            (Some(loc), true) => loc as i64 + 1,
            (Some(loc), false) => loc as i64 - 1,
            (None, true) => 0,
            (None, false) => len - 1,
        };
        let step = if direction >= 0 { 1 } else { -1 };
        while i >= 0 && i < len {
            if store.docs[i as usize].is_some() {
                return Some(i as u64);
            }
            i += step;
        }
        None
    }

    /// Next index entry in traversal order.
    ///
    /// `lower`/`upper` are in index (tree) order and always given; `after`
    /// is the previously returned entry, excluded from the result. Forward
    /// traversal walks lower to upper; reverse traversal walks upper to
    /// lower.
    #[allow(clippy::too_many_arguments)]
    pub fn next_index_entry(
        &self,
        idx_no: usize,
        after: Option<&(CompositeKey, DocLoc)>,
        lower: &CompositeKey,
        lower_inclusive: bool,
        upper: &CompositeKey,
        upper_inclusive: bool,
        direction: i32,
    ) -> Option<(CompositeKey, DocLoc)> {
        use std::ops::Bound;

        let desc = self.key_dirs[idx_no].clone();
        let entry = |key: &CompositeKey, loc: DocLoc| TreeEntry {
            key: key.clone(),
            loc,
            desc: desc.clone(),
        };

        // Inverted bounds describe an empty scan.
        if entry(lower, 0) > entry(upper, DocLoc::MAX) {
            return None;
        }

        let low = if lower_inclusive {
            Bound::Included(entry(lower, 0))
        } else {
            Bound::Excluded(entry(lower, DocLoc::MAX))
        };
        let high = if upper_inclusive {
            Bound::Included(entry(upper, DocLoc::MAX))
        } else {
            Bound::Excluded(entry(upper, 0))
        };

        let store = self.store.read().expect("store lock");
        let tree = &store.trees[idx_no];
        let found = if direction >= 0 {
            let start = match after {
                Some((k, l)) => Bound::Excluded(entry(k, *l)),
                None => low,
            };
            tree.range((start, high)).next()
        } else {
            let end = match after {
                Some((k, l)) => Bound::Excluded(entry(k, *l)),
                None => high,
            };
            tree.range((low, end)).next_back()
        };
        found.map(|e| (e.key.clone(), e.loc))
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("capped", &self.capped)
            .field("indexes", &self.indexes)
            .finish()
    }
}
