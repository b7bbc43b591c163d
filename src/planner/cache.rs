//! The plan cache: query shape → last winning access path.
//!
//! A process-lifetime registry, not a singleton; tests construct isolated
//! instances. Entries are guarded by a per-namespace mutex held only for
//! the duration of the cache operation, never across cursor work.
//!
//! Every query carries two shapes — the single-key and multikey
//! interpretations of its predicate — and registration, lookup, and
//! invalidation cover both.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::index::KeyPattern;
use crate::query::QueryPattern;

/// A recorded winner: the index key pattern (`{$natural: 1}` for a table
/// scan) and the work it took to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPlan {
    pub index_key: KeyPattern,
    pub nscanned: u64,
}

type ShardMap = HashMap<QueryPattern, CachedPlan>;

/// Per-namespace recorded plans.
#[derive(Debug, Default)]
pub struct PlanCache {
    namespaces: RwLock<HashMap<String, Arc<Mutex<ShardMap>>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, ns: &str) -> Arc<Mutex<ShardMap>> {
        if let Some(shard) = self.namespaces.read().expect("cache lock").get(ns) {
            return shard.clone();
        }
        let mut map = self.namespaces.write().expect("cache lock");
        map.entry(ns.to_string()).or_default().clone()
    }

    /// The recorded index key for a shape, if any.
    pub fn index_for_pattern(&self, ns: &str, pattern: &QueryPattern) -> Option<KeyPattern> {
        let shard = self.shard(ns);
        let guard = shard.lock().expect("cache shard lock");
        guard.get(pattern).map(|p| p.index_key.clone())
    }

    /// The recorded scan count for a shape; zero when absent.
    pub fn nscanned_for_pattern(&self, ns: &str, pattern: &QueryPattern) -> u64 {
        let shard = self.shard(ns);
        let guard = shard.lock().expect("cache shard lock");
        guard.get(pattern).map(|p| p.nscanned).unwrap_or(0)
    }

    /// Records a winner for a shape. `None` invalidates the entry.
    pub fn register_index_for_pattern(
        &self,
        ns: &str,
        pattern: &QueryPattern,
        index_key: Option<KeyPattern>,
        nscanned: u64,
    ) {
        let shard = self.shard(ns);
        let mut guard = shard.lock().expect("cache shard lock");
        match index_key {
            Some(index_key) => {
                guard.insert(
                    pattern.clone(),
                    CachedPlan {
                        index_key,
                        nscanned,
                    },
                );
            }
            None => {
                guard.remove(pattern);
            }
        }
    }

    /// Looks up both of a query's shapes under one shard lock, single-key
    /// first.
    pub fn best_index_for_patterns(
        &self,
        ns: &str,
        single: &QueryPattern,
        multi: &QueryPattern,
    ) -> Option<CachedPlan> {
        let shard = self.shard(ns);
        let guard = shard.lock().expect("cache shard lock");
        guard.get(single).or_else(|| guard.get(multi)).cloned()
    }

    /// Invalidates both of a query's shapes.
    pub fn clear_indexes_for_patterns(
        &self,
        ns: &str,
        single: &QueryPattern,
        multi: &QueryPattern,
    ) {
        let shard = self.shard(ns);
        let mut guard = shard.lock().expect("cache shard lock");
        guard.remove(single);
        guard.remove(multi);
    }
}
