//! Index specifications and the index-plugin seam.
//!
//! A plain index is fully described by its key pattern. Plugin indexes
//! (geo, text, ...) additionally claim queries through `suitability` and
//! supply their own cursors.

use std::sync::Arc;

use serde_json::Value;

use crate::catalog::Collection;
use crate::cursor::Cursor;
use crate::query::SortSpec;

use super::key::{CompositeKey, KeyValue};
use super::pattern::KeyPattern;

/// How well an index serves a query, as judged by its access method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Suitability {
    Useless,
    Helpful,
    Optimal,
}

/// A pluggable index access method.
pub trait IndexPlugin: Send + Sync {
    /// Plugin name, matched against a query's special requirement.
    fn name(&self) -> &str;

    /// Judges the plugin's ability to answer the query.
    fn suitability(&self, query: &Value, order: &SortSpec) -> Suitability;

    /// Whether results still need a buffered sort for the requested order.
    fn scan_and_order_required(&self, query: &Value, order: &SortSpec) -> bool;

    /// Opens a plugin-specific cursor.
    fn new_cursor<'a>(
        &self,
        collection: &'a Collection,
        query: &Value,
        order: &SortSpec,
        num_wanted: usize,
    ) -> Box<dyn Cursor + 'a>;
}

/// An index definition: key pattern plus optional plugin.
#[derive(Clone)]
pub struct IndexSpec {
    key_pattern: KeyPattern,
    plugin: Option<Arc<dyn IndexPlugin>>,
}

impl IndexSpec {
    pub fn new(key_pattern: KeyPattern) -> Self {
        Self {
            key_pattern,
            plugin: None,
        }
    }

    pub fn with_plugin(key_pattern: KeyPattern, plugin: Arc<dyn IndexPlugin>) -> Self {
        Self {
            key_pattern,
            plugin: Some(plugin),
        }
    }

    pub fn key_pattern(&self) -> &KeyPattern {
        &self.key_pattern
    }

    pub fn plugin(&self) -> Option<&Arc<dyn IndexPlugin>> {
        self.plugin.as_ref()
    }

    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin.as_deref().map(|p| p.name())
    }
}

impl std::fmt::Debug for IndexSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSpec")
            .field("key_pattern", &self.key_pattern)
            .field("plugin", &self.plugin_name())
            .finish()
    }
}

/// A named index on a collection.
#[derive(Debug, Clone)]
pub struct IndexDetails {
    name: String,
    spec: IndexSpec,
}

impl IndexDetails {
    pub fn new(name: impl Into<String>, spec: IndexSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn key_pattern(&self) -> &KeyPattern {
        self.spec.key_pattern()
    }

    pub fn is_id_index(&self) -> bool {
        self.key_pattern().is_id_pattern()
    }
}

/// Extracts the composite keys a document contributes to an index.
///
/// A document missing any pattern field is not indexed. The first field
/// holding an array expands into one key per element; a second array field
/// makes the document unindexable under this pattern (parallel arrays).
///
/// Returns the keys and whether expansion occurred (multikey).
pub fn extract_keys(key_pattern: &KeyPattern, doc: &Value) -> (Vec<CompositeKey>, bool) {
    let mut keys: Vec<CompositeKey> = vec![Vec::with_capacity(key_pattern.n_fields())];
    let mut multikey = false;
    for field in key_pattern.fields() {
        let value = match doc.get(&field.name) {
            Some(v) => v,
            None => return (Vec::new(), false),
        };
        match value {
            Value::Array(elems) => {
                if multikey {
                    return (Vec::new(), false);
                }
                multikey = true;
                let mut expanded = Vec::new();
                for base in &keys {
                    for elem in elems {
                        if let Some(kv) = KeyValue::from_json(elem) {
                            let mut k = base.clone();
                            k.push(kv);
                            expanded.push(k);
                        }
                    }
                }
                if expanded.is_empty() {
                    return (Vec::new(), false);
                }
                keys = expanded;
            }
            other => {
                let kv = match KeyValue::from_json(other) {
                    Some(kv) => kv,
                    None => return (Vec::new(), false),
                };
                for k in &mut keys {
                    k.push(kv.clone());
                }
            }
        }
    }
    (keys, multikey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_simple_key() {
        let kp = KeyPattern::new([("a", 1), ("b", -1)]);
        let (keys, multikey) = extract_keys(&kp, &json!({"a": 1, "b": "x"}));
        assert!(!multikey);
        assert_eq!(
            keys,
            vec![vec![KeyValue::number(1.0), KeyValue::string("x")]]
        );
    }

    #[test]
    fn test_extract_missing_field_skips_doc() {
        let kp = KeyPattern::new([("a", 1), ("b", 1)]);
        let (keys, _) = extract_keys(&kp, &json!({"a": 1}));
        assert!(keys.is_empty());
    }

    #[test]
    fn test_extract_multikey_expansion() {
        let kp = KeyPattern::new([("a", 1)]);
        let (keys, multikey) = extract_keys(&kp, &json!({"a": [1, 2, 3]}));
        assert!(multikey);
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_parallel_arrays_unindexable() {
        let kp = KeyPattern::new([("a", 1), ("b", 1)]);
        let (keys, _) = extract_keys(&kp, &json!({"a": [1, 2], "b": [3, 4]}));
        assert!(keys.is_empty());
    }
}
