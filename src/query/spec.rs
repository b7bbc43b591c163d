//! Query input types: sort specifications, hints, and projections.

use serde_json::Value;

use crate::index::{CompositeKey, KeyPattern};

/// One field of a sort specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub name: String,
    pub direction: i32,
}

/// A requested result order, e.g. `{a: 1, b: -1}`.
///
/// `{$natural: ±1}` requests insertion order and is represented as an
/// ordinary field named `$natural`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec {
    fields: Vec<SortField>,
}

impl SortSpec {
    /// No ordering requested.
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds a sort from `(name, direction)` pairs.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, direction)| SortField {
                    name: name.into(),
                    direction: if direction < 0 { -1 } else { 1 },
                })
                .collect(),
        }
    }

    /// Single ascending field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new([(field.into(), 1)])
    }

    /// Single descending field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new([(field.into(), -1)])
    }

    /// Natural (insertion) order.
    pub fn natural(direction: i32) -> Self {
        Self::new([("$natural".to_string(), direction)])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// When the leading field is `$natural`, its direction.
    pub fn natural_direction(&self) -> Option<i32> {
        self.fields
            .first()
            .filter(|f| f.name == "$natural")
            .map(|f| f.direction)
    }

    /// Field names in sort order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Canonical `(name, direction)` pairs for shape keys.
    pub fn as_pairs(&self) -> Vec<(String, i32)> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.direction))
            .collect()
    }
}

/// A caller-supplied access-path hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    /// Index by name.
    Index(String),
    /// Index by exact key pattern.
    KeyPattern(KeyPattern),
    /// Force natural order.
    Natural,
}

impl Hint {
    /// Parses a hint document: `{$natural: 1}` or a key pattern.
    pub fn from_doc(doc: &Value) -> Option<Self> {
        let kp = KeyPattern::from_doc(doc)?;
        if kp.is_natural() {
            Some(Hint::Natural)
        } else {
            Some(Hint::KeyPattern(kp))
        }
    }
}

/// A projection restricted to included top-level fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    include: Vec<String>,
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn included_fields(&self) -> &[String] {
        &self.include
    }

    /// When every included field is part of the key pattern, returns a
    /// covering projection that hydrates documents from index keys alone.
    pub fn check_key(&self, key_pattern: &KeyPattern) -> Option<KeyFieldsOnly> {
        let mut fields = Vec::with_capacity(self.include.len());
        for name in &self.include {
            let pos = key_pattern
                .fields()
                .iter()
                .position(|f| &f.name == name)?;
            fields.push((name.clone(), pos));
        }
        Some(KeyFieldsOnly { fields })
    }
}

/// A covering projection: included field names mapped to key positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFieldsOnly {
    fields: Vec<(String, usize)>,
}

impl KeyFieldsOnly {
    /// Builds a result document from an index key, without fetching the
    /// stored document.
    pub fn hydrate(&self, key: &CompositeKey) -> Value {
        let mut map = serde_json::Map::new();
        for (name, pos) in &self.fields {
            if let Some(kv) = key.get(*pos) {
                map.insert(name.clone(), kv.to_json());
            }
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KeyValue;

    #[test]
    fn test_natural_direction() {
        assert_eq!(SortSpec::natural(-1).natural_direction(), Some(-1));
        assert_eq!(SortSpec::asc("a").natural_direction(), None);
        assert_eq!(SortSpec::none().natural_direction(), None);
    }

    #[test]
    fn test_hint_from_doc() {
        let h = Hint::from_doc(&serde_json::json!({"$natural": 1})).unwrap();
        assert_eq!(h, Hint::Natural);

        let h = Hint::from_doc(&serde_json::json!({"a": 1, "b": -1})).unwrap();
        assert_eq!(h, Hint::KeyPattern(KeyPattern::new([("a", 1), ("b", -1)])));

        assert!(Hint::from_doc(&serde_json::json!({})).is_none());
    }

    #[test]
    fn test_covering_projection() {
        let kp = KeyPattern::new([("a", 1), ("b", 1)]);
        let proj = Projection::include(["b"]);
        let covering = proj.check_key(&kp).unwrap();

        let doc = covering.hydrate(&vec![KeyValue::number(1.0), KeyValue::string("x")]);
        assert_eq!(doc, serde_json::json!({"b": "x"}));

        let proj = Projection::include(["b", "c"]);
        assert!(proj.check_key(&kp).is_none());
    }
}
