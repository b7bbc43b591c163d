//! Index key patterns.

use std::fmt;

use serde_json::Value;

use super::key::{CompositeKey, KeyValue};

/// One field of a key pattern: name plus direction (`+1` or `-1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyField {
    pub name: String,
    pub direction: i32,
}

/// An ordered index key pattern, e.g. `{a: 1, b: -1}`.
///
/// `{$natural: 1}` is representable and identifies natural-order access in
/// plan-cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    fields: Vec<KeyField>,
}

impl KeyPattern {
    /// Builds a pattern from `(name, direction)` pairs.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, direction)| KeyField {
                    name: name.into(),
                    direction: if direction < 0 { -1 } else { 1 },
                })
                .collect(),
        }
    }

    /// The `{$natural: 1}` pattern, with the given direction.
    pub fn natural(direction: i32) -> Self {
        Self::new([("$natural", direction)])
    }

    /// Parses a key-pattern document, preserving field order.
    ///
    /// Returns `None` for empty or non-object documents, or when a field
    /// value is not numeric.
    pub fn from_doc(doc: &Value) -> Option<Self> {
        let obj = doc.as_object()?;
        if obj.is_empty() {
            return None;
        }
        let mut fields = Vec::with_capacity(obj.len());
        for (name, v) in obj {
            let n = v.as_f64()?;
            fields.push(KeyField {
                name: name.clone(),
                direction: if n < 0.0 { -1 } else { 1 },
            });
        }
        Some(Self { fields })
    }

    /// Returns true when this is the `{$natural: ...}` pattern.
    pub fn is_natural(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].name == "$natural"
    }

    /// Returns true when this is the single-field `{_id: 1}` pattern.
    pub fn is_id_pattern(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].name == "_id" && self.fields[0].direction == 1
    }

    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Name of the leading field, if any.
    pub fn first_field_name(&self) -> Option<&str> {
        self.fields.first().map(|f| f.name.as_str())
    }

    /// Per-field descending flags, in pattern order.
    pub fn descending_flags(&self) -> Vec<bool> {
        self.fields.iter().map(|f| f.direction < 0).collect()
    }

    /// Renders the pattern as a JSON document, preserving field order.
    pub fn to_doc(&self) -> Value {
        let mut map = serde_json::Map::new();
        for f in &self.fields {
            map.insert(f.name.clone(), Value::from(f.direction));
        }
        Value::Object(map)
    }

    /// Builds a composite key aligned with this pattern from a bounds
    /// document walked in field order. Values must be representable as
    /// single key values.
    pub fn composite_from_doc(&self, doc: &Value) -> Option<CompositeKey> {
        let obj = doc.as_object()?;
        let mut key = Vec::with_capacity(self.fields.len());
        for f in &self.fields {
            key.push(KeyValue::from_json(obj.get(&f.name)?)?);
        }
        Some(key)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, field.direction)?;
        }
        write!(f, " }}")
    }
}
