//! Totally ordered index key values.
//!
//! Index keys use a deterministic cross-type ordering with sentinels:
//! `MinKey < Null < Number < String < Bool < MaxKey`.
//! Numbers are stored as sign-flipped IEEE-754 bits so that integers and
//! doubles interleave numerically under the derived ordering.

use std::fmt;

use serde_json::Value;

/// A single indexable field value with a total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    /// Sorts before every other value; used for open lower bounds.
    MinKey,
    /// Explicit null.
    Null,
    /// Numeric value stored as order-preserving bits.
    Number(u64),
    /// String value.
    String(String),
    /// Boolean value (false < true).
    Bool(bool),
    /// Sorts after every other value; used for open upper bounds.
    MaxKey,
}

impl KeyValue {
    /// Creates a numeric key.
    ///
    /// Converts to total-ordering bits: negative floats flip all bits,
    /// non-negative floats flip the sign bit.
    pub fn number(v: f64) -> Self {
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        KeyValue::Number(ordered)
    }

    /// Creates a string key.
    pub fn string(v: impl Into<String>) -> Self {
        KeyValue::String(v.into())
    }

    /// Recovers the numeric value of a `Number` key.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            KeyValue::Number(ordered) => {
                let bits = if (ordered >> 63) == 1 {
                    ordered ^ (1 << 63)
                } else {
                    !ordered
                };
                Some(f64::from_bits(bits))
            }
            _ => None,
        }
    }

    /// Creates a key from a JSON value.
    ///
    /// Arrays and objects are not representable as a single key and
    /// return `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(KeyValue::Null),
            Value::Bool(b) => Some(KeyValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(KeyValue::number),
            Value::String(s) => Some(KeyValue::string(s)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Renders the key back as a JSON value for bounds display.
    ///
    /// The sentinels have no JSON equivalent and render as tagged strings.
    pub fn to_json(&self) -> Value {
        match self {
            KeyValue::MinKey => Value::String("$minKey".into()),
            KeyValue::MaxKey => Value::String("$maxKey".into()),
            KeyValue::Null => Value::Null,
            KeyValue::Bool(b) => Value::Bool(*b),
            KeyValue::Number(_) => {
                let f = self.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
            KeyValue::String(s) => Value::String(s.clone()),
        }
    }

    /// Returns true for `Number` keys.
    pub fn is_number(&self) -> bool {
        matches!(self, KeyValue::Number(_))
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::MinKey => write!(f, "MinKey"),
            KeyValue::MaxKey => write!(f, "MaxKey"),
            KeyValue::Null => write!(f, "null"),
            KeyValue::Bool(b) => write!(f, "{}", b),
            KeyValue::Number(_) => write!(f, "{}", self.as_f64().unwrap_or(f64::NAN)),
            KeyValue::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// A compound index key: one `KeyValue` per key-pattern field, in pattern
/// order. Ordering is lexicographic in pattern order with per-field
/// directions applied by the store.
pub type CompositeKey = Vec<KeyValue>;
