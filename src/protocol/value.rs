//! Decoded message payloads.
//!
//! [`Value`] is the JSON data model extended with the native scalars that
//! tagged wrappers decode to: [`Value::Date`] and [`Value::Double`].
//! Plain JSON numbers keep their exact [`serde_json::Number`] form so that
//! untagged payloads pass through unchanged.
//!
//! # Serialization
//!
//! `Value` serializes to relaxed extended JSON, the same dialect the
//! server emits:
//!
//! | Variant | JSON |
//! |---------|------|
//! | `Date` | `{"$date": "2019-05-01T12:00:00.000Z"}` |
//! | `Double` (finite) | plain number |
//! | `Double` (non-finite) | `{"$numberDouble": "NaN"}` |

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Number;

// ============================================================================
// Types
// ============================================================================

/// Object representation inside a [`Value`].
pub type Map = BTreeMap<String, Value>;

static NULL: Value = Value::Null;

// ============================================================================
// Value
// ============================================================================

/// A decoded JSON value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// JSON `null`, also used for an absent `data` field.
    #[default]
    Null,
    /// JSON boolean.
    Bool(bool),
    /// Untagged JSON number, kept exactly as received.
    Number(Number),
    /// Number decoded from `$numberDouble` or `$numberDecimal`.
    Double(f64),
    /// Timestamp decoded from `$date`.
    Date(DateTime<Utc>),
    /// JSON string.
    String(String),
    /// JSON array.
    Array(Vec<Value>),
    /// JSON object.
    Object(Map),
}

// ============================================================================
// Accessors
// ============================================================================

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the boolean, if this is one.
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as `f64` for both plain and decoded numbers.
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the value as `i64` if it is a plain integer.
    #[inline]
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Returns the value as `u64` if it is a plain non-negative integer.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    /// Returns the timestamp, if this is a decoded date.
    #[inline]
    #[must_use]
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the elements, if this is an array.
    #[inline]
    #[must_use]
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the entries, if this is an object.
    #[inline]
    #[must_use]
    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key in an object. Returns `None` for other variants.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Takes the value out, leaving `Null` in its place.
    #[inline]
    pub fn take(&mut self) -> Value {
        std::mem::take(self)
    }
}

impl std::ops::Index<&str> for Value {
    type Output = Value;

    /// Returns `Null` for missing keys and non-objects.
    fn index(&self, key: &str) -> &Value {
        self.get(key).unwrap_or(&NULL)
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl Value {
    /// Converts into relaxed extended JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) => Json::Number(n.clone()),
            Self::Double(d) => match Number::from_f64(*d) {
                Some(n) => Json::Number(n),
                None => serde_json::json!({ "$numberDouble": non_finite_text(*d) }),
            },
            Self::Date(d) => serde_json::json!({ "$date": format_date(d) }),
            Self::String(s) => Json::String(s.clone()),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Self::Object(value)
    }
}

// ============================================================================
// Serialize
// ============================================================================

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::Double(d) if d.is_finite() => serializer.serialize_f64(*d),
            Self::Double(d) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$numberDouble", non_finite_text(*d))?;
                map.end()
            }
            Self::Date(d) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$date", &format_date(d))?;
                map.end()
            }
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => items.serialize(serializer),
            Self::Object(map) => map.serialize(serializer),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn non_finite_text(value: f64) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

// ============================================================================
// Tests
// ============================================================================
