//! Extended JSON decoder.
//!
//! The server encodes values that JSON cannot represent natively as
//! single-key objects whose key starts with `$`:
//!
//! ```json
//! { "started": { "$date": "2019-05-01T12:00:00Z" }, "progress": { "$numberDouble": "42.5" } }
//! ```
//!
//! Decoding walks the parsed document bottom-up. Every object with exactly
//! one `$`-prefixed key is replaced by the value its [`TaggedScalar`]
//! decodes to. Unknown tags unwrap one level instead of failing, so the
//! server can introduce new tags without breaking older clients.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as Json;
use tracing::debug;

use crate::error::{Error, Result};

use super::value::{Map, Value};

// ============================================================================
// Constants
// ============================================================================

/// Naive timestamp layouts accepted for `$date`, interpreted as UTC.
const NAIVE_DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

// ============================================================================
// TaggedScalar
// ============================================================================

/// Tag of a single-key wrapper object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedScalar {
    /// `$date`: timestamp.
    Date,
    /// `$numberDouble`: 64-bit float.
    NumberDouble,
    /// `$numberDecimal`: high-precision decimal, decoded as 64-bit float.
    NumberDecimal,
    /// Any other `$` key. The wrapped value is unwrapped unchanged.
    Unknown(String),
}

impl TaggedScalar {
    /// Classifies a key. Returns `None` if the key is not a tag.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "$date" => Some(Self::Date),
            "$numberDouble" => Some(Self::NumberDouble),
            "$numberDecimal" => Some(Self::NumberDecimal),
            other if other.starts_with('$') => Some(Self::Unknown(other.to_owned())),
            _ => None,
        }
    }

    /// Decodes an already-revived wrapped value.
    #[must_use]
    pub fn decode(&self, inner: Value) -> Value {
        match self {
            Self::Date => decode_date(inner),
            Self::NumberDouble | Self::NumberDecimal => Value::Double(to_number(&inner)),
            Self::Unknown(_) => inner,
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parses frame text and revives tagged scalars.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the text is not valid JSON.
pub fn decode_str(text: &str) -> Result<Value> {
    let json: Json =
        serde_json::from_str(text).map_err(|e| Error::decode(format!("malformed frame: {e}")))?;
    Ok(revive(json))
}

/// Converts a parsed JSON document, reviving tagged scalars at any depth.
#[must_use]
pub fn revive(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => Value::Number(n),
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(items.into_iter().map(revive).collect()),
        Json::Object(map) => {
            let tag = match map.keys().next() {
                Some(key) if map.len() == 1 => TaggedScalar::from_key(key),
                _ => None,
            };

            match tag {
                Some(tag) => {
                    let inner = map.into_iter().next().map_or(Json::Null, |(_, v)| v);
                    tag.decode(revive(inner))
                }
                None => Value::Object(
                    map.into_iter()
                        .map(|(key, value)| (key, revive(value)))
                        .collect::<Map>(),
                ),
            }
        }
    }
}

// ============================================================================
// Date
// ============================================================================

fn decode_date(inner: Value) -> Value {
    let decoded = match &inner {
        Value::Date(date) => Some(*date),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::Double(d) if d.is_finite() => DateTime::from_timestamp_millis(*d as i64),
        Value::String(text) => parse_date_text(text),
        _ => None,
    };

    match decoded {
        Some(date) => Value::Date(date),
        None => {
            debug!(value = ?inner, "Undecodable $date payload, passing through");
            inner
        }
    }
}

/// Parses ISO-8601 text or an epoch-milliseconds string.
fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }

    if let Ok(date) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(date.with_timezone(&Utc));
    }

    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    // `{"$date": {"$numberLong": "..."}}` unwraps to a string first.
    text.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

// ============================================================================
// Numbers
// ============================================================================

/// Converts a wrapped value to `f64` with host number-constructor rules.
fn to_number(inner: &Value) -> f64 {
    match inner {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Double(d) => *d,
        Value::Date(date) => date.timestamp_millis() as f64,
        Value::String(text) => parse_number_text(text),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn parse_number_text(text: &str) -> f64 {
    let text = text.trim();
    if let Some((radix, digits)) = radix_prefix(text) {
        return parse_radix(digits, radix);
    }
    match text {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        // Rust also accepts "inf"/"nan" spellings; the wire format does not.
        _ if text
            .bytes()
            .any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') =>
        {
            f64::NAN
        }
        _ => text.parse().unwrap_or(f64::NAN),
    }
}

/// Splits `0x`/`0o`/`0b` (any case, unsigned) into radix and digits.
fn radix_prefix(text: &str) -> Option<(u32, &str)> {
    let prefix = text.get(..2)?;
    let radix = match prefix.to_ascii_lowercase().as_str() {
        "0x" => 16,
        "0o" => 8,
        "0b" => 2,
        _ => return None,
    };
    Some((radix, &text[2..]))
}

/// Unsigned integer in `radix`; no digits or a stray character is NaN.
fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    digits
        .chars()
        .try_fold(0.0_f64, |acc, c| {
            c.to_digit(radix)
                .map(|d| acc * f64::from(radix) + f64::from(d))
        })
        .unwrap_or(f64::NAN)
}

// ============================================================================
// Tests
// ============================================================================
