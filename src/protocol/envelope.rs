//! Notification envelope.
//!
//! Every frame on the channel carries one envelope:
//!
//! ```json
//! { "action": "job_progress", "data": { "ident": 3, "percent": { "$numberDouble": "42.5" } } }
//! ```
//!
//! `action` selects the handler. `data` is opaque to the channel and is
//! handed to the handler after extended JSON decoding.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

use crate::error::Result;

use super::extended::decode_str;
use super::value::Value;

// ============================================================================
// Envelope
// ============================================================================

/// A decoded `{action, data}` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Action name. `None` when the frame has no string `action` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Payload. `Null` when absent.
    pub data: Value,
}

impl Envelope {
    /// Creates an envelope for the given action.
    #[inline]
    #[must_use]
    pub fn new(action: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            action: Some(action.into()),
            data: data.into(),
        }
    }

    /// Decodes frame text into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`](crate::Error::Decode) if the text is not
    /// valid JSON. A valid document without an action is not an error.
    pub fn decode(text: &str) -> Result<Self> {
        decode_str(text).map(Self::from_value)
    }

    /// Splits a decoded document into action and data.
    ///
    /// Non-object documents and non-string actions yield `action: None`.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                let action = match map.remove("action") {
                    Some(Value::String(action)) => Some(action),
                    _ => None,
                };
                let data = map.remove("data").unwrap_or_default();
                Self { action, data }
            }
            _ => Self {
                action: None,
                data: Value::Null,
            },
        }
    }

    /// Returns the action name, if present.
    #[inline]
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Encodes the envelope as relaxed extended JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
