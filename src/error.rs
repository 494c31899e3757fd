//! Error types for the notification channel.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use fz_notifications::{NotificationChannel, Result};
//!
//! async fn example(channel: &NotificationChannel) -> Result<()> {
//!     channel.send(r#"{"action":"get_jobs"}"#).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Connection | [`Error::NotConnected`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Decode`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::channel::ChannelState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the channel builder is missing required settings.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL could not be used.
    #[error("Invalid endpoint URL '{url}': {message}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Operation requires an open connection.
    #[error("Channel is not connected (state: {state})")]
    NotConnected {
        /// State the channel was in.
        state: ChannelState,
    },

    /// Connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound frame could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a not connected error.
    #[inline]
    pub fn not_connected(state: ChannelState) -> Self {
        Self::NotConnected { state }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed once the channel is reopened.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotConnected { .. } | Self::ConnectionClosed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::decode("malformed frame: EOF");
        assert_eq!(err.to_string(), "Decode error: malformed frame: EOF");
    }

    #[test]
    fn test_not_connected_display() {
        let err = Error::not_connected(ChannelState::Connecting);
        assert_eq!(
            err.to_string(),
            "Channel is not connected (state: connecting)"
        );
    }

    #[test]
    fn test_invalid_url_display() {
        let err = Error::invalid_url("http://x", "scheme must be ws or wss");
        assert_eq!(
            err.to_string(),
            "Invalid endpoint URL 'http://x': scheme must be ws or wss"
        );
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::from(WsError::ConnectionClosed).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::not_connected(ChannelState::Closed).is_connection_error());
        assert!(!Error::config("test").is_connection_error());
        assert!(!Error::decode("test").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::not_connected(ChannelState::Closed).is_recoverable());
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(!Error::from(WsError::AlreadyClosed).is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
