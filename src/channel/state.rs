//! Channel state and transport lifecycle events.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use url::Url;

use crate::identifiers::ConnectionId;

// ============================================================================
// Constants
// ============================================================================

/// Close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the peer's close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code for a connection lost without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// ChannelState
// ============================================================================

/// Connection state of a [`NotificationChannel`](crate::NotificationChannel).
///
/// ```text
/// Closed --start()--> Connecting --open--> Open --close--> Closed
///                          └------failure/close-----------> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    /// No live connection.
    #[default]
    Closed,
    /// Handshake in progress.
    Connecting,
    /// Connected; frames are being dispatched.
    Open,
}

impl ChannelState {
    /// Returns `true` if a connection object exists.
    #[inline]
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
        };
        f.write_str(name)
    }
}

// ============================================================================
// OpenEvent
// ============================================================================

/// Passed to the `on_open` callback when the handshake completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEvent {
    /// Connection that opened.
    pub connection: ConnectionId,
    /// Endpoint URL.
    pub url: Url,
    /// HTTP status of the upgrade response (normally 101).
    pub status: u16,
}

// ============================================================================
// CloseEvent
// ============================================================================

/// Passed to the `on_close` callback when a connection reaches `Closed`.
///
/// Failed handshakes also produce a close event, with code
/// [`CLOSE_ABNORMAL`], so "never connected" and "dropped" look alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Connection that closed.
    pub connection: ConnectionId,
    /// WebSocket close code.
    pub code: u16,
    /// Close reason or transport error text.
    pub reason: String,
    /// `true` if a close handshake completed.
    pub was_clean: bool,
    /// `true` if this side requested the close (`close()`, `toggle()`,
    /// `start()` replacing the connection, or the channel being dropped).
    pub initiated_locally: bool,
}

impl CloseEvent {
    /// Close without a handshake (refused, reset, or cancelled while
    /// connecting).
    #[must_use]
    pub fn abnormal(
        connection: ConnectionId,
        reason: impl Into<String>,
        initiated_locally: bool,
    ) -> Self {
        Self {
            connection,
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
            was_clean: false,
            initiated_locally,
        }
    }

    /// Close built from a received close frame.
    #[must_use]
    pub fn from_frame(
        connection: ConnectionId,
        frame: Option<&CloseFrame>,
        initiated_locally: bool,
    ) -> Self {
        let (code, reason) = match frame {
            Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
            None => (CLOSE_NO_STATUS, String::new()),
        };

        Self {
            connection,
            code,
            reason,
            was_clean: true,
            initiated_locally,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
