//! Fuzzing dashboard notifications - real-time event channel.
//!
//! This library connects to a fuzzing campaign dashboard's notification
//! endpoint and routes server-pushed events to handlers registered by
//! action name.
//!
//! # Architecture
//!
//! - **Server**: pushes `{action, data}` envelopes as relaxed extended JSON
//! - **Channel (Rust)**: owns one WebSocket, decodes tagged scalars
//!   (`$date`, `$numberDouble`, ...) and dispatches by action
//!
//! Key design principles:
//!
//! - At most one live connection per channel; reconnecting closes the old
//!   one and waits for it first
//! - One handler per action; registering again replaces it
//! - Handlers run in frame order; a panicking handler only loses its frame
//! - No automatic retry; see [`Reconnector`] for an opt-in policy
//!
//! # Quick Start
//!
//! ```no_run
//! use fz_notifications::{ChannelState, NotificationChannel, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let channel = NotificationChannel::for_host("localhost:8080")?;
//!
//!     channel.subscribe("new_issue", |issue| {
//!         println!("new issue from {:?}", issue["fuzzer"].as_str());
//!     });
//!     channel.on_open(|_| println!("online"));
//!     channel.on_close(|_| println!("offline"));
//!
//!     channel.start().await;
//!     channel.wait_for(ChannelState::Open).await?;
//!     channel.send(r#"{"action":"get_jobs"}"#).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`channel`] | [`NotificationChannel`], builder, state, events |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Envelope and extended JSON decoding |
//! | [`reconnect`] | Backoff and optional reconnect supervisor |
//! | `transport` | WebSocket event loop (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Notification channel: lifecycle, subscriptions, dispatch.
pub mod channel;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for subscriptions and connections.
pub mod identifiers;

/// Wire protocol: envelopes and extended JSON values.
pub mod protocol;

/// Caller-side reconnection policy.
pub mod reconnect;

/// WebSocket transport layer.
mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Channel types
pub use channel::{
    ChannelBuilder, ChannelConfig, ChannelState, CloseEvent, DispatchOutcome, NotificationChannel,
    OpenEvent,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, SubscriptionId};

// Protocol types
pub use protocol::{Envelope, TaggedScalar, Value};

// Reconnect types
pub use reconnect::{Backoff, Reconnector};
