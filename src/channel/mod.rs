//! Notification channel.
//!
//! This module contains the publish/subscribe surface UI code talks to:
//!
//! - [`NotificationChannel`] - connection lifecycle and dispatch
//! - [`ChannelBuilder`] - endpoint configuration
//! - [`ChannelState`], [`OpenEvent`], [`CloseEvent`] - lifecycle signals
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Builder and validated configuration |
//! | `core` | `NotificationChannel` |
//! | `handlers` | Handler table and lifecycle slots |
//! | `state` | State machine and events |

// ============================================================================
// Submodules
// ============================================================================

/// Builder and validated configuration.
pub mod builder;

/// Channel handle and shared state.
pub mod core;

/// Handler table and lifecycle callbacks.
pub mod handlers;

/// State machine and transport events.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{ChannelBuilder, ChannelConfig, DEFAULT_CLOSE_TIMEOUT, DEFAULT_PATH};
pub use self::core::NotificationChannel;
pub use handlers::{CloseCallback, DispatchOutcome, Handler, OpenCallback};
pub use state::{CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL, ChannelState, CloseEvent, OpenEvent};
