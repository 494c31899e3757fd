//! WebSocket transport layer.
//!
//! This module owns the socket between the dashboard server and the
//! channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                          ┌─────────────────┐
//! │ NotificationChannel  │        WebSocket         │ Dashboard       │
//! │                      │◄─────────────────────────│ server          │
//! │  Connection (task)   │  ws(s)://host/notif...   │                 │
//! └──────────────────────┘                          └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::spawn` - start the task; handshake runs inside it
//! 2. Open event reported, frames dispatched in arrival order
//! 3. `Connection::shutdown` - send close frame, await the peer's reply
//! 4. Close event reported, task ends
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub(crate) mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub(crate) use connection::Connection;
