//! Wire protocol types.
//!
//! This module defines the message format pushed by the dashboard server
//! over the notification socket.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`Envelope`] | Server → Client | Notification `{action, data}` |
//! | raw text | Client → Server | Caller-constructed request, not validated |
//!
//! Payloads use relaxed extended JSON: values JSON cannot express natively
//! travel as single-key `$`-tagged objects (see [`extended`]).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Envelope decode/encode |
//! | `extended` | Tagged scalar decoder |
//! | `value` | Decoded value model |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope decode/encode.
pub mod envelope;

/// Tagged scalar decoder.
pub mod extended;

/// Decoded value model.
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::Envelope;
pub use extended::{TaggedScalar, decode_str, revive};
pub use value::{Map, Value};
