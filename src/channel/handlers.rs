//! Handler table and lifecycle callback slots.
//!
//! Each action name maps to a single handler; registering again for the
//! same action replaces the previous one. Handlers run synchronously on
//! the connection task, in frame order. A panicking handler is caught and
//! logged so later frames are still delivered.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, error, trace, warn};

use crate::identifiers::SubscriptionId;
use crate::protocol::{Envelope, Value};

use super::state::{CloseEvent, OpenEvent};

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with the decoded `data` of a matching envelope.
pub type Handler = Arc<dyn Fn(Value) + Send + Sync>;

/// Callback invoked when a connection opens.
pub type OpenCallback = Arc<dyn Fn(&OpenEvent) + Send + Sync>;

/// Callback invoked when a connection closes.
pub type CloseCallback = Arc<dyn Fn(&CloseEvent) + Send + Sync>;

// ============================================================================
// DispatchOutcome
// ============================================================================

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The registered handler ran to completion.
    Delivered,
    /// Frame was not valid JSON and was dropped.
    Malformed,
    /// Frame had no string `action` field.
    NoAction,
    /// No handler is registered for the action.
    Unhandled(String),
    /// The handler panicked; the panic was contained.
    HandlerPanicked(String),
}

// ============================================================================
// HandlerTable
// ============================================================================

struct Entry {
    id: SubscriptionId,
    handler: Handler,
}

/// Action name to handler mapping.
///
/// Lives as long as the channel; reconnects do not clear it.
#[derive(Default)]
pub(crate) struct HandlerTable {
    entries: RwLock<FxHashMap<String, Entry>>,
}

impl HandlerTable {
    /// Registers `handler` for `action`, replacing any previous handler.
    pub(crate) fn insert(&self, action: String, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId::next();
        let previous = self
            .entries
            .write()
            .insert(action.clone(), Entry { id, handler });

        if let Some(previous) = previous {
            debug!(%action, replaced = %previous.id, %id, "Handler replaced");
        } else {
            trace!(%action, %id, "Handler registered");
        }

        id
    }

    /// Removes the handler registered under `id`.
    ///
    /// Returns `false` if `id` was already removed or replaced.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let action = entries
            .iter()
            .find(|(_, entry)| entry.id == id)
            .map(|(action, _)| action.clone());

        match action {
            Some(action) => {
                entries.remove(&action);
                trace!(%action, %id, "Handler removed");
                true
            }
            None => false,
        }
    }

    /// Removes whatever handler is registered for `action`.
    pub(crate) fn remove_action(&self, action: &str) -> bool {
        self.entries.write().remove(action).is_some()
    }

    /// Returns `true` if `action` has a handler.
    pub(crate) fn contains(&self, action: &str) -> bool {
        self.entries.read().contains_key(action)
    }

    /// Returns the registered action names, sorted.
    pub(crate) fn actions(&self) -> Vec<String> {
        let mut actions: Vec<_> = self.entries.read().keys().cloned().collect();
        actions.sort_unstable();
        actions
    }

    /// Routes a decoded envelope to its handler.
    ///
    /// The handler is cloned out of the table before it runs, so handlers
    /// may register or remove handlers themselves.
    pub(crate) fn dispatch(&self, envelope: Envelope) -> DispatchOutcome {
        let Some(action) = envelope.action else {
            trace!("Frame without action dropped");
            return DispatchOutcome::NoAction;
        };

        let handler = self
            .entries
            .read()
            .get(&action)
            .map(|entry| Arc::clone(&entry.handler));

        let Some(handler) = handler else {
            trace!(%action, "No handler for action");
            return DispatchOutcome::Unhandled(action);
        };

        let data = envelope.data;
        match catch_unwind(AssertUnwindSafe(|| handler(data))) {
            Ok(()) => DispatchOutcome::Delivered,
            Err(panic) => {
                error!(%action, panic = panic_message(&*panic), "Handler panicked");
                DispatchOutcome::HandlerPanicked(action)
            }
        }
    }
}

// ============================================================================
// LifecycleSlots
// ============================================================================

/// Single-slot `on_open` / `on_close` callbacks.
#[derive(Default)]
pub(crate) struct LifecycleSlots {
    on_open: Mutex<Option<OpenCallback>>,
    on_close: Mutex<Option<CloseCallback>>,
}

impl LifecycleSlots {
    pub(crate) fn set_open(&self, callback: Option<OpenCallback>) {
        *self.on_open.lock() = callback;
    }

    pub(crate) fn set_close(&self, callback: Option<CloseCallback>) {
        *self.on_close.lock() = callback;
    }

    pub(crate) fn fire_open(&self, event: &OpenEvent) {
        let callback = self.on_open.lock().clone();
        if let Some(callback) = callback
            && let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event)))
        {
            warn!(panic = panic_message(&*panic), "on_open callback panicked");
        }
    }

    pub(crate) fn fire_close(&self, event: &CloseEvent) {
        let callback = self.on_close.lock().clone();
        if let Some(callback) = callback
            && let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event)))
        {
            warn!(panic = panic_message(&*panic), "on_close callback panicked");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic>"
    }
}

// ============================================================================
// Tests
// ============================================================================
