//! Notification channel.
//!
//! [`NotificationChannel`] owns at most one live connection to the
//! dashboard's notification endpoint and routes decoded envelopes to
//! handlers registered per action name.
//!
//! # Lifecycle
//!
//! `start()`, `close()` and `toggle()` are serialized. Before a new
//! connection is opened, the previous one is closed and its terminal
//! `Closed` state is awaited, so two transports never coexist.
//!
//! The handler table and lifecycle callbacks survive reconnects.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, SubscriptionId};
use crate::protocol::{Envelope, Value};
use crate::transport::Connection;

use super::builder::{ChannelBuilder, ChannelConfig};
use super::handlers::{DispatchOutcome, HandlerTable, LifecycleSlots};
use super::state::{ChannelState, CloseEvent, OpenEvent};

// ============================================================================
// Shared
// ============================================================================

/// State shared between the channel handle and its connection task.
pub(crate) struct Shared {
    handlers: HandlerTable,
    lifecycle: LifecycleSlots,
    state_tx: watch::Sender<ChannelState>,
    /// Connection whose events are authoritative.
    current: Mutex<Option<ConnectionId>>,
    last_close: Mutex<Option<CloseEvent>>,
}

impl Shared {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Closed);
        Self {
            handlers: HandlerTable::default(),
            lifecycle: LifecycleSlots::default(),
            state_tx,
            current: Mutex::new(None),
            last_close: Mutex::new(None),
        }
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        *self.current.lock() == Some(id)
    }

    fn set_state(&self, state: ChannelState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Channel state changed");
        }
    }

    /// Called by the connection task once the handshake completes.
    pub(crate) fn handle_open(&self, event: OpenEvent) {
        if !self.is_current(event.connection) {
            debug!(connection = %event.connection, "Ignoring open from superseded connection");
            return;
        }

        info!(connection = %event.connection, url = %event.url, "Notification channel open");
        self.set_state(ChannelState::Open);
        self.lifecycle.fire_open(&event);
    }

    /// Called by the connection task when it reaches a terminal state.
    pub(crate) fn handle_close(&self, event: CloseEvent) {
        if !self.is_current(event.connection) {
            debug!(connection = %event.connection, "Ignoring close from superseded connection");
            return;
        }

        info!(
            connection = %event.connection,
            code = event.code,
            reason = %event.reason,
            clean = event.was_clean,
            local = event.initiated_locally,
            "Notification channel closed"
        );

        *self.last_close.lock() = Some(event.clone());
        self.set_state(ChannelState::Closed);
        self.lifecycle.fire_close(&event);
    }

    /// Decodes one text frame and dispatches it.
    pub(crate) fn handle_text(&self, text: &str) -> DispatchOutcome {
        match Envelope::decode(text) {
            Ok(envelope) => self.handlers.dispatch(envelope),
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed frame");
                DispatchOutcome::Malformed
            }
        }
    }
}

// ============================================================================
// NotificationChannel
// ============================================================================

struct Inner {
    config: ChannelConfig,
    shared: Arc<Shared>,
    /// Live connection; the lock also serializes lifecycle operations.
    connection: AsyncMutex<Option<Connection>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.shutdown();
        }
    }
}

/// Real-time notification channel.
///
/// Cheap to clone; clones share the connection, handlers and callbacks.
/// The connection is shut down when the last clone is dropped.
///
/// # Example
///
/// ```no_run
/// use fz_notifications::{ChannelState, NotificationChannel};
///
/// # async fn example() -> fz_notifications::Result<()> {
/// let channel = NotificationChannel::for_host("localhost:8080")?;
///
/// channel.subscribe("job_progress", |data| {
///     println!("job {} at {:?}", data["ident"].as_u64().unwrap_or(0), data["percent"].as_f64());
/// });
/// channel.on_close(|event| eprintln!("offline ({})", event.code));
///
/// channel.start().await;
/// channel.wait_for(ChannelState::Open).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<Inner>,
}

// ============================================================================
// NotificationChannel - Constructors
// ============================================================================

impl NotificationChannel {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ChannelBuilder {
        ChannelBuilder::new()
    }

    /// Creates a channel for `ws://<host>/notifications`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `host` does not form a valid URL.
    pub fn for_host(host: &str) -> Result<Self> {
        ChannelBuilder::new().host(host).build()
    }

    /// Creates a channel from a validated configuration.
    #[must_use]
    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                shared: Arc::new(Shared::new()),
                connection: AsyncMutex::new(None),
            }),
        }
    }
}

// ============================================================================
// NotificationChannel - Accessors
// ============================================================================

impl NotificationChannel {
    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.config.url
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.inner.shared.state_tx.borrow()
    }

    /// Returns a receiver that observes state transitions.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.inner.shared.state_tx.subscribe()
    }

    /// Returns the close event of the most recent connection, if any.
    #[must_use]
    pub fn last_close(&self) -> Option<CloseEvent> {
        self.inner.shared.last_close.lock().clone()
    }

    /// Waits until the channel is in `target` state.
    ///
    /// Returns immediately if it already is. There is no timeout; wrap the
    /// call in [`tokio::time::timeout`] if a stalled handshake matters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the state sender is gone.
    pub async fn wait_for(&self, target: ChannelState) -> Result<()> {
        let mut rx = self.state_changes();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// NotificationChannel - Handlers
// ============================================================================

impl NotificationChannel {
    /// Registers the handler for `action`.
    ///
    /// A handler already registered for the same action is replaced; only
    /// the latest registration is invoked afterwards.
    pub fn subscribe<F>(&self, action: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.inner
            .shared
            .handlers
            .insert(action.into(), Arc::new(handler))
    }

    /// Removes the handler registered under `id`.
    ///
    /// Returns `false` if it was already removed or has been replaced by a
    /// later `subscribe` for the same action.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.shared.handlers.remove(id)
    }

    /// Removes the handler for `action`, whoever registered it.
    pub fn unsubscribe_action(&self, action: &str) -> bool {
        self.inner.shared.handlers.remove_action(action)
    }

    /// Returns `true` if `action` has a handler.
    #[must_use]
    pub fn has_handler(&self, action: &str) -> bool {
        self.inner.shared.handlers.contains(action)
    }

    /// Returns the actions that have handlers, sorted.
    #[must_use]
    pub fn actions(&self) -> Vec<String> {
        self.inner.shared.handlers.actions()
    }

    /// Sets the callback fired when a connection opens.
    pub fn on_open<F>(&self, callback: F)
    where
        F: Fn(&OpenEvent) + Send + Sync + 'static,
    {
        self.inner.shared.lifecycle.set_open(Some(Arc::new(callback)));
    }

    /// Sets the callback fired when a connection closes or fails.
    pub fn on_close<F>(&self, callback: F)
    where
        F: Fn(&CloseEvent) + Send + Sync + 'static,
    {
        self.inner.shared.lifecycle.set_close(Some(Arc::new(callback)));
    }

    /// Clears the open callback.
    pub fn clear_on_open(&self) {
        self.inner.shared.lifecycle.set_open(None);
    }

    /// Clears the close callback.
    pub fn clear_on_close(&self) {
        self.inner.shared.lifecycle.set_close(None);
    }

    /// Decodes and dispatches a frame as if it arrived on the socket.
    ///
    /// Useful when frames reach the process through another transport.
    pub fn deliver(&self, text: &str) -> DispatchOutcome {
        self.inner.shared.handle_text(text)
    }
}

// ============================================================================
// NotificationChannel - Lifecycle
// ============================================================================

impl NotificationChannel {
    /// Opens a new connection.
    ///
    /// Any live connection is closed first and its `Closed` state awaited.
    /// Returns once the new connection is `Connecting`; the handshake
    /// result arrives through `on_open` / `on_close` and
    /// [`state_changes`](Self::state_changes). A rejected handshake lands
    /// in `Closed` without an error here.
    pub async fn start(&self) {
        let mut slot = self.inner.connection.lock().await;
        self.open_locked(&mut slot).await;
    }

    /// Closes the live connection, if any, and waits for `Closed`.
    pub async fn close(&self) {
        let mut slot = self.inner.connection.lock().await;
        Self::close_locked(&mut slot).await;
    }

    /// Closes when `Open`, otherwise starts.
    pub async fn toggle(&self) {
        let mut slot = self.inner.connection.lock().await;
        if self.state() == ChannelState::Open {
            Self::close_locked(&mut slot).await;
        } else {
            self.open_locked(&mut slot).await;
        }
    }

    /// Sends a raw text frame.
    ///
    /// The payload is not validated.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless the channel is `Open`
    /// - [`Error::WebSocket`] if the write fails
    /// - [`Error::ConnectionClosed`] if the connection ends mid-send
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        let ack = {
            let slot = self.inner.connection.lock().await;
            let state = self.state();
            match slot.as_ref() {
                Some(connection) if state == ChannelState::Open => {
                    connection.enqueue(text.into())?
                }
                _ => return Err(Error::not_connected(state)),
            }
        };

        ack.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Serializes `message` to JSON and sends it.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send), plus [`Error::Json`] if serialization
    /// fails.
    pub async fn send_json<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let text = serde_json::to_string(message)?;
        self.send(text).await
    }

    async fn open_locked(&self, slot: &mut Option<Connection>) {
        Self::close_locked(slot).await;

        let shared = &self.inner.shared;
        let id = ConnectionId::next();
        *shared.current.lock() = Some(id);
        shared.set_state(ChannelState::Connecting);

        debug!(connection = %id, url = %self.inner.config.url, "Starting connection");

        *slot = Some(Connection::spawn(
            id,
            self.inner.config.clone(),
            Arc::clone(shared),
        ));
    }

    async fn close_locked(slot: &mut Option<Connection>) {
        if let Some(connection) = slot.take() {
            debug!(connection = %connection.id(), "Closing connection");
            connection.shutdown();
            connection.join().await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
