//! WebSocket connection and event loop.
//!
//! Each call to `start()` spawns one tokio task that owns the socket for
//! its whole life:
//!
//! - Connecting: runs the client handshake, cancellable by shutdown
//! - Open: dispatches inbound text frames in arrival order and writes
//!   queued outbound frames
//! - Closing: sends a close frame and waits (bounded) for the peer's reply,
//!   or flushes the reply to a close frame the peer sent first
//!
//! The task reports open and close to the channel exactly once each; a
//! failed handshake reports only the close.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::channel::core::Shared;
use crate::channel::{ChannelConfig, ChannelState, CloseEvent, OpenEvent};
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

// ============================================================================
// Types
// ============================================================================

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketWrite = SplitSink<Socket, Message>;
type SocketRead = SplitStream<Socket>;

/// Acknowledgement for one outbound frame.
pub(crate) type SendAck = oneshot::Receiver<Result<()>>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a text frame.
    Send {
        text: String,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Close the connection.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to one connection task.
pub(crate) struct Connection {
    id: ConnectionId,
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Spawns the event loop for a new connection.
    pub(crate) fn spawn(id: ConnectionId, config: ChannelConfig, shared: Arc<Shared>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_event_loop(id, config, shared, command_rx));

        Self {
            id,
            command_tx,
            task,
        }
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a text frame; the returned receiver resolves once written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has ended.
    pub(crate) fn enqueue(&self, text: String) -> Result<SendAck> {
        let (ack, ack_rx) = oneshot::channel();
        self.command_tx
            .send(ConnectionCommand::Send { text, ack })
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(ack_rx)
    }

    /// Asks the event loop to close. Does not wait.
    pub(crate) fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Waits for the event loop to finish.
    pub(crate) async fn join(self) {
        let id = self.id;
        if let Err(e) = self.task.await {
            error!(connection = %id, error = %e, "Connection task failed");
        }
    }
}

// ============================================================================
// Event Loop
// ============================================================================

async fn run_event_loop(
    id: ConnectionId,
    config: ChannelConfig,
    shared: Arc<Shared>,
    mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
) {
    let Some(socket) = connect(id, &config, &shared, &mut command_rx).await else {
        return;
    };

    let (mut ws_write, mut ws_read) = socket.split();

    let close_event = loop {
        tokio::select! {
            // Incoming frames from the server
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let outcome = shared.handle_text(text.as_str());
                        trace!(connection = %id, ?outcome, "Frame dispatched");
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(connection = %id, ?frame, "WebSocket closed by remote");
                        let mut event = CloseEvent::from_frame(id, frame.as_ref(), false);
                        event.was_clean = answer_close(id, &mut ws_write, config.close_timeout).await;
                        break event;
                    }

                    Some(Err(e)) => {
                        error!(connection = %id, error = %e, "WebSocket error");
                        break CloseEvent::abnormal(id, e.to_string(), false);
                    }

                    None => {
                        debug!(connection = %id, "WebSocket stream ended");
                        break CloseEvent::abnormal(id, "stream ended", false);
                    }

                    // Binary, Ping, Pong, Frame
                    Some(Ok(other)) => {
                        trace!(connection = %id, kind = message_kind(&other), "Ignoring non-text frame");
                    }
                }
            }

            // Commands from the channel
            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Send { text, ack }) => {
                        let result = ws_write
                            .send(Message::Text(text.into()))
                            .await
                            .map_err(Error::from);
                        if let Err(e) = &result {
                            warn!(connection = %id, error = %e, "Failed to send frame");
                        }
                        let _ = ack.send(result);
                    }

                    Some(ConnectionCommand::Shutdown) | None => {
                        debug!(connection = %id, "Shutdown requested");
                        break close_handshake(id, &mut ws_write, &mut ws_read, config.close_timeout).await;
                    }
                }
            }
        }
    };

    // Reject anything queued after the loop stopped reading commands.
    command_rx.close();
    while let Ok(command) = command_rx.try_recv() {
        if let ConnectionCommand::Send { ack, .. } = command {
            let _ = ack.send(Err(Error::ConnectionClosed));
        }
    }

    shared.handle_close(close_event);
    debug!(connection = %id, "Event loop terminated");
}

/// Runs the client handshake. Returns `None` after reporting the close if
/// the handshake fails or shutdown is requested first.
async fn connect(
    id: ConnectionId,
    config: &ChannelConfig,
    shared: &Shared,
    command_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
) -> Option<Socket> {
    let handshake = connect_async(config.url.as_str());
    tokio::pin!(handshake);

    loop {
        tokio::select! {
            result = &mut handshake => {
                return match result {
                    Ok((socket, response)) => {
                        shared.handle_open(OpenEvent {
                            connection: id,
                            url: config.url.clone(),
                            status: response.status().as_u16(),
                        });
                        Some(socket)
                    }
                    Err(e) => {
                        warn!(connection = %id, url = %config.url, error = %e, "Connection failed");
                        shared.handle_close(CloseEvent::abnormal(id, e.to_string(), false));
                        None
                    }
                };
            }

            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Send { ack, .. }) => {
                        let _ = ack.send(Err(Error::not_connected(ChannelState::Connecting)));
                    }

                    Some(ConnectionCommand::Shutdown) | None => {
                        debug!(connection = %id, "Shutdown while connecting");
                        shared.handle_close(CloseEvent::abnormal(
                            id,
                            "closed before the connection was established",
                            true,
                        ));
                        return None;
                    }
                }
            }
        }
    }
}

/// Sends a normal close frame and waits for the peer's close reply.
async fn close_handshake(
    id: ConnectionId,
    ws_write: &mut SocketWrite,
    ws_read: &mut SocketRead,
    close_timeout: Duration,
) -> CloseEvent {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: String::new().into(),
    };

    if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
        debug!(connection = %id, error = %e, "Close frame not sent");
        return CloseEvent::abnormal(id, e.to_string(), true);
    }

    let reply = timeout(close_timeout, async {
        while let Some(message) = ws_read.next().await {
            match message {
                Ok(Message::Close(frame)) => return Some(frame),
                Ok(_) => {}
                Err(_) => return None,
            }
        }
        None
    })
    .await;

    match reply {
        Ok(Some(frame)) => CloseEvent::from_frame(id, frame.as_ref(), true),
        Ok(None) => CloseEvent::abnormal(id, "connection dropped during close", true),
        Err(_) => {
            warn!(connection = %id, timeout_ms = close_timeout.as_millis() as u64, "Close handshake timed out");
            CloseEvent::abnormal(id, "close handshake timed out", true)
        }
    }
}

/// Flushes the close reply tungstenite queued for a remote close.
///
/// Returns `true` once the reply has been written.
async fn answer_close(id: ConnectionId, ws_write: &mut SocketWrite, close_timeout: Duration) -> bool {
    match timeout(close_timeout, ws_write.flush()).await {
        Ok(Ok(()) | Err(WsError::ConnectionClosed)) => true,
        Ok(Err(e)) => {
            debug!(connection = %id, error = %e, "Close reply not sent");
            false
        }
        Err(_) => {
            warn!(connection = %id, timeout_ms = close_timeout.as_millis() as u64, "Close reply timed out");
            false
        }
    }
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

// ============================================================================
// Tests
// ============================================================================
