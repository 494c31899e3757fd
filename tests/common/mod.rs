//! Shared helpers for integration tests: a local WebSocket server that
//! plays the dashboard side of the notification socket.

#![allow(dead_code)]

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing_subscriber::EnvFilter;

use fz_notifications::NotificationChannel;

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Installs a test log subscriber once (`RUST_LOG=debug` to see output).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Awaits `future`, failing the test if it takes longer than [`WAIT`].
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting in test")
}

/// Polls `condition` until it holds, failing the test after [`WAIT`].
pub async fn eventually(condition: impl Fn() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

/// Returns a localhost port with nothing listening on it.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

// ============================================================================
// TestServer
// ============================================================================

/// Accepts WebSocket clients on `127.0.0.1:<random>`.
pub struct TestServer {
    addr: SocketAddr,
    clients: mpsc::UnboundedReceiver<ServerClient>,
    accept_task: JoinHandle<()>,
}

impl TestServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, clients) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await
                    && tx.send(ServerClient::new(ws)).is_err()
                {
                    break;
                }
            }
        });

        Self {
            addr,
            clients,
            accept_task,
        }
    }

    /// Host part for [`NotificationChannel::for_host`].
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// Channel pointed at this server's `/notifications` endpoint.
    pub fn channel(&self) -> NotificationChannel {
        NotificationChannel::builder()
            .host(self.host())
            .close_timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    /// Waits for the next client to complete the handshake.
    pub async fn next_client(&mut self) -> ServerClient {
        within(self.clients.recv())
            .await
            .expect("accept loop ended")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// ============================================================================
// ServerClient
// ============================================================================

/// Server side of one accepted connection.
///
/// A background task keeps reading so close handshakes are answered.
pub struct ServerClient {
    sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    incoming: mpsc::UnboundedReceiver<Message>,
    reader: JoinHandle<()>,
}

impl ServerClient {
    fn new(ws: WebSocketStream<TcpStream>) -> Self {
        let (sink, mut stream) = ws.split();
        let (tx, incoming) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            while let Some(Ok(message)) = stream.next().await {
                let is_close = matches!(message, Message::Close(_));
                let _ = tx.send(message);
                if is_close {
                    // Keep polling so the close reply gets flushed.
                    while stream.next().await.is_some() {}
                    break;
                }
            }
        });

        Self {
            sink,
            incoming,
            reader,
        }
    }

    pub async fn send_text(&mut self, text: &str) {
        self.sink
            .send(Message::Text(text.to_owned().into()))
            .await
            .unwrap();
    }

    pub async fn send_binary(&mut self, bytes: &[u8]) {
        self.sink
            .send(Message::Binary(bytes.to_vec().into()))
            .await
            .unwrap();
    }

    /// Starts a close handshake from the server side.
    pub async fn close(&mut self, code: CloseCode, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };
        let _ = self.sink.send(Message::Close(Some(frame))).await;
    }

    /// Next text frame sent by the client.
    pub async fn recv_text(&mut self) -> String {
        loop {
            match within(self.incoming.recv()).await {
                Some(Message::Text(text)) => return text.as_str().to_owned(),
                Some(_) => continue,
                None => panic!("client disconnected before sending text"),
            }
        }
    }

    /// Waits for the client's close frame and returns its code.
    pub async fn recv_close(&mut self) -> Option<u16> {
        loop {
            match within(self.incoming.recv()).await {
                Some(Message::Close(frame)) => return frame.map(|f| u16::from(f.code)),
                Some(_) => continue,
                None => return None,
            }
        }
    }
}

impl Drop for ServerClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
