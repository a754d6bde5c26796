//! HMR WebSocket transport.
//!
//! The dev server side of the tool's own protocol (see [`messages`]). The
//! extension's client script connects to the allocated WebSocket port;
//! the server greets it, tracks it, and pushes change notifications
//! whenever the reload dispatcher fires.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `messages` | Typed server/client messages |

// ============================================================================
// Submodules
// ============================================================================

/// Typed HMR messages.
pub mod messages;

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

pub use messages::{ClientMessage, ClientReadyData, ServerMessage};

// ============================================================================
// Constants
// ============================================================================

/// Bind address for the HMR server (loopback only).
const BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Accept poll slice so the loop can observe the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

// ============================================================================
// HmrServer
// ============================================================================

/// WebSocket server pushing reload notifications to extension clients.
///
/// Multiple clients may connect (the developed extension and the
/// companion manager extension each hold one socket); pushes broadcast
/// to all of them.
pub struct HmrServer {
    /// Bound port.
    port: u16,

    /// Outbound channels by client id.
    clients: RwLock<FxHashMap<u64, mpsc::UnboundedSender<Message>>>,

    /// Next client id.
    next_client: AtomicU64,

    /// Identities reported by `clientReady` handshakes.
    ready: Mutex<Vec<ClientReadyData>>,

    /// Shutdown flag observed by the accept loop.
    shutdown: AtomicBool,
}

// ============================================================================
// HmrServer - Constructor
// ============================================================================

impl HmrServer {
    /// Binds the server to the allocated WebSocket port and starts the
    /// accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails; the allocator probed
    /// the port, but another process can win the race.
    pub async fn bind(port: u16) -> Result<Arc<Self>> {
        let addr = SocketAddr::new(BIND_IP, port);
        let listener = TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        let server = Arc::new(Self {
            port: actual_port,
            clients: RwLock::new(FxHashMap::default()),
            next_client: AtomicU64::new(1),
            ready: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        });

        let accept_server = Arc::clone(&server);
        tokio::spawn(async move {
            accept_server.accept_loop(listener).await;
        });

        info!(port = actual_port, "HMR server started");
        Ok(server)
    }
}

// ============================================================================
// HmrServer - Public API
// ============================================================================

impl HmrServer {
    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the number of connected clients.
    #[inline]
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Returns every identity reported by a `clientReady` handshake.
    #[must_use]
    pub fn ready_clients(&self) -> Vec<ClientReadyData> {
        self.ready.lock().clone()
    }

    /// Broadcasts a message to every connected client.
    ///
    /// Clients whose channel is gone are dropped from the set.
    pub fn broadcast(&self, message: &ServerMessage) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Unserializable HMR message");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let clients = self.clients.read();
            for (id, tx) in clients.iter() {
                if tx.send(Message::Text(text.clone().into())).is_err() {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.write();
            for id in dead {
                clients.remove(&id);
            }
        }

        debug!(clients = self.client_count(), "HMR message broadcast");
    }

    /// Shuts down the accept loop and disconnects every client.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.clients.write().clear();
        info!(port = self.port, "HMR server shut down");
    }
}

// ============================================================================
// HmrServer - Accept Loop
// ============================================================================

impl HmrServer {
    /// Background task accepting extension connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("HMR accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match timeout(ACCEPT_POLL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(error = %e, ?addr, "HMR connection failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "HMR accept failed");
                }
                Err(_) => {
                    // Poll slice elapsed; re-check the shutdown flag.
                    continue;
                }
            }
        }

        debug!("HMR accept loop terminated");
    }

    /// Upgrades one connection and runs its client loop.
    async fn handle_connection(
        self: Arc<Self>,
        stream: tokio::net::TcpStream,
        addr: SocketAddr,
    ) -> Result<()> {
        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let client_id = self.next_client.fetch_add(1, Ordering::Relaxed);
        info!(client_id, ?addr, "HMR client connected");

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        // Greet before registering so the handshake is always first.
        let ready = serde_json::to_string(&ServerMessage::ready())?;
        ws_write.send(Message::Text(ready.into())).await?;

        self.clients.write().insert(client_id, tx);

        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    match outbound {
                        Some(message) => {
                            if let Err(e) = ws_write.send(message).await {
                                debug!(client_id, error = %e, "HMR send failed");
                                break;
                            }
                        }
                        None => break,
                    }
                }

                inbound = ws_read.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => self.handle_client_text(client_id, &text),
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(client_id, "HMR client disconnected");
                            break;
                        }
                        Some(Err(e)) => {
                            debug!(client_id, error = %e, "HMR read error");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        self.clients.write().remove(&client_id);
        Ok(())
    }

    /// Routes one inbound client message.
    fn handle_client_text(&self, client_id: u64, text: &str) {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(client_id, error = %e, "Unparseable HMR client message");
                return;
            }
        };

        if message.is_client_ready() {
            if let Some(data) = message.data {
                debug!(client_id, id = ?data.id, "HMR client ready");
                self.ready.lock().push(data);
            }
        } else {
            debug!(client_id, status = %message.status, "HMR client status");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::StreamExt;
    use serde_json::json;

    async fn connect_client(
        port: u16,
    ) -> tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    > {
        let (stream, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}"))
            .await
            .expect("connect");
        stream
    }

    #[tokio::test]
    async fn test_bind_and_port() {
        let server = HmrServer::bind(0).await.expect("bind");
        assert!(server.port() > 0);
        assert_eq!(server.client_count(), 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_client_receives_server_ready() {
        let server = HmrServer::bind(0).await.expect("bind");
        let mut client = connect_client(server.port()).await;

        let greeting = client.next().await.expect("message").expect("ok");
        assert_eq!(
            greeting.into_text().expect("text").as_str(),
            r#"{"status":"serverReady"}"#
        );

        server.shutdown();
    }

    #[tokio::test]
    async fn test_broadcast_reaches_client() {
        let server = HmrServer::bind(0).await.expect("bind");
        let mut client = connect_client(server.port()).await;

        // Consume the greeting.
        let _ = client.next().await;

        // Registration happens right after the greeting is written.
        for _ in 0..50 {
            if server.client_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        server.broadcast(&ServerMessage::changed(crate::reload::ReloadScope::Html));

        let pushed = client.next().await.expect("message").expect("ok");
        assert_eq!(
            pushed.into_text().expect("text").as_str(),
            r#"{"changedFile":"html"}"#
        );

        server.shutdown();
    }

    #[tokio::test]
    async fn test_client_ready_recorded() {
        let server = HmrServer::bind(0).await.expect("bind");
        let mut client = connect_client(server.port()).await;
        let _ = client.next().await;

        client
            .send(Message::Text(
                json!({
                    "status": "clientReady",
                    "data": {"id": "abcdef", "manifest": {"name": "Example"}}
                })
                .to_string()
                .into(),
            ))
            .await
            .expect("send");

        for _ in 0..50 {
            if !server.ready_clients().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let ready = server.ready_clients();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id.as_deref(), Some("abcdef"));

        server.shutdown();
    }
}
