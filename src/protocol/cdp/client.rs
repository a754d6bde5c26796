//! DevTools protocol client for Chromium-family browsers.
//!
//! The client connects to the browser's debugging WebSocket once the
//! port becomes reachable, enables target discovery and auto-attach so
//! new targets (including the extension's service worker) surface as
//! events, and exposes the extension operations the reload dispatcher
//! needs.
//!
//! # Event Loop
//!
//! A spawned task owns the socket and handles:
//!
//! - Incoming messages (responses, events)
//! - Outgoing commands from the API
//! - Request/response correlation by monotonically increasing id
//! - Target bookkeeping from discovery events
//!
//! # Endpoint Discovery
//!
//! Chromium writes `DevToolsActivePort` into the profile directory on
//! startup: the bound port on the first line, the browser-endpoint path
//! on the second. Reading it avoids any HTTP round trip and works on
//! every Chromium since the file was introduced.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};

use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::protocol::{EventHandler, ProtocolEvent};

use super::messages::{CdpCommand, CdpMessage, CdpMessageKind, TargetInfo, extension_id_from_url};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Reachability poll: attempts and fixed interval.
const REACHABILITY_ATTEMPTS: u32 = 50;
const REACHABILITY_INTERVAL: Duration = Duration::from_millis(200);

/// Target re-poll during extension discovery.
const DISCOVERY_ATTEMPTS: u32 = 10;
const DISCOVERY_INTERVAL: Duration = Duration::from_millis(250);

/// File Chromium writes its endpoint into.
const ACTIVE_PORT_FILE: &str = "DevToolsActivePort";

// ============================================================================
// Types
// ============================================================================

/// Map of command ids to response channels.
type CorrelationMap = FxHashMap<u64, oneshot::Sender<Result<Value>>>;

/// Socket type produced by `connect_async` over plain TCP.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Internal commands for the event loop.
enum ClientCommand {
    /// Send a command and wait for its response.
    Send {
        command: CdpCommand,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(u64),
    /// Shutdown the connection.
    Shutdown,
}

/// Extension identity enriched from protocol or manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionInfo {
    /// Runtime extension id.
    pub extension_id: String,
    /// Extension name from the manifest.
    pub name: String,
    /// Extension version from the manifest.
    pub version: String,
}

/// Shared target bookkeeping.
#[derive(Default)]
struct TargetBook {
    /// Known targets by target id.
    targets: FxHashMap<String, TargetInfo>,
    /// Session ids for auto-attached targets.
    sessions: FxHashMap<String, String>,
}

// ============================================================================
// Discovery Strategy Order
// ============================================================================

/// How the extension's runtime id may be discovered, in the order the
/// strategies are tried. The order is load-bearing: different browser
/// versions expose the loaded-extension target at different times
/// relative to process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiscoveryStrategy {
    /// A target we already saw carries a `chrome-extension://` URL.
    KnownTargets,
    /// Ask the browser to load the unpacked directory itself.
    LoadUnpacked,
    /// Re-poll the target list with short backoff.
    PollTargets,
}

const DISCOVERY_ORDER: [DiscoveryStrategy; 3] = [
    DiscoveryStrategy::KnownTargets,
    DiscoveryStrategy::LoadUnpacked,
    DiscoveryStrategy::PollTargets,
];

// ============================================================================
// CdpClient
// ============================================================================

/// DevTools protocol client bound to one browser process.
///
/// Cheap to clone; all clones share the connection.
#[derive(Clone)]
pub struct CdpClient {
    /// Channel into the event loop.
    command_tx: mpsc::UnboundedSender<ClientCommand>,

    /// Pending commands by id (shared with the event loop).
    pending: Arc<Mutex<CorrelationMap>>,

    /// Next command id.
    next_id: Arc<AtomicU64>,

    /// Target bookkeeping (shared with the event loop).
    book: Arc<Mutex<TargetBook>>,

    /// Event handler (shared with the event loop).
    event_handler: Arc<Mutex<Option<EventHandler>>>,

    /// Session-scoped caches and notices.
    context: SessionContext,

    /// Unpacked extension directory this session develops.
    extension_dir: PathBuf,
}

// ============================================================================
// CdpClient - Connection
// ============================================================================

impl CdpClient {
    /// Connects to a launched browser's debugging endpoint.
    ///
    /// Polls the port with a fixed interval and bounded attempt count,
    /// resolves the WebSocket path from the profile's
    /// `DevToolsActivePort`, then enables target discovery and
    /// auto-attach.
    ///
    /// # Errors
    ///
    /// - [`Error::DebuggingNotEnabled`] when the poll bound is exhausted
    /// - [`Error::WebSocket`] when the upgrade fails
    pub async fn connect(
        port: u16,
        profile_path: &Path,
        extension_dir: impl Into<PathBuf>,
        context: SessionContext,
    ) -> Result<Self> {
        wait_for_port(port, REACHABILITY_ATTEMPTS, REACHABILITY_INTERVAL).await?;

        let endpoint = wait_for_endpoint(port, profile_path).await?;
        debug!(endpoint = %endpoint, "Connecting to DevTools endpoint");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&endpoint).await?;

        let client = Self::from_stream(ws_stream, extension_dir.into(), context);
        client.enable_target_discovery().await?;
        Ok(client)
    }

    /// Wraps an established socket; spawns the event loop.
    fn from_stream(ws_stream: WsStream, extension_dir: PathBuf, context: SessionContext) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(CorrelationMap::default()));
        let book = Arc::new(Mutex::new(TargetBook::default()));
        let event_handler: Arc<Mutex<Option<EventHandler>>> = Arc::new(Mutex::new(None));

        tokio::spawn(run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&pending),
            Arc::clone(&book),
            Arc::clone(&event_handler),
        ));

        Self {
            command_tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            book,
            event_handler,
            context,
            extension_dir,
        }
    }

    /// Turns on target discovery and flat auto-attach.
    async fn enable_target_discovery(&self) -> Result<()> {
        self.send("Target.setDiscoverTargets", json!({"discover": true}), None)
            .await?;
        self.send(
            "Target.setAutoAttach",
            json!({
                "autoAttach": true,
                "waitForDebuggerOnStart": false,
                "flatten": true,
            }),
            None,
        )
        .await?;
        Ok(())
    }

    /// Shuts down the connection.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ClientCommand::Shutdown);
    }
}

// ============================================================================
// CdpClient - Commands
// ============================================================================

impl CdpClient {
    /// Sends a command and awaits its result.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] when the event loop is gone
    /// - [`Error::RequestTimeout`] after the command timeout
    /// - [`Error::CommandUnsupported`] when the browser lacks the method
    /// - [`Error::Protocol`] for any other protocol error
    pub async fn send(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let command = CdpCommand {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(str::to_string),
        };

        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ClientCommand::Send {
                command,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(DEFAULT_COMMAND_TIMEOUT, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self.command_tx.send(ClientCommand::RemoveCorrelation(id));
                Err(Error::request_timeout(
                    id,
                    DEFAULT_COMMAND_TIMEOUT.as_millis() as u64,
                ))
            }
        }
    }

    /// Sets the callback invoked for every protocol event.
    pub fn set_event_handler(&self, handler: EventHandler) {
        *self.event_handler.lock() = Some(handler);
    }

    /// Returns the number of in-flight commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

// ============================================================================
// CdpClient - Extension Operations
// ============================================================================

impl CdpClient {
    /// Discovers the extension's runtime id, loading it if necessary.
    ///
    /// Tries the discovery strategies in their fixed order and returns
    /// the first id any of them yields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtensionNotDiscovered`] when every strategy
    /// comes up empty.
    pub async fn ensure_loaded(&self) -> Result<String> {
        for strategy in DISCOVERY_ORDER {
            if let Some(id) = self.run_discovery(strategy).await? {
                debug!(extension_id = %id, ?strategy, "Extension discovered");
                return Ok(id);
            }
        }

        Err(Error::extension_not_discovered(format!(
            "No extension target appeared for {}",
            self.extension_dir.display()
        )))
    }

    /// Runs one discovery strategy.
    async fn run_discovery(&self, strategy: DiscoveryStrategy) -> Result<Option<String>> {
        match strategy {
            DiscoveryStrategy::KnownTargets => Ok(self.id_from_known_targets()),

            DiscoveryStrategy::LoadUnpacked => {
                let params = json!({"path": self.extension_dir.display().to_string()});
                match self.send("Extensions.loadUnpacked", params, None).await {
                    Ok(result) => Ok(result
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string)),
                    Err(e) if e.is_unsupported() => {
                        // Older browser; the next strategy takes over.
                        debug!("Extensions.loadUnpacked unsupported, falling through");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }

            DiscoveryStrategy::PollTargets => {
                for _ in 0..DISCOVERY_ATTEMPTS {
                    self.refresh_targets().await?;
                    if let Some(id) = self.id_from_known_targets() {
                        return Ok(Some(id));
                    }
                    sleep(DISCOVERY_INTERVAL).await;
                }
                Ok(None)
            }
        }
    }

    /// Scans bookkeeping for an extension background target.
    fn id_from_known_targets(&self) -> Option<String> {
        let book = self.book.lock();
        book.targets
            .values()
            .filter(|t| t.is_extension_background())
            .find_map(|t| extension_id_from_url(&t.url).map(str::to_string))
    }

    /// Replaces bookkeeping with a fresh `Target.getTargets` snapshot.
    async fn refresh_targets(&self) -> Result<()> {
        let result = self.send("Target.getTargets", json!({}), None).await?;
        let infos: Vec<TargetInfo> = result
            .get("targetInfos")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let mut book = self.book.lock();
        for info in infos {
            book.targets.insert(info.target_id.clone(), info);
        }
        Ok(())
    }

    /// Returns the extension's identity, never failing on an optional
    /// protocol domain.
    ///
    /// Prefers the dedicated extension-info command; a browser without
    /// that domain falls back to the manifest on disk.
    ///
    /// # Errors
    ///
    /// Returns an error only when the fallback manifest itself cannot
    /// be read.
    pub async fn extension_info(&self, extension_id: &str) -> Result<ExtensionInfo> {
        match self
            .send(
                "Extensions.getExtensionInfo",
                json!({"id": extension_id}),
                None,
            )
            .await
        {
            Ok(result) => Ok(ExtensionInfo {
                extension_id: extension_id.to_string(),
                name: result
                    .pointer("/extensionInfo/name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                version: result
                    .pointer("/extensionInfo/version")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            Err(e) => {
                debug!(error = %e, "Extension info command failed, reading manifest");
                manifest_info(&self.extension_dir, extension_id)
            }
        }
    }

    /// Forces a full extension reload. Best-effort.
    ///
    /// Failure must not abort an otherwise-successful build, so this
    /// returns a success flag instead of an error.
    pub async fn hard_reload(&self, extension_id: &str) -> bool {
        match self.try_hard_reload(extension_id).await {
            Ok(()) => true,
            Err(e) => {
                debug!(extension_id, error = %e, "Hard reload failed");
                false
            }
        }
    }

    async fn try_hard_reload(&self, extension_id: &str) -> Result<()> {
        let session_id = self.background_session(extension_id).await?;
        self.send(
            "Runtime.evaluate",
            json!({"expression": "chrome.runtime.reload()"}),
            Some(&session_id),
        )
        .await?;
        Ok(())
    }

    /// Reloads the extension page shown in a tab. Best-effort.
    pub async fn reload_tab(&self, target_id: &str) -> bool {
        let session_id = {
            let book = self.book.lock();
            book.sessions.get(target_id).cloned()
        };

        let session_id = match session_id {
            Some(id) => id,
            None => match self.attach(target_id).await {
                Ok(id) => id,
                Err(e) => {
                    debug!(target_id, error = %e, "Attach for tab reload failed");
                    return false;
                }
            },
        };

        match self
            .send("Page.reload", json!({}), Some(&session_id))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(target_id, error = %e, "Tab reload failed");
                false
            }
        }
    }

    /// Returns the current target snapshot.
    #[must_use]
    pub fn known_targets(&self) -> Vec<TargetInfo> {
        self.book.lock().targets.values().cloned().collect()
    }

    /// Session id for the extension's background target, attaching if
    /// auto-attach has not delivered one yet.
    async fn background_session(&self, extension_id: &str) -> Result<String> {
        let target = {
            let book = self.book.lock();
            book.targets
                .values()
                .find(|t| {
                    t.is_extension_background()
                        && extension_id_from_url(&t.url) == Some(extension_id)
                })
                .cloned()
        };

        let target = match target {
            Some(target) => target,
            None => {
                self.refresh_targets().await?;
                let book = self.book.lock();
                book.targets
                    .values()
                    .find(|t| {
                        t.is_extension_background()
                            && extension_id_from_url(&t.url) == Some(extension_id)
                    })
                    .cloned()
                    .ok_or_else(|| {
                        Error::extension_not_discovered(format!(
                            "No background target for {extension_id}"
                        ))
                    })?
            }
        };

        if let Some(session) = self.book.lock().sessions.get(&target.target_id) {
            return Ok(session.clone());
        }

        self.attach(&target.target_id).await
    }

    /// Attaches to a target, recording and returning the session id.
    async fn attach(&self, target_id: &str) -> Result<String> {
        let result = self
            .send(
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
                None,
            )
            .await?;

        let session_id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("attachToTarget returned no sessionId"))?
            .to_string();

        self.book
            .lock()
            .sessions
            .insert(target_id.to_string(), session_id.clone());
        Ok(session_id)
    }

    /// Enables console/runtime event forwarding on the extension's
    /// background session, once per session context.
    pub async fn enable_runtime_events(&self, extension_id: &str) -> Result<()> {
        if !self.context.mark_notice(format!("runtime-events:{extension_id}")) {
            return Ok(());
        }

        let session_id = self.background_session(extension_id).await?;
        self.send("Runtime.enable", json!({}), Some(&session_id))
            .await?;
        Ok(())
    }
}

// ============================================================================
// Event Loop
// ============================================================================

async fn run_event_loop(
    ws_stream: WsStream,
    mut command_rx: mpsc::UnboundedReceiver<ClientCommand>,
    pending: Arc<Mutex<CorrelationMap>>,
    book: Arc<Mutex<TargetBook>>,
    event_handler: Arc<Mutex<Option<EventHandler>>>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        handle_incoming(&text, &pending, &book, &event_handler);
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("DevTools socket closed by browser");
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "DevTools socket error");
                        break;
                    }

                    None => {
                        debug!("DevTools stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(ClientCommand::Send { command, response_tx }) => {
                        let id = command.id;

                        let text = match serde_json::to_string(&command) {
                            Ok(text) => text,
                            Err(e) => {
                                let _ = response_tx.send(Err(Error::Json(e)));
                                continue;
                            }
                        };

                        pending.lock().insert(id, response_tx);

                        if let Err(e) = ws_write.send(Message::Text(text.into())).await
                            && let Some(tx) = pending.lock().remove(&id)
                        {
                            let _ = tx.send(Err(Error::connection(e.to_string())));
                        }

                        trace!(id, "Command sent");
                    }

                    Some(ClientCommand::RemoveCorrelation(id)) => {
                        pending.lock().remove(&id);
                        debug!(id, "Removed timed-out correlation");
                    }

                    Some(ClientCommand::Shutdown) => {
                        debug!("Shutdown command received");
                        let _ = ws_write.close().await;
                        break;
                    }

                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                }
            }
        }
    }

    fail_pending(&pending);
    debug!("DevTools event loop terminated");
}

/// Routes one incoming text message.
fn handle_incoming(
    text: &str,
    pending: &Arc<Mutex<CorrelationMap>>,
    book: &Arc<Mutex<TargetBook>>,
    event_handler: &Arc<Mutex<Option<EventHandler>>>,
) {
    let message: CdpMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Unparseable DevTools message");
            return;
        }
    };

    match message.kind() {
        CdpMessageKind::Response(id) => {
            let tx = pending.lock().remove(&id);
            let Some(tx) = tx else {
                warn!(id, "Response for unknown command");
                return;
            };

            let result = if let Some(error) = &message.error {
                if message.is_method_not_found() {
                    Err(Error::command_unsupported(error.message.clone()))
                } else {
                    Err(Error::protocol(error.message.clone()))
                }
            } else {
                Ok(message.result.unwrap_or(Value::Null))
            };

            let _ = tx.send(result);
        }

        CdpMessageKind::Event(method) => {
            track_target_event(&method, message.params.as_ref(), book);

            let handler = event_handler.lock();
            if let Some(handler) = handler.as_ref() {
                handler(ProtocolEvent {
                    method,
                    params: message.params.unwrap_or(Value::Null),
                });
            }
        }

        CdpMessageKind::Malformed => {
            warn!(text, "DevTools message with neither id nor method");
        }
    }
}

/// Applies target discovery events to the bookkeeping.
fn track_target_event(method: &str, params: Option<&Value>, book: &Arc<Mutex<TargetBook>>) {
    let Some(params) = params else { return };

    match method {
        "Target.targetCreated" | "Target.targetInfoChanged" => {
            if let Some(info) = params.get("targetInfo")
                && let Ok(info) = serde_json::from_value::<TargetInfo>(info.clone())
            {
                trace!(target_id = %info.target_id, url = %info.url, "Target tracked");
                book.lock().targets.insert(info.target_id.clone(), info);
            }
        }

        "Target.targetDestroyed" => {
            if let Some(target_id) = params.get("targetId").and_then(Value::as_str) {
                let mut book = book.lock();
                book.targets.remove(target_id);
                book.sessions.remove(target_id);
            }
        }

        "Target.attachedToTarget" => {
            if let (Some(session_id), Some(target_id)) = (
                params.get("sessionId").and_then(Value::as_str),
                params.pointer("/targetInfo/targetId").and_then(Value::as_str),
            ) {
                let mut guard = book.lock();
                guard
                    .sessions
                    .insert(target_id.to_string(), session_id.to_string());
                if let Some(info) = params.get("targetInfo")
                    && let Ok(info) = serde_json::from_value::<TargetInfo>(info.clone())
                {
                    guard.targets.insert(info.target_id.clone(), info);
                }
            }
        }

        "Target.detachedFromTarget" => {
            if let Some(target_id) = params.get("targetId").and_then(Value::as_str) {
                book.lock().sessions.remove(target_id);
            }
        }

        _ => {}
    }
}

/// Fails all pending commands with ConnectionClosed.
fn fail_pending(pending: &Arc<Mutex<CorrelationMap>>) {
    let drained: Vec<_> = pending.lock().drain().collect();
    let count = drained.len();

    for (_, tx) in drained {
        let _ = tx.send(Err(Error::ConnectionClosed));
    }

    if count > 0 {
        debug!(count, "Failed pending commands on shutdown");
    }
}

// ============================================================================
// Endpoint Discovery
// ============================================================================

/// Polls until the debug port accepts TCP connections.
async fn wait_for_port(port: u16, attempts: u32, interval: Duration) -> Result<()> {
    for attempt in 1..=attempts {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(_) => {
                debug!(port, attempt, "Debug port reachable");
                return Ok(());
            }
            Err(_) => sleep(interval).await,
        }
    }

    Err(Error::DebuggingNotEnabled { port, attempts })
}

/// Waits for `DevToolsActivePort` and builds the WebSocket URL.
async fn wait_for_endpoint(port: u16, profile_path: &Path) -> Result<String> {
    let file = profile_path.join(ACTIVE_PORT_FILE);

    for _ in 0..REACHABILITY_ATTEMPTS {
        if let Ok(content) = std::fs::read_to_string(&file)
            && let Some((file_port, path)) = parse_active_port(&content)
        {
            // Prefer the port the browser actually bound; it differs
            // from ours when the browser was asked for port 0.
            let port = if file_port > 0 { file_port } else { port };
            return Ok(format!("ws://127.0.0.1:{port}{path}"));
        }
        sleep(REACHABILITY_INTERVAL).await;
    }

    Err(Error::DebuggingNotEnabled {
        port,
        attempts: REACHABILITY_ATTEMPTS,
    })
}

/// Parses the two-line `DevToolsActivePort` format.
fn parse_active_port(content: &str) -> Option<(u16, String)> {
    let mut lines = content.lines();
    let port = lines.next()?.trim().parse().ok()?;
    let path = lines.next()?.trim();
    if !path.starts_with('/') {
        return None;
    }
    Some((port, path.to_string()))
}

// ============================================================================
// Manifest Fallback
// ============================================================================

/// Reads name/version from the extension's own manifest.
fn manifest_info(extension_dir: &Path, extension_id: &str) -> Result<ExtensionInfo> {
    let manifest_path = extension_dir.join("manifest.json");
    let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
        Error::config(format!(
            "Cannot read manifest at {}: {e}",
            manifest_path.display()
        ))
    })?;
    let manifest: Value = serde_json::from_str(&content)?;

    Ok(ExtensionInfo {
        extension_id: extension_id.to_string(),
        name: manifest
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        version: manifest
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_active_port() {
        let content = "9222\n/devtools/browser/0b4f9a42-1111-2222-3333-444455556666\n";
        let (port, path) = parse_active_port(content).expect("parse");
        assert_eq!(port, 9222);
        assert_eq!(path, "/devtools/browser/0b4f9a42-1111-2222-3333-444455556666");
    }

    #[test]
    fn test_parse_active_port_rejects_garbage() {
        assert!(parse_active_port("").is_none());
        assert!(parse_active_port("not-a-port\n/devtools/browser/x").is_none());
        assert!(parse_active_port("9222\nno-leading-slash").is_none());
    }

    #[test]
    fn test_discovery_order_is_fixed() {
        assert_eq!(
            DISCOVERY_ORDER,
            [
                DiscoveryStrategy::KnownTargets,
                DiscoveryStrategy::LoadUnpacked,
                DiscoveryStrategy::PollTargets,
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_for_port_bounded_failure() {
        // Port chosen from the ephemeral range with nothing listening.
        let err = wait_for_port(1, 2, Duration::from_millis(10))
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            Error::DebuggingNotEnabled { port: 1, attempts: 2 }
        ));
    }

    #[tokio::test]
    async fn test_wait_for_port_succeeds_when_listening() {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();

        wait_for_port(port, 3, Duration::from_millis(10))
            .await
            .expect("reachable");
    }

    #[test]
    fn test_manifest_fallback_reads_name_and_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"manifest_version": 3, "name": "My Extension", "version": "1.2.3"}"#,
        )
        .expect("write");

        let info = manifest_info(dir.path(), "abcdefghijklmnopabcdefghijklmnop").expect("info");
        assert_eq!(
            info,
            ExtensionInfo {
                extension_id: "abcdefghijklmnopabcdefghijklmnop".into(),
                name: "My Extension".into(),
                version: "1.2.3".into(),
            }
        );
    }

    #[test]
    fn test_manifest_fallback_missing_file_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(manifest_info(dir.path(), "x").is_err());
    }
}
