//! Remote debugging protocol client for Firefox-family browsers.
//!
//! The protocol is actor-addressed: every request names a `to` actor,
//! every reply and event names a `from` actor, and each actor answers
//! exactly one request at a time. A second request to a busy actor is
//! queued here, never written to the wire, until the first reply
//! arrives; sending it early desynchronizes the whole connection,
//! because replies carry no other correlation key.
//!
//! # Connection Flow
//!
//! 1. TCP connect with bounded retry (the debugger server starts a
//!    moment after the process)
//! 2. The browser greets from the `root` actor
//! 3. `getRoot` yields the add-ons actor (retried; it may not exist
//!    immediately)
//! 4. `installTemporaryAddon` loads the unpacked extension
//! 5. Reload requests go to the add-on's own actor, capability-probed

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, trace, warn};

use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::protocol::{EventHandler, ProtocolEvent};

use super::framing::{FrameDecoder, build_frame};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for one request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP connect poll: attempts and fixed interval.
const CONNECT_ATTEMPTS: u32 = 50;
const CONNECT_INTERVAL: Duration = Duration::from_millis(200);

/// Add-ons actor discovery retry: the actor may lag process start.
const ADDONS_ATTEMPTS: u32 = 10;
const ADDONS_INTERVAL: Duration = Duration::from_millis(500);

/// Welcome-tab readiness poll for the manager extension.
const WELCOME_ATTEMPTS: u32 = 20;
const WELCOME_INTERVAL: Duration = Duration::from_millis(500);

/// Read buffer size for the TCP stream.
const READ_BUFFER: usize = 16 * 1024;

/// Packet types an actor emits without being asked.
///
/// Anything else arriving from an actor with an in-flight request is
/// that request's reply.
const UNSOLICITED_TYPES: [&str; 6] = [
    "tabListChanged",
    "addonListChanged",
    "networkEventUpdate",
    "consoleAPICall",
    "pageError",
    "frameUpdate",
];

// ============================================================================
// Types
// ============================================================================

/// Caller channel for one request.
type ReplySender = oneshot::Sender<Result<Value>>;

/// Per-actor serialization state, owned by the event loop.
#[derive(Default)]
struct ActorQueues {
    /// The caller waiting on each actor's in-flight request.
    in_flight: FxHashMap<String, ReplySender>,

    /// Requests parked until their actor frees up.
    parked: FxHashMap<String, VecDeque<(Value, ReplySender)>>,
}

/// Internal commands for the event loop.
enum RdpCommand {
    /// Send (or park) a request.
    Request {
        to: String,
        payload: Value,
        response_tx: ReplySender,
    },
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// RdpClient
// ============================================================================

/// Remote debugging client bound to one Firefox process.
///
/// Cheap to clone; all clones share the connection.
#[derive(Clone)]
pub struct RdpClient {
    /// Channel into the event loop.
    command_tx: mpsc::UnboundedSender<RdpCommand>,

    /// Event handler (shared with the event loop).
    event_handler: Arc<Mutex<Option<EventHandler>>>,

    /// Session-scoped caches (root/add-ons actors, capabilities).
    context: SessionContext,
}

// ============================================================================
// RdpClient - Connection
// ============================================================================

impl RdpClient {
    /// Connects to the browser's debugger server.
    ///
    /// Polls with a fixed interval and bounded attempt count; the
    /// server starts listening shortly after the process does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DebuggingNotEnabled`] when the poll bound is
    /// exhausted.
    pub async fn connect(port: u16, context: SessionContext) -> Result<Self> {
        let stream = connect_with_retry(port).await?;
        debug!(port, "Debugger server connected");

        let (read_half, write_half) = stream.into_split();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let event_handler: Arc<Mutex<Option<EventHandler>>> = Arc::new(Mutex::new(None));

        tokio::spawn(run_event_loop(
            read_half,
            write_half,
            command_rx,
            Arc::clone(&event_handler),
        ));

        Ok(Self {
            command_tx,
            event_handler,
            context,
        })
    }

    /// Sets the callback invoked for every unsolicited packet.
    pub fn set_event_handler(&self, handler: EventHandler) {
        *self.event_handler.lock() = Some(handler);
    }

    /// Shuts down the connection.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(RdpCommand::Shutdown);
    }
}

// ============================================================================
// RdpClient - Requests
// ============================================================================

impl RdpClient {
    /// Sends a request to an actor and awaits its reply.
    ///
    /// Requests to a busy actor are queued, preserving the one-request-
    /// per-actor invariant.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] when the event loop is gone
    /// - [`Error::RequestTimeout`] after the request timeout
    /// - [`Error::CommandUnsupported`] when the actor rejects the type
    /// - [`Error::Protocol`] for other remote errors
    pub async fn request(&self, to: &str, payload: Value) -> Result<Value> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(RdpCommand::Request {
                to: to.to_string(),
                payload,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(DEFAULT_REQUEST_TIMEOUT, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::timeout(
                format!("request to {to}"),
                DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            )),
        }
    }

    /// Resolves the add-ons actor, bootstrapping through `getRoot`.
    ///
    /// The actor may not exist immediately after connect; discovery
    /// retries with a fixed delay before escalating.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActorUnavailable`] past the retry bound.
    pub async fn addons_actor(&self) -> Result<String> {
        if let Some(actor) = self.context.actor("addons") {
            return Ok(actor);
        }

        for attempt in 1..=ADDONS_ATTEMPTS {
            let root = self.request("root", json!({"type": "getRoot"})).await?;
            if let Some(actor) = root.get("addonsActor").and_then(Value::as_str) {
                debug!(actor, attempt, "Add-ons actor discovered");
                self.context.cache_actor("addons", actor);
                return Ok(actor.to_string());
            }
            sleep(ADDONS_INTERVAL).await;
        }

        Err(Error::actor_unavailable("addons"))
    }

    /// Lists open tabs from the root actor.
    pub async fn list_tabs(&self) -> Result<Vec<Value>> {
        let reply = self.request("root", json!({"type": "listTabs"})).await?;
        Ok(reply
            .get("tabs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Lists installed add-ons from the root actor.
    pub async fn list_addons(&self) -> Result<Vec<Value>> {
        let reply = self.request("root", json!({"type": "listAddons"})).await?;
        Ok(reply
            .get("addons")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// RdpClient - Extension Operations
// ============================================================================

impl RdpClient {
    /// Installs an unpacked extension as a temporary add-on.
    ///
    /// Returns the runtime add-on id. For the companion manager
    /// extension (`wait_for_welcome`), additionally waits for its
    /// welcome tab to appear, the only readiness signal it has.
    ///
    /// # Errors
    ///
    /// Propagates install rejections and the welcome-tab timeout.
    pub async fn install_temporary_addon(
        &self,
        path: &Path,
        wait_for_welcome: bool,
    ) -> Result<String> {
        let addons = self.addons_actor().await?;
        let reply = self
            .request(
                &addons,
                json!({
                    "type": "installTemporaryAddon",
                    "addonPath": path.display().to_string(),
                }),
            )
            .await?;

        let addon_id = reply
            .pointer("/addon/id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("installTemporaryAddon returned no addon id"))?
            .to_string();

        debug!(addon_id = %addon_id, path = %path.display(), "Temporary add-on installed");

        if wait_for_welcome {
            self.wait_for_welcome_tab().await?;
        }

        Ok(addon_id)
    }

    /// Reloads a temporary add-on, reinstalling when the browser lacks
    /// the native reload request.
    ///
    /// The actor's supported request types are probed once and cached;
    /// the reinstall fallback is silent because it must stay invisible
    /// to the developer. Best-effort: returns a success flag.
    pub async fn reload_addon(&self, addon_id: &str, path: &Path) -> bool {
        match self.try_reload_addon(addon_id, path).await {
            Ok(()) => true,
            Err(e) => {
                debug!(addon_id, error = %e, "Add-on reload failed");
                false
            }
        }
    }

    async fn try_reload_addon(&self, addon_id: &str, path: &Path) -> Result<()> {
        let actor = self.addon_actor(addon_id).await?;

        if self.actor_supports(&actor, "reload").await? {
            self.request(&actor, json!({"type": "reload"})).await?;
            return Ok(());
        }

        trace!(addon_id, "Native reload unsupported, reinstalling");
        self.install_temporary_addon(path, false).await?;
        Ok(())
    }

    /// Finds the descriptor actor for an installed add-on.
    async fn addon_actor(&self, addon_id: &str) -> Result<String> {
        let addons = self.list_addons().await?;
        addons
            .iter()
            .find(|a| a.get("id").and_then(Value::as_str) == Some(addon_id))
            .and_then(|a| a.get("actor").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| Error::actor_unavailable(format!("addon {addon_id}")))
    }

    /// Probes (once) whether an actor supports a request type.
    async fn actor_supports(&self, actor: &str, request_type: &str) -> Result<bool> {
        if let Some(known) = self.context.supports(actor, request_type) {
            return Ok(known);
        }

        let reply = match self.request(actor, json!({"type": "requestTypes"})).await {
            Ok(reply) => reply,
            Err(e) if e.is_unsupported() => {
                // No probe support at all; assume nothing.
                self.context.cache_capabilities(actor, Vec::new());
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let types: Vec<String> = reply
            .get("requestTypes")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let supported = types.iter().any(|t| t == request_type);
        self.context.cache_capabilities(actor, types);
        Ok(supported)
    }

    /// Polls for the manager extension's welcome tab.
    async fn wait_for_welcome_tab(&self) -> Result<()> {
        for _ in 0..WELCOME_ATTEMPTS {
            let tabs = self.list_tabs().await?;
            let found = tabs.iter().any(|tab| {
                tab.get("title")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.to_lowercase().contains("welcome"))
                    || tab
                        .get("url")
                        .and_then(Value::as_str)
                        .is_some_and(|u| u.contains("welcome"))
            });

            if found {
                debug!("Manager welcome tab present");
                return Ok(());
            }
            sleep(WELCOME_INTERVAL).await;
        }

        Err(Error::timeout(
            "waiting for manager welcome tab",
            (WELCOME_ATTEMPTS as u64) * WELCOME_INTERVAL.as_millis() as u64,
        ))
    }
}

// ============================================================================
// RdpClient - Evaluation Helpers
// ============================================================================

/// Evaluation command names in preference order. Firefox renamed the
/// console evaluation request across versions; try the newer form first.
const EVALUATE_TYPES: [&str; 2] = ["evaluateJSAsync", "evaluateJS"];

impl RdpClient {
    /// Evaluates JavaScript against a console actor.
    ///
    /// Walks the known evaluation request names, skipping ones the
    /// actor rejects as unknown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandUnsupported`] when every name is
    /// rejected, or the remote's error for genuine failures.
    pub async fn evaluate_js(&self, console_actor: &str, text: &str) -> Result<Value> {
        for request_type in EVALUATE_TYPES {
            match self
                .request(console_actor, json!({"type": request_type, "text": text}))
                .await
            {
                Ok(reply) => {
                    return Ok(reply.get("result").cloned().unwrap_or(reply));
                }
                Err(e) if e.is_unsupported() => {
                    trace!(request_type, "Evaluation type unsupported, trying next");
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::command_unsupported("evaluateJS"))
    }

    /// Extracts the page HTML including any open shadow DOM subtree.
    ///
    /// Serializes the host document and the first open shadow root
    /// separately, then merges: in the page when one more evaluation
    /// succeeds, locally otherwise.
    pub async fn page_html(&self, console_actor: &str) -> Result<String> {
        let outer = self
            .evaluate_js(console_actor, "document.documentElement.outerHTML")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();

        let shadow_script = "(() => { \
             const host = [...document.querySelectorAll('*')].find(el => el.shadowRoot); \
             if (!host) return ''; \
             return host.outerHTML.split('>')[0] + '>' + '\\u0000' + host.shadowRoot.innerHTML; \
         })()";
        let shadow_reply = self
            .evaluate_js(console_actor, shadow_script)
            .await
            .unwrap_or(Value::Null);
        let shadow = shadow_reply.as_str().unwrap_or_default();

        if shadow.is_empty() {
            return Ok(outer);
        }

        let Some((host_open, shadow_html)) = shadow.split_once('\u{0}') else {
            return Ok(outer);
        };

        // Preferred: merge inside the page, where the DOM is authoritative.
        let merge_script = "(() => { \
             const host = [...document.querySelectorAll('*')].find(el => el.shadowRoot); \
             if (!host) return document.documentElement.outerHTML; \
             const clone = host.cloneNode(true); \
             clone.innerHTML = host.shadowRoot.innerHTML + clone.innerHTML; \
             return document.documentElement.outerHTML.replace(host.outerHTML, clone.outerHTML); \
         })()";
        if let Ok(merged) = self.evaluate_js(console_actor, merge_script).await
            && let Some(merged) = merged.as_str()
            && !merged.is_empty()
        {
            return Ok(merged.to_string());
        }

        Ok(merge_shadow_locally(&outer, host_open, shadow_html))
    }
}

/// Local fallback merge: splice the shadow content in right after the
/// host element's opening tag.
fn merge_shadow_locally(outer: &str, host_open: &str, shadow_html: &str) -> String {
    match outer.find(host_open) {
        Some(index) => {
            let insert_at = index + host_open.len();
            let mut merged = String::with_capacity(outer.len() + shadow_html.len());
            merged.push_str(&outer[..insert_at]);
            merged.push_str(shadow_html);
            merged.push_str(&outer[insert_at..]);
            merged
        }
        None => outer.to_string(),
    }
}

// ============================================================================
// Connection Helpers
// ============================================================================

/// TCP connect with fixed-interval bounded retry.
async fn connect_with_retry(port: u16) -> Result<TcpStream> {
    for attempt in 1..=CONNECT_ATTEMPTS {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => {
                trace!(port, attempt, "TCP connected");
                return Ok(stream);
            }
            Err(_) => sleep(CONNECT_INTERVAL).await,
        }
    }

    Err(Error::DebuggingNotEnabled {
        port,
        attempts: CONNECT_ATTEMPTS,
    })
}

// ============================================================================
// Event Loop
// ============================================================================

async fn run_event_loop(
    mut read_half: OwnedReadHalf,
    mut write_half: OwnedWriteHalf,
    mut command_rx: mpsc::UnboundedReceiver<RdpCommand>,
    event_handler: Arc<Mutex<Option<EventHandler>>>,
) {
    let mut decoder = FrameDecoder::new();
    let mut queues = ActorQueues::default();
    let mut read_buf = vec![0u8; READ_BUFFER];

    loop {
        tokio::select! {
            read = read_half.read(&mut read_buf) => {
                match read {
                    Ok(0) => {
                        debug!("Debugger stream ended");
                        break;
                    }
                    Ok(n) => {
                        decoder.push(&read_buf[..n]);
                        if drain_frames(&mut decoder, &mut queues, &event_handler, &mut write_half)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Debugger stream read error");
                        break;
                    }
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(RdpCommand::Request { to, payload, response_tx }) => {
                        dispatch_request(&mut queues, &mut write_half, to, payload, response_tx)
                            .await;
                    }

                    Some(RdpCommand::Shutdown) => {
                        debug!("Shutdown command received");
                        let _ = write_half.shutdown().await;
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

    fail_all(&mut queues);
    debug!("Debugger event loop terminated");
}

/// Decodes and routes every complete frame in the buffer.
async fn drain_frames(
    decoder: &mut FrameDecoder,
    queues: &mut ActorQueues,
    event_handler: &Arc<Mutex<Option<EventHandler>>>,
    write_half: &mut OwnedWriteHalf,
) -> Result<()> {
    loop {
        let frame = match decoder.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(e) => {
                // A framing fault means the stream is desynchronized;
                // nothing after this point can be trusted.
                error!(error = %e, "Frame desynchronization, dropping connection");
                return Err(e);
            }
        };

        route_frame(frame, queues, event_handler);
        flush_parked(queues, write_half).await;
    }
}

/// Routes one frame to its awaiting caller or the event handler.
fn route_frame(
    frame: Value,
    queues: &mut ActorQueues,
    event_handler: &Arc<Mutex<Option<EventHandler>>>,
) {
    let Some(from) = frame.get("from").and_then(Value::as_str).map(str::to_string) else {
        warn!(?frame, "Packet without a from actor");
        return;
    };

    let packet_type = frame
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    // The connection greeting carries applicationType and can arrive
    // after our first request is already in flight; it is never a reply.
    let is_greeting = frame.get("applicationType").is_some();

    let is_reply = !is_greeting
        && queues.in_flight.contains_key(&from)
        && !UNSOLICITED_TYPES.contains(&packet_type.as_str());

    if is_reply {
        if let Some(tx) = queues.in_flight.remove(&from) {
            let _ = tx.send(reply_to_result(frame));
        }
        return;
    }

    trace!(from = %from, packet_type = %packet_type, "Unsolicited packet");
    let handler = event_handler.lock();
    if let Some(handler) = handler.as_ref() {
        handler(ProtocolEvent {
            method: packet_type,
            params: frame,
        });
    }
}

/// Converts a reply packet into the caller's result.
fn reply_to_result(frame: Value) -> Result<Value> {
    let Some(error) = frame.get("error").and_then(Value::as_str) else {
        return Ok(frame);
    };

    let message = frame
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(error)
        .to_string();

    match error {
        "unrecognizedPacketType" | "noSuchActor" | "unknownType" => {
            Err(Error::command_unsupported(message))
        }
        _ => Err(Error::protocol(message)),
    }
}

/// Sends a request if its actor is idle, parks it otherwise.
async fn dispatch_request(
    queues: &mut ActorQueues,
    write_half: &mut OwnedWriteHalf,
    to: String,
    payload: Value,
    response_tx: ReplySender,
) {
    if queues.in_flight.contains_key(&to) {
        trace!(actor = %to, "Actor busy, parking request");
        queues
            .parked
            .entry(to)
            .or_default()
            .push_back((payload, response_tx));
        return;
    }

    write_request(queues, write_half, to, payload, response_tx).await;
}

/// After a reply frees an actor, sends its next parked request.
async fn flush_parked(queues: &mut ActorQueues, write_half: &mut OwnedWriteHalf) {
    let ready: Vec<String> = queues
        .parked
        .keys()
        .filter(|actor| !queues.in_flight.contains_key(*actor))
        .cloned()
        .collect();

    for actor in ready {
        let next = queues.parked.get_mut(&actor).and_then(VecDeque::pop_front);
        if let Some((payload, response_tx)) = next {
            write_request(queues, write_half, actor.clone(), payload, response_tx).await;
        }
        if queues.parked.get(&actor).is_some_and(VecDeque::is_empty) {
            queues.parked.remove(&actor);
        }
    }
}

/// Writes one request frame, registering the in-flight entry first.
async fn write_request(
    queues: &mut ActorQueues,
    write_half: &mut OwnedWriteHalf,
    to: String,
    mut payload: Value,
    response_tx: ReplySender,
) {
    if let Some(object) = payload.as_object_mut() {
        object.insert("to".to_string(), Value::String(to.clone()));
    }

    let frame = match build_frame(&payload) {
        Ok(frame) => frame,
        Err(e) => {
            let _ = response_tx.send(Err(e));
            return;
        }
    };

    queues.in_flight.insert(to.clone(), response_tx);

    if let Err(e) = write_half.write_all(&frame).await
        && let Some(tx) = queues.in_flight.remove(&to)
    {
        let _ = tx.send(Err(Error::connection(e.to_string())));
    }

    trace!(actor = %to, "Request written");
}

/// Fails everything pending and parked with ConnectionClosed.
fn fail_all(queues: &mut ActorQueues) {
    for (_, tx) in queues.in_flight.drain() {
        let _ = tx.send(Err(Error::ConnectionClosed));
    }
    for (_, parked) in queues.parked.drain() {
        for (_, tx) in parked {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    /// Minimal scripted debugger server: greets, then answers each
    /// decoded request with the next canned reply.
    async fn scripted_server(replies: Vec<Value>) -> u16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");

            let greeting = json!({"from": "root", "applicationType": "browser"});
            stream
                .write_all(&build_frame(&greeting).expect("frame"))
                .await
                .expect("greet");

            let mut decoder = FrameDecoder::new();
            let mut buf = vec![0u8; 4096];
            let mut replies = replies.into_iter();

            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                decoder.push(&buf[..n]);

                while let Ok(Some(_request)) = decoder.next_frame() {
                    let Some(reply) = replies.next() else { return };
                    stream
                        .write_all(&build_frame(&reply).expect("frame"))
                        .await
                        .expect("reply");
                }
            }
        });

        port
    }

    #[tokio::test]
    async fn test_connect_refused_is_bounded() {
        // Nothing listens on port 1; the retry bound must trip, not hang.
        let result = tokio::time::timeout(
            Duration::from_secs(30),
            connect_with_retry(1),
        )
        .await
        .expect("bounded");
        assert!(matches!(result, Err(Error::DebuggingNotEnabled { .. })));
    }

    #[tokio::test]
    async fn test_request_reply_round_trip() {
        let port = scripted_server(vec![
            json!({"from": "root", "tabs": [{"title": "Home"}]}),
        ])
        .await;

        let client = RdpClient::connect(port, SessionContext::new())
            .await
            .expect("connect");
        let tabs = client.list_tabs().await.expect("tabs");
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0]["title"], "Home");
        client.shutdown();
    }

    #[tokio::test]
    async fn test_addons_actor_cached_in_context() {
        let port = scripted_server(vec![
            json!({"from": "root", "addonsActor": "server1.conn0.addonsActor7"}),
        ])
        .await;

        let context = SessionContext::new();
        let client = RdpClient::connect(port, context.clone())
            .await
            .expect("connect");

        let actor = client.addons_actor().await.expect("actor");
        assert_eq!(actor, "server1.conn0.addonsActor7");
        assert_eq!(context.actor("addons").as_deref(), Some(actor.as_str()));

        // Second call answers from the cache; no reply is scripted for it.
        let again = client.addons_actor().await.expect("cached");
        assert_eq!(again, actor);
        client.shutdown();
    }

    #[tokio::test]
    async fn test_error_reply_maps_to_unsupported() {
        let port = scripted_server(vec![
            json!({"from": "root", "error": "unrecognizedPacketType", "message": "no listFoo"}),
        ])
        .await;

        let client = RdpClient::connect(port, SessionContext::new())
            .await
            .expect("connect");
        let err = client
            .request("root", json!({"type": "listFoo"}))
            .await
            .expect_err("must fail");
        assert!(err.is_unsupported());
        client.shutdown();
    }

    #[tokio::test]
    async fn test_concurrent_requests_to_one_actor_serialize() {
        let port = scripted_server(vec![
            json!({"from": "root", "seq": 1}),
            json!({"from": "root", "seq": 2}),
        ])
        .await;

        let client = RdpClient::connect(port, SessionContext::new())
            .await
            .expect("connect");

        let first = client.request("root", json!({"type": "a"}));
        let second = client.request("root", json!({"type": "b"}));
        let (first, second) = tokio::join!(first, second);

        // Replies arrive in request order: the second request was
        // parked until the first reply freed the actor.
        assert_eq!(first.expect("first")["seq"], 1);
        assert_eq!(second.expect("second")["seq"], 2);
        client.shutdown();
    }

    #[test]
    fn test_merge_shadow_locally() {
        let outer = "<html><body><x-app id=\"a\"></x-app></body></html>";
        let merged = merge_shadow_locally(outer, "<x-app id=\"a\">", "<p>shadow</p>");
        assert_eq!(
            merged,
            "<html><body><x-app id=\"a\"><p>shadow</p></x-app></body></html>"
        );
    }

    #[test]
    fn test_merge_shadow_locally_host_missing() {
        let outer = "<html><body></body></html>";
        let merged = merge_shadow_locally(outer, "<x-app>", "<p>shadow</p>");
        assert_eq!(merged, outer);
    }

    #[test]
    fn test_reply_error_mapping() {
        let unsupported = reply_to_result(json!({
            "from": "actor1", "error": "noSuchActor", "message": "gone"
        }));
        assert!(unsupported.expect_err("err").is_unsupported());

        let protocol = reply_to_result(json!({
            "from": "actor1", "error": "badParameter", "message": "bad"
        }));
        assert!(matches!(
            protocol.expect_err("err"),
            Error::Protocol { .. }
        ));

        let ok = reply_to_result(json!({"from": "actor1", "value": 3}));
        assert_eq!(ok.expect("ok")["value"], 3);
    }
}
