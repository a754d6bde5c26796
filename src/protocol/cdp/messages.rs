//! DevTools protocol message types.
//!
//! Commands, responses, and events are flat JSON objects over the
//! WebSocket:
//!
//! | Shape | Direction | Example |
//! |-------|-----------|---------|
//! | `{id, method, params, sessionId?}` | client → browser | `Target.getTargets` |
//! | `{id, result}` / `{id, error}` | browser → client | command response |
//! | `{method, params, sessionId?}` | browser → client | `Target.targetCreated` |
//!
//! The `sessionId` field scopes a command to an attached target; it is
//! absent on browser-level commands.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// CdpCommand
// ============================================================================

/// An outbound command.
#[derive(Debug, Clone, Serialize)]
pub struct CdpCommand {
    /// Monotonically increasing correlation id.
    pub id: u64,

    /// Domain-qualified method, e.g. `Target.getTargets`.
    pub method: String,

    /// Method parameters; `{}` when the method takes none.
    pub params: Value,

    /// Target session scope, when attached.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

// ============================================================================
// CdpMessage
// ============================================================================

/// Any inbound message: a command response or an event.
///
/// Responses carry `id`; events carry `method`. One deserialization
/// covers both, and [`kind`](Self::kind) splits them.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpMessage {
    /// Present on responses.
    #[serde(default)]
    pub id: Option<u64>,

    /// Present on events.
    #[serde(default)]
    pub method: Option<String>,

    /// Success payload of a response.
    #[serde(default)]
    pub result: Option<Value>,

    /// Error payload of a response.
    #[serde(default)]
    pub error: Option<CdpError>,

    /// Event parameters.
    #[serde(default)]
    pub params: Option<Value>,

    /// Session the message belongs to, for auto-attached targets.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// Error payload inside a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpError {
    /// Numeric protocol error code.
    #[serde(default)]
    pub code: i64,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

/// Classified inbound message.
#[derive(Debug)]
pub enum CdpMessageKind {
    /// Response to the command with this id.
    Response(u64),
    /// Spontaneous event.
    Event(String),
    /// Neither id nor method; a protocol violation.
    Malformed,
}

impl CdpMessage {
    /// Splits the message into response/event.
    #[must_use]
    pub fn kind(&self) -> CdpMessageKind {
        match (self.id, &self.method) {
            (Some(id), _) => CdpMessageKind::Response(id),
            (None, Some(method)) => CdpMessageKind::Event(method.clone()),
            (None, None) => CdpMessageKind::Malformed,
        }
    }

    /// Returns `true` when an error code signals an unknown method.
    ///
    /// Older browsers answer `-32601` ("method not found") for domains
    /// they predate; callers treat that as a feature probe, not a
    /// failure.
    #[must_use]
    pub fn is_method_not_found(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.code == -32601)
    }
}

// ============================================================================
// TargetInfo
// ============================================================================

/// One entry from target discovery.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Stable target id.
    pub target_id: String,

    /// Target type: `page`, `service_worker`, `background_page`, ...
    #[serde(rename = "type")]
    pub target_type: String,

    /// Current URL.
    #[serde(default)]
    pub url: String,

    /// Title, when the target has one.
    #[serde(default)]
    pub title: String,

    /// Whether a debugger is attached.
    #[serde(default)]
    pub attached: bool,
}

impl TargetInfo {
    /// Returns `true` for extension background targets.
    #[must_use]
    pub fn is_extension_background(&self) -> bool {
        matches!(
            self.target_type.as_str(),
            "service_worker" | "background_page"
        ) && self.url.starts_with("chrome-extension://")
    }
}

// ============================================================================
// Extension Id Derivation
// ============================================================================

/// Extracts the runtime extension id from a `chrome-extension://` URL.
///
/// No protocol command returns the id directly; it is the host
/// component of any URL served by the extension.
#[must_use]
pub fn extension_id_from_url(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("chrome-extension://")?;
    let id = rest.split('/').next().unwrap_or(rest);
    (id.len() == 32 && id.bytes().all(|b| b.is_ascii_alphabetic())).then_some(id)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_command_serialization() {
        let command = CdpCommand {
            id: 7,
            method: "Target.getTargets".into(),
            params: json!({}),
            session_id: None,
        };

        let value = serde_json::to_value(&command).expect("serialize");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "Target.getTargets");
        assert!(value.get("sessionId").is_none());
    }

    #[test]
    fn test_command_with_session() {
        let command = CdpCommand {
            id: 8,
            method: "Runtime.enable".into(),
            params: json!({}),
            session_id: Some("SESSION1".into()),
        };

        let value = serde_json::to_value(&command).expect("serialize");
        assert_eq!(value["sessionId"], "SESSION1");
    }

    #[test]
    fn test_response_kind() {
        let message: CdpMessage =
            serde_json::from_str(r#"{"id": 3, "result": {"targetInfos": []}}"#).expect("parse");
        assert!(matches!(message.kind(), CdpMessageKind::Response(3)));
    }

    #[test]
    fn test_event_kind() {
        let message: CdpMessage = serde_json::from_str(
            r#"{"method": "Target.targetCreated", "params": {"targetInfo": {}}}"#,
        )
        .expect("parse");
        match message.kind() {
            CdpMessageKind::Event(method) => assert_eq!(method, "Target.targetCreated"),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_kind() {
        let message: CdpMessage = serde_json::from_str(r#"{"result": {}}"#).expect("parse");
        assert!(matches!(message.kind(), CdpMessageKind::Malformed));
    }

    #[test]
    fn test_method_not_found() {
        let message: CdpMessage = serde_json::from_str(
            r#"{"id": 4, "error": {"code": -32601, "message": "'Extensions.loadUnpacked' wasn't found"}}"#,
        )
        .expect("parse");
        assert!(message.is_method_not_found());
    }

    #[test]
    fn test_target_info_extension_background() {
        let worker: TargetInfo = serde_json::from_value(json!({
            "targetId": "T1",
            "type": "service_worker",
            "url": "chrome-extension://abcdefghijklmnopabcdefghijklmnop/background.js"
        }))
        .expect("parse");
        assert!(worker.is_extension_background());

        let page: TargetInfo = serde_json::from_value(json!({
            "targetId": "T2",
            "type": "page",
            "url": "https://example.com"
        }))
        .expect("parse");
        assert!(!page.is_extension_background());
    }

    #[test]
    fn test_extension_id_from_url() {
        assert_eq!(
            extension_id_from_url(
                "chrome-extension://abcdefghijklmnopabcdefghijklmnop/sw.js"
            ),
            Some("abcdefghijklmnopabcdefghijklmnop")
        );
        assert_eq!(
            extension_id_from_url("chrome-extension://abcdefghijklmnopabcdefghijklmnop"),
            Some("abcdefghijklmnopabcdefghijklmnop")
        );
        assert_eq!(extension_id_from_url("https://example.com"), None);
        assert_eq!(extension_id_from_url("chrome-extension://short/x"), None);
    }
}
