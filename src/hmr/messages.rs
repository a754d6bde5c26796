//! HMR WebSocket message types.
//!
//! This is the tool's own protocol, spoken between the dev server and
//! the extension-side client:
//!
//! | Message | Direction | Shape |
//! |---------|-----------|-------|
//! | server ready | server → client | `{"status": "serverReady"}` |
//! | file changed | server → client | `{"changedFile": "service_worker"}` |
//! | client ready | client → server | `{"status": "clientReady", "data": {id, manifest}}` |
//! | status ping | client → server | `{"status": "extensionReloaded"}` etc. |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reload::ReloadScope;

// ============================================================================
// ServerMessage
// ============================================================================

/// Message pushed from the dev server to connected extension clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Handshake sent on connect.
    Ready {
        /// Always `"serverReady"`.
        status: &'static str,
    },

    /// A source file changed; the value names the reload scope.
    ChangedFile {
        /// Wire label of the changed scope.
        #[serde(rename = "changedFile")]
        changed_file: &'static str,
    },
}

impl ServerMessage {
    /// The connect handshake.
    #[inline]
    #[must_use]
    pub const fn ready() -> Self {
        Self::Ready {
            status: "serverReady",
        }
    }

    /// A change notification for a reload scope.
    #[inline]
    #[must_use]
    pub const fn changed(scope: ReloadScope) -> Self {
        Self::ChangedFile {
            changed_file: scope.wire_label(),
        }
    }
}

// ============================================================================
// ClientMessage
// ============================================================================

/// Message received from an extension client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    /// Client status: `clientReady`, `extensionReloaded`, `tabReloaded`, ...
    pub status: String,

    /// Payload of `clientReady`.
    #[serde(default)]
    pub data: Option<ClientReadyData>,
}

/// Identity the client reports when it comes up.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientReadyData {
    /// Runtime extension id.
    #[serde(default)]
    pub id: Option<String>,

    /// The client's view of its manifest.
    #[serde(default)]
    pub manifest: Option<Value>,
}

impl ClientMessage {
    /// Returns `true` for the initial handshake message.
    #[inline]
    #[must_use]
    pub fn is_client_ready(&self) -> bool {
        self.status == "clientReady"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_ready_shape() {
        let json = serde_json::to_string(&ServerMessage::ready()).expect("serialize");
        assert_eq!(json, r#"{"status":"serverReady"}"#);
    }

    #[test]
    fn test_changed_file_shape() {
        let json =
            serde_json::to_string(&ServerMessage::changed(ReloadScope::Background)).expect("serialize");
        assert_eq!(json, r#"{"changedFile":"service_worker"}"#);
    }

    #[test]
    fn test_client_ready_parse() {
        let message: ClientMessage = serde_json::from_str(
            r#"{"status": "clientReady", "data": {"id": "abcdef", "manifest": {"name": "X"}}}"#,
        )
        .expect("parse");

        assert!(message.is_client_ready());
        let data = message.data.expect("data");
        assert_eq!(data.id.as_deref(), Some("abcdef"));
        assert_eq!(data.manifest.expect("manifest")["name"], "X");
    }

    #[test]
    fn test_status_ping_parse() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"status": "extensionReloaded"}"#).expect("parse");
        assert!(!message.is_client_ready());
        assert_eq!(message.status, "extensionReloaded");
    }
}
