//! Instance records persisted in the registry ledger.
//!
//! One [`Instance`] describes one running development session: the
//! browser process, its allocated ports, its profile, and its lifecycle
//! status. Records serialize in camelCase to match the on-disk ledger
//! format.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::browser::Browser;

// ============================================================================
// Constants
// ============================================================================

/// Instance ids are 16 hex characters.
const INSTANCE_ID_LEN: usize = 16;

/// Synthetic extension ids are 32 characters from the alphabet `a`-`p`,
/// the same shape Chromium derives from a key hash.
const EXTENSION_ID_LEN: usize = 32;

// ============================================================================
// InstanceStatus
// ============================================================================

/// Lifecycle status of an instance.
///
/// Instances are never resurrected: once `terminated` or `error`, a new
/// session always creates a fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// The browser process is (believed to be) alive.
    Running,
    /// Shut down explicitly or reaped by the health monitor.
    Terminated,
    /// The session failed; kept for diagnosis until cleanup.
    Error,
}

// ============================================================================
// Instance
// ============================================================================

/// One running development session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Random 16-hex-char identifier.
    pub instance_id: String,

    /// OS pid of the browser process; set after spawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,

    /// Debug-protocol port (CDP or RDP).
    pub control_port: u16,

    /// HMR transport WebSocket port.
    pub web_socket_port: u16,

    /// Browser this session runs against.
    pub browser: Browser,

    /// Runtime extension id; populated once the protocol client connects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_id: Option<String>,

    /// Pre-generated synthetic id for the companion manager extension.
    pub manager_extension_id: String,

    /// Browser profile directory in use.
    pub profile_path: PathBuf,

    /// Project the session belongs to.
    pub project_path: PathBuf,

    /// Unix millis at creation.
    pub start_time: u64,

    /// Lifecycle status.
    pub status: InstanceStatus,
}

// ============================================================================
// Instance - Construction
// ============================================================================

impl Instance {
    /// Creates a fresh `running` record with generated ids.
    ///
    /// Ports and profile path are filled in by the allocator; the pid is
    /// attached after spawn.
    #[must_use]
    pub fn new(
        browser: Browser,
        project_path: PathBuf,
        control_port: u16,
        web_socket_port: u16,
        profile_path: PathBuf,
    ) -> Self {
        Self {
            instance_id: generate_instance_id(),
            process_id: None,
            control_port,
            web_socket_port,
            browser,
            extension_id: None,
            manager_extension_id: generate_extension_id(),
            profile_path,
            project_path,
            start_time: now_millis(),
            status: InstanceStatus::Running,
        }
    }

    /// Returns the age of this record in milliseconds.
    #[inline]
    #[must_use]
    pub fn age_ms(&self) -> u64 {
        now_millis().saturating_sub(self.start_time)
    }

    /// Returns `true` if the record is in the `running` state.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }
}

// ============================================================================
// Id Generation
// ============================================================================

/// Generates a random 16-hex-char instance id.
#[must_use]
pub fn generate_instance_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..INSTANCE_ID_LEN].to_string()
}

/// Generates a 32-char synthetic extension id over the alphabet `a`-`p`.
///
/// Chromium extension ids use this alphabet; generating the manager id in
/// the same shape lets it be referenced before the browser assigns one.
#[must_use]
pub fn generate_extension_id() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .bytes()
        .take(EXTENSION_ID_LEN)
        .map(|b| {
            let nibble = match b {
                b'0'..=b'9' => b - b'0',
                b'a'..=b'f' => b - b'a' + 10,
                _ => 0,
            };
            (b'a' + nibble) as char
        })
        .collect()
}

/// Current unix time in milliseconds.
#[must_use]
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_instance() -> Instance {
        Instance::new(
            Browser::Chrome,
            PathBuf::from("/work/my-extension"),
            8080,
            9000,
            PathBuf::from("/data/profiles/brave-otter"),
        )
    }

    #[test]
    fn test_instance_id_shape() {
        let id = generate_instance_id();
        assert_eq!(id.len(), 16);
        assert!(id.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_extension_id_shape() {
        let id = generate_extension_id();
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|b| (b'a'..=b'p').contains(&b)));
    }

    #[test]
    fn test_ids_are_random() {
        assert_ne!(generate_instance_id(), generate_instance_id());
        assert_ne!(generate_extension_id(), generate_extension_id());
    }

    #[test]
    fn test_new_instance_is_running() {
        let instance = sample_instance();
        assert!(instance.is_running());
        assert!(instance.process_id.is_none());
        assert!(instance.extension_id.is_none());
        assert!(instance.start_time > 0);
    }

    #[test]
    fn test_serde_camel_case() {
        let instance = sample_instance();
        let json = serde_json::to_string(&instance).expect("serialize");

        assert!(json.contains("\"instanceId\""));
        assert!(json.contains("\"controlPort\""));
        assert!(json.contains("\"webSocketPort\""));
        assert!(json.contains("\"managerExtensionId\""));
        assert!(json.contains("\"status\":\"running\""));
        // Unset options are omitted entirely
        assert!(!json.contains("processId"));
        assert!(!json.contains("\"extensionId\""));
    }

    #[test]
    fn test_round_trip() {
        let mut instance = sample_instance();
        instance.process_id = Some(4242);
        instance.extension_id = Some("abcdefghijklmnopabcdefghijklmnop".into());
        instance.status = InstanceStatus::Terminated;

        let json = serde_json::to_string(&instance).expect("serialize");
        let back: Instance = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back.instance_id, instance.instance_id);
        assert_eq!(back.process_id, Some(4242));
        assert_eq!(back.status, InstanceStatus::Terminated);
    }
}
