//! Browser debugging protocol clients.
//!
//! Two wire protocols cover every supported browser:
//!
//! | Family | Protocol | Transport |
//! |--------|----------|-----------|
//! | Chromium | DevTools protocol | JSON over WebSocket |
//! | Gecko | Remote debugging protocol | length-prefixed JSON over TCP |
//!
//! Both clients implement the [`UnifiedLogging`] capability and are
//! wrapped by [`Debugger`], selected by [`BrowserFamily`] at
//! construction time, so the reload dispatcher never branches on the
//! concrete client type.

// ============================================================================
// Submodules
// ============================================================================

/// DevTools protocol (Chromium family).
pub mod cdp;

/// Remote debugging protocol (Gecko family).
pub mod rdp;

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::browser::BrowserFamily;
use crate::error::Result;

pub use cdp::{CdpClient, ExtensionInfo};
pub use rdp::RdpClient;

// ============================================================================
// ProtocolEvent
// ============================================================================

/// One spontaneous protocol event, normalized across both wires.
#[derive(Debug, Clone)]
pub struct ProtocolEvent {
    /// Event method (CDP) or packet type (RDP).
    pub method: String,

    /// Raw event payload.
    pub params: Value,
}

/// Callback invoked for every protocol event.
pub type EventHandler = Box<dyn Fn(ProtocolEvent) + Send + Sync>;

// ============================================================================
// UnifiedLogging
// ============================================================================

/// Capability shared by both protocol clients: route the browser's
/// console/runtime output through one observable stream.
#[async_trait]
pub trait UnifiedLogging {
    /// Enables forwarding of console/runtime events for an extension.
    ///
    /// Idempotent per session.
    async fn enable_unified_logging(&self, extension_id: &str) -> Result<()>;

    /// Registers the protocol-event callback.
    fn on_protocol_event(&self, handler: EventHandler);
}

#[async_trait]
impl UnifiedLogging for CdpClient {
    async fn enable_unified_logging(&self, extension_id: &str) -> Result<()> {
        self.enable_runtime_events(extension_id).await
    }

    fn on_protocol_event(&self, handler: EventHandler) {
        self.set_event_handler(handler);
    }
}

#[async_trait]
impl UnifiedLogging for RdpClient {
    async fn enable_unified_logging(&self, _extension_id: &str) -> Result<()> {
        // Console packets arrive unsolicited on this wire; there is no
        // per-extension switch to flip.
        Ok(())
    }

    fn on_protocol_event(&self, handler: EventHandler) {
        self.set_event_handler(handler);
    }
}

// ============================================================================
// Debugger
// ============================================================================

/// Family-selected protocol client.
#[derive(Clone)]
pub enum Debugger {
    /// Chromium family over the DevTools protocol.
    Cdp(CdpClient),
    /// Gecko family over the remote debugging protocol.
    Rdp(RdpClient),
}

impl Debugger {
    /// Returns the family this debugger speaks for.
    #[inline]
    #[must_use]
    pub const fn family(&self) -> BrowserFamily {
        match self {
            Self::Cdp(_) => BrowserFamily::Chromium,
            Self::Rdp(_) => BrowserFamily::Gecko,
        }
    }

    /// Full extension reload. Best-effort.
    pub async fn reload_extension(&self, extension_id: &str, extension_dir: &Path) -> bool {
        match self {
            Self::Cdp(client) => client.hard_reload(extension_id).await,
            Self::Rdp(client) => client.reload_addon(extension_id, extension_dir).await,
        }
    }

    /// Targeted page reload. Best-effort.
    pub async fn reload_page(&self, extension_id: &str) -> bool {
        match self {
            Self::Cdp(client) => {
                let target = client.known_targets().into_iter().find(|t| {
                    t.target_type == "page"
                        && cdp::extension_id_from_url(&t.url) == Some(extension_id)
                });
                match target {
                    Some(target) => client.reload_tab(&target.target_id).await,
                    None => {
                        debug!(extension_id, "No extension page target to reload");
                        false
                    }
                }
            }

            Self::Rdp(client) => {
                let tab_actor = match client.list_tabs().await {
                    Ok(tabs) => tabs.first().and_then(|tab| {
                        tab.get("actor")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    }),
                    Err(e) => {
                        debug!(error = %e, "Tab listing failed for page reload");
                        None
                    }
                };

                match tab_actor {
                    Some(actor) => client
                        .request(&actor, serde_json::json!({"type": "reload"}))
                        .await
                        .is_ok(),
                    None => false,
                }
            }
        }
    }

    /// Registers the protocol-event callback on the underlying client.
    pub fn on_protocol_event(&self, handler: EventHandler) {
        match self {
            Self::Cdp(client) => client.set_event_handler(handler),
            Self::Rdp(client) => client.set_event_handler(handler),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_handler_is_object_safe() {
        fn assert_boxable(_: EventHandler) {}
        assert_boxable(Box::new(|_event| {}));
    }
}
