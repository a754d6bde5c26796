//! DevTools protocol client for Chromium-family browsers.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `messages` | Wire message types and extension-id derivation |
//! | `client` | Connection, correlation, extension operations |

// ============================================================================
// Submodules
// ============================================================================

/// Connection and extension operations.
pub mod client;

/// Wire message types.
pub mod messages;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{CdpClient, ExtensionInfo};
pub use messages::{CdpCommand, CdpMessage, TargetInfo, extension_id_from_url};
