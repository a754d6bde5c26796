//! Remote debugging protocol client for Firefox-family browsers.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `framing` | Length-prefixed JSON wire codec |
//! | `client` | Actor-serialized connection and add-on operations |

// ============================================================================
// Submodules
// ============================================================================

/// Actor-serialized connection.
pub mod client;

/// Length-prefixed JSON framing.
pub mod framing;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::RdpClient;
pub use framing::{FrameDecoder, build_frame};
