//! Port and profile allocation.
//!
//! Given the registry's view of the machine, this module picks an
//! unused control port and WebSocket port and materializes an on-disk
//! browser profile seeded with developer-mode preferences.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `ports` | Bind-probed port allocation with upward scan |
//! | `profile` | Ephemeral/persistent profile directories |
//! | `preferences` | Developer-mode preference seed sets |

// ============================================================================
// Submodules
// ============================================================================

/// Developer-mode preference seed sets.
pub mod preferences;

/// Bind-probed port allocation.
pub mod ports;

/// Profile directory materialization.
pub mod profile;

// ============================================================================
// Re-exports
// ============================================================================

pub use ports::{DEFAULT_CONTROL_BASE, DEFAULT_WEBSOCKET_BASE, PortBases, allocate_port, port_is_free};
pub use preferences::{FirefoxPref, PrefValue};
pub use profile::{Profile, ProfileKind, ephemeral_profile_dir, sweep_stale_profiles};
