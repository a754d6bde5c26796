//! Multi-instance browser session orchestrator for extension development.
//!
//! This library runs real browsers against unpacked web extensions and
//! keeps them hot: it allocates non-conflicting network resources
//! across concurrent development sessions on one machine, launches and
//! supervises the browser subprocess, speaks the browser's debugging
//! protocol to install the extension and learn its runtime id, and
//! reloads exactly the right thing when a source file changes.
//!
//! # Architecture
//!
//! Each development session is one [`DevSession`]:
//!
//! - The [`registry`] ledger coordinates sessions across OS processes
//!   through one JSON file and an advisory lock
//! - The [`allocator`] picks bind-probed ports and materializes a
//!   profile seeded for extension development
//! - The [`launcher`] resolves the binary, composes flags, and
//!   supervises the process
//! - The [`protocol`] clients speak CDP (Chromium, JSON over
//!   WebSocket) or RDP (Firefox, length-prefixed JSON over TCP)
//! - The [`reload`] dispatcher classifies changed files and issues the
//!   matching reload
//! - The [`hmr`] server pushes change notifications to the extension's
//!   own client script
//!
//! # Quick Start
//!
//! ```no_run
//! use extension_dev::{Browser, DevSession, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = DevSession::builder(Browser::Chrome, "./my-extension")
//!         .extension_dir("./dist")
//!         .launch()
//!         .await?;
//!
//!     // The build pipeline reports changes; the session does the rest.
//!     session.notify_change("./dist/background.js");
//!
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`allocator`] | Port allocation and profile materialization |
//! | [`browser`] | Browser and protocol-family identification |
//! | [`context`] | Session-scoped shared caches |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`hmr`] | HMR WebSocket server (internal protocol) |
//! | [`launcher`] | Binary resolution, flags, process supervision |
//! | [`protocol`] | CDP and RDP debugging clients |
//! | [`registry`] | Cross-process instance ledger |
//! | [`reload`] | Change classification and dispatch |
//! | [`session`] | The top-level session coordinator |

// ============================================================================
// Modules
// ============================================================================

/// Port allocation and profile materialization.
pub mod allocator;

/// Browser and protocol-family identification.
pub mod browser;

/// Session-scoped shared caches.
pub mod context;

/// Error types and result aliases.
pub mod error;

/// HMR WebSocket transport.
pub mod hmr;

/// Binary resolution, flag composition, process supervision.
pub mod launcher;

/// Browser debugging protocol clients.
pub mod protocol;

/// Cross-process instance ledger.
pub mod registry;

/// Change classification and reload dispatch.
pub mod reload;

/// Development session coordinator.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

// Core session types
pub use browser::{Browser, BrowserFamily};
pub use context::SessionContext;
pub use session::{DevSession, SessionBuilder};

// Error types
pub use error::{Error, Result};

// Registry types
pub use registry::{Instance, InstanceStatus, Registry};

// Allocation types
pub use allocator::{PortBases, Profile, ProfileKind};

// Launch types
pub use launcher::{ExitOutcome, LaunchSpec, LaunchedBrowser};

// Protocol types
pub use protocol::{CdpClient, Debugger, ExtensionInfo, ProtocolEvent, RdpClient, UnifiedLogging};

// Reload types
pub use reload::{FileGroups, ReloadDispatcher, ReloadScope};

// HMR types
pub use hmr::{ClientMessage, HmrServer, ServerMessage};
