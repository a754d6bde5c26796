//! Browser process launching and supervision.
//!
//! Resolves an executable, composes its command line from the allocated
//! port and profile, spawns it, and supervises termination.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `binary` | Executable resolution and signed-build rejection |
//! | `flags` | Command-line composition |
//! | `process` | Spawn, supervision, signal handling |

// ============================================================================
// Submodules
// ============================================================================

/// Executable resolution.
pub mod binary;

/// Command-line flag composition.
pub mod flags;

/// Spawn and supervision.
pub mod process;

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;

use crate::browser::{Browser, BrowserFamily};
use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use binary::resolve_binary;
pub use flags::{LaunchSpec, chromium_args, gecko_args};
pub use process::{ExitOutcome, LaunchedBrowser, install_panic_cleanup, install_signal_handlers};

// ============================================================================
// Launch
// ============================================================================

/// Resolves the binary, composes flags, and spawns the browser.
///
/// For Gecko-family browsers the extension is not passed on the command
/// line (the RDP client installs it as a temporary add-on after
/// connect), so `spec.extension_paths` only reaches the command line on
/// the Chromium path.
///
/// # Errors
///
/// Propagates binary resolution and spawn failures; both are fatal and
/// carry remediation text.
pub async fn launch(
    browser: Browser,
    explicit_binary: Option<&Path>,
    data_dir: &Path,
    spec: &LaunchSpec,
    verbose: bool,
) -> Result<LaunchedBrowser> {
    let binary = resolve_binary(browser, explicit_binary, data_dir).await?;

    let args = match browser.family() {
        BrowserFamily::Chromium => chromium_args(spec),
        BrowserFamily::Gecko => {
            let profile = spec
                .profile_path
                .as_deref()
                .unwrap_or_else(|| Path::new("."));
            gecko_args(profile, spec.debug_port.unwrap_or(0), &spec.extra_flags)
        }
    };

    LaunchedBrowser::spawn(browser, &binary, &args, verbose)
}
