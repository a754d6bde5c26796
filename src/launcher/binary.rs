//! Browser binary resolution.
//!
//! Resolution order:
//!
//! 1. An explicit user-supplied path, validated to exist; an invalid
//!    explicit path is fatal, never silently ignored.
//! 2. A previously-downloaded binary under the tool's data directory.
//! 3. OS-specific auto-detection over the usual install locations.
//!
//! Auto-detected Chrome binaries are additionally version-probed:
//! the vendor's officially-signed build refuses `--load-extension`, so
//! only "for Testing" builds (and non-Chrome Chromium forks) pass.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::browser::Browser;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Directory under the data dir where downloaded binaries live.
const BINARIES_DIR: &str = "binaries";

// ============================================================================
// Resolution
// ============================================================================

/// Resolves the executable for a browser.
///
/// # Errors
///
/// - [`Error::Config`] when an explicit path does not exist
/// - [`Error::BinaryNotFound`] when no candidate resolves
/// - [`Error::SignedBuildRejected`] when the only Chrome found is the
///   officially-signed build
pub async fn resolve_binary(
    browser: Browser,
    explicit: Option<&Path>,
    data_dir: &Path,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::config(format!(
                "Browser binary not found at the path you provided: {}\n\
                 Check the path or remove it to use auto-detection.",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Using explicit browser binary");
        return Ok(path.to_path_buf());
    }

    if browser.requires_explicit_binary() {
        return Err(Error::config(format!(
            "Browser \"{browser}\" requires an explicit binary path."
        )));
    }

    if let Some(cached) = cached_binary(browser, data_dir) {
        debug!(path = %cached.display(), "Using downloaded browser binary");
        return Ok(cached);
    }

    let detected = detect_binary(browser).ok_or_else(|| {
        Error::binary_not_found(browser.name(), default_install_hint(browser))
    })?;
    debug!(path = %detected.display(), "Auto-detected browser binary");

    if browser == Browser::Chrome {
        reject_signed_build(&detected).await?;
    }

    Ok(detected)
}

// ============================================================================
// Cache Lookup
// ============================================================================

/// Checks the tool's download cache for a usable binary.
fn cached_binary(browser: Browser, data_dir: &Path) -> Option<PathBuf> {
    let dir = data_dir.join(BINARIES_DIR).join(browser.name());
    for name in executable_names(browser) {
        let candidate = dir.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Executable file names a cached download may use.
fn executable_names(browser: Browser) -> &'static [&'static str] {
    match browser {
        Browser::Chrome => &["chrome", "chrome.exe", "Google Chrome for Testing"],
        Browser::Chromium => &["chromium", "chrome", "chrome.exe"],
        Browser::Edge => &["msedge", "msedge.exe"],
        Browser::Firefox => &["firefox", "firefox.exe", "firefox-bin"],
        Browser::ChromiumBased | Browser::GeckoBased => &[],
    }
}

// ============================================================================
// OS Detection
// ============================================================================

/// Probes the usual install locations for this OS.
fn detect_binary(browser: Browser) -> Option<PathBuf> {
    detection_candidates(browser)
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

#[cfg(target_os = "macos")]
fn detection_candidates(browser: Browser) -> Vec<&'static str> {
    match browser {
        Browser::Chrome => vec![
            "/Applications/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ],
        Browser::Chromium => vec!["/Applications/Chromium.app/Contents/MacOS/Chromium"],
        Browser::Edge => vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"],
        Browser::Firefox => vec![
            "/Applications/Firefox.app/Contents/MacOS/firefox",
            "/Applications/Firefox Developer Edition.app/Contents/MacOS/firefox",
        ],
        Browser::ChromiumBased | Browser::GeckoBased => vec![],
    }
}

#[cfg(target_os = "windows")]
fn detection_candidates(browser: Browser) -> Vec<&'static str> {
    match browser {
        Browser::Chrome => vec![
            "C:\\Program Files\\Google\\Chrome for Testing\\chrome.exe",
            "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
            "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
        ],
        Browser::Chromium => vec!["C:\\Program Files\\Chromium\\Application\\chrome.exe"],
        Browser::Edge => vec![
            "C:\\Program Files (x86)\\Microsoft\\Edge\\Application\\msedge.exe",
            "C:\\Program Files\\Microsoft\\Edge\\Application\\msedge.exe",
        ],
        Browser::Firefox => vec![
            "C:\\Program Files\\Mozilla Firefox\\firefox.exe",
            "C:\\Program Files (x86)\\Mozilla Firefox\\firefox.exe",
        ],
        Browser::ChromiumBased | Browser::GeckoBased => vec![],
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn detection_candidates(browser: Browser) -> Vec<&'static str> {
    match browser {
        Browser::Chrome => vec![
            "/usr/bin/google-chrome-for-testing",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/opt/google/chrome/chrome",
        ],
        Browser::Chromium => vec![
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ],
        Browser::Edge => vec!["/usr/bin/microsoft-edge", "/usr/bin/microsoft-edge-stable"],
        Browser::Firefox => vec![
            "/usr/bin/firefox",
            "/usr/lib/firefox/firefox",
            "/snap/bin/firefox",
        ],
        Browser::ChromiumBased | Browser::GeckoBased => vec![],
    }
}

/// The path shown in the not-found error for this OS.
fn default_install_hint(browser: Browser) -> PathBuf {
    detection_candidates(browser)
        .first()
        .map_or_else(|| PathBuf::from("<no default>"), PathBuf::from)
}

// ============================================================================
// Signed-Build Probe
// ============================================================================

/// Rejects the officially-signed Chrome build.
///
/// Runs `<binary> --version` and inspects the output: signed builds
/// report "Google Chrome N.N" with no "for Testing" marker. A probe
/// that fails to run at all is treated as passing: some CI images
/// ship binaries that cannot execute `--version` headlessly, and a
/// false rejection is worse than a late launch failure.
async fn reject_signed_build(path: &Path) -> Result<()> {
    let output = match Command::new(path).arg("--version").output().await {
        Ok(output) => output,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Version probe failed, skipping check");
            return Ok(());
        }
    };

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!(path = %path.display(), version = %version, "Probed browser version");

    if is_signed_chrome_version(&version) {
        return Err(Error::SignedBuildRejected {
            path: path.to_path_buf(),
            version,
        });
    }

    Ok(())
}

/// Returns `true` for the vendor's signed Chrome version string.
fn is_signed_chrome_version(version: &str) -> bool {
    version.starts_with("Google Chrome") && !version.contains("for Testing")
}

// ============================================================================
// Tests
// ============================================================================
