//! Browser profile materialization.
//!
//! A profile is an on-disk directory mimicking the browser's own
//! user-data layout: `Default/Preferences` for Chromium,
//! `user.js`-bearing directory for Firefox.
//!
//! # Lifecycles
//!
//! - *Ephemeral* profiles get a fresh directory per launch under the
//!   tool's data directory, named with a human-readable random token,
//!   and are swept in the background once older than the age threshold.
//! - *Persistent* profiles live at a stable path chosen by the
//!   developer and are reused across runs. Their preferences are seeded
//!   exactly once: an existing `Preferences`/`user.js` is never
//!   overwritten, protecting customizations made inside the browser.
//!
//! Directory creation can collide with a concurrently exiting browser
//! still holding the path; those transient failures retry with linear
//! backoff, purging any half-created directory between attempts.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::browser::{Browser, BrowserFamily};
use crate::error::{Error, Result};

use super::preferences::{chromium_preferences, firefox_dev_prefs, firefox_user_js};

// ============================================================================
// Constants
// ============================================================================

/// Directory under the data dir holding ephemeral profiles.
const PROFILES_DIR: &str = "profiles";

/// Ephemeral profiles older than this are swept.
const STALE_PROFILE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Attempts for contended directory creation.
const MAX_CREATE_ATTEMPTS: u32 = 5;

/// Linear backoff unit for contended creation.
const CREATE_RETRY_STEP: Duration = Duration::from_millis(50);

/// Name fragments for human-readable profile tokens.
const TOKEN_ADJECTIVES: [&str; 16] = [
    "amber", "bold", "calm", "dapper", "eager", "foggy", "gentle", "hazel", "ivory", "jolly",
    "keen", "lunar", "mellow", "noble", "opal", "quiet",
];

const TOKEN_NOUNS: [&str; 16] = [
    "badger", "comet", "dune", "ember", "fjord", "grove", "harbor", "iris", "juniper", "kestrel",
    "lagoon", "meadow", "nimbus", "otter", "pine", "quartz",
];

// ============================================================================
// ProfileKind
// ============================================================================

/// Profile lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    /// Fresh directory per launch, swept after the age threshold.
    Ephemeral,
    /// Stable directory reused across runs, seeded once.
    Persistent,
}

// ============================================================================
// Profile
// ============================================================================

/// A materialized browser profile directory.
#[derive(Debug, Clone)]
pub struct Profile {
    /// Profile directory.
    path: PathBuf,

    /// Lifecycle of this profile.
    kind: ProfileKind,

    /// Family whose layout the directory follows.
    family: BrowserFamily,
}

impl Profile {
    /// Materializes a profile at `path`, seeding developer preferences.
    ///
    /// Creates the directory (with bounded retry on contention) and
    /// writes the family's preference file unless one already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] when the directory cannot be created
    /// after the attempt bound or the preference file cannot be written.
    pub async fn materialize(
        path: impl Into<PathBuf>,
        family: BrowserFamily,
        kind: ProfileKind,
    ) -> Result<Self> {
        let path = path.into();

        create_dir_retrying(&path).await?;

        let profile = Self { path, kind, family };
        profile.seed_preferences()?;
        Ok(profile)
    }

    /// Returns the profile directory.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the profile lifecycle.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ProfileKind {
        self.kind
    }

    /// Returns the path of the family's preference file.
    #[must_use]
    pub fn preferences_path(&self) -> PathBuf {
        match self.family {
            BrowserFamily::Chromium => self.path.join("Default").join("Preferences"),
            BrowserFamily::Gecko => self.path.join("user.js"),
        }
    }

    /// Writes the developer-mode preference file if absent.
    ///
    /// An existing file is left untouched in every case; for persistent
    /// profiles it may hold customizations made inside the browser.
    fn seed_preferences(&self) -> Result<()> {
        let pref_path = self.preferences_path();
        if pref_path.exists() {
            debug!(path = %pref_path.display(), "Preferences already present, not overwriting");
            return Ok(());
        }

        if let Some(parent) = pref_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::profile(format!("Failed to create {}: {e}", parent.display())))?;
        }

        let content = match self.family {
            BrowserFamily::Chromium => serde_json::to_string_pretty(&chromium_preferences())?,
            BrowserFamily::Gecko => firefox_user_js(&firefox_dev_prefs()),
        };

        std::fs::write(&pref_path, content)
            .map_err(|e| Error::profile(format!("Failed to write {}: {e}", pref_path.display())))?;

        debug!(path = %pref_path.display(), "Seeded developer preferences");
        Ok(())
    }
}

// ============================================================================
// Ephemeral Paths & Sweeping
// ============================================================================

/// Computes a fresh ephemeral profile path under the data directory.
///
/// The directory is not created here; [`Profile::materialize`] does
/// that at launch time. The name is a readable token like
/// `chrome-mellow-otter-3f2a` so a developer scanning the profiles
/// directory can tell sessions apart.
#[must_use]
pub fn ephemeral_profile_dir(data_dir: &Path, browser: Browser) -> PathBuf {
    let bytes = *Uuid::new_v4().as_bytes();
    let adjective = TOKEN_ADJECTIVES[(bytes[0] & 0x0f) as usize];
    let noun = TOKEN_NOUNS[(bytes[1] & 0x0f) as usize];
    let suffix = u16::from_be_bytes([bytes[2], bytes[3]]);

    data_dir
        .join(PROFILES_DIR)
        .join(format!("{browser}-{adjective}-{noun}-{suffix:04x}"))
}

/// Removes ephemeral profiles older than the age threshold.
///
/// Best-effort: unreadable entries are skipped, not fatal. Returns the
/// number of directories removed.
pub fn sweep_stale_profiles(data_dir: &Path) -> usize {
    let profiles = data_dir.join(PROFILES_DIR);
    let Ok(entries) = std::fs::read_dir(&profiles) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|m| m.elapsed().ok())
            .unwrap_or(Duration::ZERO);

        if age > STALE_PROFILE_AGE {
            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "Swept stale profile");
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to sweep profile");
                }
            }
        }
    }

    removed
}

// ============================================================================
// Private Helpers
// ============================================================================

/// Creates a directory, retrying transient contention.
///
/// `EBUSY`/`EACCES`/`ENOTEMPTY` during creation mean another process
/// (usually a browser mid-exit) still holds the path. Each retry purges
/// whatever half-created state the failed attempt left behind.
async fn create_dir_retrying(path: &Path) -> Result<()> {
    for attempt in 1..=MAX_CREATE_ATTEMPTS {
        match std::fs::create_dir_all(path) {
            Ok(()) => return Ok(()),
            Err(e) if is_contention(&e) && attempt < MAX_CREATE_ATTEMPTS => {
                warn!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "Profile directory contended, retrying"
                );
                let _ = std::fs::remove_dir_all(path);
                tokio::time::sleep(CREATE_RETRY_STEP * attempt).await;
            }
            Err(e) => {
                return Err(Error::profile(format!(
                    "Failed to create profile directory at {}: {e}",
                    path.display()
                )));
            }
        }
    }

    unreachable!("loop returns on success or final error")
}

/// Transient contention error kinds worth retrying.
fn is_contention(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ResourceBusy | ErrorKind::PermissionDenied | ErrorKind::DirectoryNotEmpty
    )
}

// ============================================================================
// Tests
// ============================================================================
