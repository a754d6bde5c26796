//! Advisory file lock for cross-process registry mutation.
//!
//! Concurrent development sessions are separate OS processes sharing one
//! registry file. Mutual exclusion uses a lock file created with
//! create-exclusive semantics, the only primitive that is atomic on
//! every platform the tool supports. POSIX `flock` is deliberately not
//! relied on.
//!
//! Acquisition retries a bounded number of times with linear backoff and
//! then fails with [`Error::LockContended`]: a lock that cannot be taken
//! after ten attempts signals resource exhaustion, not a slow peer.

// ============================================================================
// Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Maximum acquisition attempts before giving up.
const MAX_LOCK_ATTEMPTS: u32 = 10;

/// Backoff unit; attempt N waits N * this.
const LOCK_RETRY_STEP: Duration = Duration::from_millis(100);

/// A lock file older than this is considered abandoned and is broken.
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

// ============================================================================
// RegistryLock
// ============================================================================

/// Held advisory lock over the registry directory.
///
/// The lock file is deleted on drop. If the process dies without
/// dropping, the next acquirer breaks the lock once it passes the
/// staleness threshold.
#[derive(Debug)]
pub struct RegistryLock {
    /// Path of the lock file we own.
    path: PathBuf,
}

impl RegistryLock {
    /// Acquires the lock, retrying with linear backoff.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockContended`] after [`MAX_LOCK_ATTEMPTS`]
    /// failed attempts.
    pub async fn acquire(lock_path: &Path) -> Result<Self> {
        for attempt in 1..=MAX_LOCK_ATTEMPTS {
            match try_create(lock_path) {
                Ok(()) => {
                    debug!(path = %lock_path.display(), attempt, "Registry lock acquired");
                    return Ok(Self {
                        path: lock_path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if break_if_stale(lock_path) {
                        continue;
                    }
                    debug!(
                        path = %lock_path.display(),
                        attempt,
                        "Registry lock held by another session"
                    );
                    tokio::time::sleep(LOCK_RETRY_STEP * attempt).await;
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Err(Error::LockContended {
            path: lock_path.to_path_buf(),
            attempts: MAX_LOCK_ATTEMPTS,
        })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release registry lock");
        }
    }
}

// ============================================================================
// Private Helpers
// ============================================================================

/// Creates the lock file with create-exclusive semantics.
fn try_create(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    // The pid inside the file is diagnostic only; exclusion comes from
    // create_new.
    let _ = write!(file, "{}", std::process::id());
    Ok(())
}

/// Breaks a lock file past the staleness threshold.
///
/// Returns `true` if the file was removed and the caller should retry
/// immediately.
fn break_if_stale(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        // Holder released between our create attempt and this check.
        return true;
    };

    let age = metadata
        .modified()
        .ok()
        .and_then(|m| m.elapsed().ok())
        .unwrap_or(Duration::ZERO);

    if age > STALE_LOCK_AGE {
        warn!(path = %path.display(), age_secs = age.as_secs(), "Breaking stale registry lock");
        return std::fs::remove_file(path).is_ok();
    }

    false
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock_path = dir.path().join("registry.lock");

        {
            let _lock = RegistryLock::acquire(&lock_path).await.expect("acquire");
            assert!(lock_path.exists());
        }

        // Released on drop
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn test_contended_lock_fails_bounded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock_path = dir.path().join("registry.lock");

        let _held = RegistryLock::acquire(&lock_path).await.expect("acquire");

        let result = RegistryLock::acquire(&lock_path).await;
        let err = result.expect_err("second acquire must fail");
        assert!(err.is_resource_exhaustion());
        assert!(matches!(err, Error::LockContended { attempts: 10, .. }));
    }

    #[tokio::test]
    async fn test_reacquire_after_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock_path = dir.path().join("registry.lock");

        drop(RegistryLock::acquire(&lock_path).await.expect("first"));
        let _second = RegistryLock::acquire(&lock_path).await.expect("second");
    }

    #[tokio::test]
    async fn test_lock_file_contains_pid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock_path = dir.path().join("registry.lock");

        let _lock = RegistryLock::acquire(&lock_path).await.expect("acquire");
        let content = std::fs::read_to_string(&lock_path).expect("read lock");
        assert_eq!(content, std::process::id().to_string());
    }
}
