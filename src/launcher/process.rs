//! Browser process spawning and supervision.
//!
//! One launched browser is one [`LaunchedBrowser`]: the child handle,
//! its pid, and the termination machinery. Termination is always
//! graceful-then-forced: the polite signal first, a bounded grace
//! period, then a hard kill of whatever survived. On Windows the
//! graceful path goes through `taskkill /T` because a single signal
//! leaves the browser's subprocess tree running.
//!
//! Signal handling follows the same path: the first SIGINT/SIGTERM/
//! SIGHUP delivery terminates the child and only then lets this
//! process exit. Panics are routed through a synchronous best-effort
//! cleanup hook before unwinding continues.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::Browser;
use crate::error::{Error, Result};
use crate::registry::probe;

// ============================================================================
// Constants
// ============================================================================

/// Grace period before a forced kill, shared with the registry's crash
/// recovery path.
const TERMINATION_GRACE: Duration = probe::TERMINATION_GRACE;

/// Chromium exits with this code when another instance already owns the
/// profile directory. Benign: the developer's browser is simply still
/// open.
const CHROMIUM_PROFILE_IN_USE: i32 = 21;

// ============================================================================
// ExitOutcome
// ============================================================================

/// How a supervised browser process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Clean exit (code 0).
    Clean,
    /// Another instance already holds the profile; not an error.
    ProfileInUse,
    /// Killed by a signal, including our own forced kill.
    Signaled,
    /// Any other non-zero exit code.
    Failed(i32),
}

impl ExitOutcome {
    /// Returns `true` for outcomes that are not failures.
    #[inline]
    #[must_use]
    pub const fn is_benign(self) -> bool {
        matches!(self, Self::Clean | Self::ProfileInUse | Self::Signaled)
    }
}

// ============================================================================
// LaunchedBrowser
// ============================================================================

/// A running, supervised browser process.
///
/// Cheap to clone; clones share the child handle.
#[derive(Clone, Debug)]
pub struct LaunchedBrowser {
    inner: Arc<LaunchedInner>,
}

#[derive(Debug)]
struct LaunchedInner {
    /// Browser kind, for logging.
    browser: Browser,

    /// Pid captured at spawn.
    pid: u32,

    /// Child handle; taken by whichever path reaps it first.
    child: Mutex<Option<Child>>,
}

impl LaunchedBrowser {
    /// Spawns the browser.
    ///
    /// `verbose` inherits the browser's stdio into this process;
    /// otherwise all three streams are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProcessLaunchFailed`] when the spawn itself
    /// fails (missing binary, permissions, exec format).
    pub fn spawn(
        browser: Browser,
        binary: &Path,
        args: &[String],
        verbose: bool,
    ) -> Result<Self> {
        let mut cmd = Command::new(binary);
        cmd.args(args);

        if verbose {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }

        let child = cmd.spawn().map_err(Error::process_launch_failed)?;
        let pid = child.id().unwrap_or(0);

        info!(browser = %browser, pid, "Browser process spawned");

        Ok(Self {
            inner: Arc::new(LaunchedInner {
                browser,
                pid,
                child: Mutex::new(Some(child)),
            }),
        })
    }

    /// Returns the browser pid.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Waits for the process to exit on its own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the wait itself fails.
    pub async fn wait(&self) -> Result<ExitOutcome> {
        let child = self.inner.child.lock().take();
        let Some(mut child) = child else {
            // Already reaped by terminate().
            return Ok(ExitOutcome::Signaled);
        };

        let status = child.wait().await?;
        let outcome = classify_exit(status.code());

        match outcome {
            ExitOutcome::ProfileInUse => {
                info!(
                    browser = %self.inner.browser,
                    "Browser exited: profile already in use by a running instance"
                );
            }
            ExitOutcome::Failed(code) => {
                warn!(browser = %self.inner.browser, code, "Browser exited with failure");
            }
            _ => debug!(browser = %self.inner.browser, ?outcome, "Browser exited"),
        }

        Ok(outcome)
    }

    /// Terminates the process: graceful signal, grace period, hard kill.
    pub async fn terminate(&self) {
        let child = self.inner.child.lock().take();
        let Some(mut child) = child else {
            return;
        };

        debug!(pid = self.inner.pid, "Requesting graceful browser shutdown");
        graceful_signal(self.inner.pid);

        match tokio::time::timeout(TERMINATION_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid = self.inner.pid, ?status, "Browser exited gracefully");
            }
            Ok(Err(e)) => {
                warn!(pid = self.inner.pid, error = %e, "Wait failed during shutdown");
            }
            Err(_) => {
                warn!(pid = self.inner.pid, "Grace period expired, forcing kill");
                if let Err(e) = child.kill().await {
                    warn!(pid = self.inner.pid, error = %e, "Forced kill failed");
                }
                let _ = child.wait().await;
            }
        }
    }
}

impl Drop for LaunchedInner {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.lock().take()
            && let Err(e) = child.start_kill()
        {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal in Drop");
        }
    }
}

// ============================================================================
// Signal Handling
// ============================================================================

/// Installs process-signal handlers tied to a launched browser.
///
/// The first SIGINT/SIGTERM/SIGHUP terminates the child (graceful, then
/// forced after the grace period) and exits this process with the
/// conventional code for the signal received.
pub fn install_signal_handlers(launched: LaunchedBrowser) -> JoinHandle<()> {
    tokio::spawn(async move {
        let exit_code = wait_for_shutdown_signal().await;
        info!("Shutdown signal received, terminating browser");
        launched.terminate().await;
        std::process::exit(exit_code);
    })
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> i32 {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return 130;
        }
    };
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGHUP handler");
            let _ = tokio::signal::ctrl_c().await;
            return 130;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => 130,
        _ = sigterm.recv() => 143,
        _ = sighup.recv() => 129,
    }
}

#[cfg(windows)]
async fn wait_for_shutdown_signal() -> i32 {
    let _ = tokio::signal::ctrl_c().await;
    130
}

/// Registers a panic hook that signals the child before unwinding.
///
/// Panic hooks cannot await, so this is the synchronous polite signal
/// only; the orphan sweep reaps anything that ignores it.
pub fn install_panic_cleanup(pid: u32) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        graceful_signal(pid);
        previous(info);
    }));
}

// ============================================================================
// Private Helpers
// ============================================================================

#[cfg(unix)]
fn graceful_signal(pid: u32) {
    if pid == 0 {
        return;
    }
    // SAFETY: standard termination signal to our own child.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(windows)]
fn graceful_signal(pid: u32) {
    if pid == 0 {
        return;
    }
    // Tree-kill: a plain signal leaves renderer processes behind.
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T"])
        .output();
}

/// Maps an exit code to an outcome.
fn classify_exit(code: Option<i32>) -> ExitOutcome {
    match code {
        Some(0) => ExitOutcome::Clean,
        Some(CHROMIUM_PROFILE_IN_USE) => ExitOutcome::ProfileInUse,
        Some(code) => ExitOutcome::Failed(code),
        None => ExitOutcome::Signaled,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_exit_codes() {
        assert_eq!(classify_exit(Some(0)), ExitOutcome::Clean);
        assert_eq!(classify_exit(Some(21)), ExitOutcome::ProfileInUse);
        assert_eq!(classify_exit(Some(1)), ExitOutcome::Failed(1));
        assert_eq!(classify_exit(None), ExitOutcome::Signaled);
    }

    #[test]
    fn test_benign_outcomes() {
        assert!(ExitOutcome::Clean.is_benign());
        assert!(ExitOutcome::ProfileInUse.is_benign());
        assert!(ExitOutcome::Signaled.is_benign());
        assert!(!ExitOutcome::Failed(1).is_benign());
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_launch_failure() {
        let err = LaunchedBrowser::spawn(
            Browser::Chrome,
            Path::new("/definitely/not/a/browser"),
            &[],
            false,
        )
        .expect_err("must fail");
        assert!(matches!(err, Error::ProcessLaunchFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_and_wait_clean_exit() {
        let launched =
            LaunchedBrowser::spawn(Browser::Chromium, Path::new("/bin/true"), &[], false)
                .expect("spawn");
        assert!(launched.pid() > 0);

        let outcome = launched.wait().await.expect("wait");
        assert_eq!(outcome, ExitOutcome::Clean);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_long_running_process() {
        let launched = LaunchedBrowser::spawn(
            Browser::Chromium,
            Path::new("/bin/sleep"),
            &["600".to_string()],
            false,
        )
        .expect("spawn");

        let pid = launched.pid();
        launched.terminate().await;
        assert!(!probe::process_alive(pid));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_after_terminate_reports_signaled() {
        let launched = LaunchedBrowser::spawn(
            Browser::Chromium,
            Path::new("/bin/sleep"),
            &["600".to_string()],
            false,
        )
        .expect("spawn");

        launched.terminate().await;
        let outcome = launched.wait().await.expect("wait");
        assert_eq!(outcome, ExitOutcome::Signaled);
    }
}
