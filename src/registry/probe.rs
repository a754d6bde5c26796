//! Process liveness probes and termination signals.
//!
//! Orphan detection and crash recovery need to ask two questions about a
//! pid the ledger remembers: "does it still exist?" and "make it stop".
//! Both are platform-specific; everything else in the registry is not.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::{debug, warn};

// ============================================================================
// Constants
// ============================================================================

/// Grace period between the polite signal and the forced kill.
pub(crate) const TERMINATION_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// Liveness
// ============================================================================

/// Returns `true` if a process with this pid currently exists.
///
/// Uses the zero-signal probe: no signal is delivered, only existence and
/// permission are checked. `EPERM` means the process exists but belongs
/// to another user, which still counts as alive.
#[cfg(unix)]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    // SAFETY: kill with signal 0 performs no action beyond validity checks.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }

    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Returns `true` if a process with this pid currently exists.
///
/// Windows has no zero-signal probe; `tasklist` filtered by pid is the
/// portable answer without pulling in a win32 binding.
#[cfg(windows)]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&format!("\"{pid}\"")))
        .unwrap_or(false)
}

// ============================================================================
// Termination
// ============================================================================

/// Gracefully terminates a process, escalating to a forced kill.
///
/// Sends the polite signal, waits out the grace period, and kills
/// whatever is still alive. Used for crash recovery of processes this
/// orchestrator did not spawn (and therefore has no child handle for).
pub async fn terminate_process(pid: u32) {
    if !process_alive(pid) {
        return;
    }

    debug!(pid, "Sending graceful termination");
    signal_terminate(pid);

    tokio::time::sleep(TERMINATION_GRACE).await;

    if process_alive(pid) {
        warn!(pid, "Process survived graceful termination, forcing kill");
        signal_kill(pid);
    }
}

#[cfg(unix)]
fn signal_terminate(pid: u32) {
    // SAFETY: standard termination signal to a pid we recorded ourselves.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(unix)]
fn signal_kill(pid: u32) {
    // SAFETY: as above.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

/// On Windows a single-process signal leaves the browser's child
/// processes orphaned; `taskkill /T` takes the whole tree down.
#[cfg(windows)]
fn signal_terminate(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T"])
        .output();
}

#[cfg(windows)]
fn signal_kill(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }

    #[test]
    fn test_pid_zero_is_not_alive() {
        assert!(!process_alive(0));
    }

    #[test]
    fn test_unlikely_pid_is_not_alive() {
        // Linux pid_max defaults well below this; other platforms cap lower.
        assert!(!process_alive(u32::MAX - 1));
    }

    #[tokio::test]
    async fn test_terminate_dead_process_is_noop() {
        terminate_process(u32::MAX - 1).await;
    }
}
