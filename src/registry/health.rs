//! Background health monitoring for registered instances.
//!
//! Each created instance gets a recurring check that reaps it from the
//! ledger once its browser process is demonstrably gone. The check is
//! conjunctive and conservative: the recorded pid must not be this
//! process, must not be alive, and neither of the instance's ports may
//! be in use. Anything less keeps the entry.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::allocator::ports::port_is_free;

use super::probe::process_alive;
use super::store::Registry;

// ============================================================================
// Constants
// ============================================================================

/// Interval between health checks.
const CHECK_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// Monitor
// ============================================================================

/// Spawns the recurring health check for one instance.
///
/// The task ends on its own when the instance leaves the `running`
/// state or disappears from the ledger; [`Registry::stop_monitor`]
/// aborts it eagerly on explicit termination.
pub(crate) fn spawn_monitor(registry: Registry, instance_id: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        // The first tick fires immediately; skip it so a freshly spawned
        // browser has time to bind its ports.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let instance = match registry.get(&instance_id) {
                Ok(Some(instance)) => instance,
                Ok(None) => {
                    debug!(instance_id, "Instance gone from ledger, monitor exiting");
                    return;
                }
                Err(e) => {
                    warn!(instance_id, error = %e, "Health check could not read ledger");
                    continue;
                }
            };

            if !instance.is_running() {
                debug!(instance_id, "Instance no longer running, monitor exiting");
                return;
            }

            if is_orphaned(&instance) {
                info!(instance_id, "Health monitor reaping orphaned instance");
                if let Err(e) = registry.terminate_instance(&instance_id).await {
                    warn!(instance_id, error = %e, "Failed to terminate orphan");
                }
                return;
            }
        }
    })
}

/// Conjunctive orphan test used by the recurring check.
fn is_orphaned(instance: &super::instance::Instance) -> bool {
    let Some(pid) = instance.process_id else {
        // Not yet spawned; nothing to monitor.
        return false;
    };

    pid != std::process::id()
        && !process_alive(pid)
        && port_is_free(instance.control_port)
        && port_is_free(instance.web_socket_port)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{Ipv4Addr, TcpListener};
    use std::path::PathBuf;

    use crate::browser::Browser;
    use crate::registry::instance::Instance;

    fn instance_with(pid: Option<u32>, control: u16, ws: u16) -> Instance {
        let mut instance = Instance::new(
            Browser::Firefox,
            PathBuf::from("/work/project"),
            control,
            ws,
            PathBuf::from("/profiles/p"),
        );
        instance.process_id = pid;
        instance
    }

    fn free_port() -> u16 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        listener.local_addr().expect("addr").port()
    }

    #[test]
    fn test_unspawned_instance_is_not_orphaned() {
        let instance = instance_with(None, free_port(), free_port());
        assert!(!is_orphaned(&instance));
    }

    #[test]
    fn test_own_pid_is_not_orphaned() {
        let instance = instance_with(Some(std::process::id()), free_port(), free_port());
        assert!(!is_orphaned(&instance));
    }

    #[test]
    fn test_dead_pid_with_free_ports_is_orphaned() {
        let instance = instance_with(Some(u32::MAX - 1), free_port(), free_port());
        assert!(is_orphaned(&instance));
    }

    #[test]
    fn test_dead_pid_with_held_port_is_not_orphaned() {
        let holder = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        let held = holder.local_addr().expect("addr").port();

        let instance = instance_with(Some(u32::MAX - 1), held, free_port());
        assert!(!is_orphaned(&instance));
    }
}
