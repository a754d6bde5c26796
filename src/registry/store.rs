//! Persisted ledger of running development sessions.
//!
//! Each development session is a separate OS process; the only state
//! they share is one JSON file under the per-OS application-data
//! directory. All mutation is read-modify-write under the advisory
//! [`RegistryLock`]; reads work from the persisted snapshot without
//! locking.
//!
//! # Ledger Layout
//!
//! ```json
//! {
//!   "instances": { "<instanceId>": { ... } },
//!   "lastCleanup": 1754000000000
//! }
//! ```
//!
//! # Orphan Detection
//!
//! An entry is removable when ANY of these holds:
//!
//! 1. its status is `terminated` or `error`;
//! 2. it is older than 24 hours;
//! 3. its recorded process no longer exists;
//! 4. both of its ports are currently free.
//!
//! The fourth condition catches browsers that crashed on platforms where
//! pid probes alone cannot invalidate the record.

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::allocator::ports::{self, PortBases};
use crate::allocator::profile::ephemeral_profile_dir;
use crate::browser::Browser;
use crate::error::{Error, Result};

use super::instance::{Instance, InstanceStatus, now_millis};
use super::lock::RegistryLock;
use super::probe;

// ============================================================================
// Constants
// ============================================================================

/// Application-data directory name, shared across platforms.
pub const DATA_DIR_NAME: &str = "extension-js";

/// Ledger file name inside the data directory.
const REGISTRY_FILE: &str = "registry.json";

/// Lock file name inside the data directory.
const LOCK_FILE: &str = "registry.lock";

/// Entries older than this are orphans regardless of other signals.
const MAX_INSTANCE_AGE_MS: u64 = 24 * 60 * 60 * 1000;

/// Opportunistic cleanup runs at most this often.
const CLEANUP_INTERVAL_MS: u64 = 60 * 60 * 1000;

// ============================================================================
// RegistryFile
// ============================================================================

/// On-disk shape of the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryFile {
    /// All known instances by id.
    #[serde(default)]
    instances: HashMap<String, Instance>,

    /// Unix millis of the last orphan sweep.
    #[serde(default)]
    last_cleanup: u64,
}

// ============================================================================
// Registry
// ============================================================================

/// File-backed, lock-coordinated instance ledger.
///
/// Cheap to clone; all clones share the same data directory and health
/// monitor set.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Application-data directory holding ledger, lock, and profiles.
    data_dir: PathBuf,

    /// Port scan bases.
    bases: PortBases,

    /// Health monitor tasks by instance id.
    monitors: Mutex<FxHashMap<String, JoinHandle<()>>>,
}

// ============================================================================
// Registry - Construction
// ============================================================================

impl Registry {
    /// Opens the registry at the per-OS application-data directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the platform exposes no
    /// application-data directory.
    pub fn open() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::config("No application-data directory on this platform"))?;
        Ok(Self::at(base.join(DATA_DIR_NAME), PortBases::default()))
    }

    /// Opens a registry rooted at an explicit directory.
    #[must_use]
    pub fn at(data_dir: PathBuf, bases: PortBases) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                data_dir,
                bases,
                monitors: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Returns the application-data directory.
    #[inline]
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    fn registry_path(&self) -> PathBuf {
        self.inner.data_dir.join(REGISTRY_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.inner.data_dir.join(LOCK_FILE)
    }
}

// ============================================================================
// Registry - Mutation
// ============================================================================

impl Registry {
    /// Creates and persists a fresh instance.
    ///
    /// Opportunistically sweeps orphans when the last sweep is older
    /// than one hour, then allocates non-conflicting ports (honoring
    /// `requested_port` for the control port when usable) and an
    /// ephemeral profile path, and starts background health monitoring.
    ///
    /// # Errors
    ///
    /// - [`Error::LockContended`] when the ledger lock cannot be taken
    /// - [`Error::PortExhausted`] when no free port exists in scan range
    pub async fn create_instance(
        &self,
        browser: Browser,
        project_path: impl Into<PathBuf>,
        requested_port: Option<u16>,
    ) -> Result<Instance> {
        let project_path = project_path.into();
        let _lock = RegistryLock::acquire(&self.lock_path()).await?;
        let mut file = self.load()?;

        if now_millis().saturating_sub(file.last_cleanup) > CLEANUP_INTERVAL_MS {
            sweep_orphans(&mut file);
            file.last_cleanup = now_millis();
        }

        let mut in_use: std::collections::HashSet<u16> = file
            .instances
            .values()
            .filter(|i| i.is_running())
            .flat_map(|i| [i.control_port, i.web_socket_port])
            .collect();

        let control_port = ports::allocate_port(requested_port, self.inner.bases.control, &in_use)?;
        in_use.insert(control_port);
        let web_socket_port = ports::allocate_port(None, self.inner.bases.websocket, &in_use)?;

        let profile_path = ephemeral_profile_dir(&self.inner.data_dir, browser);
        let instance = Instance::new(
            browser,
            project_path,
            control_port,
            web_socket_port,
            profile_path,
        );

        file.instances
            .insert(instance.instance_id.clone(), instance.clone());
        self.persist(&file)?;

        info!(
            instance_id = %instance.instance_id,
            browser = %browser,
            control_port,
            web_socket_port,
            "Instance registered"
        );

        self.start_monitor(&instance);

        Ok(instance)
    }

    /// Applies a mutation to an instance and persists the result.
    ///
    /// Used to attach the pid after spawn, the runtime extension id
    /// after protocol connect, or a persistent profile path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstanceNotFound`] for unknown ids.
    pub async fn update_instance(
        &self,
        instance_id: &str,
        mutate: impl FnOnce(&mut Instance),
    ) -> Result<Instance> {
        let _lock = RegistryLock::acquire(&self.lock_path()).await?;
        let mut file = self.load()?;

        let instance = file
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| Error::instance_not_found(instance_id))?;
        mutate(instance);
        let updated = instance.clone();

        self.persist(&file)?;
        Ok(updated)
    }

    /// Marks an instance `terminated` and stops its health monitor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstanceNotFound`] for unknown ids.
    pub async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        self.stop_monitor(instance_id);

        self.update_instance(instance_id, |instance| {
            instance.status = InstanceStatus::Terminated;
        })
        .await?;

        info!(instance_id, "Instance terminated");
        Ok(())
    }

    /// Terminates every live process belonging to a project.
    ///
    /// Crash-recovery operation: sends graceful-then-forced termination
    /// to each recorded pid and marks the entries `terminated`.
    pub async fn force_cleanup_project_processes(
        &self,
        project_path: impl AsRef<Path>,
    ) -> Result<usize> {
        let project_path = project_path.as_ref();
        let victims: Vec<Instance> = self
            .snapshot()?
            .into_iter()
            .filter(|i| i.is_running() && i.project_path == project_path)
            .collect();

        for instance in &victims {
            if let Some(pid) = instance.process_id {
                warn!(
                    instance_id = %instance.instance_id,
                    pid,
                    "Force-terminating stale project process"
                );
                probe::terminate_process(pid).await;
            }
            self.terminate_instance(&instance.instance_id).await?;
        }

        Ok(victims.len())
    }
}

// ============================================================================
// Registry - Queries
// ============================================================================

impl Registry {
    /// Returns all `running` instances from the persisted snapshot.
    pub fn running_instances(&self) -> Result<Vec<Instance>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .filter(Instance::is_running)
            .collect())
    }

    /// Finds the running instance holding a control port.
    pub fn instance_by_port(&self, port: u16) -> Result<Option<Instance>> {
        Ok(self
            .running_instances()?
            .into_iter()
            .find(|i| i.control_port == port))
    }

    /// Finds the running instance holding an HMR WebSocket port.
    pub fn instance_by_websocket_port(&self, port: u16) -> Result<Option<Instance>> {
        Ok(self
            .running_instances()?
            .into_iter()
            .find(|i| i.web_socket_port == port))
    }

    /// Returns every instance in the ledger, whatever its status.
    pub fn snapshot(&self) -> Result<Vec<Instance>> {
        Ok(self.load()?.instances.into_values().collect())
    }
}

// ============================================================================
// Registry - Health Monitoring
// ============================================================================

impl Registry {
    fn start_monitor(&self, instance: &Instance) {
        let handle = super::health::spawn_monitor(self.clone(), instance.instance_id.clone());
        let previous = self
            .inner
            .monitors
            .lock()
            .insert(instance.instance_id.clone(), handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub(crate) fn stop_monitor(&self, instance_id: &str) {
        if let Some(handle) = self.inner.monitors.lock().remove(instance_id) {
            handle.abort();
            debug!(instance_id, "Health monitor stopped");
        }
    }

    /// Looks up a single instance by id from the persisted snapshot.
    pub(crate) fn get(&self, instance_id: &str) -> Result<Option<Instance>> {
        Ok(self.load()?.instances.get(instance_id).cloned())
    }
}

// ============================================================================
// Registry - Persistence
// ============================================================================

impl Registry {
    fn load(&self) -> Result<RegistryFile> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(RegistryFile::default());
        }

        let content = std::fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(file) => Ok(file),
            Err(e) => {
                // A corrupt ledger must not brick every future session.
                warn!(path = %path.display(), error = %e, "Registry file corrupt, starting fresh");
                Ok(RegistryFile::default())
            }
        }
    }

    fn persist(&self, file: &RegistryFile) -> Result<()> {
        std::fs::create_dir_all(&self.inner.data_dir)?;

        let path = self.registry_path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(file)?)?;
        std::fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), count = file.instances.len(), "Registry persisted");
        Ok(())
    }
}

// ============================================================================
// Orphan Detection
// ============================================================================

/// Returns the reason an entry is an orphan, or `None` if it is healthy.
///
/// The four conditions are evaluated independently; any one suffices.
#[must_use]
pub fn orphan_reason(instance: &Instance) -> Option<&'static str> {
    if !instance.is_running() {
        return Some("status");
    }

    if instance.age_ms() > MAX_INSTANCE_AGE_MS {
        return Some("age");
    }

    if let Some(pid) = instance.process_id
        && !probe::process_alive(pid)
    {
        return Some("dead-process");
    }

    if ports::port_is_free(instance.control_port) && ports::port_is_free(instance.web_socket_port) {
        return Some("ports-free");
    }

    None
}

/// Removes every orphaned entry from the ledger in place.
fn sweep_orphans(file: &mut RegistryFile) {
    file.instances.retain(|id, instance| {
        match orphan_reason(instance) {
            Some(reason) => {
                debug!(instance_id = %id, reason, "Removing orphaned instance");
                false
            }
            None => true,
        }
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{Ipv4Addr, TcpListener};

    fn test_registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::at(dir.path().join("extension-js"), PortBases::default());
        (dir, registry)
    }

    /// An instance whose pid is alive and whose ports are visibly held.
    fn healthy_instance(holders: &mut Vec<TcpListener>) -> Instance {
        let l1 = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        let l2 = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        let (p1, p2) = (
            l1.local_addr().expect("addr").port(),
            l2.local_addr().expect("addr").port(),
        );
        holders.push(l1);
        holders.push(l2);

        let mut instance = Instance::new(
            Browser::Chrome,
            PathBuf::from("/work/project"),
            p1,
            p2,
            PathBuf::from("/profiles/p"),
        );
        instance.process_id = Some(std::process::id());
        instance
    }

    #[tokio::test]
    async fn test_create_instance_allocates_distinct_ports() {
        let (_dir, registry) = test_registry();

        let a = registry
            .create_instance(Browser::Chrome, "/work/a", None)
            .await
            .expect("create a");
        let b = registry
            .create_instance(Browser::Firefox, "/work/b", None)
            .await
            .expect("create b");

        let ports = [
            a.control_port,
            a.web_socket_port,
            b.control_port,
            b.web_socket_port,
        ];
        let unique: std::collections::HashSet<u16> = ports.into_iter().collect();
        assert_eq!(unique.len(), 4, "all four ports distinct: {ports:?}");

        registry.stop_monitor(&a.instance_id);
        registry.stop_monitor(&b.instance_id);
    }

    #[tokio::test]
    async fn test_create_persists_and_queries() {
        let (_dir, registry) = test_registry();

        let created = registry
            .create_instance(Browser::Chromium, "/work/q", None)
            .await
            .expect("create");

        let running = registry.running_instances().expect("query");
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].instance_id, created.instance_id);

        let by_port = registry
            .instance_by_port(created.control_port)
            .expect("query")
            .expect("found");
        assert_eq!(by_port.instance_id, created.instance_id);

        let by_ws = registry
            .instance_by_websocket_port(created.web_socket_port)
            .expect("query")
            .expect("found");
        assert_eq!(by_ws.instance_id, created.instance_id);

        registry.stop_monitor(&created.instance_id);
    }

    #[tokio::test]
    async fn test_terminate_instance() {
        let (_dir, registry) = test_registry();

        let created = registry
            .create_instance(Browser::Edge, "/work/t", None)
            .await
            .expect("create");
        registry
            .terminate_instance(&created.instance_id)
            .await
            .expect("terminate");

        assert!(registry.running_instances().expect("query").is_empty());
        let stored = registry
            .get(&created.instance_id)
            .expect("get")
            .expect("exists");
        assert_eq!(stored.status, InstanceStatus::Terminated);
    }

    #[tokio::test]
    async fn test_terminated_instance_never_resurrected() {
        let (_dir, registry) = test_registry();

        let created = registry
            .create_instance(Browser::Chrome, "/work/r", None)
            .await
            .expect("create");
        registry
            .terminate_instance(&created.instance_id)
            .await
            .expect("terminate");

        let fresh = registry
            .create_instance(Browser::Chrome, "/work/r", None)
            .await
            .expect("recreate");
        assert_ne!(fresh.instance_id, created.instance_id);
        registry.stop_monitor(&fresh.instance_id);
    }

    #[test]
    fn test_orphan_status_condition() {
        let mut holders = Vec::new();
        let mut instance = healthy_instance(&mut holders);
        instance.status = InstanceStatus::Error;
        assert_eq!(orphan_reason(&instance), Some("status"));
    }

    #[test]
    fn test_orphan_age_condition() {
        let mut holders = Vec::new();
        let mut instance = healthy_instance(&mut holders);
        instance.start_time = now_millis() - MAX_INSTANCE_AGE_MS - 1000;
        assert_eq!(orphan_reason(&instance), Some("age"));
    }

    #[test]
    fn test_orphan_dead_process_condition() {
        let mut holders = Vec::new();
        let mut instance = healthy_instance(&mut holders);
        instance.process_id = Some(u32::MAX - 1);
        assert_eq!(orphan_reason(&instance), Some("dead-process"));
    }

    #[test]
    fn test_orphan_ports_free_condition() {
        let mut holders = Vec::new();
        let instance = healthy_instance(&mut holders);
        // Release both listeners: ports become free while the pid stays alive.
        holders.clear();
        assert_eq!(orphan_reason(&instance), Some("ports-free"));
    }

    #[test]
    fn test_healthy_instance_is_not_orphan() {
        let mut holders = Vec::new();
        let instance = healthy_instance(&mut holders);
        assert_eq!(orphan_reason(&instance), None);
    }

    #[tokio::test]
    async fn test_corrupt_registry_starts_fresh() {
        let (_dir, registry) = test_registry();

        std::fs::create_dir_all(registry.data_dir()).expect("mkdir");
        std::fs::write(registry.registry_path(), "{not json").expect("write");

        assert!(registry.running_instances().expect("query").is_empty());
    }

    #[tokio::test]
    async fn test_force_cleanup_project_processes() {
        let (_dir, registry) = test_registry();

        let a = registry
            .create_instance(Browser::Chrome, "/work/doomed", None)
            .await
            .expect("create");
        let b = registry
            .create_instance(Browser::Chrome, "/work/other", None)
            .await
            .expect("create");

        let cleaned = registry
            .force_cleanup_project_processes("/work/doomed")
            .await
            .expect("cleanup");
        assert_eq!(cleaned, 1);

        let doomed = registry
            .get(&a.instance_id)
            .expect("get")
            .expect("exists");
        assert_eq!(doomed.status, InstanceStatus::Terminated);

        let running = registry.running_instances().expect("query");
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].instance_id, b.instance_id);
        registry.stop_monitor(&b.instance_id);
    }
}
