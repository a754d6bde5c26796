//! Debounced reload dispatch.
//!
//! Source-file saves arrive in bursts: editors write temp files,
//! formatters rewrite imports, bundlers emit several outputs per
//! change. The dispatcher coalesces every path reported within a quiet
//! period into one action: classify each path, take the most severe
//! scope, run the matching protocol operation, and push one HMR
//! notification.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::hmr::{HmrServer, ServerMessage};
use crate::protocol::Debugger;

use super::scope::{FileGroups, ReloadScope};

// ============================================================================
// Constants
// ============================================================================

/// Quiet period that ends a change burst.
const DEBOUNCE: Duration = Duration::from_millis(300);

// ============================================================================
// ReloadDispatcher
// ============================================================================

/// Consumes changed-file notifications and issues reloads.
pub struct ReloadDispatcher {
    /// Change notifications in.
    tx: mpsc::UnboundedSender<PathBuf>,

    /// The debounce task.
    task: JoinHandle<()>,
}

impl ReloadDispatcher {
    /// Starts the dispatcher for one session.
    #[must_use]
    pub fn start(
        groups: FileGroups,
        debugger: Debugger,
        hmr: Arc<HmrServer>,
        extension_id: String,
        extension_dir: PathBuf,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_debounced(rx, move |batch: Vec<PathBuf>| {
            let groups = groups.clone();
            let debugger = debugger.clone();
            let hmr = Arc::clone(&hmr);
            let extension_id = extension_id.clone();
            let extension_dir = extension_dir.clone();

            async move {
                let Some(scope) = dominant_scope(&groups, &batch) else {
                    return;
                };

                info!(?scope, files = batch.len(), "Dispatching reload");

                let reloaded = if scope.needs_full_reload() {
                    debugger.reload_extension(&extension_id, &extension_dir).await
                } else {
                    debugger.reload_page(&extension_id).await
                };

                if !reloaded {
                    // Best-effort: the build stays green even when the
                    // browser refuses the reload.
                    warn!(?scope, "Browser reload did not complete");
                }

                hmr.broadcast(&ServerMessage::changed(scope));
            }
        }));

        Self { tx, task }
    }

    /// Reports a changed file.
    ///
    /// Safe to call from any task; bursts coalesce automatically.
    pub fn notify_change(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(path = %path.display(), "File change reported");
        let _ = self.tx.send(path);
    }

    /// Stops the dispatcher.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

// ============================================================================
// Debounce Loop
// ============================================================================

/// Runs `handle` once per change burst.
///
/// A burst ends when the channel stays quiet for the debounce period.
async fn run_debounced<F, Fut>(mut rx: mpsc::UnboundedReceiver<PathBuf>, handle: F)
where
    F: Fn(Vec<PathBuf>) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];

        loop {
            match timeout(DEBOUNCE, rx.recv()).await {
                Ok(Some(path)) => batch.push(path),
                Ok(None) => {
                    handle(batch).await;
                    return;
                }
                Err(_) => break,
            }
        }

        handle(batch).await;
    }
}

// ============================================================================
// Scope Selection
// ============================================================================

/// Most severe scope across a burst, by the classification tie-break.
#[must_use]
pub fn dominant_scope(groups: &FileGroups, batch: &[PathBuf]) -> Option<ReloadScope> {
    batch
        .iter()
        .map(|path| groups.classify(path))
        .min_by_key(|scope| severity(*scope))
}

/// Severity rank; lower wins.
const fn severity(scope: ReloadScope) -> u8 {
    match scope {
        ReloadScope::Manifest => 0,
        ReloadScope::Locale => 1,
        ReloadScope::Background => 2,
        ReloadScope::Html => 3,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::json;

    fn groups() -> FileGroups {
        let manifest = json!({
            "manifest_version": 3,
            "background": {"service_worker": "sw.js"},
            "action": {"default_popup": "popup.html"}
        });
        FileGroups::from_manifest(&manifest, Path::new("/ext"))
    }

    #[test]
    fn test_dominant_scope_picks_most_severe() {
        let g = groups();
        let batch = vec![
            PathBuf::from("/ext/popup.html"),
            PathBuf::from("/ext/sw.js"),
            PathBuf::from("/ext/_locales/en/messages.json"),
        ];
        assert_eq!(dominant_scope(&g, &batch), Some(ReloadScope::Locale));
    }

    #[test]
    fn test_dominant_scope_manifest_wins() {
        let g = groups();
        let batch = vec![
            PathBuf::from("/ext/sw.js"),
            PathBuf::from("/ext/manifest.json"),
        ];
        assert_eq!(dominant_scope(&g, &batch), Some(ReloadScope::Manifest));
    }

    #[test]
    fn test_dominant_scope_empty_batch() {
        assert_eq!(dominant_scope(&groups(), &[]), None);
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_action() {
        let (tx, rx) = mpsc::unbounded_channel();
        let fired = Arc::new(AtomicUsize::new(0));
        let sizes = Arc::new(Mutex::new(Vec::new()));

        let fired_in = Arc::clone(&fired);
        let sizes_in = Arc::clone(&sizes);
        let task = tokio::spawn(run_debounced(rx, move |batch: Vec<PathBuf>| {
            let fired = Arc::clone(&fired_in);
            let sizes = Arc::clone(&sizes_in);
            async move {
                fired.fetch_add(1, Ordering::SeqCst);
                sizes.lock().push(batch.len());
            }
        }));

        for i in 0..5 {
            tx.send(PathBuf::from(format!("/ext/file{i}.css"))).expect("send");
        }
        drop(tx);
        task.await.expect("task");

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(*sizes.lock(), vec![5]);
    }

    #[tokio::test]
    async fn test_separate_bursts_fire_separately() {
        let (tx, rx) = mpsc::unbounded_channel();
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_in = Arc::clone(&fired);
        let task = tokio::spawn(run_debounced(rx, move |_batch: Vec<PathBuf>| {
            let fired = Arc::clone(&fired_in);
            async move {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        }));

        tx.send(PathBuf::from("/ext/a.css")).expect("send");
        tokio::time::sleep(DEBOUNCE * 2).await;
        tx.send(PathBuf::from("/ext/b.css")).expect("send");
        drop(tx);
        task.await.expect("task");

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
