//! Development session coordinator.
//!
//! A [`DevSession`] owns one complete development session: the registry
//! entry, the materialized profile, the supervised browser process, the
//! protocol client, the HMR server, and the reload dispatcher. It is
//! the only type the surrounding build pipeline talks to: it feeds
//! changed-file paths in and tears everything down on shutdown.
//!
//! # Example
//!
//! ```no_run
//! use extension_dev::{Browser, DevSession, Result};
//!
//! # async fn example() -> Result<()> {
//! let session = DevSession::builder(Browser::Chrome, "./my-extension")
//!     .extension_dir("./dist")
//!     .launch()
//!     .await?;
//!
//! session.notify_change("./dist/background.js");
//! session.shutdown().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::allocator::{Profile, ProfileKind};
use crate::browser::{Browser, BrowserFamily};
use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::hmr::HmrServer;
use crate::launcher::{self, LaunchSpec, LaunchedBrowser};
use crate::protocol::{CdpClient, Debugger, RdpClient};
use crate::registry::{Instance, Registry};
use crate::reload::{FileGroups, ReloadDispatcher};

// ============================================================================
// SessionBuilder
// ============================================================================

/// Fluent configuration for a [`DevSession`].
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    browser: Browser,
    project_path: PathBuf,
    extension_dir: Option<PathBuf>,
    manager_dir: Option<PathBuf>,
    binary: Option<PathBuf>,
    requested_port: Option<u16>,
    persistent_profile: Option<PathBuf>,
    extra_flags: Vec<String>,
    excluded_flags: Vec<String>,
    verbose: bool,
}

impl SessionBuilder {
    fn new(browser: Browser, project_path: PathBuf) -> Self {
        Self {
            browser,
            project_path,
            extension_dir: None,
            manager_dir: None,
            binary: None,
            requested_port: None,
            persistent_profile: None,
            extra_flags: Vec::new(),
            excluded_flags: Vec::new(),
            verbose: false,
        }
    }

    /// Sets the compiled, unpacked extension directory. Required.
    #[inline]
    #[must_use]
    pub fn extension_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.extension_dir = Some(path.into());
        self
    }

    /// Sets the companion manager extension directory.
    #[inline]
    #[must_use]
    pub fn manager_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.manager_dir = Some(path.into());
        self
    }

    /// Sets an explicit browser binary path.
    #[inline]
    #[must_use]
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Requests a specific control port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.requested_port = Some(port);
        self
    }

    /// Uses a persistent profile at a stable path instead of an
    /// ephemeral one.
    #[inline]
    #[must_use]
    pub fn persistent_profile(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistent_profile = Some(path.into());
        self
    }

    /// Appends developer-supplied browser flags.
    #[inline]
    #[must_use]
    pub fn extra_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.extra_flags.extend(flags);
        self
    }

    /// Removes baseline flags by name.
    #[inline]
    #[must_use]
    pub fn exclude_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.excluded_flags.extend(flags);
        self
    }

    /// Inherits the browser's stdio instead of discarding it.
    #[inline]
    #[must_use]
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Validates the configuration and launches the session.
    ///
    /// # Errors
    ///
    /// Propagates every fatal condition from the launch pipeline: missing
    /// extension directory, registry lock contention, port exhaustion,
    /// binary resolution failure, spawn failure, protocol connect
    /// failure.
    pub async fn launch(self) -> Result<DevSession> {
        let extension_dir = self.extension_dir.clone().ok_or_else(|| {
            Error::config(
                "Extension directory is required. Use .extension_dir() to set it.\n\
                 Example: DevSession::builder(browser, project).extension_dir(\"./dist\")",
            )
        })?;
        if !extension_dir.exists() {
            return Err(Error::config(format!(
                "Extension directory not found at: {}\n\
                 Run the build first so there is something to load.",
                extension_dir.display()
            )));
        }

        let registry = Registry::open()?;
        DevSession::launch(registry, self, extension_dir).await
    }
}

// ============================================================================
// DevSession
// ============================================================================

/// One running development session.
pub struct DevSession {
    registry: Registry,
    instance: Instance,
    debugger: Debugger,
    hmr: Arc<HmrServer>,
    dispatcher: ReloadDispatcher,
    process: LaunchedBrowser,
    context: SessionContext,
    extension_id: String,
}

impl std::fmt::Debug for DevSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevSession")
            .field("extension_id", &self.extension_id)
            .finish_non_exhaustive()
    }
}

impl DevSession {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder(browser: Browser, project_path: impl Into<PathBuf>) -> SessionBuilder {
        SessionBuilder::new(browser, project_path.into())
    }

    /// Full launch pipeline: register, materialize, spawn, connect.
    async fn launch(
        registry: Registry,
        config: SessionBuilder,
        extension_dir: PathBuf,
    ) -> Result<Self> {
        let context = SessionContext::new();

        // Stale ephemeral profiles are cheap to sweep while we are here.
        let swept = crate::allocator::sweep_stale_profiles(registry.data_dir());
        if swept > 0 {
            debug!(swept, "Swept stale ephemeral profiles");
        }

        let mut instance = registry
            .create_instance(config.browser, config.project_path.clone(), config.requested_port)
            .await?;

        // Persistent profile overrides the allocated ephemeral path.
        let (profile_path, profile_kind) = match &config.persistent_profile {
            Some(path) => (path.clone(), ProfileKind::Persistent),
            None => (instance.profile_path.clone(), ProfileKind::Ephemeral),
        };
        let profile =
            Profile::materialize(&profile_path, config.browser.family(), profile_kind).await?;
        if profile_kind == ProfileKind::Persistent {
            instance = registry
                .update_instance(&instance.instance_id, |i| {
                    i.profile_path = profile_path.clone();
                })
                .await?;
        }

        // Gecko installs extensions over the wire, not the command line.
        let cli_extensions = match config.browser.family() {
            BrowserFamily::Chromium => {
                let mut paths = vec![extension_dir.clone()];
                paths.extend(config.manager_dir.clone());
                paths
            }
            BrowserFamily::Gecko => Vec::new(),
        };

        let spec = LaunchSpec {
            extension_paths: cli_extensions,
            profile_path: Some(profile.path().to_path_buf()),
            debug_port: Some(instance.control_port),
            extra_flags: config.extra_flags.clone(),
            excluded_flags: config.excluded_flags.clone(),
        };

        let process = launcher::launch(
            config.browser,
            config.binary.as_deref(),
            registry.data_dir(),
            &spec,
            config.verbose,
        )
        .await?;

        launcher::install_signal_handlers(process.clone());
        launcher::install_panic_cleanup(process.pid());

        instance = registry
            .update_instance(&instance.instance_id, |i| {
                i.process_id = Some(process.pid());
            })
            .await?;

        let hmr = HmrServer::bind(instance.web_socket_port).await?;

        let (debugger, extension_id) = Self::connect_debugger(
            config.browser,
            &instance,
            profile.path(),
            &extension_dir,
            config.manager_dir.as_deref(),
            context.clone(),
        )
        .await?;

        instance = registry
            .update_instance(&instance.instance_id, |i| {
                i.extension_id = Some(extension_id.clone());
            })
            .await?;

        let groups = load_file_groups(&extension_dir)?;
        let dispatcher = ReloadDispatcher::start(
            groups,
            debugger.clone(),
            Arc::clone(&hmr),
            extension_id.clone(),
            extension_dir.clone(),
        );

        info!(
            instance_id = %instance.instance_id,
            extension_id = %extension_id,
            control_port = instance.control_port,
            hmr_port = instance.web_socket_port,
            "Development session ready"
        );

        Ok(Self {
            registry,
            instance,
            debugger,
            hmr,
            dispatcher,
            process,
            context,
            extension_id,
        })
    }

    /// Connects the family's protocol client and resolves the
    /// extension's runtime id.
    async fn connect_debugger(
        browser: Browser,
        instance: &Instance,
        profile_path: &Path,
        extension_dir: &Path,
        manager_dir: Option<&Path>,
        context: SessionContext,
    ) -> Result<(Debugger, String)> {
        match browser.family() {
            BrowserFamily::Chromium => {
                let client = CdpClient::connect(
                    instance.control_port,
                    profile_path,
                    extension_dir,
                    context,
                )
                .await?;
                let extension_id = client.ensure_loaded().await?;
                Ok((Debugger::Cdp(client), extension_id))
            }

            BrowserFamily::Gecko => {
                let client = RdpClient::connect(instance.control_port, context).await?;

                if let Some(manager) = manager_dir {
                    client.install_temporary_addon(manager, true).await?;
                }
                let extension_id = client.install_temporary_addon(extension_dir, false).await?;
                Ok((Debugger::Rdp(client), extension_id))
            }
        }
    }
}

// ============================================================================
// DevSession - Public API
// ============================================================================

impl DevSession {
    /// Returns the runtime extension id.
    #[inline]
    #[must_use]
    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    /// Returns the registry record for this session.
    #[inline]
    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Returns the session context.
    #[inline]
    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Returns the protocol client.
    #[inline]
    #[must_use]
    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    /// Returns the HMR server.
    #[inline]
    #[must_use]
    pub fn hmr(&self) -> &Arc<HmrServer> {
        &self.hmr
    }

    /// Reports a changed file from the build pipeline.
    pub fn notify_change(&self, path: impl Into<PathBuf>) {
        self.dispatcher.notify_change(path);
    }

    /// Tears the session down: dispatcher, HMR server, protocol
    /// client, browser process, registry entry, in that order.
    ///
    /// # Errors
    ///
    /// Returns registry errors; everything else is best-effort.
    pub async fn shutdown(self) -> Result<()> {
        info!(instance_id = %self.instance.instance_id, "Shutting down session");

        self.dispatcher.shutdown();
        self.hmr.shutdown();

        match &self.debugger {
            Debugger::Cdp(client) => client.shutdown(),
            Debugger::Rdp(client) => client.shutdown(),
        }

        self.process.terminate().await;

        self.registry
            .terminate_instance(&self.instance.instance_id)
            .await?;

        Ok(())
    }
}

// ============================================================================
// Private Helpers
// ============================================================================

/// Parses the extension manifest into reload file groups.
fn load_file_groups(extension_dir: &Path) -> Result<FileGroups> {
    let manifest_path = extension_dir.join("manifest.json");
    let manifest: Value = match std::fs::read_to_string(&manifest_path) {
        Ok(content) => serde_json::from_str(&content)?,
        Err(e) => {
            // The dispatcher can classify without groups; manifest and
            // locale rules need no manifest content.
            warn!(path = %manifest_path.display(), error = %e, "Manifest unreadable");
            Value::Null
        }
    };

    Ok(FileGroups::from_manifest(&manifest, extension_dir))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_launch_requires_extension_dir() {
        let err = DevSession::builder(Browser::Chrome, "/work/project")
            .launch()
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("extension_dir"));
    }

    #[tokio::test]
    async fn test_launch_requires_existing_extension_dir() {
        let err = DevSession::builder(Browser::Chrome, "/work/project")
            .extension_dir("/definitely/not/built")
            .launch()
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_builder_accumulates_flags() {
        let builder = DevSession::builder(Browser::Firefox, "/work/p")
            .extra_flags(["--headless".to_string()])
            .extra_flags(["--safe-mode".to_string()])
            .exclude_flags(["--disable-sync".to_string()]);

        assert_eq!(builder.extra_flags, vec!["--headless", "--safe-mode"]);
        assert_eq!(builder.excluded_flags, vec!["--disable-sync"]);
    }

    #[test]
    fn test_load_file_groups_without_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let groups = load_file_groups(dir.path()).expect("groups");
        assert!(groups.background_scripts.is_empty());
        // Manifest classification still works from the path rule.
        assert_eq!(
            groups.classify(&dir.path().join("manifest.json")),
            crate::reload::ReloadScope::Manifest
        );
    }
}
