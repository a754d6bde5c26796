//! Reload scope classification for changed files.
//!
//! Every changed path maps to exactly one [`ReloadScope`]. A file can
//! belong to several manifest-derived groups at once; the match order
//! is the tie-break and is load-bearing:
//!
//! 1. the manifest file itself
//! 2. anything under `_locales/`
//! 3. the background/service-worker script group
//! 4. everything else (HTML entries and their assets)
//!
//! A file inside `_locales/` that an HTML page also references is a
//! locale change, nothing else.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Component, Path, PathBuf};

use serde_json::Value;

// ============================================================================
// ReloadScope
// ============================================================================

/// What a file change forces to reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReloadScope {
    /// The manifest changed; the whole extension reloads.
    Manifest,
    /// A localization file changed.
    Locale,
    /// The background script / service worker changed.
    Background,
    /// An HTML entry or one of its assets changed.
    Html,
}

impl ReloadScope {
    /// Label pushed to HMR clients for this scope.
    #[inline]
    #[must_use]
    pub const fn wire_label(self) -> &'static str {
        match self {
            Self::Manifest => "manifest.json",
            Self::Locale => "locale",
            Self::Background => "service_worker",
            Self::Html => "html",
        }
    }

    /// Returns `true` when the scope needs a full extension reload
    /// rather than a targeted page reload.
    #[inline]
    #[must_use]
    pub const fn needs_full_reload(self) -> bool {
        matches!(self, Self::Manifest | Self::Locale | Self::Background)
    }
}

// ============================================================================
// FileGroups
// ============================================================================

/// Manifest-derived file groupings used by classification.
#[derive(Debug, Clone, Default)]
pub struct FileGroups {
    /// Absolute path of the manifest itself.
    pub manifest_path: PathBuf,

    /// Background scripts / service worker files.
    pub background_scripts: Vec<PathBuf>,

    /// HTML entry points (popup, options, devtools, overrides).
    pub html_pages: Vec<PathBuf>,
}

impl FileGroups {
    /// Derives the groups from a parsed manifest.
    ///
    /// Paths in the manifest are relative to the extension root; every
    /// group member is stored absolute against it.
    #[must_use]
    pub fn from_manifest(manifest: &Value, extension_root: &Path) -> Self {
        let mut background_scripts = Vec::new();
        let mut html_pages = Vec::new();

        if let Some(worker) = manifest
            .pointer("/background/service_worker")
            .and_then(Value::as_str)
        {
            background_scripts.push(extension_root.join(worker));
        }
        if let Some(scripts) = manifest
            .pointer("/background/scripts")
            .and_then(Value::as_array)
        {
            background_scripts.extend(
                scripts
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| extension_root.join(s)),
            );
        }
        if let Some(page) = manifest
            .pointer("/background/page")
            .and_then(Value::as_str)
        {
            background_scripts.push(extension_root.join(page));
        }

        for pointer in [
            "/action/default_popup",
            "/browser_action/default_popup",
            "/page_action/default_popup",
            "/options_ui/page",
            "/options_page",
            "/devtools_page",
            "/chrome_url_overrides/newtab",
            "/sidebar_action/default_panel",
        ] {
            if let Some(page) = manifest.pointer(pointer).and_then(Value::as_str) {
                html_pages.push(extension_root.join(page));
            }
        }

        Self {
            manifest_path: extension_root.join("manifest.json"),
            background_scripts,
            html_pages,
        }
    }

    /// Classifies a changed path into its single reload scope.
    ///
    /// Total: every path classifies, unknown files as [`ReloadScope::Html`].
    #[must_use]
    pub fn classify(&self, changed: &Path) -> ReloadScope {
        if changed == self.manifest_path
            || changed.file_name().is_some_and(|n| n == "manifest.json")
        {
            return ReloadScope::Manifest;
        }

        if in_locales_dir(changed) {
            return ReloadScope::Locale;
        }

        if self.background_scripts.iter().any(|s| s == changed) {
            return ReloadScope::Background;
        }

        ReloadScope::Html
    }
}

/// Returns `true` for any path with a `_locales` component.
fn in_locales_dir(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == "_locales"))
}

// ============================================================================
// Tests
// ============================================================================
