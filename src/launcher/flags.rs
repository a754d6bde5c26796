//! Command-line flag composition for browser launches.
//!
//! Chromium flags layer in a fixed order: the stability/telemetry
//! baseline, then the extension and profile flags computed from the
//! allocation, then developer extras. An exclusion list removes
//! baseline flags the developer wants gone; matching is by flag name,
//! ignoring any `=value` suffix.
//!
//! Firefox takes positional-style arguments instead of `--key=value`
//! flags, so its composition is a separate, simpler path.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

// ============================================================================
// Constants
// ============================================================================

/// Baseline flags for every Chromium-family launch.
///
/// Keeps the browser quiet and deterministic under automation: no first
/// run UI, no update/telemetry traffic, no default-browser nagging.
const CHROMIUM_BASELINE: [&str; 12] = [
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-component-update",
    "--disable-sync",
    "--disable-default-apps",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-domain-reliability",
    "--metrics-recording-only",
    "--no-service-autorun",
    "--password-store=basic",
];

// ============================================================================
// LaunchSpec
// ============================================================================

/// Everything flag composition needs to know about a launch.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    /// Unpacked extension directories to load.
    pub extension_paths: Vec<PathBuf>,

    /// Profile directory, when one is in use.
    pub profile_path: Option<PathBuf>,

    /// Debug-protocol port; set only when inspection is requested.
    pub debug_port: Option<u16>,

    /// Developer-supplied extra flags, appended last.
    pub extra_flags: Vec<String>,

    /// Baseline flags to remove, matched by name.
    pub excluded_flags: Vec<String>,
}

// ============================================================================
// Composition
// ============================================================================

/// Composes the argument vector for a Chromium-family launch.
#[must_use]
pub fn chromium_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args: Vec<String> = CHROMIUM_BASELINE
        .iter()
        .filter(|flag| !is_excluded(flag, &spec.excluded_flags))
        .map(|s| (*s).to_string())
        .collect();

    if !spec.extension_paths.is_empty() {
        args.push(format!(
            "--load-extension={}",
            join_paths(&spec.extension_paths)
        ));
    }

    if let Some(profile) = &spec.profile_path {
        args.push(format!("--user-data-dir={}", profile.display()));
    }

    if let Some(port) = spec.debug_port {
        args.push(format!("--remote-debugging-port={port}"));
    }

    args.extend(spec.extra_flags.iter().cloned());
    args
}

/// Composes the argument vector for a Firefox-family launch.
///
/// The debugger server is Firefox's RDP listener; it is always enabled
/// because the RDP client is the only way to install a temporary
/// add-on.
#[must_use]
pub fn gecko_args(profile_path: &Path, debug_port: u16, extra_flags: &[String]) -> Vec<String> {
    let mut args = vec![
        "-profile".to_string(),
        profile_path.display().to_string(),
        "--no-remote".to_string(),
        "--new-instance".to_string(),
        "--start-debugger-server".to_string(),
        debug_port.to_string(),
    ];
    args.extend(extra_flags.iter().cloned());
    args
}

// ============================================================================
// Private Helpers
// ============================================================================

/// Joins extension paths for `--load-extension`.
fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Matches a flag against the exclusion list by name.
///
/// `--password-store=basic` is excluded by either `--password-store` or
/// the full flag text.
fn is_excluded(flag: &str, excluded: &[String]) -> bool {
    let name = flag.split('=').next().unwrap_or(flag);
    excluded
        .iter()
        .any(|e| e == flag || e.split('=').next().unwrap_or(e) == name)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            extension_paths: vec![PathBuf::from("/build/ext"), PathBuf::from("/build/manager")],
            profile_path: Some(PathBuf::from("/profiles/calm-otter")),
            debug_port: Some(9222),
            extra_flags: vec!["--window-size=1280,720".into()],
            excluded_flags: Vec::new(),
        }
    }

    #[test]
    fn test_chromium_args_include_load_extension() {
        let args = chromium_args(&spec());
        assert!(
            args.iter()
                .any(|a| a == "--load-extension=/build/ext,/build/manager")
        );
    }

    #[test]
    fn test_chromium_args_include_profile_and_port() {
        let args = chromium_args(&spec());
        assert!(args.contains(&"--user-data-dir=/profiles/calm-otter".to_string()));
        assert!(args.contains(&"--remote-debugging-port=9222".to_string()));
    }

    #[test]
    fn test_debug_port_omitted_when_not_requested() {
        let mut s = spec();
        s.debug_port = None;
        let args = chromium_args(&s);
        assert!(!args.iter().any(|a| a.starts_with("--remote-debugging-port")));
    }

    #[test]
    fn test_baseline_precedes_extras() {
        let args = chromium_args(&spec());
        let baseline_idx = args.iter().position(|a| a == "--no-first-run").expect("baseline");
        let extra_idx = args
            .iter()
            .position(|a| a == "--window-size=1280,720")
            .expect("extra");
        assert!(baseline_idx < extra_idx);
    }

    #[test]
    fn test_exclusion_by_name_ignores_value() {
        let mut s = spec();
        s.excluded_flags = vec!["--password-store".into()];
        let args = chromium_args(&s);
        assert!(!args.iter().any(|a| a.starts_with("--password-store")));
    }

    #[test]
    fn test_exclusion_full_text() {
        let mut s = spec();
        s.excluded_flags = vec!["--disable-sync".into()];
        let args = chromium_args(&s);
        assert!(!args.contains(&"--disable-sync".to_string()));
        // Other baseline flags survive
        assert!(args.contains(&"--no-first-run".to_string()));
    }

    #[test]
    fn test_gecko_args_shape() {
        let args = gecko_args(Path::new("/profiles/p"), 6000, &["--headless".to_string()]);
        assert_eq!(
            args,
            vec![
                "-profile",
                "/profiles/p",
                "--no-remote",
                "--new-instance",
                "--start-debugger-server",
                "6000",
                "--headless",
            ]
        );
    }

    #[test]
    fn test_no_extensions_no_load_flag() {
        let mut s = spec();
        s.extension_paths.clear();
        let args = chromium_args(&s);
        assert!(!args.iter().any(|a| a.starts_with("--load-extension")));
    }
}
