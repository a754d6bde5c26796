//! Developer-mode preference seeding for browser profiles.
//!
//! Firefox preferences are written as JavaScript function calls in
//! `user.js`:
//!
//! ```javascript
//! user_pref("preference.name", value);
//! ```
//!
//! Chromium preferences are a JSON document at `Default/Preferences`.
//! Both seed sets exist to make a throwaway profile usable for extension
//! development on first launch: unsigned/unpacked extensions allowed,
//! remote debugging reachable, first-run UI and telemetry out of the way.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

// ============================================================================
// PrefValue
// ============================================================================

/// A Firefox preference value in `user.js`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrefValue {
    /// Boolean value (true/false).
    Bool(bool),

    /// Integer value.
    Int(i32),

    /// String value.
    String(String),
}

impl PrefValue {
    /// Formats the value for `user.js`.
    #[must_use]
    pub fn to_js_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::String(s) => format!("\"{}\"", escape_js_string(s)),
        }
    }
}

impl From<bool> for PrefValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PrefValue {
    #[inline]
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for PrefValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

// ============================================================================
// FirefoxPref
// ============================================================================

/// A Firefox preference: name plus value.
#[derive(Debug, Clone)]
pub struct FirefoxPref {
    /// Preference name (e.g. "xpinstall.signatures.required").
    pub key: String,

    /// Preference value.
    pub value: PrefValue,
}

impl FirefoxPref {
    /// Creates a new preference.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<PrefValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Generates the `user_pref("key", value);` line.
    #[must_use]
    pub fn to_user_pref_line(&self) -> String {
        format!("user_pref(\"{}\", {});", self.key, self.value.to_js_string())
    }
}

// ============================================================================
// Firefox Seed Set
// ============================================================================

/// Preferences seeded into a fresh Firefox development profile.
#[must_use]
pub fn firefox_dev_prefs() -> Vec<FirefoxPref> {
    vec![
        // Unsigned/temporary extension support
        FirefoxPref::new("xpinstall.signatures.required", false),
        FirefoxPref::new("extensions.autoDisableScopes", 0),
        FirefoxPref::new("extensions.enabledScopes", 15),
        FirefoxPref::new("extensions.webextensions.restrictedDomains", ""),
        // Remote debugging server
        FirefoxPref::new("devtools.debugger.remote-enabled", true),
        FirefoxPref::new("devtools.debugger.prompt-connection", false),
        FirefoxPref::new("devtools.chrome.enabled", true),
        // Fast, quiet startup
        FirefoxPref::new("browser.startup.page", 0),
        FirefoxPref::new("browser.shell.checkDefaultBrowser", false),
        FirefoxPref::new("browser.sessionstore.resume_from_crash", false),
        FirefoxPref::new("browser.warnOnQuit", false),
        FirefoxPref::new("browser.aboutConfig.showWarning", false),
        FirefoxPref::new("startup.homepage_welcome_url", ""),
        FirefoxPref::new("startup.homepage_override_url", ""),
        // Telemetry and background noise
        FirefoxPref::new("toolkit.telemetry.enabled", false),
        FirefoxPref::new("toolkit.telemetry.unified", false),
        FirefoxPref::new("datareporting.policy.dataSubmissionEnabled", false),
        FirefoxPref::new("datareporting.healthreport.uploadEnabled", false),
        FirefoxPref::new("app.update.service.enabled", false),
        FirefoxPref::new("extensions.update.enabled", false),
        FirefoxPref::new("app.normandy.enabled", false),
    ]
}

/// Serializes the full `user.js` content for a seed set.
#[must_use]
pub fn firefox_user_js(prefs: &[FirefoxPref]) -> String {
    let mut content = String::from("// Generated development profile preferences\n\n");
    for pref in prefs {
        content.push_str(&pref.to_user_pref_line());
        content.push('\n');
    }
    content
}

// ============================================================================
// Chromium Seed Set
// ============================================================================

/// The `Default/Preferences` JSON seeded into a fresh Chromium profile.
///
/// Turns on the extensions developer mode toggle, pins the devtools
/// panes open state, and suppresses the first-run chrome.
#[must_use]
pub fn chromium_preferences() -> Value {
    json!({
        "extensions": {
            "ui": {
                "developer_mode": true
            }
        },
        "devtools": {
            "preferences": {
                "currentDockState": "\"undocked\""
            }
        },
        "browser": {
            "show_home_button": false,
            "check_default_browser": false
        },
        "distribution": {
            "import_bookmarks": false,
            "make_chrome_default": false,
            "make_chrome_default_for_user": false,
            "skip_first_run_ui": true
        },
        "first_run_tabs": [],
        "session": {
            "restore_on_startup": 5
        }
    })
}

// ============================================================================
// Private Helpers
// ============================================================================

/// Escapes special characters for JavaScript strings.
fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_to_js_string() {
        assert_eq!(PrefValue::Bool(true).to_js_string(), "true");
        assert_eq!(PrefValue::Bool(false).to_js_string(), "false");
    }

    #[test]
    fn test_int_to_js_string() {
        assert_eq!(PrefValue::Int(15).to_js_string(), "15");
        assert_eq!(PrefValue::Int(-1).to_js_string(), "-1");
    }

    #[test]
    fn test_string_to_js_string() {
        assert_eq!(PrefValue::String("x".into()).to_js_string(), "\"x\"");
    }

    #[test]
    fn test_escape_js_string() {
        assert_eq!(
            escape_js_string("path\\to\n\"file\""),
            "path\\\\to\\n\\\"file\\\""
        );
    }

    #[test]
    fn test_user_pref_line() {
        let pref = FirefoxPref::new("devtools.debugger.remote-enabled", true);
        assert_eq!(
            pref.to_user_pref_line(),
            "user_pref(\"devtools.debugger.remote-enabled\", true);"
        );
    }

    #[test]
    fn test_firefox_dev_prefs_enable_debugging() {
        let prefs = firefox_dev_prefs();
        let remote = prefs
            .iter()
            .find(|p| p.key == "devtools.debugger.remote-enabled")
            .expect("remote debugging pref present");
        assert_eq!(remote.value, PrefValue::Bool(true));

        let signatures = prefs
            .iter()
            .find(|p| p.key == "xpinstall.signatures.required")
            .expect("signature pref present");
        assert_eq!(signatures.value, PrefValue::Bool(false));
    }

    #[test]
    fn test_firefox_user_js_is_line_per_pref() {
        let prefs = firefox_dev_prefs();
        let content = firefox_user_js(&prefs);
        let pref_lines = content
            .lines()
            .filter(|l| l.starts_with("user_pref("))
            .count();
        assert_eq!(pref_lines, prefs.len());
    }

    #[test]
    fn test_chromium_preferences_developer_mode() {
        let prefs = chromium_preferences();
        assert_eq!(
            prefs.pointer("/extensions/ui/developer_mode"),
            Some(&Value::Bool(true))
        );
    }
}
