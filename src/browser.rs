//! Browser identification and protocol family selection.
//!
//! A development session targets one [`Browser`]. The browser determines
//! which [`BrowserFamily`], and therefore which debugging protocol, the
//! session speaks: Chromium-family browsers expose the DevTools protocol
//! over WebSocket, Gecko-family browsers expose the remote debugging
//! protocol over raw TCP.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Browser
// ============================================================================

/// The browser a development session runs against.
///
/// `ChromiumBased` and `GeckoBased` cover vendor forks launched through a
/// user-supplied binary path (Brave, Opera, Waterfox, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Browser {
    /// Google Chrome ("for Testing" builds only).
    Chrome,
    /// Microsoft Edge.
    Edge,
    /// Open-source Chromium.
    Chromium,
    /// Mozilla Firefox.
    Firefox,
    /// Any other Chromium fork with a user-supplied binary.
    ChromiumBased,
    /// Any other Gecko fork with a user-supplied binary.
    GeckoBased,
}

// ============================================================================
// BrowserFamily
// ============================================================================

/// Protocol family a browser belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserFamily {
    /// DevTools protocol over WebSocket.
    Chromium,
    /// Remote debugging protocol over TCP.
    Gecko,
}

// ============================================================================
// Browser - Methods
// ============================================================================

impl Browser {
    /// Returns the protocol family for this browser.
    #[inline]
    #[must_use]
    pub const fn family(self) -> BrowserFamily {
        match self {
            Self::Chrome | Self::Edge | Self::Chromium | Self::ChromiumBased => {
                BrowserFamily::Chromium
            }
            Self::Firefox | Self::GeckoBased => BrowserFamily::Gecko,
        }
    }

    /// Returns the canonical lowercase name.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Edge => "edge",
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::ChromiumBased => "chromium-based",
            Self::GeckoBased => "gecko-based",
        }
    }

    /// Returns `true` if this browser requires a user-supplied binary.
    #[inline]
    #[must_use]
    pub const fn requires_explicit_binary(self) -> bool {
        matches!(self, Self::ChromiumBased | Self::GeckoBased)
    }
}

// ============================================================================
// Browser - Trait Implementations
// ============================================================================

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Browser {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chrome" => Ok(Self::Chrome),
            "edge" => Ok(Self::Edge),
            "chromium" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            "chromium-based" => Ok(Self::ChromiumBased),
            "gecko-based" => Ok(Self::GeckoBased),
            other => Err(Error::config(format!("Unknown browser: {other}"))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_mapping() {
        assert_eq!(Browser::Chrome.family(), BrowserFamily::Chromium);
        assert_eq!(Browser::Edge.family(), BrowserFamily::Chromium);
        assert_eq!(Browser::Chromium.family(), BrowserFamily::Chromium);
        assert_eq!(Browser::ChromiumBased.family(), BrowserFamily::Chromium);
        assert_eq!(Browser::Firefox.family(), BrowserFamily::Gecko);
        assert_eq!(Browser::GeckoBased.family(), BrowserFamily::Gecko);
    }

    #[test]
    fn test_name_round_trip() {
        for browser in [
            Browser::Chrome,
            Browser::Edge,
            Browser::Chromium,
            Browser::Firefox,
            Browser::ChromiumBased,
            Browser::GeckoBased,
        ] {
            let parsed: Browser = browser.name().parse().expect("parse name");
            assert_eq!(parsed, browser);
        }
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("safari".parse::<Browser>().is_err());
    }

    #[test]
    fn test_serde_kebab_case() {
        let json = serde_json::to_string(&Browser::ChromiumBased).expect("serialize");
        assert_eq!(json, "\"chromium-based\"");

        let parsed: Browser = serde_json::from_str("\"gecko-based\"").expect("parse");
        assert_eq!(parsed, Browser::GeckoBased);
    }

    #[test]
    fn test_requires_explicit_binary() {
        assert!(Browser::ChromiumBased.requires_explicit_binary());
        assert!(Browser::GeckoBased.requires_explicit_binary());
        assert!(!Browser::Chrome.requires_explicit_binary());
        assert!(!Browser::Firefox.requires_explicit_binary());
    }
}
