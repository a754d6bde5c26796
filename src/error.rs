//! Error types for the session orchestrator.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use extension_dev::{Result, Error};
//!
//! async fn example(registry: &Registry) -> Result<()> {
//!     let instance = registry.create_instance(Browser::Chrome, "./app", None)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Resource exhaustion | [`Error::PortExhausted`], [`Error::LockContended`] |
//! | Binary/profile | [`Error::BinaryNotFound`], [`Error::SignedBuildRejected`], [`Error::Profile`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::DebuggingNotEnabled`] |
//! | Protocol | [`Error::Protocol`], [`Error::Frame`], [`Error::ActorUnavailable`], [`Error::CommandUnsupported`] |
//! | Execution | [`Error::Timeout`], [`Error::RequestTimeout`], [`Error::ProcessLaunchFailed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Resource-exhaustion and binary/profile variants are fatal and carry
//! remediation text. Connection and actor errors are transient: callers
//! retry them with bounded backoff before escalating.
//! [`Error::CommandUnsupported`] marks an optional protocol feature
//! missing from an older browser and always triggers a fallback rather
//! than aborting the operation.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Resource Exhaustion
    // ========================================================================
    /// No free port found scanning upward from the base.
    ///
    /// Every candidate in the scan range failed the bind probe or was
    /// registered to another running instance.
    #[error("No free port found after {attempts} candidates starting at {base}")]
    PortExhausted {
        /// First port probed.
        base: u16,
        /// Number of candidates tried.
        attempts: u32,
    },

    /// Registry lock could not be acquired within the attempt bound.
    ///
    /// Another development session is holding the lock, or a stale lock
    /// file was left behind by a crashed process.
    #[error(
        "Could not lock instance registry at {path} after {attempts} attempts. \
         Another session may be starting; if not, delete the lock file."
    )]
    LockContended {
        /// Lock file path.
        path: PathBuf,
        /// Number of acquisition attempts made.
        attempts: u32,
    },

    // ========================================================================
    // Configuration & Binary Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Profile error.
    ///
    /// Returned when profile creation or preference seeding fails.
    #[error("Profile error: {message}")]
    Profile {
        /// Description of the profile error.
        message: String,
    },

    /// Browser binary not found.
    #[error(
        "{browser} binary not found at: {path}\n\
         Install the browser or pass an explicit binary path."
    )]
    BinaryNotFound {
        /// Browser that was being resolved.
        browser: String,
        /// Path where the binary was expected.
        path: PathBuf,
    },

    /// Detected Chrome binary is the officially-signed build.
    ///
    /// The signed build refuses `--load-extension`, so unpacked
    /// extensions cannot be developed against it.
    #[error(
        "The Chrome at {path} ({version}) is the official signed build, which blocks \
         loading unpacked extensions.\n\
         Install \"Chrome for Testing\" or point to a Chromium build instead."
    )]
    SignedBuildRejected {
        /// Path of the rejected binary.
        path: PathBuf,
        /// Version string reported by the binary.
        version: String,
    },

    /// Failed to launch the browser process.
    #[error("Failed to launch browser: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection establishment timed out.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The browser's debugging endpoint never became reachable.
    ///
    /// Raised after the bounded reachability poll is exhausted.
    #[error(
        "Debugging endpoint on port {port} not reachable after {attempts} attempts. \
         The browser may not have debugging enabled."
    )]
    DebuggingNotEnabled {
        /// Debug-protocol port that was polled.
        port: u16,
        /// Number of poll attempts made.
        attempts: u32,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected response.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Malformed remote-debugging wire frame.
    #[error("Frame error: {message}")]
    Frame {
        /// Description of the framing fault.
        message: String,
    },

    /// A remote actor is not (yet) available.
    ///
    /// Transient during browser startup; retried with fixed delay.
    #[error("Actor not available: {actor}")]
    ActorUnavailable {
        /// Actor name or role that was requested.
        actor: String,
    },

    /// The remote browser does not support a protocol command.
    ///
    /// Always handled by falling back to an alternative mechanism;
    /// never surfaced to the developer as a failure.
    #[error("Command not supported by this browser: {method}")]
    CommandUnsupported {
        /// The unsupported command or domain.
        method: String,
    },

    /// The extension target never appeared.
    ///
    /// Raised when every discovery strategy has been exhausted.
    #[error("Extension not discovered: {message}")]
    ExtensionNotDiscovered {
        /// Description of the discovery failure.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Command request timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: u64,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Registry entry not found.
    #[error("Instance not found: {instance_id}")]
    InstanceNotFound {
        /// The missing instance ID.
        instance_id: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a profile error.
    #[inline]
    pub fn profile(message: impl Into<String>) -> Self {
        Self::Profile {
            message: message.into(),
        }
    }

    /// Creates a binary-not-found error.
    #[inline]
    pub fn binary_not_found(browser: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::BinaryNotFound {
            browser: browser.into(),
            path: path.into(),
        }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(err: IoError) -> Self {
        Self::ProcessLaunchFailed {
            message: err.to_string(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a framing error.
    #[inline]
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Creates an actor-unavailable error.
    #[inline]
    pub fn actor_unavailable(actor: impl Into<String>) -> Self {
        Self::ActorUnavailable {
            actor: actor.into(),
        }
    }

    /// Creates a command-unsupported error.
    #[inline]
    pub fn command_unsupported(method: impl Into<String>) -> Self {
        Self::CommandUnsupported {
            method: method.into(),
        }
    }

    /// Creates an extension-not-discovered error.
    #[inline]
    pub fn extension_not_discovered(message: impl Into<String>) -> Self {
        Self::ExtensionNotDiscovered {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: u64, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates an instance-not-found error.
    #[inline]
    pub fn instance_not_found(instance_id: impl Into<String>) -> Self {
        Self::InstanceNotFound {
            instance_id: instance_id.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::Timeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::DebuggingNotEnabled { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is transient.
    ///
    /// Transient errors may succeed on retry with backoff.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::Connection { .. }
                | Self::Timeout { .. }
                | Self::RequestTimeout { .. }
                | Self::ActorUnavailable { .. }
        )
    }

    /// Returns `true` if this is resource exhaustion.
    ///
    /// Resource-exhaustion errors are fatal and must not be retried.
    #[inline]
    #[must_use]
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::PortExhausted { .. } | Self::LockContended { .. }
        )
    }

    /// Returns `true` if the remote browser lacks an optional feature.
    ///
    /// Callers degrade to a fallback instead of failing.
    #[inline]
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::CommandUnsupported { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing binary path");
        assert_eq!(err.to_string(), "Configuration error: missing binary path");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 5000 };
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 1000 };
        let closed_err = Error::ConnectionClosed;
        let debug_err = Error::DebuggingNotEnabled {
            port: 9222,
            attempts: 50,
        };
        let other_err = Error::config("test");

        assert!(conn_err.is_connection_error());
        assert!(timeout_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(debug_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_is_transient() {
        let actor_err = Error::actor_unavailable("addons");
        let lock_err = Error::LockContended {
            path: "/tmp/registry.lock".into(),
            attempts: 10,
        };

        assert!(actor_err.is_transient());
        assert!(!lock_err.is_transient());
    }

    #[test]
    fn test_is_resource_exhaustion() {
        let port_err = Error::PortExhausted {
            base: 8080,
            attempts: 100,
        };
        let lock_err = Error::LockContended {
            path: "/tmp/registry.lock".into(),
            attempts: 10,
        };
        let conn_err = Error::connection("test");

        assert!(port_err.is_resource_exhaustion());
        assert!(lock_err.is_resource_exhaustion());
        assert!(!conn_err.is_resource_exhaustion());
    }

    #[test]
    fn test_is_unsupported() {
        let err = Error::command_unsupported("Extensions.loadUnpacked");
        assert!(err.is_unsupported());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_signed_build_rejected_mentions_remediation() {
        let err = Error::SignedBuildRejected {
            path: "/usr/bin/google-chrome".into(),
            version: "Google Chrome 140.0".into(),
        };
        assert!(err.to_string().contains("Chrome for Testing"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
