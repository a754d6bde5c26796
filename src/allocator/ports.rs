//! Port allocation with live bind probes.
//!
//! The registry alone cannot answer "is this port free": its entries go
//! stale when a browser crashes, and processes outside this tool occupy
//! ports it never recorded. Every candidate therefore passes a real
//! bind/listen probe in addition to the registry check, and the probe
//! socket is closed immediately so the browser can take the port.
//!
//! Control ports (debug protocol) and WebSocket ports (HMR transport)
//! scan upward from independent bases.

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, TcpListener};

use tracing::{debug, trace};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default base for debug-protocol port scans.
pub const DEFAULT_CONTROL_BASE: u16 = 8080;

/// Default base for HMR WebSocket port scans.
pub const DEFAULT_WEBSOCKET_BASE: u16 = 9000;

/// Candidates probed before declaring exhaustion.
const MAX_SCAN_ATTEMPTS: u32 = 100;

// ============================================================================
// PortBases
// ============================================================================

/// Scan bases for the two port kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBases {
    /// First candidate for the debug-protocol port.
    pub control: u16,
    /// First candidate for the HMR WebSocket port.
    pub websocket: u16,
}

impl Default for PortBases {
    fn default() -> Self {
        Self {
            control: DEFAULT_CONTROL_BASE,
            websocket: DEFAULT_WEBSOCKET_BASE,
        }
    }
}

// ============================================================================
// Probing
// ============================================================================

/// Returns `true` if the port can be bound on loopback right now.
///
/// Probes IPv4 and, where the host supports it, IPv6. A port held on
/// either stack is reported in use; hosts without IPv6 simply skip that
/// half of the check.
#[must_use]
pub fn port_is_free(port: u16) -> bool {
    match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
        Ok(listener) => drop(listener),
        Err(_) => return false,
    }

    match TcpListener::bind((Ipv6Addr::LOCALHOST, port)) {
        Ok(listener) => {
            drop(listener);
            true
        }
        // No IPv6 stack on this host; the IPv4 probe decides.
        Err(e) if e.kind() == ErrorKind::AddrNotAvailable => true,
        Err(e) if e.raw_os_error() == Some(unsupported_af_errno()) => true,
        Err(_) => false,
    }
}

#[cfg(unix)]
const fn unsupported_af_errno() -> i32 {
    libc::EAFNOSUPPORT
}

#[cfg(windows)]
const fn unsupported_af_errno() -> i32 {
    // WSAEAFNOSUPPORT
    10047
}

// ============================================================================
// Allocation
// ============================================================================

/// Allocates a port, honoring an explicit request when possible.
///
/// A requested port is accepted only if it passes the bind probe and is
/// not registered to a running instance; an unusable request falls back
/// to the scan. The scan walks upward from `base`, skipping registered
/// ports, probing each remaining candidate.
///
/// # Errors
///
/// Returns [`Error::PortExhausted`] when no candidate in the scan range
/// is usable.
pub fn allocate_port(
    requested: Option<u16>,
    base: u16,
    registered: &HashSet<u16>,
) -> Result<u16> {
    if let Some(port) = requested {
        if !registered.contains(&port) && port_is_free(port) {
            debug!(port, "Requested port accepted");
            return Ok(port);
        }
        debug!(port, "Requested port unavailable, scanning from base");
    }

    for offset in 0..MAX_SCAN_ATTEMPTS {
        let Some(candidate) = base.checked_add(offset as u16) else {
            break;
        };

        if registered.contains(&candidate) {
            trace!(port = candidate, "Skipping registered port");
            continue;
        }

        if port_is_free(candidate) {
            debug!(port = candidate, "Allocated port");
            return Ok(candidate);
        }

        trace!(port = candidate, "Port externally occupied");
    }

    Err(Error::PortExhausted {
        base,
        attempts: MAX_SCAN_ATTEMPTS,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Binds an ephemeral port and keeps the listener alive.
    fn hold_port() -> (TcpListener, u16) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        (listener, port)
    }

    #[test]
    fn test_free_port_is_free() {
        let (listener, port) = hold_port();
        drop(listener);
        assert!(port_is_free(port));
    }

    #[test]
    fn test_held_port_is_not_free() {
        let (_listener, port) = hold_port();
        assert!(!port_is_free(port));
    }

    #[test]
    fn test_requested_port_accepted_when_free() {
        let (listener, port) = hold_port();
        drop(listener);

        let allocated =
            allocate_port(Some(port), DEFAULT_CONTROL_BASE, &HashSet::new()).expect("allocate");
        assert_eq!(allocated, port);
    }

    #[test]
    fn test_requested_port_rejected_when_registered() {
        // Keep the requested port held so neither the registry check
        // nor the scan can hand it back.
        let (_holder, port) = hold_port();

        let mut registered = HashSet::new();
        registered.insert(port);

        let (base_listener, base) = hold_port();
        drop(base_listener);
        let allocated = allocate_port(Some(port), base, &registered).expect("allocate");
        assert_ne!(allocated, port);
    }

    #[test]
    fn test_scan_from_default_base_skips_registered() {
        let registered: HashSet<u16> = [8080, 8081].into_iter().collect();
        let allocated = allocate_port(None, 8080, &registered).expect("allocate");
        // 8082, or the next externally-free port above it.
        assert!(allocated >= 8082);
        assert!(!registered.contains(&allocated));
    }

    #[test]
    fn test_scan_skips_registered_ports() {
        // Find a base where base and base+1 are registerable.
        let (listener, base) = hold_port();
        drop(listener);

        let mut registered = HashSet::new();
        registered.insert(base);
        registered.insert(base + 1);

        let allocated = allocate_port(None, base, &registered).expect("allocate");
        assert!(allocated >= base + 2, "got {allocated}, base {base}");
    }

    #[test]
    fn test_scan_skips_externally_held_port() {
        let (_held, base) = hold_port();

        let allocated = allocate_port(None, base, &HashSet::new()).expect("allocate");
        assert!(allocated > base);
    }

    #[test]
    fn test_exhaustion_near_u16_max() {
        let mut registered = HashSet::new();
        for port in 65530..=u16::MAX {
            registered.insert(port);
        }

        let err = allocate_port(None, 65530, &registered).expect_err("must exhaust");
        assert!(err.is_resource_exhaustion());
    }
}
