//! The send-target value object.
//!
//! An [`Endpoint`] is the `{host, port}` pair currently designated as the
//! UDP send target.  It is produced by the settings layer whenever the user
//! edits the connection configuration; the transport never owns or mutates
//! one, it only reads the latest published snapshot.
//!
//! There is no "unset" sentinel value: a resolver that has never observed a
//! valid target yields `Option::<Endpoint>::None`, which callers turn into
//! an unresolved-endpoint failure before any socket is touched.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for endpoint construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// The host string is empty or whitespace-only.
    #[error("endpoint host must not be empty")]
    EmptyHost,

    /// Port 0 is reserved and never a valid send target.
    #[error("endpoint port must be in 1..=65535")]
    ZeroPort,
}

/// The `{host, port}` pair a datagram is sent to.
///
/// `host` is either an IP address literal or a resolvable hostname; the
/// actual address resolution happens at send time inside the sender, so a
/// hostname that stops resolving simply produces a transport failure for
/// that send instead of poisoning the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates a validated endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::EmptyHost`] for a blank host and
    /// [`EndpointError::ZeroPort`] for port 0.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, EndpointError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(EndpointError::EmptyHost);
        }
        if port == 0 {
            return Err(EndpointError::ZeroPort);
        }
        Ok(Self { host, port })
    }

    /// The target host (IP literal or hostname).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The target UDP port (always non-zero).
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_ip_literal_and_port() {
        // Arrange / Act
        let ep = Endpoint::new("192.168.1.50", 7777).expect("valid endpoint");

        // Assert
        assert_eq!(ep.host(), "192.168.1.50");
        assert_eq!(ep.port(), 7777);
    }

    #[test]
    fn test_new_accepts_hostname() {
        let ep = Endpoint::new("gaming-pc.local", 5055).expect("valid endpoint");
        assert_eq!(ep.host(), "gaming-pc.local");
    }

    #[test]
    fn test_new_rejects_empty_host() {
        let result = Endpoint::new("", 5055);
        assert_eq!(result, Err(EndpointError::EmptyHost));
    }

    #[test]
    fn test_new_rejects_whitespace_host() {
        let result = Endpoint::new("   ", 5055);
        assert_eq!(result, Err(EndpointError::EmptyHost));
    }

    #[test]
    fn test_new_rejects_port_zero() {
        let result = Endpoint::new("192.168.1.50", 0);
        assert_eq!(result, Err(EndpointError::ZeroPort));
    }

    #[test]
    fn test_display_renders_host_colon_port() {
        let ep = Endpoint::new("10.0.0.2", 24900).unwrap();
        assert_eq!(ep.to_string(), "10.0.0.2:24900");
    }
}
