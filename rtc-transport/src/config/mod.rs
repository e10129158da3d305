//! Per-channel transport configuration.
//!
//! ```rust
//! use rtc_transport::config::TransportConfig;
//!
//! let config = TransportConfig::default()
//!     .with_nat_traversal(true)
//!     .with_port_range(40000, 40100)
//!     .with_stun_servers(vec!["192.0.2.1:3478".parse().unwrap()]);
//! assert!(config.validate().is_ok());
//! ```


use serde::{Deserialize, Serialize};
use shared::error::*;
use std::net::SocketAddr;

/// Configuration of one stream transport.
///
/// Supplied once to `initialize` and never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Gather server-reflexive and relayed candidates in addition to host
    /// candidates.
    ///
    /// Default: false
    pub nat_traversal: bool,

    /// Lowest local port candidates may bind. Zero means unbounded.
    pub min_port: u16,

    /// Highest local port candidates may bind. Zero means unbounded.
    pub max_port: u16,

    /// STUN servers used for server-reflexive discovery.
    pub stun_servers: Vec<SocketAddr>,

    /// Relay servers used for relayed candidates, as `host[:port]`.
    pub relay_servers: Vec<String>,
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nat_traversal(mut self, nat_traversal: bool) -> Self {
        self.nat_traversal = nat_traversal;
        self
    }

    pub fn with_port_range(mut self, min_port: u16, max_port: u16) -> Self {
        self.min_port = min_port;
        self.max_port = max_port;
        self
    }

    pub fn with_stun_servers(mut self, stun_servers: Vec<SocketAddr>) -> Self {
        self.stun_servers = stun_servers;
        self
    }

    pub fn with_relay_servers(mut self, relay_servers: Vec<String>) -> Self {
        self.relay_servers = relay_servers;
        self
    }

    /// Checks the port range. A zero bound on either side is unbounded.
    pub fn validate(&self) -> Result<()> {
        if self.min_port != 0 && self.max_port != 0 && self.max_port < self.min_port {
            return Err(Error::ErrEndPortLessThanStart);
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(Error::from_std)?;
        config.validate()?;
        Ok(config)
    }
}
