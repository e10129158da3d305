//! Candidate allocation collaborators.
//!
//! The transport never enumerates interfaces or binds sockets itself. The
//! owner supplies a [`NetworkManager`] and a [`PacketSocketFactory`] once, at
//! factory construction, and each stream transport hands them to the
//! [`PortAllocator`] built by its [`TransportStack`](crate::factory::TransportStack).


use crate::candidate::Candidate;
use crate::config::TransportConfig;
use log::{debug, warn};
use shared::PacketSocket;
use shared::error::*;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

bitflags::bitflags! {
    /// Gathering phases a [`PortAllocator`] must skip.
    #[derive(Default)]
    pub struct PortAllocatorFlags: u32 {
        const DISABLE_UDP = 0x01;
        const DISABLE_STUN = 0x02;
        const DISABLE_RELAY = 0x04;
        const DISABLE_TCP = 0x08;
    }
}

/// A local network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub ip: IpAddr,
}

impl Network {
    pub fn new(name: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            name: name.into(),
            ip,
        }
    }
}

/// Enumerates the interfaces host candidates are gathered on.
pub trait NetworkManager {
    fn networks(&self) -> Result<Vec<Network>>;
}

/// Creates raw datagram sockets for candidate gathering.
pub trait PacketSocketFactory {
    /// Binds a UDP socket on `ip` with a port in `[min_port, max_port]`.
    /// A zero bound means "any".
    fn create_udp_socket(
        &self,
        ip: IpAddr,
        min_port: u16,
        max_port: u16,
    ) -> Result<Box<dyn PacketSocket>>;
}

/// A bound socket together with the local candidates it serves.
pub struct AllocatedPort {
    pub network: Network,
    pub socket: Box<dyn PacketSocket>,
    pub candidates: Vec<Candidate>,
}

/// Produces local candidates for one ICE transport channel.
pub trait PortAllocator {
    fn set_flags(&mut self, flags: PortAllocatorFlags);

    fn flags(&self) -> PortAllocatorFlags;

    /// Restricts local ports to `[min_port, max_port]`. Zero means unbounded.
    fn set_port_range(&mut self, min_port: u16, max_port: u16);

    fn port_range(&self) -> (u16, u16);

    /// Binds sockets and gathers candidates, honoring flags and port range.
    fn allocate_ports(&mut self) -> Result<Vec<AllocatedPort>>;
}

/// Gathers UDP host candidates on every interface the network manager
/// reports.
///
/// Server-reflexive and relayed gathering need a STUN or TURN client, which
/// this allocator does not have; those phases are skipped whatever the flags
/// say.
pub struct BasicPortAllocator {
    network_manager: Rc<dyn NetworkManager>,
    socket_factory: Rc<dyn PacketSocketFactory>,
    flags: PortAllocatorFlags,
    min_port: u16,
    max_port: u16,
}

impl BasicPortAllocator {
    pub fn new(
        network_manager: Rc<dyn NetworkManager>,
        socket_factory: Rc<dyn PacketSocketFactory>,
    ) -> Self {
        Self {
            network_manager,
            socket_factory,
            flags: PortAllocatorFlags::default(),
            min_port: 0,
            max_port: 0,
        }
    }
}

impl PortAllocator for BasicPortAllocator {
    fn set_flags(&mut self, flags: PortAllocatorFlags) {
        self.flags = flags;
    }

    fn flags(&self) -> PortAllocatorFlags {
        self.flags
    }

    fn set_port_range(&mut self, min_port: u16, max_port: u16) {
        self.min_port = min_port;
        self.max_port = max_port;
    }

    fn port_range(&self) -> (u16, u16) {
        (self.min_port, self.max_port)
    }

    fn allocate_ports(&mut self) -> Result<Vec<AllocatedPort>> {
        if self.flags.contains(PortAllocatorFlags::DISABLE_UDP) {
            debug!("UDP gathering disabled, no host candidates");
            return Ok(vec![]);
        }
        if !self
            .flags
            .contains(PortAllocatorFlags::DISABLE_STUN | PortAllocatorFlags::DISABLE_RELAY)
        {
            debug!("basic allocator skips server-reflexive and relayed gathering");
        }

        let mut ports = vec![];
        for network in self.network_manager.networks()? {
            let socket = match self.socket_factory.create_udp_socket(
                network.ip,
                self.min_port,
                self.max_port,
            ) {
                Ok(socket) => socket,
                Err(err) => {
                    warn!("failed to bind on {} ({}): {}", network.name, network.ip, err);
                    continue;
                }
            };

            let candidate = Candidate::host(socket.local_addr())?;
            debug!("gathered {} on {}", candidate, network.name);
            ports.push(AllocatedPort {
                network,
                socket,
                candidates: vec![candidate],
            });
        }

        if ports.is_empty() {
            return Err(Error::ErrNoInterface);
        }
        Ok(ports)
    }
}

/// How candidates are gathered for one connect attempt.
///
/// Chosen once from the immutable [`TransportConfig`] when `connect` runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocatorStrategy {
    /// Host candidates only. No server-reflexive or relayed discovery.
    LocalOnly,
    /// Host, server-reflexive and relayed candidates.
    Traversal {
        stun_servers: Vec<SocketAddr>,
        relay_servers: Vec<String>,
    },
}

impl fmt::Display for AllocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocatorStrategy::LocalOnly => write!(f, "local-only"),
            AllocatorStrategy::Traversal {
                stun_servers,
                relay_servers,
            } => write!(
                f,
                "traversal ({} stun, {} relay)",
                stun_servers.len(),
                relay_servers.len()
            ),
        }
    }
}

impl AllocatorStrategy {
    pub fn select(config: &TransportConfig) -> Self {
        if config.nat_traversal {
            AllocatorStrategy::Traversal {
                stun_servers: config.stun_servers.clone(),
                relay_servers: config.relay_servers.clone(),
            }
        } else {
            AllocatorStrategy::LocalOnly
        }
    }

    /// Allocator flags for this strategy. Raw TCP candidates are always off.
    pub fn flags(&self) -> PortAllocatorFlags {
        match self {
            AllocatorStrategy::LocalOnly => {
                PortAllocatorFlags::DISABLE_TCP
                    | PortAllocatorFlags::DISABLE_STUN
                    | PortAllocatorFlags::DISABLE_RELAY
            }
            AllocatorStrategy::Traversal { .. } => PortAllocatorFlags::DISABLE_TCP,
        }
    }

    pub fn is_traversal(&self) -> bool {
        matches!(self, AllocatorStrategy::Traversal { .. })
    }
}
