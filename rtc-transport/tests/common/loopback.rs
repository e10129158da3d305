//! In-memory network and collaborator engines.
//!
//! Datagrams travel through a [`Hub`] shared by every socket factory of a
//! test, so two transports built from different factories can reach each
//! other. The ICE channel and reliability adapter here are deliberately
//! small: one-byte framing, no loss, no retransmission.

use bytes::{BufMut, BytesMut};
use log::trace;
use rtc_transport::allocator::{
    AllocatedPort, AllocatorStrategy, BasicPortAllocator, Network, NetworkManager,
    PacketSocketFactory, PortAllocator, PortAllocatorFlags,
};
use rtc_transport::candidate::{Candidate, CandidateConfig, CandidateType};
use rtc_transport::factory::TransportStack;
use rtc_transport::ice::channel_socket::ChannelSocketAdapter;
use rtc_transport::ice::{IceChannelEvent, IceTransportChannel};
use rtc_transport::reliability::ReliabilityAdapter;
use shared::error::{Error, Result};
use shared::{DatagramSocket, PacketSocket, StreamSocket, TaggedBytesMut};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;
use std::task::Poll;
use std::time::{Duration, Instant};

const ICE_PING: u8 = 1;
const ICE_PONG: u8 = 2;
const ICE_DATA: u8 = 3;

const SEG_SYN: u8 = 1;
const SEG_SYN_ACK: u8 = 2;
const SEG_DATA: u8 = 3;
const SEG_MAX_PAYLOAD: usize = 1200;

const EPHEMERAL_PORT_START: u16 = 49152;

/// Inboxes of every bound loopback address.
#[derive(Clone, Default)]
pub struct Hub {
    inboxes: Rc<RefCell<HashMap<SocketAddr, VecDeque<TaggedBytesMut>>>>,
}

impl Hub {
    fn bind(&self, addr: SocketAddr) -> bool {
        let mut inboxes = self.inboxes.borrow_mut();
        if inboxes.contains_key(&addr) {
            return false;
        }
        inboxes.insert(addr, VecDeque::new());
        true
    }

    fn unbind(&self, addr: SocketAddr) {
        self.inboxes.borrow_mut().remove(&addr);
    }

    fn deliver(&self, from: SocketAddr, to: SocketAddr, payload: &[u8]) {
        match self.inboxes.borrow_mut().get_mut(&to) {
            Some(inbox) => inbox.push_back(TaggedBytesMut::datagram(
                to,
                from,
                BytesMut::from(payload),
            )),
            None => trace!("dropping datagram {from} -> {to}, nobody bound"),
        }
    }

    fn take(&self, addr: SocketAddr) -> Option<TaggedBytesMut> {
        self.inboxes.borrow_mut().get_mut(&addr)?.pop_front()
    }

    pub fn bound_addrs(&self) -> usize {
        self.inboxes.borrow().len()
    }
}

pub struct LoopbackSocket {
    hub: Hub,
    local_addr: SocketAddr,
}

impl PacketSocket for LoopbackSocket {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_to(&mut self, payload: &[u8], peer_addr: SocketAddr) -> Result<usize> {
        self.hub.deliver(self.local_addr, peer_addr, payload);
        Ok(payload.len())
    }

    fn poll_recv(&mut self) -> Option<TaggedBytesMut> {
        self.hub.take(self.local_addr)
    }
}

impl Drop for LoopbackSocket {
    fn drop(&mut self) {
        self.hub.unbind(self.local_addr);
    }
}

pub struct LoopbackNetworkManager {
    networks: Vec<Network>,
}

impl LoopbackNetworkManager {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            networks: vec![Network::new("lo", ip)],
        }
    }
}

impl NetworkManager for LoopbackNetworkManager {
    fn networks(&self) -> Result<Vec<Network>> {
        Ok(self.networks.clone())
    }
}

pub struct LoopbackSocketFactory {
    hub: Hub,
}

impl LoopbackSocketFactory {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }
}

impl PacketSocketFactory for LoopbackSocketFactory {
    fn create_udp_socket(
        &self,
        ip: IpAddr,
        min_port: u16,
        max_port: u16,
    ) -> Result<Box<dyn PacketSocket>> {
        let start = if min_port == 0 {
            EPHEMERAL_PORT_START
        } else {
            min_port
        };
        let end = if max_port == 0 { u16::MAX } else { max_port };

        for port in start..=end {
            let local_addr = SocketAddr::new(ip, port);
            if self.hub.bind(local_addr) {
                return Ok(Box::new(LoopbackSocket {
                    hub: self.hub.clone(),
                    local_addr,
                }));
            }
        }
        Err(Error::ErrPortSpaceExhausted)
    }
}

/// Host gathering plus simulated server-reflexive and relayed candidates.
pub struct TraversalAllocator {
    inner: BasicPortAllocator,
    stun_servers: Vec<SocketAddr>,
    relay_servers: Vec<String>,
    public_ip: IpAddr,
}

impl PortAllocator for TraversalAllocator {
    fn set_flags(&mut self, flags: PortAllocatorFlags) {
        self.inner.set_flags(flags);
    }

    fn flags(&self) -> PortAllocatorFlags {
        self.inner.flags()
    }

    fn set_port_range(&mut self, min_port: u16, max_port: u16) {
        self.inner.set_port_range(min_port, max_port);
    }

    fn port_range(&self) -> (u16, u16) {
        self.inner.port_range()
    }

    fn allocate_ports(&mut self) -> Result<Vec<AllocatedPort>> {
        let flags = self.flags();
        let mut ports = self.inner.allocate_ports()?;

        for port in &mut ports {
            let base = port.socket.local_addr();
            if !flags.contains(PortAllocatorFlags::DISABLE_STUN) && !self.stun_servers.is_empty() {
                port.candidates.push(
                    CandidateConfig {
                        candidate_type: CandidateType::ServerReflexive,
                        address: Some(SocketAddr::new(self.public_ip, base.port())),
                        related_address: Some(base),
                        ..Default::default()
                    }
                    .new_candidate()?,
                );
            }
            if !flags.contains(PortAllocatorFlags::DISABLE_RELAY) && !self.relay_servers.is_empty()
            {
                port.candidates.push(
                    CandidateConfig {
                        candidate_type: CandidateType::Relay,
                        address: Some(SocketAddr::new(
                            self.public_ip,
                            base.port().wrapping_add(1),
                        )),
                        related_address: Some(base),
                        ..Default::default()
                    }
                    .new_candidate()?,
                );
            }
        }

        Ok(ports)
    }
}

/// Connectivity checks over the hub with a one-byte ping/pong.
pub struct LoopbackChannel {
    name: String,
    allocator: Box<dyn PortAllocator>,
    ports: Vec<AllocatedPort>,
    local_candidates: Vec<Candidate>,
    remote_candidates: Vec<Candidate>,
    selected: Option<(usize, SocketAddr)>,
    events: VecDeque<IceChannelEvent>,
    inbound: VecDeque<BytesMut>,
    signaling_ready: bool,
    fail_connectivity: bool,
    failure_reported: bool,
}

impl LoopbackChannel {
    fn ping_remote_candidates(&mut self) {
        for port in &mut self.ports {
            for candidate in &self.remote_candidates {
                let _ = port.socket.send_to(&[ICE_PING], candidate.address());
            }
        }
    }

    fn pump(&mut self) {
        for (index, port) in self.ports.iter_mut().enumerate() {
            while let Some(mut msg) = port.socket.poll_recv() {
                let peer_addr = msg.transport.peer_addr;
                let Some(&kind) = msg.message.first() else {
                    continue;
                };
                match kind {
                    ICE_PING => {
                        let _ = port.socket.send_to(&[ICE_PONG], peer_addr);
                        self.selected.get_or_insert((index, peer_addr));
                    }
                    ICE_PONG => {
                        self.selected.get_or_insert((index, peer_addr));
                    }
                    ICE_DATA => {
                        self.inbound.push_back(msg.message.split_off(1));
                    }
                    _ => trace!("[{}]: unknown datagram kind {}", self.name, kind),
                }
            }
        }
    }
}

impl IceTransportChannel for LoopbackChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<()> {
        self.ports = self.allocator.allocate_ports()?;
        self.local_candidates = self
            .ports
            .iter()
            .flat_map(|port| port.candidates.iter().cloned())
            .collect();
        self.events.push_back(IceChannelEvent::RequestSignaling);
        Ok(())
    }

    fn on_signaling_ready(&mut self) {
        if self.signaling_ready {
            return;
        }
        self.signaling_ready = true;
        for candidate in &self.local_candidates {
            self.events
                .push_back(IceChannelEvent::CandidateReady(candidate.clone()));
        }
    }

    fn add_remote_candidate(&mut self, candidate: Candidate) -> Result<()> {
        for port in &mut self.ports {
            let _ = port.socket.send_to(&[ICE_PING], candidate.address());
        }
        self.remote_candidates.push(candidate);
        Ok(())
    }

    fn poll_event(&mut self) -> Option<IceChannelEvent> {
        self.events.pop_front()
    }

    fn send(&mut self, payload: &[u8]) -> Result<usize> {
        let (index, peer_addr) = self.selected.ok_or(Error::ErrChannelNotWritable)?;
        let mut frame = BytesMut::with_capacity(payload.len() + 1);
        frame.put_u8(ICE_DATA);
        frame.put_slice(payload);
        self.ports[index].socket.send_to(&frame, peer_addr)?;
        Ok(payload.len())
    }

    fn recv(&mut self) -> Option<BytesMut> {
        self.pump();
        self.inbound.pop_front()
    }

    fn is_writable(&self) -> bool {
        self.selected.is_some()
    }

    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        if self.fail_connectivity {
            if !self.failure_reported {
                self.failure_reported = true;
                self.events.push_back(IceChannelEvent::ConnectionFailed);
            }
            return Ok(());
        }

        self.pump();
        if self.selected.is_none() {
            self.ping_remote_candidates();
        }
        Ok(())
    }
}

/// Settings a reliability adapter was configured with.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReliabilitySettings {
    pub receive_buffer_size: usize,
    pub send_buffer_size: usize,
    pub no_delay: bool,
    pub ack_delay: Duration,
}

/// SYN / SYN-ACK handshake, then unacknowledged data segments.
pub struct LoopbackReliability {
    socket: ChannelSocketAdapter,
    settings: Rc<RefCell<ReliabilitySettings>>,
    fail_handshake: bool,
    syn_sent: bool,
    established: bool,
    reported: bool,
    received: VecDeque<u8>,
}

impl LoopbackReliability {
    fn try_send_syn(&mut self) {
        if !self.syn_sent && !self.established && self.socket.is_writable() {
            self.syn_sent = self.socket.send(&[SEG_SYN]).is_ok();
        }
    }

    fn pump(&mut self) {
        while let Some(segment) = self.socket.recv() {
            let Some((&kind, payload)) = segment.split_first() else {
                continue;
            };
            match kind {
                SEG_SYN => {
                    let _ = self.socket.send(&[SEG_SYN_ACK]);
                    self.established = true;
                }
                SEG_SYN_ACK => self.established = true,
                SEG_DATA => {
                    self.established = true;
                    self.received.extend(payload);
                }
                _ => trace!("unknown segment kind {kind}"),
            }
        }
    }
}

impl io::Read for LoopbackReliability {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.pump();
        if self.received.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(self.received.len());
        for (dst, src) in buf.iter_mut().zip(self.received.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl io::Write for LoopbackReliability {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.established {
            return Err(Error::ErrSocketNotConnected.into());
        }
        for chunk in buf.chunks(SEG_MAX_PAYLOAD) {
            let mut segment = BytesMut::with_capacity(chunk.len() + 1);
            segment.put_u8(SEG_DATA);
            segment.put_slice(chunk);
            self.socket.send(&segment)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StreamSocket for LoopbackReliability {
    fn is_connected(&self) -> bool {
        self.established && self.socket.is_writable()
    }

    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        self.try_send_syn();
        self.pump();
        Ok(())
    }
}

impl ReliabilityAdapter for LoopbackReliability {
    fn set_receive_buffer_size(&mut self, size: usize) -> bool {
        self.settings.borrow_mut().receive_buffer_size = size;
        true
    }

    fn set_send_buffer_size(&mut self, size: usize) -> bool {
        self.settings.borrow_mut().send_buffer_size = size;
        true
    }

    fn set_no_delay(&mut self, no_delay: bool) {
        self.settings.borrow_mut().no_delay = no_delay;
    }

    fn set_ack_delay(&mut self, delay: Duration) {
        self.settings.borrow_mut().ack_delay = delay;
    }

    fn connect(&mut self) -> Poll<Result<()>> {
        if self.fail_handshake {
            return Poll::Ready(Err(Error::ErrReliabilityHandshakeFailed));
        }
        self.try_send_syn();
        Poll::Pending
    }

    fn poll_connect(&mut self) -> Option<Result<()>> {
        self.pump();
        self.try_send_syn();
        if self.established && !self.reported {
            self.reported = true;
            return Some(Ok(()));
        }
        None
    }

    fn into_stream_socket(self: Box<Self>) -> Box<dyn StreamSocket> {
        self
    }
}

/// Failure injection for a [`LoopbackStack`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Faults {
    pub fail_connectivity: bool,
    pub fail_reliability: bool,
}

/// Builds loopback engines. Records every reliability configuration and
/// every allocator strategy it was asked for.
pub struct LoopbackStack {
    public_ip: IpAddr,
    stun_servers: Vec<SocketAddr>,
    faults: Faults,
    pub strategies: RefCell<Vec<AllocatorStrategy>>,
    pub reliability_settings: RefCell<Vec<Rc<RefCell<ReliabilitySettings>>>>,
}

impl LoopbackStack {
    pub fn new(public_ip: IpAddr) -> Self {
        Self {
            public_ip,
            stun_servers: vec![],
            faults: Faults::default(),
            strategies: RefCell::new(vec![]),
            reliability_settings: RefCell::new(vec![]),
        }
    }

    /// STUN servers the allocator knows about regardless of configuration.
    pub fn with_stun_servers(mut self, stun_servers: Vec<SocketAddr>) -> Self {
        self.stun_servers = stun_servers;
        self
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }
}

impl TransportStack for LoopbackStack {
    fn new_port_allocator(
        &self,
        strategy: &AllocatorStrategy,
        network_manager: &Rc<dyn NetworkManager>,
        socket_factory: &Rc<dyn PacketSocketFactory>,
    ) -> Result<Box<dyn PortAllocator>> {
        self.strategies.borrow_mut().push(strategy.clone());

        let mut stun_servers = self.stun_servers.clone();
        let mut relay_servers = vec![];
        if let AllocatorStrategy::Traversal {
            stun_servers: configured_stun,
            relay_servers: configured_relay,
        } = strategy
        {
            stun_servers.extend(configured_stun);
            relay_servers.extend(configured_relay.iter().cloned());
        }

        Ok(Box::new(TraversalAllocator {
            inner: BasicPortAllocator::new(
                Rc::clone(network_manager),
                Rc::clone(socket_factory),
            ),
            stun_servers,
            relay_servers,
            public_ip: self.public_ip,
        }))
    }

    fn new_transport_channel(
        &self,
        name: &str,
        allocator: Box<dyn PortAllocator>,
    ) -> Result<Box<dyn IceTransportChannel>> {
        Ok(Box::new(LoopbackChannel {
            name: name.to_owned(),
            allocator,
            ports: vec![],
            local_candidates: vec![],
            remote_candidates: vec![],
            selected: None,
            events: VecDeque::new(),
            inbound: VecDeque::new(),
            signaling_ready: false,
            fail_connectivity: self.faults.fail_connectivity,
            failure_reported: false,
        }))
    }

    fn new_reliability_adapter(
        &self,
        socket: ChannelSocketAdapter,
    ) -> Result<Box<dyn ReliabilityAdapter>> {
        let settings = Rc::new(RefCell::new(ReliabilitySettings::default()));
        self.reliability_settings
            .borrow_mut()
            .push(Rc::clone(&settings));

        Ok(Box::new(LoopbackReliability {
            socket,
            settings,
            fail_handshake: self.faults.fail_reliability,
            syn_sent: false,
            established: false,
            reported: false,
            received: VecDeque::new(),
        }))
    }
}
