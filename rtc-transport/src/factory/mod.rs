
use crate::allocator::{AllocatorStrategy, NetworkManager, PacketSocketFactory, PortAllocator};
use crate::ice::IceTransportChannel;
use crate::ice::channel_socket::ChannelSocketAdapter;
use crate::reliability::ReliabilityAdapter;
use crate::stream_transport::StreamTransport;
use log::{debug, error};
use shared::error::*;
use std::rc::Rc;

/// Builds the external engines a stream transport drives.
///
/// Implementations bind the transport to a concrete ICE agent, reliability
/// protocol and socket layer.
pub trait TransportStack {
    /// Creates the candidate allocator for one connect attempt. The transport
    /// applies the strategy's flags and the configured port range afterwards.
    fn new_port_allocator(
        &self,
        strategy: &AllocatorStrategy,
        network_manager: &Rc<dyn NetworkManager>,
        socket_factory: &Rc<dyn PacketSocketFactory>,
    ) -> Result<Box<dyn PortAllocator>>;

    /// Creates an ICE transport channel named `name` gathering through
    /// `allocator`.
    fn new_transport_channel(
        &self,
        name: &str,
        allocator: Box<dyn PortAllocator>,
    ) -> Result<Box<dyn IceTransportChannel>>;

    /// Wraps the channel's datagram path in a reliability adapter.
    fn new_reliability_adapter(
        &self,
        socket: ChannelSocketAdapter,
    ) -> Result<Box<dyn ReliabilityAdapter>>;
}

/// Unreliable datagram channel between two peers. No implementation exists.
pub trait DatagramTransport {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;
}

/// Creates transports sharing one interface provider, socket factory and
/// transport stack.
pub struct TransportFactory {
    network_manager: Rc<dyn NetworkManager>,
    socket_factory: Rc<dyn PacketSocketFactory>,
    stack: Rc<dyn TransportStack>,
}

impl TransportFactory {
    pub fn new(
        network_manager: Rc<dyn NetworkManager>,
        socket_factory: Rc<dyn PacketSocketFactory>,
        stack: Rc<dyn TransportStack>,
    ) -> Self {
        Self {
            network_manager,
            socket_factory,
            stack,
        }
    }

    /// Returns a new, uninitialized stream transport.
    pub fn create_stream_transport(&self) -> StreamTransport {
        debug!("creating stream transport");
        StreamTransport::new(
            Rc::clone(&self.network_manager),
            Rc::clone(&self.socket_factory),
            Rc::clone(&self.stack),
        )
    }

    /// Datagram transports are not supported; this always fails.
    pub fn create_datagram_transport(&self) -> Result<Box<dyn DatagramTransport>> {
        error!("datagram transport is not implemented");
        Err(Error::ErrDatagramTransportNotImplemented)
    }

    pub fn network_manager(&self) -> &Rc<dyn NetworkManager> {
        &self.network_manager
    }

    pub fn socket_factory(&self) -> &Rc<dyn PacketSocketFactory> {
        &self.socket_factory
    }
}
