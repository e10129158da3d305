//! Socket abstractions shared by the transport layers.
//!
//! Three shapes of socket appear while a peer-to-peer channel is being set up:
//!
//! - [`PacketSocket`]: a raw, addressed datagram socket handed out by a packet
//!   socket factory and used by candidate allocators.
//! - [`DatagramSocket`]: the connected, unreliable and unordered datagram view
//!   of an ICE transport channel once a candidate pair has been selected.
//! - [`StreamSocket`]: a reliable, ordered byte stream, either produced by a
//!   reliability layer running over a [`DatagramSocket`] or by an
//!   authenticator upgrading such a stream.
//!
//! All of them are non-blocking: when nothing is available a read returns
//! `None` (datagrams) or an [`io::ErrorKind::WouldBlock`] error (streams).

use crate::error::Result;
use crate::transport::TaggedBytesMut;
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

/// An addressed datagram socket bound to a local transport address.
pub trait PacketSocket {
    /// Local address the socket is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Sends `payload` to `peer_addr`, returning the number of bytes sent.
    fn send_to(&mut self, payload: &[u8], peer_addr: SocketAddr) -> Result<usize>;

    /// Polls the next received datagram, tagged with its addresses.
    fn poll_recv(&mut self) -> Option<TaggedBytesMut>;
}

/// Connected datagram interface of a transport channel.
pub trait DatagramSocket {
    /// Sends one datagram over the selected path.
    fn send(&mut self, payload: &[u8]) -> Result<usize>;

    /// Polls the next received datagram.
    fn recv(&mut self) -> Option<BytesMut>;

    /// Whether a path is currently selected and datagrams can be sent.
    fn is_writable(&self) -> bool;
}

/// Reliable, ordered byte stream.
///
/// Streams layered over datagrams run their own retransmission and ACK
/// timers. Whoever holds the stream drives them through
/// [`handle_timeout`](Self::handle_timeout) whenever
/// [`poll_timeout`](Self::poll_timeout) comes due; a wrapping stream forwards
/// both to the stream it wraps.
pub trait StreamSocket: io::Read + io::Write {
    /// Whether the stream is established and not yet torn down.
    fn is_connected(&self) -> bool;

    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        None
    }
}
