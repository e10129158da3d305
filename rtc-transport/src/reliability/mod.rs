//! Reliability layer seam.
//!
//! A [`ReliabilityAdapter`] runs a TCP-like protocol over the datagram path of
//! an ICE channel and exposes it as a [`StreamSocket`]. Segment format,
//! retransmission and windowing are the adapter's business; the transport
//! only configures it, waits for its connect handshake and drives its timers
//! through [`StreamSocket::handle_timeout`] until the stream is handed over.


use log::warn;
use shared::StreamSocket;
use shared::error::Result;
use std::task::Poll;
use std::time::Duration;

/// Receive buffer of every stream transport.
pub const TCP_RECEIVE_BUFFER_SIZE: usize = 256 * 1024;
/// Send buffer of every stream transport.
pub const TCP_SEND_BUFFER_SIZE: usize = TCP_RECEIVE_BUFFER_SIZE + 30 * 1024;
/// Trades a little latency for fewer ACK-only segments.
pub const TCP_ACK_DELAY: Duration = Duration::from_millis(10);

pub trait ReliabilityAdapter: StreamSocket {
    /// Returns false when the size is not supported.
    fn set_receive_buffer_size(&mut self, size: usize) -> bool;

    fn set_send_buffer_size(&mut self, size: usize) -> bool;

    /// Disables Nagle-style coalescing when `no_delay` is set.
    fn set_no_delay(&mut self, no_delay: bool);

    fn set_ack_delay(&mut self, delay: Duration);

    /// Starts the connect handshake. `Poll::Ready` means it finished
    /// synchronously and [`poll_connect`](Self::poll_connect) will not report
    /// it again.
    fn connect(&mut self) -> Poll<Result<()>>;

    /// Reports the outcome of a pending handshake once, when it is known.
    fn poll_connect(&mut self) -> Option<Result<()>>;

    /// Hands over the connected stream.
    fn into_stream_socket(self: Box<Self>) -> Box<dyn StreamSocket>;
}

/// Tuning applied to a reliability adapter before it connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliabilityOptions {
    pub receive_buffer_size: usize,
    pub send_buffer_size: usize,
    pub no_delay: bool,
    pub ack_delay: Duration,
}

impl Default for ReliabilityOptions {
    fn default() -> Self {
        Self {
            receive_buffer_size: TCP_RECEIVE_BUFFER_SIZE,
            send_buffer_size: TCP_SEND_BUFFER_SIZE,
            no_delay: true,
            ack_delay: TCP_ACK_DELAY,
        }
    }
}

impl ReliabilityOptions {
    pub fn apply(&self, adapter: &mut dyn ReliabilityAdapter) {
        if !adapter.set_send_buffer_size(self.send_buffer_size) {
            warn!(
                "reliability adapter rejected send buffer size {}",
                self.send_buffer_size
            );
        }
        if !adapter.set_receive_buffer_size(self.receive_buffer_size) {
            warn!(
                "reliability adapter rejected receive buffer size {}",
                self.receive_buffer_size
            );
        }
        adapter.set_no_delay(self.no_delay);
        adapter.set_ack_delay(self.ack_delay);
    }
}
