//! ICE transport channel seam.
//!
//! An [`IceTransportChannel`] gathers local candidates through its
//! [`PortAllocator`](crate::allocator::PortAllocator), runs connectivity
//! checks against the remote candidates it is given and, once a pair is
//! selected, exposes an unreliable datagram path. The engine itself lives
//! outside this crate; the stream transport only drives it.


pub mod channel_socket;

use crate::candidate::Candidate;
use bytes::BytesMut;
use shared::error::Result;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

/// Events an ICE transport channel reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IceChannelEvent {
    /// The channel has candidates to signal and waits for the owner to be
    /// ready to relay them.
    RequestSignaling,
    /// A local candidate was gathered.
    CandidateReady(Candidate),
    /// Connectivity checks failed on every candidate pair.
    ConnectionFailed,
}

impl fmt::Display for IceChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IceChannelEvent::RequestSignaling => write!(f, "RequestSignaling"),
            IceChannelEvent::CandidateReady(c) => write!(f, "CandidateReady({c})"),
            IceChannelEvent::ConnectionFailed => write!(f, "ConnectionFailed"),
        }
    }
}

pub trait IceTransportChannel {
    /// Channel name, identical to the owning transport's name.
    fn name(&self) -> &str;

    /// Starts candidate gathering and connectivity checks.
    fn connect(&mut self) -> Result<()>;

    /// Answer to [`IceChannelEvent::RequestSignaling`].
    fn on_signaling_ready(&mut self);

    /// Adds a candidate received from the remote peer.
    fn add_remote_candidate(&mut self, candidate: Candidate) -> Result<()>;

    fn poll_event(&mut self) -> Option<IceChannelEvent>;

    /// Sends one datagram over the selected pair.
    fn send(&mut self, payload: &[u8]) -> Result<usize>;

    /// Polls one datagram received over the selected pair.
    fn recv(&mut self) -> Option<BytesMut>;

    /// Whether a candidate pair is selected.
    fn is_writable(&self) -> bool;

    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        None
    }
}

/// Channel handle shared by the transport and its datagram socket adapter.
pub type SharedTransportChannel = Rc<RefCell<Box<dyn IceTransportChannel>>>;
