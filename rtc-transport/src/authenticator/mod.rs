//! Channel authenticator seam.

use shared::StreamSocket;
use shared::error::Result;
use std::time::Instant;

/// Secures and authenticates a connected byte stream.
///
/// A transport calls [`secure_and_authenticate`](Self::secure_and_authenticate)
/// exactly once, handing over the raw stream, then polls
/// [`poll_done`](Self::poll_done) until it yields the upgraded stream or an
/// error. Dropping the authenticator abandons the handshake.
///
/// While it holds the stream, the authenticator's `handle_timeout` and
/// `poll_timeout` must forward to the stream's, so the reliability layer
/// underneath keeps its timers running.
pub trait ChannelAuthenticator {
    fn secure_and_authenticate(&mut self, socket: Box<dyn StreamSocket>);

    fn poll_done(&mut self) -> Option<Result<Box<dyn StreamSocket>>>;

    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        None
    }
}
