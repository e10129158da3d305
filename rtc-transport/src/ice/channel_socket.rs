use super::SharedTransportChannel;
use bytes::BytesMut;
use shared::DatagramSocket;
use shared::error::*;

/// Datagram socket view of an ICE transport channel.
///
/// The adapter ends up inside the socket delivered to the caller, below the
/// reliability and authentication layers. Dropping it runs the on-destroyed
/// callback, which is how the transport learns the caller released the
/// connection.
pub struct ChannelSocketAdapter {
    channel: Option<SharedTransportChannel>,
    on_destroyed: Option<Box<dyn FnOnce()>>,
}

impl ChannelSocketAdapter {
    pub fn new(channel: SharedTransportChannel) -> Self {
        Self {
            channel: Some(channel),
            on_destroyed: None,
        }
    }

    /// Registers the callback run once when the adapter is dropped.
    pub fn set_on_destroyed_callback(&mut self, callback: Box<dyn FnOnce()>) {
        debug_assert!(self.on_destroyed.is_none());
        self.on_destroyed = Some(callback);
    }

    /// Detaches from the channel. Later sends fail and receives yield nothing.
    pub fn close(&mut self) {
        self.channel.take();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_none()
    }
}

impl DatagramSocket for ChannelSocketAdapter {
    fn send(&mut self, payload: &[u8]) -> Result<usize> {
        let channel = self.channel.as_ref().ok_or(Error::ErrUseClosedNetworkConn)?;
        let mut channel = channel.borrow_mut();
        if !channel.is_writable() {
            return Err(Error::ErrChannelNotWritable);
        }
        channel.send(payload)
    }

    fn recv(&mut self) -> Option<BytesMut> {
        self.channel.as_ref()?.borrow_mut().recv()
    }

    fn is_writable(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| channel.borrow().is_writable())
    }
}

impl Drop for ChannelSocketAdapter {
    fn drop(&mut self) {
        self.channel.take();
        if let Some(on_destroyed) = self.on_destroyed.take() {
            on_destroyed();
        }
    }
}
