use std::fmt;

/// Lifecycle of a [`StreamTransport`](super::StreamTransport).
///
/// `Uninitialized -> Initialized -> Connecting -> Authenticating -> Connected
/// -> Destroyed`, with `Failed` reachable from `Connecting` and
/// `Authenticating`, and `Closed` from `Uninitialized` and `Initialized`.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamTransportState {
    /// Created by the factory, `initialize` not called yet.
    #[default]
    Uninitialized,

    /// Name, config, event handler and authenticator are set.
    Initialized,

    /// Candidates are being gathered and checked, the reliability handshake
    /// is running.
    Connecting,

    /// The raw stream belongs to the authenticator.
    Authenticating,

    /// The authenticated stream was delivered to the caller.
    Connected,

    /// Connecting or authenticating failed. Nothing was delivered.
    Failed,

    /// The caller released the delivered stream and the channel is gone.
    Destroyed,

    /// Closed before `connect`. No callback was ever stored.
    Closed,
}

impl fmt::Display for StreamTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Uninitialized => "Uninitialized",
            Self::Initialized => "Initialized",
            Self::Connecting => "Connecting",
            Self::Authenticating => "Authenticating",
            Self::Connected => "Connected",
            Self::Failed => "Failed",
            Self::Destroyed => "Destroyed",
            Self::Closed => "Closed",
        };
        write!(f, "{s}")
    }
}

impl From<u8> for StreamTransportState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Initialized,
            2 => Self::Connecting,
            3 => Self::Authenticating,
            4 => Self::Connected,
            5 => Self::Failed,
            6 => Self::Destroyed,
            7 => Self::Closed,
            _ => Self::Uninitialized,
        }
    }
}

impl StreamTransportState {
    /// Whether the completion callback has been consumed.
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Connected | Self::Failed | Self::Destroyed)
    }

    /// Whether a connect attempt is still running.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::Authenticating)
    }
}

/// Events surfaced through `sansio::Protocol::poll_event`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamTransportEvent {
    OnStateChange(StreamTransportState),
}
