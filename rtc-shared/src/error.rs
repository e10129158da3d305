#![allow(dead_code)]

use std::io;
use std::net;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("use of closed network connection")]
    ErrUseClosedNetworkConn,
    #[error("address already in use")]
    ErrAddressAlreadyInUse,
    #[error("no such address")]
    ErrNoSuchAddress,
    #[error("no interface is available")]
    ErrNoInterface,
    #[error("invalid port number")]
    ErrInvalidPortNumber,
    #[error("end port is less than the start")]
    ErrEndPortLessThanStart,
    #[error("port space exhausted")]
    ErrPortSpaceExhausted,

    //ICE errors
    #[error("ice: channel is not writable")]
    ErrChannelNotWritable,
    #[error("ice: connectivity checks failed")]
    ErrConnectivityCheckFailed,
    #[error("ice: unknown candidate type")]
    ErrUnknownCandidateType,

    //Reliability layer errors
    #[error("reliability: connect handshake failed")]
    ErrReliabilityHandshakeFailed,
    #[error("reliability: socket is not connected")]
    ErrSocketNotConnected,

    //Authentication errors
    #[error("authenticator: handshake rejected")]
    ErrAuthenticationRejected,

    //Stream transport errors
    #[error("stream transport: closed")]
    ErrTransportClosed,
    #[error("datagram transport is not implemented")]
    ErrDatagramTransportNotImplemented,
    #[error("signaling: malformed message: {0}")]
    ErrMalformedSignal(String),

    //Third Party Error
    #[error("parse ip: {0}")]
    ParseIp(#[from] net::AddrParseError),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Std(#[source] StdError),

    //Other Errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn from_std<T>(error: T) -> Self
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        Error::Std(StdError(Box::new(error)))
    }

    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        if let Error::Std(s) = self {
            return s.0.downcast_ref();
        }

        None
    }
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

/// Maps an error onto `io::Error` for the byte-stream sockets, which speak
/// `std::io::Read`/`Write`.
impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(IoError(err)) => err,
            Error::ErrChannelNotWritable => io::Error::new(io::ErrorKind::WouldBlock, e),
            Error::ErrSocketNotConnected => io::Error::new(io::ErrorKind::NotConnected, e),
            Error::ErrUseClosedNetworkConn => io::Error::new(io::ErrorKind::BrokenPipe, e),
            _ => io::Error::other(e.to_string()),
        }
    }
}

/// An escape hatch to preserve stack traces when we don't know the error.
///
/// Collaborator implementations living in crates higher up the stack produce
/// their own error types; `Error::from_std` keeps the underlying error (and
/// its stack trace) instead of flattening it into a string.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StdError(pub Box<dyn std::error::Error + Send + Sync>);

impl PartialEq for StdError {
    fn eq(&self, _: &Self) -> bool {
        false
    }
}
