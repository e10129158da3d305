#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod error;
pub mod socket;
pub(crate) mod transport;
pub mod util;

pub use socket::{DatagramSocket, PacketSocket, StreamSocket};
pub use transport::{TaggedBytesMut, TransportContext, TransportMessage, TransportProtocol};
