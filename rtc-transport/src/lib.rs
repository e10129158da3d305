//! Peer-to-peer stream transport establishment.
//!
//! A [`StreamTransport`](stream_transport::StreamTransport) negotiates one
//! reliable, ordered and authenticated byte stream between two endpoints that
//! may sit behind NATs or firewalls. It drives three collaborators, each of
//! which can fail on its own:
//!
//! 1. an ICE transport channel that gathers local candidates, checks
//!    connectivity against remote candidates and selects a datagram path,
//! 2. a reliability adapter turning that datagram path into a byte stream,
//! 3. a channel authenticator securing the byte stream.
//!
//! The collaborators are traits; concrete ICE, reliability and authentication
//! engines are supplied through a [`TransportStack`](factory::TransportStack)
//! handed to the [`TransportFactory`](factory::TransportFactory).
//!
//! Everything here is single-threaded. Transports and the factory are `!Send`
//! and are driven by the owner's event loop through
//! [`sansio::Protocol::handle_timeout`].

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod allocator;
pub mod authenticator;
pub mod candidate;
pub mod config;
pub mod factory;
pub mod ice;
pub mod reliability;
pub mod signaling;
pub mod stream_transport;

pub use sansio;
