
mod state;

pub use state::{StreamTransportEvent, StreamTransportState};

use crate::allocator::{AllocatorStrategy, NetworkManager, PacketSocketFactory};
use crate::authenticator::ChannelAuthenticator;
use crate::candidate::Candidate;
use crate::config::TransportConfig;
use crate::factory::TransportStack;
use crate::ice::channel_socket::ChannelSocketAdapter;
use crate::ice::{IceChannelEvent, SharedTransportChannel};
use crate::reliability::{ReliabilityAdapter, ReliabilityOptions};
use log::{debug, info, trace, warn};
use shared::StreamSocket;
use shared::error::*;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::Poll;
use std::time::Instant;

/// Receives the outcome of a connect attempt: the authenticated stream, or
/// `None` when any stage failed. Called at most once.
pub type ConnectedCallback = Box<dyn FnOnce(Option<Box<dyn StreamSocket>>)>;

/// Owner-side notifications of a stream transport.
pub trait TransportEventHandler {
    /// A local candidate is ready to be relayed to the remote peer.
    fn on_transport_candidate(&mut self, name: &str, candidate: &Candidate);

    /// The transport is being dropped. No further notification follows.
    fn on_transport_deleted(&mut self, name: &str);
}

/// Establishes one reliable, authenticated byte stream to a remote peer.
///
/// A transport is single use: `initialize` and `connect` are each called
/// exactly once, in that order, and calling either again panics. The owner
/// relays candidates between the peers and keeps calling
/// [`handle_timeout`](sansio::Protocol::handle_timeout) until the connected
/// callback has run.
///
/// Once the stream is delivered the transport keeps a handle on the ICE
/// channel so late remote candidates still reach it. When the caller drops the
/// delivered stream, the next `handle_timeout` moves the transport to
/// [`StreamTransportState::Destroyed`] and the owner may drop it. From
/// delivery on, the owner drives the stream's own timers through
/// [`StreamSocket::handle_timeout`].
pub struct StreamTransport {
    network_manager: Rc<dyn NetworkManager>,
    socket_factory: Rc<dyn PacketSocketFactory>,
    stack: Rc<dyn TransportStack>,

    name: String,
    config: TransportConfig,
    event_handler: Option<Box<dyn TransportEventHandler>>,
    authenticator: Option<Box<dyn ChannelAuthenticator>>,
    callback: Option<ConnectedCallback>,

    state: StreamTransportState,
    channel: Option<SharedTransportChannel>,
    // Owned until the reliability handshake completes.
    socket: Option<Box<dyn ReliabilityAdapter>>,
    pending_remote_candidates: Vec<Candidate>,
    channel_destroyed: Rc<Cell<bool>>,

    events: VecDeque<StreamTransportEvent>,
}

impl StreamTransport {
    pub fn new(
        network_manager: Rc<dyn NetworkManager>,
        socket_factory: Rc<dyn PacketSocketFactory>,
        stack: Rc<dyn TransportStack>,
    ) -> Self {
        Self {
            network_manager,
            socket_factory,
            stack,

            name: String::new(),
            config: TransportConfig::default(),
            event_handler: None,
            authenticator: None,
            callback: None,

            state: StreamTransportState::Uninitialized,
            channel: None,
            socket: None,
            pending_remote_candidates: vec![],
            channel_destroyed: Rc::new(Cell::new(false)),

            events: VecDeque::new(),
        }
    }

    /// Assigns the transport's identity and collaborators.
    ///
    /// # Panics
    ///
    /// When called twice or with an empty name.
    pub fn initialize(
        &mut self,
        name: &str,
        config: TransportConfig,
        event_handler: Box<dyn TransportEventHandler>,
        authenticator: Box<dyn ChannelAuthenticator>,
    ) {
        assert!(!name.is_empty(), "stream transport name must not be empty");
        assert_eq!(
            self.state,
            StreamTransportState::Uninitialized,
            "[{}]: stream transport can be initialized only once",
            self.name
        );

        self.name = name.to_owned();
        self.config = config;
        self.event_handler = Some(event_handler);
        self.authenticator = Some(authenticator);
        self.state_change(StreamTransportState::Initialized);
    }

    /// Starts establishing the stream. `callback` runs once with the outcome,
    /// either from inside this call or from a later `handle_timeout`.
    ///
    /// # Panics
    ///
    /// Unless the transport is [`StreamTransportState::Initialized`].
    pub fn connect(&mut self, callback: ConnectedCallback) {
        assert_eq!(
            self.state,
            StreamTransportState::Initialized,
            "[{}]: connect requires an initialized transport that never connected",
            self.name
        );

        self.callback = Some(callback);
        self.state_change(StreamTransportState::Connecting);

        if let Err(err) = self.start_connect() {
            warn!("[{}]: failed to start connecting: {}", self.name, err);
            self.notify_connect_failed();
            return;
        }

        self.process();
    }

    /// Feeds a candidate received from the remote peer to the ICE channel.
    ///
    /// Candidates arriving before `connect` are buffered and flushed in order
    /// once the channel exists.
    pub fn add_remote_candidate(&mut self, candidate: Candidate) -> Result<()> {
        self.check_channel_destroyed();

        match self.state {
            StreamTransportState::Uninitialized | StreamTransportState::Initialized => {
                debug!(
                    "[{}]: buffering remote candidate {} until connect",
                    self.name, candidate
                );
                self.pending_remote_candidates.push(candidate);
                Ok(())
            }
            StreamTransportState::Connecting
            | StreamTransportState::Authenticating
            | StreamTransportState::Connected => {
                let channel = self.channel.as_ref().ok_or(Error::ErrTransportClosed)?;
                trace!("[{}]: adding remote candidate {}", self.name, candidate);
                channel.borrow_mut().add_remote_candidate(candidate)
            }
            StreamTransportState::Failed
            | StreamTransportState::Destroyed
            | StreamTransportState::Closed => Err(Error::ErrTransportClosed),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn state(&self) -> StreamTransportState {
        self.state
    }

    /// Whether the connected callback has been consumed, successfully or not.
    pub fn is_connected(&self) -> bool {
        self.state.is_completed()
    }

    fn state_change(&mut self, state: StreamTransportState) {
        if self.state != state {
            debug!("[{}]: state {} -> {}", self.name, self.state, state);
            self.state = state;
            self.events.push_back(StreamTransportEvent::OnStateChange(state));
        }
    }

    fn start_connect(&mut self) -> Result<()> {
        self.config.validate()?;

        let strategy = AllocatorStrategy::select(&self.config);
        info!("[{}]: connecting with {} gathering", self.name, strategy);

        let mut allocator = self.stack.new_port_allocator(
            &strategy,
            &self.network_manager,
            &self.socket_factory,
        )?;
        allocator.set_flags(strategy.flags());
        allocator.set_port_range(self.config.min_port, self.config.max_port);

        let channel: SharedTransportChannel = Rc::new(RefCell::new(
            self.stack.new_transport_channel(&self.name, allocator)?,
        ));
        self.channel = Some(Rc::clone(&channel));

        channel.borrow_mut().connect()?;
        for candidate in self.pending_remote_candidates.drain(..) {
            trace!("[{}]: adding buffered remote candidate {}", self.name, candidate);
            channel.borrow_mut().add_remote_candidate(candidate)?;
        }

        let mut channel_adapter = ChannelSocketAdapter::new(channel);
        let channel_destroyed = Rc::clone(&self.channel_destroyed);
        channel_adapter.set_on_destroyed_callback(Box::new(move || channel_destroyed.set(true)));

        let mut socket = self.stack.new_reliability_adapter(channel_adapter)?;
        ReliabilityOptions::default().apply(socket.as_mut());

        let result = socket.connect();
        self.socket = Some(socket);
        if let Poll::Ready(result) = result {
            self.on_reliability_connected(result);
        }

        Ok(())
    }

    /// Handles every pending collaborator event until none is left.
    fn process(&mut self) {
        loop {
            let mut progressed = false;

            while let Some(event) = self.poll_channel_event() {
                self.on_channel_event(event);
                progressed = true;
            }

            if self.state == StreamTransportState::Connecting {
                let result = self.socket.as_mut().and_then(|socket| socket.poll_connect());
                if let Some(result) = result {
                    self.on_reliability_connected(result);
                    progressed = true;
                }
            }

            if self.state == StreamTransportState::Authenticating {
                let result = self
                    .authenticator
                    .as_mut()
                    .and_then(|authenticator| authenticator.poll_done());
                if let Some(result) = result {
                    self.on_authentication_done(result);
                    progressed = true;
                }
            }

            if !progressed {
                break;
            }
        }

        self.check_channel_destroyed();
    }

    fn poll_channel_event(&mut self) -> Option<IceChannelEvent> {
        self.channel.as_ref()?.borrow_mut().poll_event()
    }

    fn on_channel_event(&mut self, event: IceChannelEvent) {
        match (self.state, event) {
            (_, IceChannelEvent::RequestSignaling) => {
                if let Some(channel) = &self.channel {
                    channel.borrow_mut().on_signaling_ready();
                }
            }
            (_, IceChannelEvent::CandidateReady(candidate)) => {
                trace!("[{}]: local candidate ready {}", self.name, candidate);
                if let Some(event_handler) = self.event_handler.as_mut() {
                    event_handler.on_transport_candidate(&self.name, &candidate);
                }
            }
            (
                StreamTransportState::Connecting | StreamTransportState::Authenticating,
                IceChannelEvent::ConnectionFailed,
            ) => {
                warn!("[{}]: ICE connectivity checks failed", self.name);
                self.notify_connect_failed();
            }
            (StreamTransportState::Connected, IceChannelEvent::ConnectionFailed) => {
                warn!(
                    "[{}]: ICE connectivity lost after the stream was delivered",
                    self.name
                );
            }
            (
                state @ (StreamTransportState::Uninitialized
                | StreamTransportState::Initialized
                | StreamTransportState::Failed
                | StreamTransportState::Destroyed
                | StreamTransportState::Closed),
                IceChannelEvent::ConnectionFailed,
            ) => {
                unreachable!(
                    "[{}]: channel event without a live channel in state {}",
                    self.name, state
                );
            }
        }
    }

    fn on_reliability_connected(&mut self, result: Result<()>) {
        if let Err(err) = result {
            warn!("[{}]: reliability handshake failed: {}", self.name, err);
            self.notify_connect_failed();
            return;
        }

        let Some(socket) = self.socket.take() else {
            unreachable!(
                "[{}]: reliability handshake completed in state {}",
                self.name, self.state
            );
        };

        debug!("[{}]: reliability handshake completed", self.name);
        self.check_channel_destroyed();
        self.state_change(StreamTransportState::Authenticating);
        match self.authenticator.as_mut() {
            Some(authenticator) => authenticator.secure_and_authenticate(socket.into_stream_socket()),
            None => unreachable!("[{}]: authenticator released before use", self.name),
        }
    }

    fn on_authentication_done(&mut self, result: Result<Box<dyn StreamSocket>>) {
        match result {
            Ok(socket) => self.notify_connected(socket),
            Err(err) => {
                warn!("[{}]: authentication failed: {}", self.name, err);
                self.notify_connect_failed();
            }
        }
    }

    fn check_channel_destroyed(&mut self) {
        if !self.channel_destroyed.replace(false) {
            return;
        }

        if self.state == StreamTransportState::Connected {
            info!("[{}]: delivered stream released", self.name);
            self.channel.take();
            self.state_change(StreamTransportState::Destroyed);
        } else {
            trace!(
                "[{}]: ignoring channel teardown in state {}",
                self.name, self.state
            );
        }
    }

    fn notify_connected(&mut self, socket: Box<dyn StreamSocket>) {
        info!("[{}]: connected", self.name);
        self.authenticator.take();
        // A teardown seen before this point belongs to the raw stream, not to
        // the delivered one.
        self.check_channel_destroyed();
        self.state_change(StreamTransportState::Connected);
        self.deliver(Some(socket));
    }

    fn notify_connect_failed(&mut self) {
        self.socket.take();
        self.channel.take();
        self.authenticator.take();
        self.pending_remote_candidates.clear();

        self.state_change(StreamTransportState::Failed);
        self.deliver(None);
    }

    fn deliver(&mut self, socket: Option<Box<dyn StreamSocket>>) {
        match self.callback.take() {
            Some(callback) => callback(socket),
            None => unreachable!("[{}]: connect outcome delivered twice", self.name),
        }
    }

    fn release(&mut self) {
        self.callback.take();
        self.socket.take();
        self.authenticator.take();
        self.channel.take();
        self.pending_remote_candidates.clear();
    }

    fn drive(&mut self, now: Instant) -> Result<()> {
        if let Some(channel) = &self.channel {
            channel.borrow_mut().handle_timeout(now)?;
        }
        if let Some(socket) = self.socket.as_mut() {
            socket.handle_timeout(now)?;
        }
        if self.state == StreamTransportState::Authenticating {
            if let Some(authenticator) = self.authenticator.as_mut() {
                authenticator.handle_timeout(now)?;
            }
        }
        Ok(())
    }
}

impl sansio::Protocol<Candidate, (), ()> for StreamTransport {
    type Rout = ();
    type Wout = ();
    type Eout = StreamTransportEvent;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, candidate: Candidate) -> Result<()> {
        self.add_remote_candidate(candidate)
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        None
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.events.pop_front()
    }

    /// Drives the ICE channel, the reliability adapter and the authenticator,
    /// then acts on whatever they report.
    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if let Err(err) = self.drive(now) {
            if !self.state.is_pending() {
                return Err(err);
            }
            warn!("[{}]: connect attempt aborted: {}", self.name, err);
            self.notify_connect_failed();
            return Ok(());
        }

        self.process();
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        let channel = self
            .channel
            .as_ref()
            .and_then(|channel| channel.borrow_mut().poll_timeout());
        let socket = self.socket.as_mut().and_then(|socket| socket.poll_timeout());
        let authenticator = self
            .authenticator
            .as_mut()
            .and_then(|authenticator| authenticator.poll_timeout());

        [channel, socket, authenticator].into_iter().flatten().min()
    }

    /// Abandons the transport. A pending connect attempt fails and its
    /// callback receives `None`.
    fn close(&mut self) -> Result<()> {
        match self.state {
            StreamTransportState::Failed
            | StreamTransportState::Destroyed
            | StreamTransportState::Closed => {}
            StreamTransportState::Connected => {
                self.channel.take();
                self.state_change(StreamTransportState::Destroyed);
            }
            StreamTransportState::Connecting | StreamTransportState::Authenticating => {
                debug!("[{}]: closing in state {}", self.name, self.state);
                self.notify_connect_failed();
            }
            StreamTransportState::Uninitialized | StreamTransportState::Initialized => {
                debug!("[{}]: closing before connect", self.name);
                self.release();
                self.state_change(StreamTransportState::Closed);
            }
        }
        Ok(())
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        debug_assert!(
            self.state != StreamTransportState::Connected || self.socket.is_none(),
            "[{}]: connected transport still owns the raw stream",
            self.name
        );

        self.release();
        if let Some(mut event_handler) = self.event_handler.take() {
            event_handler.on_transport_deleted(&self.name);
        }
    }
}
