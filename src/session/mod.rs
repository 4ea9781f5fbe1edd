//! Channel sessions - one transport, one router, one channel handler
//!
//! [`Session`] is the synchronous core shared by all three channels: it
//! feeds socket events to the [`TransportSession`], routes frames through
//! the [`Router`], sends whatever the handler asks for and collects
//! [`Notice`]s for the front end. [`driver`] runs it against a real socket.

pub mod driver;
mod router;

pub use driver::{spawn, SessionHandle, SessionView};
pub use router::{ChannelHandler, Decoded, RouteOutcome, Router};

use crate::channel::{ChannelKind, ValidationError};
use crate::protocol::{self, Envelope};
use crate::transport::{
    ConnectionState, FrameSink, Reconnect, ReconnectPolicy, SendOutcome, TransportError,
    TransportSession,
};
use std::collections::VecDeque;
use uuid::Uuid;

/// Something the operator should see outside the channel's own log
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Text of an `error` frame from the backend
    ServerError(String),
    /// A rejected intent
    Hint(String),
    Connection(ConnectionState),
    /// The reconnect cap was reached
    GaveUp { attempts: u32 },
}

/// A channel handler bound to its transport
pub struct Session<H> {
    id: Uuid,
    transport: TransportSession,
    router: Router<H>,
    notices: VecDeque<Notice>,
    /// Bumped whenever the handler may have changed
    revision: u64,
}

impl<H: ChannelHandler> Session<H> {
    pub fn new(handler: H, endpoint: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport: TransportSession::new(endpoint, policy),
            router: Router::new(handler),
            notices: VecDeque::new(),
            revision: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ChannelKind {
        H::KIND
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn handler(&self) -> &H {
        self.router.handler()
    }

    pub fn transport(&self) -> &TransportSession {
        &self.transport
    }

    /// Handler revision; unchanged means the handler was not touched
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Begin connecting; `false` if already connecting or connected
    pub fn connect(&mut self) -> bool {
        let started = self.transport.connect();
        if started {
            self.notices
                .push_back(Notice::Connection(ConnectionState::Connecting));
        }
        started
    }

    /// The socket opened: flush queued frames, then issue the channel's
    /// initial requests
    pub fn on_open(&mut self, sink: Box<dyn FrameSink>) {
        let flushed = self.transport.on_open(sink);
        tracing::info!(
            "Connected to {} ({} queued frame(s) flushed)",
            self.transport.endpoint(),
            flushed
        );
        self.notices
            .push_back(Notice::Connection(ConnectionState::Connected));

        let initial = self.router.handler_mut().on_open();
        self.revision += 1;
        self.send_all(initial);
    }

    /// Route one text frame
    pub fn on_frame(&mut self, frame: &str) -> RouteOutcome {
        let outcome = self.router.route(frame);
        self.after_route(&outcome);
        outcome
    }

    /// Route one binary frame
    pub fn on_frame_bytes(&mut self, frame: &[u8]) -> RouteOutcome {
        let outcome = self.router.route_bytes(frame);
        self.after_route(&outcome);
        outcome
    }

    fn after_route(&mut self, outcome: &RouteOutcome) {
        match outcome {
            RouteOutcome::Handled(envelopes) => {
                self.revision += 1;
                for envelope in envelopes {
                    self.send(envelope);
                }
            }
            RouteOutcome::ServerError(text) => {
                tracing::warn!("Server error on {}: {}", H::KIND, text);
                self.notices.push_back(Notice::ServerError(text.clone()));
            }
            RouteOutcome::Ignored(_) | RouteOutcome::Dropped(_) => {}
        }
    }

    pub fn on_close(&mut self) -> Reconnect {
        let decision = self.transport.on_close();
        self.after_disconnect(decision)
    }

    pub fn on_error(&mut self, error: &TransportError) -> Reconnect {
        let decision = self.transport.on_error(error);
        self.after_disconnect(decision)
    }

    fn after_disconnect(&mut self, decision: Reconnect) -> Reconnect {
        self.notices
            .push_back(Notice::Connection(ConnectionState::Disconnected));
        match decision {
            Reconnect::After(delay) => {
                tracing::info!(
                    "Reconnecting to {} in {:?} (attempt {})",
                    self.transport.endpoint(),
                    delay,
                    self.transport.attempts()
                );
            }
            Reconnect::GiveUp { attempts } => {
                tracing::error!(
                    "Giving up on {} after {} attempt(s)",
                    self.transport.endpoint(),
                    attempts
                );
                self.notices.push_back(Notice::GaveUp { attempts });
            }
            Reconnect::Idle => {}
        }
        decision
    }

    /// Apply an operator intent.
    ///
    /// A rejected intent becomes a [`Notice::Hint`] and sends nothing.
    pub fn apply(&mut self, intent: H::Intent) -> Result<Vec<SendOutcome>, ValidationError> {
        match self.router.handler_mut().apply(intent) {
            Ok(envelopes) => {
                self.revision += 1;
                Ok(self.send_all(envelopes))
            }
            Err(e) => {
                tracing::debug!("Rejected intent on {}: {}", H::KIND, e);
                self.notices.push_back(Notice::Hint(e.to_string()));
                Err(e)
            }
        }
    }

    /// Encode and hand one envelope to the transport
    pub fn send(&mut self, envelope: &Envelope) -> SendOutcome {
        match protocol::encode(envelope) {
            Ok(frame) => {
                let outcome = self.transport.send(frame);
                if let SendOutcome::Queued { connect: true } = outcome {
                    self.notices
                        .push_back(Notice::Connection(ConnectionState::Connecting));
                }
                outcome
            }
            Err(e) => {
                tracing::error!("Failed to encode '{}': {}", envelope.kind, e);
                SendOutcome::Dropped
            }
        }
    }

    fn send_all(&mut self, envelopes: Vec<Envelope>) -> Vec<SendOutcome> {
        envelopes.iter().map(|e| self.send(e)).collect()
    }

    /// Tear down without reconnecting
    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Drain notices collected since the last call
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }
}
