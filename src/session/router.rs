//! Per-session message router

use crate::channel::{ChannelKind, ValidationError};
use crate::protocol::{self, kind, Envelope, ProtocolError};

/// Result of asking a channel to decode an envelope
#[derive(Debug)]
pub enum Decoded<M> {
    Message(M),
    /// A `type` this channel does not know; ignored for forward compatibility
    Unknown(String),
}

/// A channel's owned state plus its closed message vocabulary.
///
/// `Inbound` is the tagged union of server messages the channel reacts to,
/// `Intent` the tagged union of operator requests it accepts. Both sides
/// produce envelopes for the session to send.
pub trait ChannelHandler {
    type Inbound;
    type Intent;

    const KIND: ChannelKind;

    /// Map an envelope onto the channel's inbound union
    fn decode(envelope: Envelope) -> Result<Decoded<Self::Inbound>, ProtocolError>;

    /// Requests to issue every time the socket opens
    fn on_open(&mut self) -> Vec<Envelope>;

    /// Apply a decoded server message
    fn handle(&mut self, message: Self::Inbound) -> Vec<Envelope>;

    /// Apply an operator intent; validation runs before anything is built
    fn apply(&mut self, intent: Self::Intent) -> Result<Vec<Envelope>, ValidationError>;
}

/// What happened to one inbound frame
#[derive(Debug)]
pub enum RouteOutcome {
    /// Delivered to the handler, which asked for these envelopes to be sent
    Handled(Vec<Envelope>),
    /// `type: "error"` from the server; carries the text to surface
    ServerError(String),
    Ignored(String),
    Dropped(ProtocolError),
}

/// Dispatches decoded frames to exactly one channel handler
pub struct Router<H> {
    handler: H,
}

impl<H: ChannelHandler> Router<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Route a text frame
    pub fn route(&mut self, frame: &str) -> RouteOutcome {
        match protocol::decode(frame) {
            Ok(envelope) => self.route_envelope(envelope),
            Err(e) => {
                tracing::warn!("Dropping frame on {}: {}", H::KIND, e);
                RouteOutcome::Dropped(e)
            }
        }
    }

    /// Route a binary frame carrying UTF-8 JSON
    pub fn route_bytes(&mut self, frame: &[u8]) -> RouteOutcome {
        match protocol::decode_bytes(frame) {
            Ok(envelope) => self.route_envelope(envelope),
            Err(e) => {
                tracing::warn!("Dropping frame on {}: {}", H::KIND, e);
                RouteOutcome::Dropped(e)
            }
        }
    }

    pub fn route_envelope(&mut self, envelope: Envelope) -> RouteOutcome {
        if envelope.is(kind::ERROR) {
            return RouteOutcome::ServerError(envelope.data_text());
        }

        let kind = envelope.kind.clone();
        match H::decode(envelope) {
            Ok(Decoded::Message(message)) => {
                tracing::debug!("Routed '{}' on {}", kind, H::KIND);
                RouteOutcome::Handled(self.handler.handle(message))
            }
            Ok(Decoded::Unknown(kind)) => {
                tracing::debug!("Ignoring unknown type '{}' on {}", kind, H::KIND);
                RouteOutcome::Ignored(kind)
            }
            Err(e) => {
                tracing::warn!("Dropping '{}' on {}: {}", kind, H::KIND, e);
                RouteOutcome::Dropped(e)
            }
        }
    }
}
