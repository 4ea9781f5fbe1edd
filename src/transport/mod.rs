//! Transport session - connection lifecycle, send policy and reconnect policy
//!
//! [`TransportSession`] is a pure state machine: it never touches a socket
//! itself. The async driver feeds it lifecycle events (open, close, error)
//! and asks it what to do next, which keeps the policy testable without a
//! network.
//!
//! ```text
//! Disconnected --connect()--> Connecting --on_open()--> Connected
//!      ^                          |                         |
//!      +------on_error()----------+-------on_close()--------+
//! ```

pub mod ws;

use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),
}

/// Connection state of a single socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Destination for encoded outbound frames while a socket is open
pub trait FrameSink: Send {
    fn send_frame(&self, frame: String) -> Result<(), TransportError>;
}

impl FrameSink for mpsc::UnboundedSender<String> {
    fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        self.send(frame).map_err(|_| TransportError::Closed)
    }
}

/// Bounded exponential backoff with an attempt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: Some(20),
        }
    }
}

impl BackoffConfig {
    /// Delay before reconnect attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// What a channel does when its socket goes away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect on its own after a backoff delay (console, export)
    Eager(BackoffConfig),
    /// Stay disconnected until the next send needs the socket (GM)
    Lazy,
}

/// Decision taken after a close or error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// Call [`TransportSession::connect`] again after this delay
    After(Duration),
    /// Wait for demand
    Idle,
    /// Attempt cap reached; the session stays disconnected
    GiveUp { attempts: u32 },
}

/// Result of handing a frame to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Held until the next open; `connect` is true when this send started
    /// a new connection attempt that the driver must carry out
    Queued { connect: bool },
    /// Not connected and the policy does not queue
    Dropped,
}

/// Owns one logical connection to a fixed endpoint
pub struct TransportSession {
    endpoint: String,
    state: ConnectionState,
    policy: ReconnectPolicy,
    attempts: u32,
    sink: Option<Box<dyn FrameSink>>,
    pending: VecDeque<String>,
}

impl TransportSession {
    pub fn new(endpoint: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: ConnectionState::Disconnected,
            policy,
            attempts: 0,
            sink: None,
            pending: VecDeque::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Failed attempts since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Frames waiting for the next open
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Start a connection attempt.
    ///
    /// Returns `false` when one is already in progress or established.
    pub fn connect(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// The socket opened; flushes queued frames and returns how many went out
    pub fn on_open(&mut self, sink: Box<dyn FrameSink>) -> usize {
        self.state = ConnectionState::Connected;
        self.attempts = 0;

        let mut flushed = 0;
        while let Some(frame) = self.pending.pop_front() {
            if let Err(e) = sink.send_frame(frame) {
                tracing::warn!("Failed to flush queued frame to {}: {}", self.endpoint, e);
                break;
            }
            flushed += 1;
        }
        self.sink = Some(sink);
        flushed
    }

    /// Send an encoded frame according to the current state and policy
    pub fn send(&mut self, frame: String) -> SendOutcome {
        if let (ConnectionState::Connected, Some(sink)) = (self.state, &self.sink) {
            return match sink.send_frame(frame) {
                Ok(()) => SendOutcome::Sent,
                Err(e) => {
                    tracing::warn!("Dropped frame for {}: {}", self.endpoint, e);
                    SendOutcome::Dropped
                }
            };
        }

        match self.policy {
            ReconnectPolicy::Lazy => {
                self.pending.push_back(frame);
                let connect = self.connect();
                SendOutcome::Queued { connect }
            }
            ReconnectPolicy::Eager(_) => {
                tracing::warn!(
                    "Dropped frame for {}: not connected ({:?})",
                    self.endpoint,
                    self.state
                );
                SendOutcome::Dropped
            }
        }
    }

    /// The socket closed
    pub fn on_close(&mut self) -> Reconnect {
        self.sink = None;
        self.state = ConnectionState::Disconnected;
        self.next_reconnect()
    }

    /// A connect attempt or an open socket failed
    pub fn on_error(&mut self, error: &TransportError) -> Reconnect {
        tracing::warn!("Transport error on {}: {}", self.endpoint, error);
        self.on_close()
    }

    /// Tear down without scheduling a reconnect
    pub fn close(&mut self) {
        self.sink = None;
        self.state = ConnectionState::Disconnected;
        self.pending.clear();
    }

    fn next_reconnect(&mut self) -> Reconnect {
        match self.policy {
            ReconnectPolicy::Lazy => {
                if !self.pending.is_empty() {
                    tracing::warn!(
                        "Discarding {} queued frame(s) for {}",
                        self.pending.len(),
                        self.endpoint
                    );
                    self.pending.clear();
                }
                Reconnect::Idle
            }
            ReconnectPolicy::Eager(backoff) => {
                self.attempts = self.attempts.saturating_add(1);
                match backoff.max_attempts {
                    Some(max) if self.attempts > max => Reconnect::GiveUp {
                        attempts: self.attempts - 1,
                    },
                    _ => Reconnect::After(backoff.delay_for(self.attempts)),
                }
            }
        }
    }
}
