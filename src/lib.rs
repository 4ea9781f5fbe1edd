//! gmconsole - operator client for a game-server admin backend
//!
//! The backend exposes three independent WebSocket channels:
//! - `/telnet`: debug console multiplexed over named server targets
//! - `/gm`: GM command catalog and command invocation
//! - `/exportTable`: table export settings, export runs and sheet lookup
//!
//! # Architecture
//!
//! Each channel runs in its own [`session::Session`], which binds a
//! [`transport::TransportSession`] (connection state and reconnect policy)
//! to a router and a channel handler from [`channel`]. Sessions exchange
//! JSON [`protocol::Envelope`]s with the backend and are driven by one
//! tokio task each; front ends talk to them through typed intents.

pub mod channel;
pub mod client;
pub mod config;
pub mod protocol;
pub mod session;
pub mod transport;
