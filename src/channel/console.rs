//! Console channel - target multiplexer for the debug console

use super::{ChannelKind, Direction, EntryLog, LogOrder, ValidationError};
use crate::protocol::{kind, Envelope, ProtocolError};
use crate::session::{ChannelHandler, Decoded};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A named server process the console can address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
}

/// Server messages on the console channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInbound {
    /// Full replacement of the known targets
    Servers(Vec<String>),
    /// Output of a console command
    Output {
        target: Option<String>,
        text: String,
    },
    /// Result of a hot reload on one target
    Reload {
        target: Option<String>,
        text: String,
    },
}

impl ConsoleInbound {
    fn from_envelope(envelope: Envelope) -> Result<Decoded<Self>, ProtocolError> {
        let message = match envelope.kind.as_str() {
            kind::SERVERS => {
                let names = match envelope.data {
                    None | Some(Value::Null) => Vec::new(),
                    Some(data) => serde_json::from_value(data)
                        .map_err(|e| ProtocolError::invalid_payload(kind::SERVERS, e))?,
                };
                ConsoleInbound::Servers(names)
            }
            kind::MESSAGE => ConsoleInbound::Output {
                text: envelope.data_text(),
                target: envelope.target,
            },
            kind::RELOAD => ConsoleInbound::Reload {
                text: envelope.data_text(),
                target: envelope.target,
            },
            _ => return Ok(Decoded::Unknown(envelope.kind)),
        };
        Ok(Decoded::Message(message))
    }
}

/// Operator requests on the console channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleIntent {
    RefreshTargets,
    Select(String),
    Submit(String),
    /// Arm the hot-reload confirmation
    RequestReload,
    ConfirmReload,
    CancelReload,
    ClearLog,
}

/// Tracks known targets, the focused one, and a display log per target
#[derive(Debug, Clone)]
pub struct TargetMultiplexer {
    targets: Vec<Target>,
    active: Option<String>,
    /// Set once any target has had focus
    focused_once: bool,
    logs: HashMap<String, EntryLog>,
    /// Shown while nothing is focused
    empty: EntryLog,
    reload_pending: bool,
}

impl Default for TargetMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetMultiplexer {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            active: None,
            focused_once: false,
            logs: HashMap::new(),
            empty: EntryLog::new(LogOrder::NewestFirst),
            reload_pending: false,
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Newest-first log of the focused target
    pub fn log(&self) -> &EntryLog {
        self.active
            .as_deref()
            .and_then(|name| self.logs.get(name))
            .unwrap_or(&self.empty)
    }

    /// Log of any target, if it has one
    pub fn log_for(&self, name: &str) -> Option<&EntryLog> {
        self.logs.get(name)
    }

    fn active_log(&mut self) -> Option<&mut EntryLog> {
        let name = self.active.clone()?;
        Some(
            self.logs
                .entry(name)
                .or_insert_with(|| EntryLog::new(LogOrder::NewestFirst)),
        )
    }

    pub fn reload_pending(&self) -> bool {
        self.reload_pending
    }

    pub fn has_target(&self, name: &str) -> bool {
        self.targets.iter().any(|t| t.name == name)
    }

    /// Replace the target set wholesale.
    ///
    /// A focused target missing from the new set falls back to none, and
    /// logs of vanished targets are dropped. The first listed target only
    /// takes focus if no target was ever focused.
    pub fn ingest_servers(&mut self, names: Vec<String>) {
        self.targets = names.into_iter().map(|name| Target { name }).collect();

        if let Some(active) = &self.active {
            if !self.has_target(active) {
                tracing::info!("Target '{}' disappeared", active);
                self.active = None;
            }
        }
        let targets = &self.targets;
        self.logs
            .retain(|name, _| targets.iter().any(|t| &t.name == name));

        if !self.focused_once {
            if let Some(first) = self.targets.first() {
                self.active = Some(first.name.clone());
                self.focused_once = true;
            }
        }
    }

    /// Focus another target
    pub fn select(&mut self, name: &str) -> Result<(), ValidationError> {
        if !self.has_target(name) {
            return Err(ValidationError::UnknownTarget(name.to_string()));
        }
        self.active = Some(name.to_string());
        self.focused_once = true;
        Ok(())
    }

    /// Record output for `target`; returns whether it was logged.
    ///
    /// Only the focused target's traffic is kept.
    pub fn on_output(&mut self, target: Option<&str>, text: String) -> bool {
        let focused = matches!(
            (target, self.active.as_deref()),
            (Some(target), Some(active)) if target == active
        );
        if !focused {
            tracing::debug!("Discarding output for {:?}", target);
            return false;
        }
        if let Some(log) = self.active_log() {
            log.push(Direction::Recv, text);
        }
        true
    }

    /// Echo `text` into the log and build the console message for it
    pub fn submit(&mut self, text: String) -> Result<Envelope, ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyInput);
        }
        let target = self.active.clone().ok_or(ValidationError::NoTarget)?;

        if let Some(log) = self.active_log() {
            log.push(Direction::Send, text.clone());
        }
        Ok(Envelope::new(kind::MESSAGE)
            .with_target(target)
            .with_data(text))
    }

    pub fn request_reload(&mut self) {
        self.reload_pending = true;
    }

    pub fn cancel_reload(&mut self) {
        self.reload_pending = false;
    }

    /// Build the hot-reload trigger; requires a prior [`request_reload`](Self::request_reload)
    pub fn confirm_reload(&mut self) -> Result<Envelope, ValidationError> {
        if !self.reload_pending {
            return Err(ValidationError::NoReloadPending);
        }
        self.reload_pending = false;
        Ok(Envelope::new(kind::RELOAD))
    }

    /// Clear the focused target's log only
    pub fn clear_log(&mut self) {
        if let Some(log) = self.active_log() {
            log.clear();
        }
    }
}

impl ChannelHandler for TargetMultiplexer {
    type Inbound = ConsoleInbound;
    type Intent = ConsoleIntent;

    const KIND: ChannelKind = ChannelKind::Console;

    fn decode(envelope: Envelope) -> Result<Decoded<ConsoleInbound>, ProtocolError> {
        ConsoleInbound::from_envelope(envelope)
    }

    fn on_open(&mut self) -> Vec<Envelope> {
        vec![Envelope::new(kind::SERVERS)]
    }

    fn handle(&mut self, message: ConsoleInbound) -> Vec<Envelope> {
        match message {
            ConsoleInbound::Servers(names) => self.ingest_servers(names),
            ConsoleInbound::Output { target, text } | ConsoleInbound::Reload { target, text } => {
                self.on_output(target.as_deref(), text);
            }
        }
        Vec::new()
    }

    fn apply(&mut self, intent: ConsoleIntent) -> Result<Vec<Envelope>, ValidationError> {
        match intent {
            ConsoleIntent::RefreshTargets => return Ok(vec![Envelope::new(kind::SERVERS)]),
            ConsoleIntent::Select(name) => self.select(&name)?,
            ConsoleIntent::Submit(text) => return Ok(vec![self.submit(text)?]),
            ConsoleIntent::RequestReload => self.request_reload(),
            ConsoleIntent::ConfirmReload => return Ok(vec![self.confirm_reload()?]),
            ConsoleIntent::CancelReload => self.cancel_reload(),
            ConsoleIntent::ClearLog => self.clear_log(),
        }
        Ok(Vec::new())
    }
}
