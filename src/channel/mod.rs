//! Channels - the three independent subsystems sharing the admin backend
//!
//! Each channel has its own endpoint path, message vocabulary and owned
//! state. The types here are shared between them: the channel identity,
//! client-side validation errors and the append-only entry log.

pub mod catalog;
pub mod console;
pub mod export;
pub mod gm;
pub mod invoker;

pub use catalog::{ArgKind, Category, Command, CommandArg, CommandCatalog, FieldKind};
pub use console::{ConsoleInbound, ConsoleIntent, Target, TargetMultiplexer};
pub use export::{ConfigDialog, ExportConfig, ExportInbound, ExportIntent, ExportSession};
pub use gm::{GmChannel, GmInbound, GmIntent};
pub use invoker::{CommandInvoker, ResponseSlot};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Which subsystem a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Console,
    Gm,
    Export,
}

impl ChannelKind {
    /// Endpoint path on the admin backend
    pub fn path(&self) -> &'static str {
        match self {
            ChannelKind::Console => "/telnet",
            ChannelKind::Gm => "/gm",
            ChannelKind::Export => "/exportTable",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::Console => "console",
            ChannelKind::Gm => "gm",
            ChannelKind::Export => "export",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Client-side precondition failures, reported before anything is sent
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Nothing to send")]
    EmptyInput,

    #[error("No target selected")]
    NoTarget,

    #[error("Unknown target '{0}'")]
    UnknownTarget(String),

    #[error("No reload is waiting for confirmation")]
    NoReloadPending,

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("No command selected")]
    NoCommandSelected,

    #[error("Command '{command}' has no argument '{index}'")]
    UnknownArgument { command: String, index: String },

    #[error("Argument '{index}' expects a {expected}")]
    WrongType {
        index: String,
        expected: &'static str,
    },

    #[error("Argument '{index}' is out of range: {value}")]
    OutOfRange { index: String, value: f64 },

    #[error("Export settings could not be encoded: {0}")]
    InvalidConfig(String),

    #[error("Enter a sheet name to search")]
    EmptySheetName,
}

/// Direction of a logged entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Send,
    Recv,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => f.write_str("SEND"),
            Direction::Recv => f.write_str("RECV"),
        }
    }
}

/// One immutable line of a channel log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in arrival order, starting at 1
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    pub text: String,
}

/// Ordering policy of an [`EntryLog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOrder {
    NewestFirst,
    OldestFirst,
}

/// Append-only log, cleared only wholesale
#[derive(Debug, Clone)]
pub struct EntryLog {
    entries: VecDeque<LogEntry>,
    order: LogOrder,
    next_seq: u64,
}

impl EntryLog {
    pub fn new(order: LogOrder) -> Self {
        Self {
            entries: VecDeque::new(),
            order,
            next_seq: 1,
        }
    }

    pub fn order(&self) -> LogOrder {
        self.order
    }

    pub fn push(&mut self, direction: Direction, text: impl Into<String>) -> u64 {
        let entry = LogEntry {
            seq: self.next_seq,
            timestamp: Local::now(),
            direction,
            text: text.into(),
        };
        self.next_seq += 1;
        let seq = entry.seq;
        match self.order {
            LogOrder::NewestFirst => self.entries.push_front(entry),
            LogOrder::OldestFirst => self.entries.push_back(entry),
        }
        seq
    }

    /// Entries in display order
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Entries newer than `seq`, oldest first
    pub fn since(&self, seq: u64) -> Vec<&LogEntry> {
        let mut newer: Vec<&LogEntry> = self.entries.iter().filter(|e| e.seq > seq).collect();
        newer.sort_by_key(|e| e.seq);
        newer
    }

    /// Sequence number of the most recent entry, 0 when nothing was ever logged
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry; sequence numbers keep counting
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_first_ordering() {
        let mut log = EntryLog::new(LogOrder::NewestFirst);
        log.push(Direction::Send, "a");
        log.push(Direction::Recv, "b");
        let texts: Vec<_> = log.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a"]);
    }

    #[test]
    fn test_since_is_chronological() {
        let mut log = EntryLog::new(LogOrder::NewestFirst);
        log.push(Direction::Send, "a");
        log.push(Direction::Recv, "b");
        log.push(Direction::Recv, "c");
        let texts: Vec<_> = log.since(1).iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn test_clear_keeps_sequence() {
        let mut log = EntryLog::new(LogOrder::OldestFirst);
        log.push(Direction::Recv, "a");
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.push(Direction::Recv, "b"), 2);
        assert_eq!(log.last_seq(), 2);
    }

    #[test]
    fn test_channel_paths() {
        assert_eq!(ChannelKind::Console.path(), "/telnet");
        assert_eq!(ChannelKind::Gm.path(), "/gm");
        assert_eq!(ChannelKind::Export.path(), "/exportTable");
    }
}
