//! Output rendering - plain-text formatting for the line REPLs

use crate::channel::{
    Command, CommandCatalog, ExportConfig, FieldKind, LogEntry, ResponseSlot, TargetMultiplexer,
};
use crate::session::Notice;
use crate::transport::ConnectionState;
use serde_json::Value;
use std::fmt::Write;

/// One log line: `[12:03:04] SEND print(1)`
pub fn format_entry(entry: &LogEntry, show_timestamps: bool) -> String {
    if show_timestamps {
        format!(
            "[{}] {} {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.direction,
            entry.text
        )
    } else {
        format!("{} {}", entry.direction, entry.text)
    }
}

/// Target list with the active one marked
pub fn format_targets(mux: &TargetMultiplexer) -> String {
    if mux.targets().is_empty() {
        return "No targets".to_string();
    }
    mux.targets()
        .iter()
        .map(|t| {
            let marker = if mux.active() == Some(t.name.as_str()) { '*' } else { ' ' };
            format!("{} {}", marker, t.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Catalog tree, optionally limited to one category
pub fn format_catalog(catalog: &CommandCatalog, category: Option<&str>) -> String {
    if catalog.is_empty() {
        return "No GM commands available".to_string();
    }
    let mut out = String::new();
    for cat in catalog.categories() {
        if category.is_some_and(|c| !cat.name.eq_ignore_ascii_case(c)) {
            continue;
        }
        let _ = writeln!(out, "{}", cat.name);
        for cmd in &cat.commands {
            let _ = writeln!(out, "  {}", cmd.label);
        }
    }
    if out.is_empty() {
        return format!("No category named '{}'", category.unwrap_or_default());
    }
    out.trim_end().to_string()
}

fn format_field(field: FieldKind) -> String {
    match field {
        FieldKind::Numeric { min, max } => match (min, max) {
            (Some(lo), Some(hi)) => format!("number {}..{}", lo, hi),
            (Some(lo), None) => format!("number >= {}", lo),
            (None, Some(hi)) => format!("number <= {}", hi),
            (None, None) => "number".to_string(),
        },
        FieldKind::Text => "text".to_string(),
        FieldKind::Toggle => "true/false".to_string(),
    }
}

/// A command's form and the state of its last invocation
pub fn format_command(command: &Command, slot: Option<&ResponseSlot>) -> String {
    let mut out = format!("{} [{}]", command.label, command.category);
    for (arg, field) in command.renderable_args() {
        let _ = write!(out, "\n  {}={}  ({})", arg.index, arg.name, format_field(field));
    }
    match slot {
        Some(ResponseSlot::Pending) => out.push_str("\n-> waiting for response"),
        Some(ResponseSlot::Ready(data)) => {
            let _ = write!(out, "\n-> {}", format_response(data));
        }
        None => {}
    }
    out
}

/// Response payload as text; strings verbatim, anything else pretty JSON
pub fn format_response(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub fn format_config(config: Option<&ExportConfig>) -> String {
    match config {
        None => "Export settings not loaded yet".to_string(),
        Some(c) => format!(
            "export_cmd         = {}\nexcel_path         = {}\nexport_client_path = {}\nexport_server_path = {}",
            c.export_command, c.excel_path, c.export_client_path, c.export_server_path
        ),
    }
}

pub fn format_notice(notice: &Notice) -> String {
    match notice {
        Notice::ServerError(text) => format!("server error: {}", text),
        Notice::Hint(text) => text.clone(),
        Notice::Connection(ConnectionState::Connected) => "connected".to_string(),
        Notice::Connection(ConnectionState::Connecting) => "connecting...".to_string(),
        Notice::Connection(ConnectionState::Disconnected) => "disconnected".to_string(),
        Notice::GaveUp { attempts } => {
            format!("gave up reconnecting after {} attempt(s)", attempts)
        }
    }
}
