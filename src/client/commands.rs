//! Command handling for client control commands (prefixed with `:`)
//!
//! Each channel has its own command set. Handlers only look at the latest
//! channel snapshot and return what the REPL should do; nothing here talks
//! to the session directly.

use crate::channel::{
    ArgKind, Command, ConsoleIntent, ExportConfig, ExportIntent, ExportSession, GmChannel,
    GmIntent, TargetMultiplexer, ValidationError,
};
use crate::client::input::parse_pairs;
use crate::client::renderer;
use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult<I> {
    Continue,
    /// Text for the operator
    Print(String),
    Apply(Vec<I>),
    /// Ask the operator a yes/no question before going on
    Confirm(String),
    Exit,
}

pub const CONSOLE_HELP: &str = "\
  <text>            Send to the active target
  @name             Switch target
  @name: <text>     Switch target and send
  :targets          List targets
  :refresh          Ask the server for the target list
  :clear            Clear the log
  :reload           Hot-reload (asks for confirmation)
  :quit             Exit";

pub const GM_HELP: &str = "\
  :list [category]  List commands
  :search <text>    Search command labels
  :use <label|id>   Select a command
  :show             Show the selected command and its last response
  :refresh          Reload the catalog
  key=value ...     Invoke the selected command
  :quit             Exit";

pub const EXPORT_HELP: &str = "\
  :config           Show the export settings
  :set key=value    Change settings (export_cmd, excel_path,
                    export_client_path, export_server_path)
  :export           Run the export
  :find <sheet>     Look up which file holds a sheet
  :quit             Exit";

fn common<I>(command: &str, help: &str) -> Option<CommandResult<I>> {
    match command {
        "quit" | "q" | "exit" => Some(CommandResult::Exit),
        "help" | "h" | "?" => Some(CommandResult::Print(help.to_string())),
        _ => None,
    }
}

fn unknown<I>(command: &str) -> CommandResult<I> {
    CommandResult::Print(format!("Unknown command ':{}' (try :help)", command))
}

/// Handle a console control command
pub fn console_command(
    command: &str,
    args: &[String],
    mux: &TargetMultiplexer,
) -> CommandResult<ConsoleIntent> {
    if let Some(result) = common(command, CONSOLE_HELP) {
        return result;
    }
    match command {
        "targets" | "ls" => CommandResult::Print(renderer::format_targets(mux)),
        "refresh" => CommandResult::Apply(vec![ConsoleIntent::RefreshTargets]),
        "clear" => CommandResult::Apply(vec![ConsoleIntent::ClearLog]),
        "reload" if args.is_empty() => {
            CommandResult::Confirm("Hot-reload all servers? [y/N]".to_string())
        }
        "reload" => CommandResult::Print("Usage: :reload".to_string()),
        _ => unknown(command),
    }
}

/// Handle a GM control command
pub fn gm_command(command: &str, args: &[String], gm: &GmChannel) -> CommandResult<GmIntent> {
    if let Some(result) = common(command, GM_HELP) {
        return result;
    }
    match command {
        "list" | "ls" => CommandResult::Print(renderer::format_catalog(
            gm.catalog(),
            args.first().map(String::as_str),
        )),
        "search" | "s" => {
            let query = args.join(" ");
            let hits = gm.catalog().search(&query);
            if hits.is_empty() {
                CommandResult::Print(format!("No command matches '{}'", query))
            } else {
                CommandResult::Print(hits.join("\n"))
            }
        }
        // Labels may contain spaces
        "use" | "u" if !args.is_empty() => {
            CommandResult::Apply(vec![GmIntent::Select(args.join(" "))])
        }
        "use" | "u" => CommandResult::Print("Usage: :use <label|id>".to_string()),
        "show" => match gm.selected() {
            Some(cmd) => CommandResult::Print(renderer::format_command(
                cmd,
                gm.invoker().slot(&cmd.id),
            )),
            None => CommandResult::Print(ValidationError::NoCommandSelected.to_string()),
        },
        "refresh" => CommandResult::Apply(vec![GmIntent::RefreshCatalog]),
        _ => unknown(command),
    }
}

/// Turn a `key=value ...` line into an invocation of the selected command
pub fn gm_invocation(line: &str, gm: &GmChannel) -> Result<GmIntent> {
    let command = gm
        .selected()
        .ok_or(ValidationError::NoCommandSelected)?;
    let values = typed_values(command, parse_pairs(line)?)?;
    Ok(GmIntent::Invoke {
        command: command.id.clone(),
        values,
    })
}

/// Convert raw text values using the argument kinds of `command`.
///
/// Keys the command does not declare are passed through as strings so the
/// invoker can reject them.
pub fn typed_values(command: &Command, pairs: Vec<(String, String)>) -> Result<Map<String, Value>> {
    let mut values = Map::new();
    for (key, raw) in pairs {
        let value = match command.arg(&key).map(|a| &a.kind) {
            Some(ArgKind::Number) => parse_number(&raw)
                .ok_or_else(|| anyhow!("'{}' expects a number, got '{}'", key, raw))?,
            Some(ArgKind::Bool) => Value::Bool(parse_bool(&raw).ok_or_else(|| {
                anyhow!("'{}' expects true or false, got '{}'", key, raw)
            })?),
            _ => Value::String(raw),
        };
        values.insert(key, value);
    }
    Ok(values)
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::Number(n.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Handle an export control command
pub fn export_command(
    command: &str,
    args: &[String],
    export: &ExportSession,
) -> CommandResult<ExportIntent> {
    if let Some(result) = common(command, EXPORT_HELP) {
        return result;
    }
    match command {
        "config" | "cfg" => {
            CommandResult::Apply(vec![ExportIntent::RefreshConfig, ExportIntent::OpenConfig])
        }
        "close" => CommandResult::Apply(vec![ExportIntent::CloseConfig]),
        "set" => {
            let base = export.config().cloned().unwrap_or_default();
            match apply_settings(base, &args.join(" ")) {
                Ok(config) => CommandResult::Apply(vec![ExportIntent::SaveConfig(config)]),
                Err(e) => CommandResult::Print(e.to_string()),
            }
        }
        "export" | "run" => {
            if export.is_running() {
                CommandResult::Print("An export is already running".to_string())
            } else {
                CommandResult::Apply(vec![ExportIntent::Export])
            }
        }
        "find" => CommandResult::Apply(vec![ExportIntent::FindSheet(args.join(" "))]),
        _ => unknown(command),
    }
}

/// Apply `key=value` settings on top of `config`
pub fn apply_settings(mut config: ExportConfig, line: &str) -> Result<ExportConfig> {
    let pairs = parse_pairs(line)?;
    if pairs.is_empty() {
        bail!("Usage: :set key=value ...");
    }
    for (key, value) in pairs {
        let field = match key.as_str() {
            "export_cmd" | "export_command" => &mut config.export_command,
            "excel_path" => &mut config.excel_path,
            "export_client_path" => &mut config.export_client_path,
            "export_server_path" => &mut config.export_server_path,
            other => bail!("Unknown setting '{}'", other),
        };
        *field = value;
    }
    Ok(config)
}
