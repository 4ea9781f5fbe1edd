//! Input handling - parse user input and commands

use anyhow::{bail, Result};

/// Parsed user input
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedInput {
    /// Regular input for the active channel
    Text(String),

    /// Switch active target: @target
    SwitchTarget(String),

    /// Send to a specific target: @target: command
    SendToTarget { target: String, command: String },

    /// Control command: :command args
    ControlCommand { command: String, args: Vec<String> },
}

/// Parse a line of user input
pub fn parse_input(line: &str) -> Result<ParsedInput> {
    let line = line.trim();

    // Control command: :command
    if let Some(rest) = line.strip_prefix(':') {
        let mut parts = rest.splitn(2, ' ');
        let command = parts.next().unwrap_or_default().to_string();
        if command.is_empty() {
            bail!("Missing command after ':'");
        }
        let args = parts
            .next()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        return Ok(ParsedInput::ControlCommand { command, args });
    }

    // Target addressing: @target or @target: command
    if let Some(rest) = line.strip_prefix('@') {
        if let Some(colon_idx) = rest.find(':') {
            let target = rest[..colon_idx].trim().to_string();
            let command = rest[colon_idx + 1..].trim().to_string();
            if target.is_empty() {
                bail!("Missing target name after '@'");
            }
            return Ok(ParsedInput::SendToTarget { target, command });
        }
        let target = rest.split_whitespace().next().unwrap_or(rest).to_string();
        if target.is_empty() {
            bail!("Missing target name after '@'");
        }
        return Ok(ParsedInput::SwitchTarget(target));
    }

    Ok(ParsedInput::Text(line.to_string()))
}

/// Split `key=value` pairs separated by whitespace.
///
/// Values may be double-quoted to include spaces: `reason="too fast"`.
pub fn parse_pairs(line: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = line.trim().chars().peekable();

    while chars.peek().is_some() {
        let mut key = String::new();
        let mut has_eq = false;
        for c in chars.by_ref() {
            if c == '=' {
                has_eq = true;
                break;
            }
            key.push(c);
        }
        let key = key.trim().to_string();
        if !has_eq || key.is_empty() || key.contains(char::is_whitespace) {
            bail!("Expected key=value, got '{}'", key);
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '"' {
                    closed = true;
                    break;
                }
                value.push(c);
            }
            if !closed {
                bail!("Unterminated quote in value for '{}'", key);
            }
        } else {
            while let Some(c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(*c);
                chars.next();
            }
        }
        pairs.push((key, value));

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
    }
    Ok(pairs)
}
