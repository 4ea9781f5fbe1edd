//! Envelope and message vocabulary for the admin backend protocol

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Message `type` strings understood by at least one channel
pub mod kind {
    pub const SERVERS: &str = "servers";
    pub const MESSAGE: &str = "message";
    pub const RELOAD: &str = "reload";
    pub const ERROR: &str = "error";
    pub const GM_LIST: &str = "gmList";
    pub const GM_COMMAND: &str = "gmCommand";
    pub const TABLE_CONFIG: &str = "tableConfig";
    pub const SET_TABLE_CONFIG: &str = "setTableConfig";
    pub const EXPORT_TABLE: &str = "exportTable";
    pub const FIND_SHEET: &str = "findSheet";
}

/// JSON wrapper common to every frame on every channel.
///
/// `type` is always present; the other fields depend on the message kind
/// and are omitted from the wire when absent. The backend serializes unset
/// `target`/`command` as empty strings, which are read back as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub target: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub command: Option<String>,
}

impl Envelope {
    /// Envelope with only a `type`
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
            target: None,
            command: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// `data` as a borrowed string, if it is one
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }

    /// `data` rendered as display text.
    ///
    /// Strings come back verbatim, `null`/absent as an empty string and
    /// anything else as compact JSON.
    pub fn data_text(&self) -> String {
        match &self.data {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
