//! GM channel - catalog browsing and command invocation

use super::catalog::{parse_catalog, Category, Command, CommandCatalog};
use super::invoker::{CommandInvoker, ResponseSlot};
use super::{ChannelKind, ValidationError};
use crate::protocol::{kind, Envelope, ProtocolError};
use crate::session::{ChannelHandler, Decoded};
use serde_json::{Map, Value};

/// Server messages on the GM channel
#[derive(Debug, Clone, PartialEq)]
pub enum GmInbound {
    Catalog(Vec<Category>),
    CommandResult { command: String, data: Value },
}

impl GmInbound {
    fn from_envelope(envelope: Envelope) -> Result<Decoded<Self>, ProtocolError> {
        let message = match envelope.kind.as_str() {
            kind::GM_LIST => {
                GmInbound::Catalog(parse_catalog(envelope.data.as_ref().unwrap_or(&Value::Null))?)
            }
            kind::GM_COMMAND => {
                let command = envelope.command.ok_or_else(|| {
                    ProtocolError::invalid_payload(kind::GM_COMMAND, "missing command id")
                })?;
                GmInbound::CommandResult {
                    command,
                    data: envelope.data.unwrap_or(Value::Null),
                }
            }
            _ => return Ok(Decoded::Unknown(envelope.kind)),
        };
        Ok(Decoded::Message(message))
    }
}

/// Operator requests on the GM channel
#[derive(Debug, Clone, PartialEq)]
pub enum GmIntent {
    RefreshCatalog,
    /// Select by display label or id
    Select(String),
    ClearSelection,
    /// Invoke by display label or id with values keyed by argument index
    Invoke {
        command: String,
        values: Map<String, Value>,
    },
}

/// Catalog, current selection and response store of one GM session
#[derive(Debug, Clone, Default)]
pub struct GmChannel {
    catalog: CommandCatalog,
    invoker: CommandInvoker,
    selected: Option<String>,
}

impl GmChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    pub fn invoker(&self) -> &CommandInvoker {
        &self.invoker
    }

    /// Currently selected command, if it still exists in the catalog
    pub fn selected(&self) -> Option<&Command> {
        self.selected.as_deref().and_then(|l| self.catalog.get(l))
    }

    pub fn select(&mut self, key: &str) -> Result<&Command, ValidationError> {
        let command = self
            .catalog
            .resolve(key)
            .ok_or_else(|| ValidationError::UnknownCommand(key.to_string()))?;
        self.selected = Some(command.label.clone());
        Ok(command)
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Response slot of the selected command
    pub fn selected_response(&self) -> Option<&ResponseSlot> {
        self.selected().and_then(|c| self.invoker.slot(&c.id))
    }

    pub fn invoke(
        &mut self,
        key: &str,
        values: Map<String, Value>,
    ) -> Result<Envelope, ValidationError> {
        let command = self
            .catalog
            .resolve(key)
            .ok_or_else(|| ValidationError::UnknownCommand(key.to_string()))?;
        self.invoker.invoke(command, values)
    }
}

impl ChannelHandler for GmChannel {
    type Inbound = GmInbound;
    type Intent = GmIntent;

    const KIND: ChannelKind = ChannelKind::Gm;

    fn decode(envelope: Envelope) -> Result<Decoded<GmInbound>, ProtocolError> {
        GmInbound::from_envelope(envelope)
    }

    fn on_open(&mut self) -> Vec<Envelope> {
        vec![Envelope::new(kind::GM_LIST)]
    }

    fn handle(&mut self, message: GmInbound) -> Vec<Envelope> {
        match message {
            GmInbound::Catalog(categories) => {
                self.catalog.replace(categories);
                tracing::info!("Catalog holds {} command(s)", self.catalog.len());
            }
            GmInbound::CommandResult { command, data } => self.invoker.on_response(command, data),
        }
        Vec::new()
    }

    fn apply(&mut self, intent: GmIntent) -> Result<Vec<Envelope>, ValidationError> {
        match intent {
            GmIntent::RefreshCatalog => Ok(vec![Envelope::new(kind::GM_LIST)]),
            GmIntent::Select(key) => self.select(&key).map(|_| Vec::new()),
            GmIntent::ClearSelection => {
                self.clear_selection();
                Ok(Vec::new())
            }
            GmIntent::Invoke { command, values } => Ok(vec![self.invoke(&command, values)?]),
        }
    }
}
