//! Export channel - table export configuration, job progress and sheet lookup

use super::{ChannelKind, Direction, EntryLog, LogOrder, ValidationError};
use crate::protocol::{json_payload, kind, Envelope, ProtocolError};
use crate::session::{ChannelHandler, Decoded};
use serde::{Deserialize, Serialize};

/// Settings of the export tool, stored by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    #[serde(rename = "export_cmd")]
    pub export_command: String,
    pub excel_path: String,
    pub export_client_path: String,
    pub export_server_path: String,
}

/// State of the configuration dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigDialog {
    #[default]
    Closed,
    Open,
    /// Save sent, waiting for the acknowledgement
    Saving,
}

/// Server messages on the export channel
#[derive(Debug, Clone, PartialEq)]
pub enum ExportInbound {
    Config(ExportConfig),
    ConfigSaved,
    /// One progress line; an empty line marks the end of the job
    Progress(String),
    SheetInfo(String),
}

impl ExportInbound {
    fn from_envelope(envelope: Envelope) -> Result<Decoded<Self>, ProtocolError> {
        let message = match envelope.kind.as_str() {
            kind::TABLE_CONFIG => {
                let data = envelope.data.as_ref().ok_or_else(|| {
                    ProtocolError::invalid_payload(kind::TABLE_CONFIG, "missing config")
                })?;
                let config = json_payload(data)
                    .map_err(|e| ProtocolError::invalid_payload(kind::TABLE_CONFIG, e))?;
                ExportInbound::Config(config)
            }
            kind::SET_TABLE_CONFIG => ExportInbound::ConfigSaved,
            kind::EXPORT_TABLE => ExportInbound::Progress(envelope.data_text()),
            kind::FIND_SHEET => ExportInbound::SheetInfo(envelope.data_text()),
            _ => return Ok(Decoded::Unknown(envelope.kind)),
        };
        Ok(Decoded::Message(message))
    }
}

/// Operator requests on the export channel
#[derive(Debug, Clone, PartialEq)]
pub enum ExportIntent {
    RefreshConfig,
    OpenConfig,
    CloseConfig,
    SaveConfig(ExportConfig),
    Export,
    FindSheet(String),
    DismissSheetInfo,
}

/// One export session: config singleton, progress log and lookup result
#[derive(Debug, Clone)]
pub struct ExportSession {
    config: Option<ExportConfig>,
    dialog: ConfigDialog,
    log: EntryLog,
    running: bool,
    sheet_info: Option<String>,
}

impl Default for ExportSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportSession {
    pub fn new() -> Self {
        Self {
            config: None,
            dialog: ConfigDialog::Closed,
            log: EntryLog::new(LogOrder::OldestFirst),
            running: false,
            sheet_info: None,
        }
    }

    /// `None` until the backend has reported it
    pub fn config(&self) -> Option<&ExportConfig> {
        self.config.as_ref()
    }

    pub fn dialog(&self) -> ConfigDialog {
        self.dialog
    }

    /// Oldest-first progress of the current export
    pub fn log(&self) -> &EntryLog {
        &self.log
    }

    /// An export was triggered and its end marker has not arrived yet
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Result of the last sheet lookup, until dismissed
    pub fn sheet_info(&self) -> Option<&str> {
        self.sheet_info.as_deref()
    }

    pub fn open_config(&mut self) {
        self.dialog = ConfigDialog::Open;
    }

    pub fn close_config(&mut self) {
        self.dialog = ConfigDialog::Closed;
    }

    /// Build the save request; the backend expects the config as a JSON string
    pub fn save_config(&mut self, config: &ExportConfig) -> Result<Envelope, ValidationError> {
        let text = serde_json::to_string(config)
            .map_err(|e| ValidationError::InvalidConfig(e.to_string()))?;
        self.dialog = ConfigDialog::Saving;
        Ok(Envelope::new(kind::SET_TABLE_CONFIG).with_data(text))
    }

    /// Clear the previous run and build the trigger
    pub fn trigger_export(&mut self) -> Envelope {
        self.log.clear();
        self.running = true;
        Envelope::new(kind::EXPORT_TABLE)
    }

    pub fn find_sheet(&self, name: &str) -> Result<Envelope, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptySheetName);
        }
        Ok(Envelope::new(kind::FIND_SHEET).with_data(name))
    }

    pub fn dismiss_sheet_info(&mut self) {
        self.sheet_info = None;
    }

    /// Log one progress line. Only an exactly empty line ends the run;
    /// blank lines from the tool are kept.
    pub fn on_progress(&mut self, line: &str) {
        if line.is_empty() {
            if self.running {
                tracing::info!("Export finished with {} line(s)", self.log.len());
            }
            self.running = false;
            return;
        }
        self.log
            .push(Direction::Recv, line.trim_end_matches(['\r', '\n']));
    }
}

impl ChannelHandler for ExportSession {
    type Inbound = ExportInbound;
    type Intent = ExportIntent;

    const KIND: ChannelKind = ChannelKind::Export;

    fn decode(envelope: Envelope) -> Result<Decoded<ExportInbound>, ProtocolError> {
        ExportInbound::from_envelope(envelope)
    }

    fn on_open(&mut self) -> Vec<Envelope> {
        vec![Envelope::new(kind::TABLE_CONFIG)]
    }

    fn handle(&mut self, message: ExportInbound) -> Vec<Envelope> {
        match message {
            ExportInbound::Config(config) => self.config = Some(config),
            ExportInbound::ConfigSaved => {
                self.dialog = ConfigDialog::Closed;
                return vec![Envelope::new(kind::TABLE_CONFIG)];
            }
            ExportInbound::Progress(line) => self.on_progress(&line),
            ExportInbound::SheetInfo(text) => self.sheet_info = Some(text),
        }
        Vec::new()
    }

    fn apply(&mut self, intent: ExportIntent) -> Result<Vec<Envelope>, ValidationError> {
        let envelope = match intent {
            ExportIntent::RefreshConfig => Envelope::new(kind::TABLE_CONFIG),
            ExportIntent::OpenConfig => {
                self.open_config();
                return Ok(Vec::new());
            }
            ExportIntent::CloseConfig => {
                self.close_config();
                return Ok(Vec::new());
            }
            ExportIntent::SaveConfig(config) => self.save_config(&config)?,
            ExportIntent::Export => self.trigger_export(),
            ExportIntent::FindSheet(name) => self.find_sheet(&name)?,
            ExportIntent::DismissSheetInfo => {
                self.dismiss_sheet_info();
                return Ok(Vec::new());
            }
        };
        Ok(vec![envelope])
    }
}
