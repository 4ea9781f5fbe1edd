//! GM command invoker - request building and response correlation

use super::catalog::{ArgKind, Command};
use super::ValidationError;
use crate::protocol::{kind, Envelope};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Response state for one command id
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseSlot {
    /// Invoked, no response yet
    Pending,
    Ready(Value),
}

/// Build the `gmCommand` request for `command`.
///
/// Values are checked against the argument schema and emitted in schema
/// order, followed by the command id. `null` values stand for untouched
/// form fields and are left out.
pub fn build_request(
    command: &Command,
    mut values: Map<String, Value>,
) -> Result<Envelope, ValidationError> {
    if let Some(index) = values.keys().find(|k| command.arg(k).is_none()) {
        return Err(ValidationError::UnknownArgument {
            command: command.id.clone(),
            index: index.clone(),
        });
    }

    let mut data = Map::new();
    for arg in &command.args {
        let Some(value) = values.remove(&arg.index) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        check_value(&arg.index, &arg.kind, arg.min, arg.max, &value)?;
        data.insert(arg.index.clone(), value);
    }
    data.insert("command".to_string(), Value::String(command.id.clone()));

    Ok(Envelope::new(kind::GM_COMMAND)
        .with_data(Value::Object(data))
        .with_command(command.id.clone()))
}

fn check_value(
    index: &str,
    kind: &ArgKind,
    min: Option<f64>,
    max: Option<f64>,
    value: &Value,
) -> Result<(), ValidationError> {
    let wrong_type = |expected| ValidationError::WrongType {
        index: index.to_string(),
        expected,
    };
    match kind {
        ArgKind::Number => {
            let n = value.as_f64().ok_or_else(|| wrong_type("number"))?;
            let below = min.is_some_and(|m| n < m);
            let above = max.is_some_and(|m| n > m);
            if below || above {
                return Err(ValidationError::OutOfRange {
                    index: index.to_string(),
                    value: n,
                });
            }
        }
        ArgKind::String if !value.is_string() => return Err(wrong_type("string")),
        ArgKind::Bool if !value.is_boolean() => return Err(wrong_type("boolean")),
        _ => {}
    }
    Ok(())
}

/// One response slot per command id
#[derive(Debug, Clone, Default)]
pub struct CommandInvoker {
    responses: HashMap<String, ResponseSlot>,
}

impl CommandInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, clear the command's slot, and build its request
    pub fn invoke(
        &mut self,
        command: &Command,
        values: Map<String, Value>,
    ) -> Result<Envelope, ValidationError> {
        let envelope = build_request(command, values)?;
        self.responses
            .insert(command.id.clone(), ResponseSlot::Pending);
        Ok(envelope)
    }

    /// Store a response under its command id
    pub fn on_response(&mut self, command: String, data: Value) {
        self.responses.insert(command, ResponseSlot::Ready(data));
    }

    pub fn slot(&self, id: &str) -> Option<&ResponseSlot> {
        self.responses.get(id)
    }

    /// The stored response, if one arrived since the last invocation
    pub fn response(&self, id: &str) -> Option<&Value> {
        match self.responses.get(id) {
            Some(ResponseSlot::Ready(data)) => Some(data),
            _ => None,
        }
    }
}
