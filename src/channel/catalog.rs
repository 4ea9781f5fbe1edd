//! GM command catalog - category tree plus flat lookup indexes

use crate::protocol::{json_payload, kind, ProtocolError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Declared type of a command argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    Number,
    String,
    Bool,
    /// A type this client does not know how to render
    Unrecognized(String),
}

impl ArgKind {
    fn from_wire(raw: &str) -> Self {
        match raw {
            "number" => ArgKind::Number,
            "string" => ArgKind::String,
            "bool" => ArgKind::Bool,
            other => ArgKind::Unrecognized(other.to_string()),
        }
    }
}

/// How a front end should render an argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Numeric { min: Option<f64>, max: Option<f64> },
    Text,
    Toggle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandArg {
    pub kind: ArgKind,
    /// Label shown next to the field
    pub name: String,
    /// Form field key, also the key in the outgoing payload
    pub index: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl CommandArg {
    /// `None` for argument kinds that are not rendered
    pub fn field(&self) -> Option<FieldKind> {
        match self.kind {
            ArgKind::Number => Some(FieldKind::Numeric {
                min: self.min,
                max: self.max,
            }),
            ArgKind::String => Some(FieldKind::Text),
            ArgKind::Bool => Some(FieldKind::Toggle),
            ArgKind::Unrecognized(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Server-assigned key
    pub id: String,
    pub name: String,
    /// `name(id)`, unique across the catalog
    pub label: String,
    pub category: String,
    pub args: Vec<CommandArg>,
}

impl Command {
    pub fn arg(&self, index: &str) -> Option<&CommandArg> {
        self.args.iter().find(|a| a.index == index)
    }

    /// Arguments a form can show, with their field kind
    pub fn renderable_args(&self) -> impl Iterator<Item = (&CommandArg, FieldKind)> {
        self.args.iter().filter_map(|a| a.field().map(|f| (a, f)))
    }
}

pub fn display_label(name: &str, id: &str) -> String {
    format!("{}({})", name, id)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub name: String,
    pub commands: Vec<Command>,
}

#[derive(Deserialize)]
struct RawCategory {
    name: String,
    #[serde(default, alias = "commands")]
    value: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawCommand {
    #[serde(default)]
    name: String,
    /// Parsed one by one so a bad argument only drops itself
    #[serde(default)]
    args: Vec<Value>,
}

#[derive(Deserialize)]
struct RawArg {
    /// Missing type reads as an unrecognized kind
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
    index: String,
    #[serde(default)]
    min: Option<Value>,
    #[serde(default)]
    max: Option<Value>,
}

/// Bounds may arrive as numbers or numeric strings; anything else is no bound
fn bound(value: Option<Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a `gmList` payload into categories, preserving server order.
///
/// An empty object stands for "no GM service registered" and yields an
/// empty catalog.
pub fn parse_catalog(data: &Value) -> Result<Vec<Category>, ProtocolError> {
    let invalid = |e: &dyn std::fmt::Display| ProtocolError::invalid_payload(kind::GM_LIST, e);

    let payload: Value = json_payload(data).map_err(|e| invalid(&e))?;
    let raw_categories: Vec<RawCategory> = match payload {
        Value::Array(_) => serde_json::from_value(payload).map_err(|e| invalid(&e))?,
        Value::Object(ref map) if map.is_empty() => Vec::new(),
        Value::Null => Vec::new(),
        _ => return Err(invalid(&"expected an array of categories")),
    };

    let mut categories = Vec::with_capacity(raw_categories.len());
    for raw in raw_categories {
        let mut commands = Vec::with_capacity(raw.value.len());
        for (id, body) in raw.value {
            let cmd = match RawCommand::deserialize(&body) {
                Ok(cmd) => cmd,
                Err(e) => {
                    tracing::warn!("Skipping GM command '{}': {}", id, e);
                    continue;
                }
            };

            let mut seen = HashSet::new();
            let mut args = Vec::with_capacity(cmd.args.len());
            for raw_arg in cmd.args {
                let arg = match RawArg::deserialize(&raw_arg) {
                    Ok(arg) => arg,
                    Err(e) => {
                        tracing::warn!("Skipping an argument of '{}': {}", id, e);
                        continue;
                    }
                };
                if !seen.insert(arg.index.clone()) {
                    tracing::warn!("Command '{}' repeats argument '{}'", id, arg.index);
                    continue;
                }
                args.push(CommandArg {
                    kind: ArgKind::from_wire(&arg.kind),
                    name: arg.name,
                    index: arg.index,
                    min: bound(arg.min),
                    max: bound(arg.max),
                });
            }

            commands.push(Command {
                label: display_label(&cmd.name, &id),
                id,
                name: cmd.name,
                category: raw.name.clone(),
                args,
            });
        }
        categories.push(Category {
            name: raw.name,
            commands,
        });
    }
    Ok(categories)
}

/// Catalog as last reported by the server
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    categories: Vec<Category>,
    by_label: HashMap<String, Command>,
    label_by_id: HashMap<String, String>,
    labels: Vec<String>,
}

impl CommandCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole catalog and rebuild its indexes
    pub fn replace(&mut self, categories: Vec<Category>) {
        let mut by_label = HashMap::new();
        let mut label_by_id = HashMap::new();
        for command in categories.iter().flat_map(|c| c.commands.iter()) {
            label_by_id.insert(command.id.clone(), command.label.clone());
            by_label.insert(command.label.clone(), command.clone());
        }

        let mut labels: Vec<String> = by_label.keys().cloned().collect();
        labels.sort();

        self.categories = categories;
        self.by_label = by_label;
        self.label_by_id = label_by_id;
        self.labels = labels;
    }

    /// Parse and replace in one step; on error the previous catalog stays
    pub fn ingest(&mut self, data: &Value) -> Result<usize, ProtocolError> {
        let categories = parse_catalog(data)?;
        self.replace(categories);
        Ok(self.len())
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Sorted display labels
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn get(&self, label: &str) -> Option<&Command> {
        self.by_label.get(label)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Command> {
        self.label_by_id.get(id).and_then(|l| self.by_label.get(l))
    }

    /// Look up by display label first, then by id
    pub fn resolve(&self, key: &str) -> Option<&Command> {
        self.get(key).or_else(|| self.get_by_id(key))
    }

    /// Case-insensitive substring search over display labels
    pub fn search(&self, query: &str) -> Vec<&str> {
        let needle = query.to_lowercase();
        self.labels
            .iter()
            .filter(|l| l.to_lowercase().contains(&needle))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!([
            {
                "name": "Player",
                "value": {
                    "kick": {"name": "KickPlayer", "args": [
                        {"type": "string", "name": "Reason", "index": "reason"}
                    ]},
                    "add_gold": {"name": "AddGold", "args": [
                        {"type": "number", "name": "Entity", "index": "entity_id"},
                        {"type": "number", "name": "Amount", "index": "amount", "min": 1, "max": 1000},
                        {"type": "color", "name": "Tint", "index": "tint"}
                    ]}
                }
            },
            {"name": "Server", "value": {"shutdown": {"name": "Shutdown", "args": []}}}
        ])
    }

    #[test]
    fn test_labels_and_indexes() {
        let mut catalog = CommandCatalog::new();
        assert_eq!(catalog.ingest(&sample()).unwrap(), 3);

        assert_eq!(
            catalog.labels(),
            &["AddGold(add_gold)", "KickPlayer(kick)", "Shutdown(shutdown)"]
        );
        let kick = catalog.get("KickPlayer(kick)").unwrap();
        assert_eq!(kick.id, "kick");
        assert_eq!(kick.category, "Player");
        assert_eq!(catalog.get_by_id("shutdown").unwrap().label, "Shutdown(shutdown)");
        assert_eq!(catalog.resolve("add_gold").unwrap().name, "AddGold");
    }

    #[test]
    fn test_category_order_is_preserved() {
        let mut catalog = CommandCatalog::new();
        catalog.ingest(&sample()).unwrap();
        let player = &catalog.categories()[0];
        assert_eq!(player.name, "Player");
        let ids: Vec<_> = player.commands.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["kick", "add_gold"]);
    }

    #[test]
    fn test_embedded_string_payload() {
        let mut catalog = CommandCatalog::new();
        catalog.ingest(&json!(sample().to_string())).unwrap();
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_unrecognized_arg_is_not_rendered() {
        let mut catalog = CommandCatalog::new();
        catalog.ingest(&sample()).unwrap();
        let cmd = catalog.get_by_id("add_gold").unwrap();
        assert_eq!(cmd.args.len(), 3);

        let fields: Vec<_> = cmd.renderable_args().map(|(a, f)| (a.index.as_str(), f)).collect();
        assert_eq!(
            fields,
            vec![
                ("entity_id", FieldKind::Numeric { min: None, max: None }),
                ("amount", FieldKind::Numeric { min: Some(1.0), max: Some(1000.0) }),
            ]
        );
    }

    #[test]
    fn test_empty_object_means_empty_catalog() {
        let mut catalog = CommandCatalog::new();
        catalog.ingest(&sample()).unwrap();
        catalog.ingest(&json!("{}")).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.categories().is_empty());
    }

    #[test]
    fn test_bad_payload_keeps_previous_catalog() {
        let mut catalog = CommandCatalog::new();
        catalog.ingest(&sample()).unwrap();
        assert!(catalog.ingest(&json!("not json")).is_err());
        assert!(catalog.ingest(&json!(42)).is_err());
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let mut catalog = CommandCatalog::new();
        catalog.ingest(&sample()).unwrap();
        assert_eq!(catalog.search("gold"), vec!["AddGold(add_gold)"]);
        assert_eq!(catalog.search("").len(), 3);
    }

    #[test]
    fn test_untyped_arg_is_kept_but_not_rendered() {
        let data = json!([{"name": "Player", "value": {
            "add_gold": {"name": "AddGold", "args": [
                {"type": "number", "name": "Amount", "index": "amount", "min": "1", "max": true},
                {"name": "X", "index": "x"}
            ]}
        }}]);
        let categories = parse_catalog(&data).unwrap();
        let cmd = &categories[0].commands[0];
        assert_eq!(cmd.args.len(), 2);
        assert_eq!(cmd.args[1].kind, ArgKind::Unrecognized(String::new()));

        let fields: Vec<_> = cmd.renderable_args().map(|(a, f)| (a.index.as_str(), f)).collect();
        assert_eq!(
            fields,
            vec![("amount", FieldKind::Numeric { min: Some(1.0), max: None })]
        );
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let data = json!([{"name": "Player", "value": {
            "kick": {"name": "KickPlayer", "args": [
                {"type": "number", "name": "Entity"},
                {"type": "string", "name": "Reason", "index": "reason"},
                "not an arg"
            ]},
            "broken": {"name": 42, "args": "none"},
            "shutdown": {"name": "Shutdown", "args": []}
        }}]);
        let mut catalog = CommandCatalog::new();
        assert_eq!(catalog.ingest(&data).unwrap(), 2);
        assert!(catalog.get_by_id("broken").is_none());

        let kick = catalog.get_by_id("kick").unwrap();
        let indexes: Vec<_> = kick.args.iter().map(|a| a.index.as_str()).collect();
        assert_eq!(indexes, vec!["reason"]);
    }

    #[test]
    fn test_duplicate_arg_index_keeps_first() {
        let data = json!([{"name": "X", "value": {"c": {"name": "C", "args": [
            {"type": "string", "name": "First", "index": "k"},
            {"type": "number", "name": "Second", "index": "k"}
        ]}}}]);
        let categories = parse_catalog(&data).unwrap();
        let args = &categories[0].commands[0].args;
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].name, "First");
    }
}
