//! Simulator configuration documents.
//!
//! A document is JSON with `//` and `/* */` comments. Two top-level
//! fields matter: `simulator.url` (opaque locator of the hosting
//! implementation) and `simulator.modules`, the ordered module list. Each
//! module entry carries an id, a kind-bearing url, and an optional
//! per-kind config object validated by the kind's factory.

use serde::Deserialize;
use serde_json::Value;

use wirewrap_core::core::error::{ConfigError, SimError};
use wirewrap_core::core::module::ModuleSpec;
use wirewrap_core::core::simulator::Simulator;

use crate::registry;

#[derive(Clone, Debug, Deserialize)]
pub struct ModuleEntry {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub css: Option<Value>,
    #[serde(default)]
    pub config: Option<Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SimulatorConfig {
    pub url: String,
    pub modules: Vec<ModuleEntry>,
}

#[derive(Clone, Debug, Deserialize)]
struct Document {
    simulator: SimulatorConfig,
}

/// Strip `//` and `/* */` comments, string-literal aware.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '/' => match chars.peek() {
                Some('/') => {
                    for ch in chars.by_ref() {
                        if ch == '\n' {
                            out.push('\n');
                            break;
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for ch in chars.by_ref() {
                        if prev == '*' && ch == '/' {
                            break;
                        }
                        if ch == '\n' {
                            // Keep line numbers stable for error messages.
                            out.push('\n');
                        }
                        prev = ch;
                    }
                }
                _ => out.push(ch),
            },
            _ => out.push(ch),
        }
    }
    out
}

/// Parse a configuration document.
pub fn parse_document(text: &str) -> Result<SimulatorConfig, ConfigError> {
    let stripped = strip_comments(text);
    let document: Document = serde_json::from_str(&stripped)
        .map_err(|err| ConfigError::Document(err.to_string()))?;
    Ok(document.simulator)
}

/// Resolve every module entry against the registry, in document order.
pub fn module_specs(config: &SimulatorConfig) -> Result<Vec<ModuleSpec>, ConfigError> {
    config
        .modules
        .iter()
        .map(|entry| {
            let name = registry::kind_from_url(&entry.url);
            let kind = registry::find(name)
                .ok_or_else(|| ConfigError::UnknownKind(name.to_string()))?;
            let raw = entry
                .config
                .clone()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
            (kind.create)(&entry.id, raw)
        })
        .collect()
}

/// Build a simulator straight from a document.
pub fn build(text: &str) -> Result<Simulator, SimError> {
    let config = parse_document(text)?;
    let specs = module_specs(&config)?;
    Simulator::build(specs)
}
