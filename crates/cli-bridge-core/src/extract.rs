//! Embedded command extraction.
//!
//! The hub can ask the model to smuggle a structured directive inside
//! an otherwise free-text response: a marker token followed by a JSON
//! object, possibly trailed by explanatory prose. Extraction is
//! best-effort; a malformed directive never blocks delivery of the
//! plain-text response.

use serde_json::Map;
use serde_json::Value;
use tracing::debug;

/// Marker preceding an embedded directive in response text.
pub const HUB_COMMAND_MARKER: &str = "HUB_COMMAND:";

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedCommand {
    pub name: String,
    pub payload: Value,
}

/// Scan completed response text for an embedded directive.
///
/// Everything after the marker is the candidate blob, trimmed to the
/// last `}` so trailing prose does not break the parse. Returns `None`
/// for missing markers and for directives that fail to parse.
pub fn extract_embedded_command(full_text: &str) -> Option<EmbeddedCommand> {
    let idx = full_text.find(HUB_COMMAND_MARKER)?;
    let after = &full_text[idx + HUB_COMMAND_MARKER.len()..];

    let end = match after.rfind('}') {
        Some(end) => end,
        None => {
            debug!("embedded command marker present but no JSON object follows");
            return None;
        }
    };

    let candidate = after[..=end].trim();
    let value: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "embedded command failed to parse");
            return None;
        }
    };

    let object = value.as_object()?;
    let name = object.get("Command")?.as_str()?.to_string();
    let payload = object
        .get("Payload")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    Some(EmbeddedCommand { name, payload })
}
