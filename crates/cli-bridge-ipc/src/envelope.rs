use serde::Serialize;

/// Outbound request to a target process: one JSON object per line.
///
/// Immutable once sent; the wire shape is fixed by the patched target
/// (`{"command":"prompt","text":...}` / `{"command":"getHistory"}`).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum RequestEnvelope {
    Prompt { text: String },
    GetHistory,
}

impl RequestEnvelope {
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::Prompt { text: text.into() }
    }
}
