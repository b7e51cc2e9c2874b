//! Inbound frame decoding.
//!
//! The target process writes one JSON object per line:
//! `{"type":"response","text":...}`. A single read may deliver several
//! concatenated lines, or a fraction of one, so the decoder buffers
//! partial lines across reads and only parses once a full delimiter is
//! observed. Unparseable lines are dropped: the channel may interleave
//! diagnostic output with protocol frames, and that noise must never
//! stall a turn.

use serde::Deserialize;
use tracing::trace;

/// Sentinel the target emits when a turn's output is complete.
pub const TURN_FINISHED_MARKER: &str = "[TURN_FINISHED]";
/// Sentinel for prompts the target consumed without producing output
/// (slash commands and the like).
pub const COMMAND_HANDLED_MARKER: &str = "[Command Handled]";
/// Wrapper markers around a serialized conversation history payload.
pub const HISTORY_START_MARKER: &str = "[HISTORY_START]";
pub const HISTORY_END_MARKER: &str = "[HISTORY_END]";

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// A classified message from the target's response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMessage {
    /// An ordinary content chunk.
    Content(String),
    /// End-of-turn sentinel.
    TurnFinished,
    /// The prompt was consumed without visible output.
    CommandHandled,
    /// A conversation history payload (markers already stripped).
    HistoryData(String),
}

impl ResponseMessage {
    /// Classify a frame's `text` field.
    ///
    /// Markers are matched against the whole message, not by substring
    /// scan, so a content chunk that merely mentions the marker text
    /// stays content.
    fn classify(text: &str) -> Self {
        if text == TURN_FINISHED_MARKER {
            return ResponseMessage::TurnFinished;
        }
        if text == COMMAND_HANDLED_MARKER {
            return ResponseMessage::CommandHandled;
        }
        if let Some(rest) = text.strip_prefix(HISTORY_START_MARKER) {
            let payload = rest.strip_suffix(HISTORY_END_MARKER).unwrap_or(rest);
            return ResponseMessage::HistoryData(payload.to_string());
        }
        ResponseMessage::Content(text.to_string())
    }
}

/// Streaming decoder for newline-delimited JSON frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the channel; returns every message whose
    /// delimiter arrived, in order. Bytes after the last `\n` are kept
    /// for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ResponseMessage> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<RawFrame>(line) {
                Ok(frame) if frame.kind == "response" => {
                    messages.push(ResponseMessage::classify(&frame.text));
                }
                Ok(frame) => {
                    trace!(kind = %frame.kind, "ignoring frame with unrecognized type");
                }
                Err(err) => {
                    trace!(error = %err, "dropping unparseable line from channel");
                }
            }
        }
        messages
    }

    /// Number of buffered bytes awaiting a delimiter.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> String {
        format!("{}\n", serde_json::json!({"type": "response", "text": text}))
    }

    #[test]
    fn test_single_content_frame() {
        let mut decoder = FrameDecoder::new();
        let messages = decoder.push(frame("hello").as_bytes());
        assert_eq!(messages, vec![ResponseMessage::Content("hello".to_string())]);
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut decoder = FrameDecoder::new();
        let burst = format!("{}{}{}", frame("he"), frame("llo"), frame("[TURN_FINISHED]"));
        let messages = decoder.push(burst.as_bytes());
        assert_eq!(
            messages,
            vec![
                ResponseMessage::Content("he".to_string()),
                ResponseMessage::Content("llo".to_string()),
                ResponseMessage::TurnFinished,
            ]
        );
    }

    #[test]
    fn test_partial_line_buffered_across_reads() {
        let mut decoder = FrameDecoder::new();
        let full = frame("split across reads");
        let (a, b) = full.split_at(10);

        assert!(decoder.push(a.as_bytes()).is_empty());
        assert!(decoder.pending_bytes() > 0);

        let messages = decoder.push(b.as_bytes());
        assert_eq!(
            messages,
            vec![ResponseMessage::Content("split across reads".to_string())]
        );
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn test_resumes_at_every_split_point() {
        let burst = format!("{}{}", frame("first"), frame("second"));
        for split in 1..burst.len() {
            let mut decoder = FrameDecoder::new();
            let (a, b) = burst.split_at(split);
            let mut messages = decoder.push(a.as_bytes());
            messages.extend(decoder.push(b.as_bytes()));
            assert_eq!(
                messages,
                vec![
                    ResponseMessage::Content("first".to_string()),
                    ResponseMessage::Content("second".to_string()),
                ],
                "failed at split {}",
                split
            );
        }
    }

    #[test]
    fn test_malformed_line_does_not_block_later_lines() {
        let mut decoder = FrameDecoder::new();
        let burst = format!("not json at all\n{}", frame("still here"));
        let messages = decoder.push(burst.as_bytes());
        assert_eq!(
            messages,
            vec![ResponseMessage::Content("still here".to_string())]
        );
    }

    #[test]
    fn test_unknown_frame_type_ignored() {
        let mut decoder = FrameDecoder::new();
        let line = format!("{}\n", serde_json::json!({"type": "debug", "text": "x"}));
        assert!(decoder.push(line.as_bytes()).is_empty());
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut decoder = FrameDecoder::new();
        let burst = format!("\n\n{}\n", frame("after blanks"));
        let messages = decoder.push(burst.as_bytes());
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_marker_classification_is_exact_match() {
        let mut decoder = FrameDecoder::new();
        let messages = decoder.push(frame("the token [TURN_FINISHED] appeared").as_bytes());
        assert_eq!(
            messages,
            vec![ResponseMessage::Content(
                "the token [TURN_FINISHED] appeared".to_string()
            )]
        );
    }

    #[test]
    fn test_command_handled_classified() {
        let mut decoder = FrameDecoder::new();
        let messages = decoder.push(frame("[Command Handled]").as_bytes());
        assert_eq!(messages, vec![ResponseMessage::CommandHandled]);
    }

    #[test]
    fn test_history_payload_unwrapped() {
        let mut decoder = FrameDecoder::new();
        let wrapped = format!(
            "{}{}{}",
            HISTORY_START_MARKER,
            r#"[{"role":"user","text":"hi"}]"#,
            HISTORY_END_MARKER
        );
        let messages = decoder.push(frame(&wrapped).as_bytes());
        assert_eq!(
            messages,
            vec![ResponseMessage::HistoryData(
                r#"[{"role":"user","text":"hi"}]"#.to_string()
            )]
        );
    }
}
