//! Turn accumulation.
//!
//! One "turn" is everything the target produces between a prompt and
//! its end-of-turn sentinel. Older target builds never send the
//! sentinel and instead return one unmarked blob, so the accumulator
//! also finalizes on an inactivity grace window when exactly one chunk
//! has arrived. Time is passed in rather than read from the wall clock
//! so tests drive the state machine without sleeping.

use std::time::Duration;
use std::time::Instant;

use crate::frame::ResponseMessage;

const DEFAULT_GRACE_WINDOW_MS: u64 = 500;
const DEFAULT_TURN_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Inactivity window after a lone content chunk before the turn is
    /// treated as finished (legacy targets without a sentinel).
    pub grace_window: Duration,
    /// Hard ceiling on a turn's duration, regardless of state.
    pub turn_timeout: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_millis(DEFAULT_GRACE_WINDOW_MS),
            turn_timeout: Duration::from_secs(DEFAULT_TURN_TIMEOUT_SECS),
        }
    }
}

impl TurnConfig {
    pub fn with_grace_window(mut self, window: Duration) -> Self {
        self.grace_window = window;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingFirst,
    Accumulating,
    Finished,
    TimedOut,
}

/// Outcome of one turn, finalized exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnResult {
    /// Accumulated content. Never contains terminal-marker tokens.
    pub full_text: String,
    pub completed: bool,
    pub timed_out: bool,
}

#[derive(Debug)]
pub struct TurnAccumulator {
    config: TurnConfig,
    state: TurnState,
    full_text: String,
    started_at: Option<Instant>,
    last_content_at: Option<Instant>,
    content_chunks: usize,
    command_handled: bool,
}

impl TurnAccumulator {
    pub fn new(config: TurnConfig) -> Self {
        Self {
            config,
            state: TurnState::Idle,
            full_text: String::new(),
            started_at: None,
            last_content_at: None,
            content_chunks: 0,
            command_handled: false,
        }
    }

    /// Arm the accumulator; called when the request is written.
    pub fn start(&mut self, now: Instant) {
        self.state = TurnState::AwaitingFirst;
        self.started_at = Some(now);
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// True once the target acknowledged the prompt without producing
    /// visible output (slash commands).
    pub fn command_handled(&self) -> bool {
        self.command_handled
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TurnState::Finished | TurnState::TimedOut)
    }

    pub fn on_message(&mut self, message: ResponseMessage, now: Instant) {
        if self.is_terminal() || self.state == TurnState::Idle {
            return;
        }

        match message {
            ResponseMessage::Content(payload) => {
                self.full_text.push_str(&payload);
                self.full_text.push('\n');
                self.content_chunks += 1;
                self.last_content_at = Some(now);
                self.state = TurnState::Accumulating;
            }
            ResponseMessage::TurnFinished => {
                self.state = TurnState::Finished;
            }
            ResponseMessage::CommandHandled => {
                // Recorded, never appended to visible text.
                self.command_handled = true;
            }
            ResponseMessage::HistoryData(payload) => {
                if self.state == TurnState::AwaitingFirst {
                    // History short-circuits the turn: the raw payload
                    // replaces the accumulated text wholesale.
                    self.full_text = payload;
                    self.state = TurnState::Finished;
                }
            }
        }
    }

    /// Advance time-driven transitions; call on every poll tick.
    pub fn poll(&mut self, now: Instant) {
        if self.is_terminal() || self.state == TurnState::Idle {
            return;
        }

        if let Some(started) = self.started_at {
            if now.duration_since(started) >= self.config.turn_timeout {
                self.state = TurnState::TimedOut;
                return;
            }
        }

        // Legacy protocol: one unmarked blob, then silence.
        if self.state == TurnState::Accumulating && self.content_chunks == 1 {
            if let Some(last) = self.last_content_at {
                if now.duration_since(last) >= self.config.grace_window {
                    self.state = TurnState::Finished;
                }
            }
        }
    }

    pub fn finish(self) -> TurnResult {
        TurnResult {
            full_text: self.full_text,
            completed: self.state == TurnState::Finished,
            timed_out: self.state == TurnState::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator(config: TurnConfig) -> (TurnAccumulator, Instant) {
        let mut acc = TurnAccumulator::new(config);
        let start = Instant::now();
        acc.start(start);
        (acc, start)
    }

    #[test]
    fn test_chunked_turn_with_sentinel() {
        // Scenario: "he", "llo", then the sentinel, in three reads.
        let (mut acc, start) = accumulator(TurnConfig::default());

        acc.on_message(ResponseMessage::Content("he".to_string()), start);
        acc.on_message(ResponseMessage::Content("llo".to_string()), start);
        assert_eq!(acc.state(), TurnState::Accumulating);

        acc.on_message(ResponseMessage::TurnFinished, start);
        assert!(acc.is_terminal());

        let result = acc.finish();
        assert_eq!(result.full_text, "he\nllo\n");
        assert!(result.completed);
        assert!(!result.timed_out);
    }

    #[test]
    fn test_sentinel_never_reaches_full_text() {
        let (mut acc, start) = accumulator(TurnConfig::default());
        acc.on_message(ResponseMessage::Content("real".to_string()), start);
        acc.on_message(ResponseMessage::TurnFinished, start);
        let result = acc.finish();
        assert!(!result.full_text.contains("[TURN_FINISHED]"));
    }

    #[test]
    fn test_legacy_single_blob_finalizes_after_grace_window() {
        // Scenario: one content message, then 600ms of silence.
        let config = TurnConfig::default().with_grace_window(Duration::from_millis(500));
        let (mut acc, start) = accumulator(config);

        acc.on_message(ResponseMessage::Content("blob".to_string()), start);
        acc.poll(start + Duration::from_millis(100));
        assert_eq!(acc.state(), TurnState::Accumulating);

        acc.poll(start + Duration::from_millis(600));
        assert_eq!(acc.state(), TurnState::Finished);

        let result = acc.finish();
        assert_eq!(result.full_text, "blob\n");
        assert!(result.completed);
    }

    #[test]
    fn test_grace_window_does_not_apply_after_second_chunk() {
        let (mut acc, start) = accumulator(TurnConfig::default());
        acc.on_message(ResponseMessage::Content("a".to_string()), start);
        acc.on_message(ResponseMessage::Content("b".to_string()), start);

        acc.poll(start + Duration::from_secs(2));
        assert_eq!(acc.state(), TurnState::Accumulating);
    }

    #[test]
    fn test_timeout_returns_partial_text() {
        let config = TurnConfig::default().with_turn_timeout(Duration::from_secs(5));
        let (mut acc, start) = accumulator(config);

        acc.on_message(ResponseMessage::Content("partial".to_string()), start);
        acc.on_message(ResponseMessage::Content("output".to_string()), start);
        acc.poll(start + Duration::from_secs(6));

        assert_eq!(acc.state(), TurnState::TimedOut);
        let result = acc.finish();
        assert!(result.timed_out);
        assert!(!result.completed);
        assert_eq!(result.full_text, "partial\noutput\n");
    }

    #[test]
    fn test_timeout_while_awaiting_first() {
        let config = TurnConfig::default().with_turn_timeout(Duration::from_secs(5));
        let (mut acc, start) = accumulator(config);
        acc.poll(start + Duration::from_secs(6));
        let result = acc.finish();
        assert!(result.timed_out);
        assert_eq!(result.full_text, "");
    }

    #[test]
    fn test_history_short_circuits_accumulation() {
        let (mut acc, start) = accumulator(TurnConfig::default());
        let payload = r#"[{"role":"user","text":"hi"}]"#;
        acc.on_message(ResponseMessage::HistoryData(payload.to_string()), start);

        assert!(acc.is_terminal());
        let result = acc.finish();
        assert_eq!(result.full_text, payload);
        assert!(result.completed);
    }

    #[test]
    fn test_command_handled_recorded_but_invisible() {
        let (mut acc, start) = accumulator(TurnConfig::default());
        acc.on_message(ResponseMessage::CommandHandled, start);
        acc.on_message(ResponseMessage::TurnFinished, start);

        assert!(acc.command_handled());
        let result = acc.finish();
        assert_eq!(result.full_text, "");
        assert!(result.completed);
    }

    #[test]
    fn test_messages_before_start_are_ignored() {
        let mut acc = TurnAccumulator::new(TurnConfig::default());
        acc.on_message(
            ResponseMessage::Content("stray".to_string()),
            Instant::now(),
        );
        assert_eq!(acc.state(), TurnState::Idle);
    }

    #[test]
    fn test_messages_after_finish_are_ignored() {
        let (mut acc, start) = accumulator(TurnConfig::default());
        acc.on_message(ResponseMessage::Content("a".to_string()), start);
        acc.on_message(ResponseMessage::TurnFinished, start);
        acc.on_message(ResponseMessage::Content("late".to_string()), start);

        let result = acc.finish();
        assert_eq!(result.full_text, "a\n");
    }
}
