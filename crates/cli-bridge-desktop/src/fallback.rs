//! Keyboard-and-clipboard fallback for targets without a control
//! endpoint.
//!
//! The controller runs a fixed sequence against a black-box window:
//! locate it, force it to the foreground, capture the visible buffer
//! as a diff baseline, inject the prompt, then re-capture on a cadence
//! until the buffer stops changing. Every timing knob lives in
//! `FallbackConfig` so tests can run the machine without real waits.

use std::time::Duration;

use tracing::debug;
use tracing::warn;

use cli_bridge_common::Sleeper;

use crate::desktop::Desktop;
use crate::desktop::WindowInfo;
use crate::error::DesktopError;

const DEFAULT_FOCUS_ATTEMPTS: u32 = 3;
const DEFAULT_FOCUS_SETTLE_MS: u64 = 1000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
const DEFAULT_MAX_POLLS: u32 = 40;
const DEFAULT_STABILIZE_SLACK: usize = 8;
const DEFAULT_TAIL_LINES: usize = 40;

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Title substrings that identify the target's window.
    pub title_allowlist: Vec<String>,
    /// Window classes accepted for a title match; rejects unrelated
    /// windows (file managers, editors) sharing a title substring.
    pub class_allowlist: Vec<String>,
    pub focus_attempts: u32,
    pub focus_settle: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
    /// The final capture must exceed the baseline by more than this
    /// many characters before "stable" counts as "answered" - a no-op
    /// capture must not look finished immediately.
    pub stabilize_slack: usize,
    /// Lines taken from the end of the final capture when the baseline
    /// is no longer a prefix (scrolled/truncated buffer).
    pub tail_lines: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            title_allowlist: Vec::new(),
            class_allowlist: Vec::new(),
            focus_attempts: DEFAULT_FOCUS_ATTEMPTS,
            focus_settle: Duration::from_millis(DEFAULT_FOCUS_SETTLE_MS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_polls: DEFAULT_MAX_POLLS,
            stabilize_slack: DEFAULT_STABILIZE_SLACK,
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

impl FallbackConfig {
    pub fn with_titles(mut self, titles: &[&str]) -> Self {
        self.title_allowlist = titles.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_classes(mut self, classes: &[&str]) -> Self {
        self.class_allowlist = classes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_polls(mut self, polls: u32) -> Self {
        self.max_polls = polls;
        self
    }
}

/// Remove spinner/animation glyphs and trailing per-line whitespace so
/// a busy indicator does not defeat stabilization.
pub fn strip_animation_glyphs(text: &str) -> String {
    fn is_animation(c: char) -> bool {
        // Braille spinner block plus the common quarter-circle set.
        matches!(c, '\u{2800}'..='\u{28FF}') || matches!(c, '◐' | '◓' | '◑' | '◒' | '◴' | '◷' | '◶' | '◵')
    }

    text.lines()
        .map(|line| {
            line.chars()
                .filter(|c| !is_animation(*c))
                .collect::<String>()
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct FallbackController<'a> {
    desktop: &'a dyn Desktop,
    sleeper: &'a dyn Sleeper,
    config: FallbackConfig,
}

impl<'a> FallbackController<'a> {
    pub fn new(desktop: &'a dyn Desktop, sleeper: &'a dyn Sleeper, config: FallbackConfig) -> Self {
        Self {
            desktop,
            sleeper,
            config,
        }
    }

    /// Run one full prompt/response exchange through the window.
    ///
    /// Errors are returned, never panicked, so one session's
    /// automation failure cannot take down the bridge.
    pub fn run_turn(&self, prompt: &str) -> Result<String, DesktopError> {
        let window = self.locate()?;
        debug!(title = %window.title, class = %window.class, "fallback window located");

        self.focus(&window)?;

        let baseline = strip_animation_glyphs(&self.desktop.capture_text(window.id)?);

        self.desktop.type_text(prompt)?;
        self.desktop.press_enter()?;

        let stable = self.poll_until_stable(&window, &baseline)?;
        Ok(extract_new_output(&baseline, &stable, self.config.tail_lines))
    }

    fn locate(&self) -> Result<WindowInfo, DesktopError> {
        let windows = self.desktop.list_windows()?;
        windows
            .into_iter()
            .find(|w| self.title_matches(&w.title) && self.class_matches(&w.class))
            .ok_or_else(|| DesktopError::WindowNotFound {
                titles: self.config.title_allowlist.join(", "),
            })
    }

    fn title_matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.config
            .title_allowlist
            .iter()
            .any(|t| title.contains(&t.to_lowercase()))
    }

    fn class_matches(&self, class: &str) -> bool {
        self.config.class_allowlist.is_empty()
            || self.config.class_allowlist.iter().any(|c| c == class)
    }

    fn focus(&self, window: &WindowInfo) -> Result<(), DesktopError> {
        for attempt in 1..=self.config.focus_attempts {
            if self.desktop.focus_window(window.id)? {
                self.sleeper.sleep(self.config.focus_settle);
                return Ok(());
            }
            warn!(attempt, title = %window.title, "foreground change refused");
            // The OS may refuse foreground changes requested from the
            // background; a key tap counts as recent input and unlocks
            // the next attempt.
            self.desktop.tap_release_key()?;
            self.sleeper.sleep(self.config.focus_settle);
        }
        Err(DesktopError::FocusFailure {
            attempts: self.config.focus_attempts,
        })
    }

    fn poll_until_stable(
        &self,
        window: &WindowInfo,
        baseline: &str,
    ) -> Result<String, DesktopError> {
        let mut previous: Option<String> = None;

        for _ in 0..self.config.max_polls {
            self.sleeper.sleep(self.config.poll_interval);
            let capture = strip_animation_glyphs(&self.desktop.capture_text(window.id)?);

            let grown = capture.len() > baseline.len() + self.config.stabilize_slack;
            if grown && previous.as_deref() == Some(capture.as_str()) {
                return Ok(capture);
            }
            previous = Some(capture);
        }

        Err(DesktopError::OutputNeverStabilized {
            polls: self.config.max_polls,
        })
    }
}

/// Final text is the suffix beyond the baseline when the baseline is
/// still a prefix; otherwise the buffer scrolled and the best we can
/// do is the last few lines (documented degraded-accuracy path).
fn extract_new_output(baseline: &str, stable: &str, tail_lines: usize) -> String {
    if let Some(suffix) = stable.strip_prefix(baseline) {
        return suffix.trim().to_string();
    }

    let lines: Vec<&str> = stable.lines().collect();
    let start = lines.len().saturating_sub(tail_lines);
    lines[start..].join("\n").trim().to_string()
}
