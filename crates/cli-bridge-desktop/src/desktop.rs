//! Platform seam for the UI-automation fallback.
//!
//! The fallback never talks to the windowing system directly; it goes
//! through this trait so the state machine is testable with a scripted
//! mock and the platform backend stays replaceable.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::DesktopError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    /// Opaque native window handle.
    pub id: u64,
    pub title: String,
    /// Native window class, used to reject unrelated windows that
    /// happen to share a title substring.
    pub class: String,
}

pub trait Desktop: Send + Sync {
    fn list_windows(&self) -> Result<Vec<WindowInfo>, DesktopError>;

    /// Attempt to bring the window to the foreground. `Ok(false)`
    /// means the OS refused the change (common for requests from a
    /// background process), which the caller may retry.
    fn focus_window(&self, id: u64) -> Result<bool, DesktopError>;

    /// Tap a modifier key; some window managers only grant foreground
    /// changes after recent keyboard activity.
    fn tap_release_key(&self) -> Result<(), DesktopError>;

    fn type_text(&self, text: &str) -> Result<(), DesktopError>;

    fn press_enter(&self) -> Result<(), DesktopError>;

    /// Select-all + copy the window's visible buffer and return the
    /// clipboard contents.
    fn capture_text(&self, id: u64) -> Result<String, DesktopError>;
}

/// Scripted desktop for tests: fixed window list, queued focus
/// outcomes, queued capture snapshots.
#[derive(Default)]
pub struct MockDesktop {
    windows: Vec<WindowInfo>,
    focus_outcomes: Mutex<VecDeque<bool>>,
    captures: Mutex<VecDeque<String>>,
    typed: Mutex<Vec<String>>,
    enter_presses: Mutex<u32>,
    release_taps: Mutex<u32>,
}

impl MockDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, id: u64, title: &str, class: &str) -> Self {
        self.windows.push(WindowInfo {
            id,
            title: title.to_string(),
            class: class.to_string(),
        });
        self
    }

    pub fn with_focus_outcomes(self, outcomes: &[bool]) -> Self {
        self.focus_outcomes
            .lock()
            .unwrap()
            .extend(outcomes.iter().copied());
        self
    }

    /// Queue successive `capture_text` results; the last entry repeats
    /// once the queue drains.
    pub fn with_captures(self, captures: &[&str]) -> Self {
        self.captures
            .lock()
            .unwrap()
            .extend(captures.iter().map(|s| s.to_string()));
        self
    }

    pub fn typed(&self) -> Vec<String> {
        self.typed.lock().unwrap().clone()
    }

    pub fn enter_presses(&self) -> u32 {
        *self.enter_presses.lock().unwrap()
    }

    pub fn release_taps(&self) -> u32 {
        *self.release_taps.lock().unwrap()
    }
}

impl Desktop for MockDesktop {
    fn list_windows(&self) -> Result<Vec<WindowInfo>, DesktopError> {
        Ok(self.windows.clone())
    }

    fn focus_window(&self, _id: u64) -> Result<bool, DesktopError> {
        Ok(self.focus_outcomes.lock().unwrap().pop_front().unwrap_or(true))
    }

    fn tap_release_key(&self) -> Result<(), DesktopError> {
        *self.release_taps.lock().unwrap() += 1;
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), DesktopError> {
        self.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn press_enter(&self) -> Result<(), DesktopError> {
        *self.enter_presses.lock().unwrap() += 1;
        Ok(())
    }

    fn capture_text(&self, _id: u64) -> Result<String, DesktopError> {
        let mut captures = self.captures.lock().unwrap();
        if captures.len() > 1 {
            Ok(captures.pop_front().unwrap_or_default())
        } else {
            Ok(captures.front().cloned().unwrap_or_default())
        }
    }
}
