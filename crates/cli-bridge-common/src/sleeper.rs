//! Sleeper trait for deterministic timing in tests.
//!
//! The bridge spends most of its life waiting: channel-open retries,
//! turn polling, UI-automation stabilization. Everything that sleeps
//! does so through this trait so tests can substitute a mock that
//! records calls without waiting.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

pub trait Sleeper: Send + Sync {
    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealSleeper;

impl Sleeper for RealSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Records every requested wait and returns immediately, so tests can
/// assert on retry cadence without paying for it in wall-clock time.
#[derive(Debug, Default)]
pub struct MockSleeper {
    call_count: AtomicU64,
    total_duration_ms: AtomicU64,
    durations: Mutex<Vec<Duration>>,
}

impl MockSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `sleep` was invoked.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Sum of every requested wait.
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.total_duration_ms.load(Ordering::SeqCst))
    }

    /// Each requested wait, in call order.
    pub fn durations(&self) -> Vec<Duration> {
        self.durations.lock().unwrap().clone()
    }
}

impl Sleeper for MockSleeper {
    fn sleep(&self, duration: Duration) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        self.durations.lock().unwrap().push(duration);
    }
}
