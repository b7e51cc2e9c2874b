//! Session bookkeeping.
//!
//! A session binds one discovered target process to its conversation
//! state. The target has no concept of concurrent turns, so each
//! session admits one in-flight request; later prompts queue FIFO and
//! are drained as turns complete, never interleaved.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use cli_bridge_common::mutex_lock_or_recover;
use cli_bridge_common::rwlock_read_or_recover;
use cli_bridge_common::rwlock_write_or_recover;

use crate::error::BridgeError;
use crate::locator::TargetProcess;

#[derive(Debug)]
pub struct Session {
    pub target: TargetProcess,
    queue: VecDeque<String>,
    in_flight: bool,
    history: Vec<(String, String)>,
}

impl Session {
    pub fn new(target: TargetProcess) -> Self {
        Self {
            target,
            queue: VecDeque::new(),
            in_flight: false,
            history: Vec::new(),
        }
    }

    /// Admit a prompt. Returns it back when the session is free to run
    /// it now; queues it otherwise.
    pub fn begin_turn(&mut self, prompt: String) -> Option<String> {
        if self.in_flight {
            self.queue.push_back(prompt);
            None
        } else {
            self.in_flight = true;
            Some(prompt)
        }
    }

    /// Mark the in-flight turn done and hand back the next queued
    /// prompt, keeping the session busy until the queue drains.
    pub fn complete_turn(&mut self) -> Option<String> {
        match self.queue.pop_front() {
            Some(next) => Some(next),
            None => {
                self.in_flight = false;
                None
            }
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn record_exchange(&mut self, prompt: &str, response: &str) {
        self.history.push(("user".to_string(), prompt.to_string()));
        self.history
            .push(("assistant".to_string(), response.to_string()));
    }

    pub fn history(&self) -> &[(String, String)] {
        &self.history
    }
}

/// Registry of known sessions plus the active pointer for
/// single-target addressing.
///
/// The `sessions` and `active` locks are never held together, and both
/// are only ever held briefly; turn I/O happens outside these locks.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u32, Arc<Mutex<Session>>>>,
    active: RwLock<Option<u32>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a discovered target, keeping any existing session for
    /// the same pid. The first registration becomes active.
    pub fn register(&self, target: TargetProcess) -> Arc<Mutex<Session>> {
        let pid = target.pid;
        let session = {
            let mut sessions = rwlock_write_or_recover(&self.sessions);
            Arc::clone(
                sessions
                    .entry(pid)
                    .or_insert_with(|| Arc::new(Mutex::new(Session::new(target)))),
            )
        };

        let mut active = rwlock_write_or_recover(&self.active);
        if active.is_none() {
            *active = Some(pid);
        }
        session
    }

    /// Point single-target addressing at another known session.
    pub fn switch_active(&self, pid: u32) -> Result<Arc<Mutex<Session>>, BridgeError> {
        let session = {
            let sessions = rwlock_read_or_recover(&self.sessions);
            sessions
                .get(&pid)
                .cloned()
                .ok_or(BridgeError::SessionNotFound(pid))?
        };
        *rwlock_write_or_recover(&self.active) = Some(pid);
        Ok(session)
    }

    pub fn active(&self) -> Option<Arc<Mutex<Session>>> {
        let pid = (*rwlock_read_or_recover(&self.active))?;
        rwlock_read_or_recover(&self.sessions).get(&pid).cloned()
    }

    /// Session for `pid`, or the active session when `pid` is absent.
    pub fn resolve(&self, pid: Option<u32>) -> Result<Arc<Mutex<Session>>, BridgeError> {
        match pid {
            Some(pid) => {
                let sessions = rwlock_read_or_recover(&self.sessions);
                sessions
                    .get(&pid)
                    .cloned()
                    .ok_or(BridgeError::SessionNotFound(pid))
            }
            None => self.active().ok_or(BridgeError::NoActiveSession),
        }
    }

    /// Snapshot of known pids. Discovery refresh is the caller's job;
    /// processes come and go between calls.
    pub fn list(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = rwlock_read_or_recover(&self.sessions)
            .keys()
            .copied()
            .collect();
        pids.sort_unstable();
        pids
    }

    /// Drop a session whose process disappeared. The active pointer is
    /// cleared if it pointed there.
    pub fn remove(&self, pid: u32) {
        rwlock_write_or_recover(&self.sessions).remove(&pid);
        let mut active = rwlock_write_or_recover(&self.active);
        if *active == Some(pid) {
            *active = None;
        }
    }

    pub fn with_session<T>(
        &self,
        session: &Arc<Mutex<Session>>,
        f: impl FnOnce(&mut Session) -> T,
    ) -> T {
        let mut guard = mutex_lock_or_recover(session);
        f(&mut guard)
    }
}
