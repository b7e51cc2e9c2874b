//! Bridge-level error taxonomy.
//!
//! Every variant ends up as a textual `Error: ...` response on the bus;
//! nothing here is allowed to unwind the orchestrator's event loop.

use thiserror::Error;

use cli_bridge_desktop::DesktopError;
use cli_bridge_ipc::ChannelError;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("no process matched '{program}'")]
    DiscoveryFailure { program: String },

    #[error("launched '{command}' but it never became discoverable after {attempts} polls")]
    LaunchFailure { command: String, attempts: u32 },

    #[error("no session with pid {0}")]
    SessionNotFound(u32),

    #[error("no active session")]
    NoActiveSession,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Desktop(#[from] DesktopError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True when the error means the target has no reachable control
    /// endpoint, which is the cue to try UI automation instead.
    pub fn channel_unavailable(&self) -> bool {
        matches!(
            self,
            BridgeError::Channel(ChannelError::Unavailable { .. })
        )
    }
}
