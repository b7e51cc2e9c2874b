use std::env;
use std::path::PathBuf;
use std::time::Duration;

use cli_bridge_core::TurnConfig;
use cli_bridge_ipc::ChannelConfig;

const DEFAULT_PROGRAM: &str = "gemini-cli";
const DEFAULT_PROCESS_FILTER: &str = "node";
const DEFAULT_BUNDLE_MARKER: &str = "bundle/gemini.js";
const DEFAULT_DIST_MARKER: &str = "dist/index.js";
const DEFAULT_LAUNCH_COMMAND: &str = "gemini";
const DEFAULT_LAUNCH_ATTEMPTS: u32 = 10;
const DEFAULT_LAUNCH_POLL_MS: u64 = 1000;
const DEFAULT_READ_TICK_MS: u64 = 200;

/// All tunables for one bridge instance. Timing knobs are overridable
/// so tests never depend on production constants.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Control-socket naming stem; the endpoint for pid N is
    /// `<program>-<N>.sock`.
    pub program: String,
    /// Coarse process-name filter for discovery (the target runs under
    /// a generic interpreter name).
    pub process_filter: String,
    /// Command-line substring identifying a local development bundle.
    pub bundle_marker: String,
    /// Command-line substring identifying a packaged distribution.
    pub dist_marker: String,
    /// Command used to auto-launch a target when none is running.
    pub launch_command: String,
    /// Working directory for auto-launched targets.
    pub install_dir: PathBuf,
    /// Bounded rediscovery polls after a launch; there is no ready
    /// signal, presence in the process table is the readiness check.
    pub launch_attempts: u32,
    pub launch_poll: Duration,
    /// Cadence of non-blocking channel reads while a turn is open.
    pub read_tick: Duration,
    /// Start a target when discovery finds none. Off turns an empty
    /// discovery pass into an immediate error instead.
    pub auto_launch: bool,
    pub turn: TurnConfig,
    pub channel: ChannelConfig,
    /// Window titles accepted by the UI-automation fallback.
    pub window_titles: Vec<String>,
    /// Window classes accepted by the fallback; rejects unrelated
    /// windows sharing a title substring.
    pub window_classes: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let mut channel = ChannelConfig::default();
        if let Some(attempts) = env_parse("CLI_BRIDGE_CONNECT_ATTEMPTS") {
            channel = channel.with_connect_attempts(attempts);
        }
        if let Some(spacing_ms) = env_parse("CLI_BRIDGE_CONNECT_SPACING_MS") {
            channel = channel.with_connect_spacing(Duration::from_millis(spacing_ms));
        }

        Self {
            program: env::var("CLI_BRIDGE_PROGRAM").unwrap_or_else(|_| DEFAULT_PROGRAM.to_string()),
            process_filter: env::var("CLI_BRIDGE_PROCESS_FILTER")
                .unwrap_or_else(|_| DEFAULT_PROCESS_FILTER.to_string()),
            bundle_marker: env::var("CLI_BRIDGE_BUNDLE_MARKER")
                .unwrap_or_else(|_| DEFAULT_BUNDLE_MARKER.to_string()),
            dist_marker: env::var("CLI_BRIDGE_DIST_MARKER")
                .unwrap_or_else(|_| DEFAULT_DIST_MARKER.to_string()),
            launch_command: env::var("CLI_BRIDGE_LAUNCH_COMMAND")
                .unwrap_or_else(|_| DEFAULT_LAUNCH_COMMAND.to_string()),
            install_dir: env::var("CLI_BRIDGE_INSTALL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            launch_attempts: env::var("CLI_BRIDGE_LAUNCH_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_LAUNCH_ATTEMPTS),
            launch_poll: Duration::from_millis(
                env::var("CLI_BRIDGE_LAUNCH_POLL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_LAUNCH_POLL_MS),
            ),
            read_tick: Duration::from_millis(
                env::var("CLI_BRIDGE_READ_TICK_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_READ_TICK_MS),
            ),
            auto_launch: env_parse("CLI_BRIDGE_AUTO_LAUNCH").unwrap_or(true),
            turn: TurnConfig::default(),
            channel,
            window_titles: vec![DEFAULT_PROGRAM.to_string()],
            window_classes: vec![
                "ConsoleWindowClass".to_string(),
                "CASCADIA_HOSTING_WINDOW_CLASS".to_string(),
            ],
        }
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    pub fn with_process_filter(mut self, filter: &str) -> Self {
        self.process_filter = filter.to_string();
        self
    }

    pub fn with_install_dir(mut self, dir: PathBuf) -> Self {
        self.install_dir = dir;
        self
    }

    pub fn with_launch_attempts(mut self, attempts: u32) -> Self {
        self.launch_attempts = attempts;
        self
    }

    pub fn with_launch_poll(mut self, poll: Duration) -> Self {
        self.launch_poll = poll;
        self
    }

    pub fn with_read_tick(mut self, tick: Duration) -> Self {
        self.read_tick = tick;
        self
    }

    pub fn with_auto_launch(mut self, auto_launch: bool) -> Self {
        self.auto_launch = auto_launch;
        self
    }

    pub fn with_turn(mut self, turn: TurnConfig) -> Self {
        self.turn = turn;
        self
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.program, DEFAULT_PROGRAM);
        assert_eq!(config.process_filter, DEFAULT_PROCESS_FILTER);
        assert_eq!(config.launch_attempts, DEFAULT_LAUNCH_ATTEMPTS);
        assert_eq!(config.launch_poll, Duration::from_millis(1000));
        assert_eq!(config.read_tick, Duration::from_millis(200));
        assert!(config.auto_launch);
    }

    #[test]
    fn test_builder_pattern() {
        let config = BridgeConfig::default()
            .with_program("other-cli")
            .with_process_filter("deno")
            .with_launch_attempts(3)
            .with_read_tick(Duration::from_millis(10))
            .with_auto_launch(false);

        assert_eq!(config.program, "other-cli");
        assert_eq!(config.process_filter, "deno");
        assert_eq!(config.launch_attempts, 3);
        assert_eq!(config.read_tick, Duration::from_millis(10));
        assert!(!config.auto_launch);
    }
}
