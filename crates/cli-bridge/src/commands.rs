use clap::Parser;
use clap::Subcommand;

const LONG_ABOUT: &str = r#"cli-bridge connects a remote command bus to interactive AI CLIs.

It discovers running target processes, opens a control channel to the
chosen one, relays prompts, and reports responses as JSON events. When
a target exposes no control endpoint the bridge falls back to driving
its window through simulated keyboard input.

EXAMPLES:
    # Serve bus commands over stdin/stdout
    cli-bridge run

    # Show discoverable targets, best match first
    cli-bridge locate

    # One prompt against the best target
    cli-bridge prompt "summarize the open files"

    # Address a specific process
    cli-bridge prompt --pid 12345 "hello"
    cli-bridge switch 12345"#;

#[derive(Parser)]
#[command(name = "cli-bridge")]
#[command(author, version)]
#[command(about = "Remote control bridge for interactive AI CLIs")]
#[command(long_about = LONG_ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, env = "CLI_BRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve bus commands over stdin/stdout as JSON lines
    #[command(name = "run")]
    Run,

    /// List discoverable target processes, best match first
    #[command(name = "locate")]
    Locate,

    /// Send one prompt and print the resulting events
    #[command(name = "prompt")]
    Prompt {
        /// Prompt text to send
        text: String,

        /// Target a specific process instead of discovering one
        #[arg(long)]
        pid: Option<u32>,
    },

    /// List known sessions after a discovery refresh
    #[command(name = "sessions")]
    Sessions,

    /// Make another session active and print its history
    #[command(name = "switch")]
    Switch {
        /// Process id of the session to activate
        pid: u32,
    },

    /// Print the effective configuration
    #[command(name = "env")]
    Env,
}
