use std::sync::Arc;

use clap::Parser;

use cli_bridge::commands::Cli;
use cli_bridge::commands::Commands;
use cli_bridge::stdio_bus;
use cli_bridge::stdio_bus::StdioPublisher;
use cli_bridge::telemetry::init_tracing;
use cli_bridge_daemon::BridgeConfig;
use cli_bridge_daemon::BusCommand;
use cli_bridge_daemon::LocatorCriteria;
use cli_bridge_daemon::MatchTier;
use cli_bridge_daemon::Orchestrator;
use cli_bridge_daemon::TargetProcess;
use cli_bridge_daemon::discover;

fn main() {
    let cli = Cli::parse();
    let _telemetry = init_tracing(&cli.log_level);

    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::from_env();

    match cli.command {
        Commands::Run => {
            let orchestrator =
                Orchestrator::with_defaults(config, Arc::new(StdioPublisher));
            let stdin = std::io::stdin().lock();
            stdio_bus::serve(&orchestrator, stdin)?;
            // Commands read just before EOF are still being answered
            // on worker threads.
            orchestrator.wait_for_workers();
        }

        Commands::Locate => {
            let targets = discover(&LocatorCriteria::from_config(&config));
            if targets.is_empty() {
                eprintln!("no targets found");
                std::process::exit(1);
            }
            for target in targets {
                println!(
                    "{:<8} {:?}{}{}",
                    target.pid,
                    target.tier,
                    target
                        .launch_dir
                        .as_ref()
                        .map(|d| format!("  {}", d.display()))
                        .unwrap_or_default(),
                    if target.legacy_protocol {
                        "  (legacy)"
                    } else {
                        ""
                    },
                );
            }
        }

        Commands::Prompt { text, pid } => {
            let orchestrator =
                Orchestrator::with_defaults(config, Arc::new(StdioPublisher));
            if let Some(pid) = pid {
                // Explicit addressing skips discovery entirely.
                orchestrator.registry().register(TargetProcess {
                    pid,
                    tier: MatchTier::Distribution,
                    launch_dir: None,
                    legacy_protocol: false,
                });
            }
            orchestrator.run_command(BusCommand::Prompt { text, pid });
        }

        Commands::Sessions => {
            let orchestrator =
                Orchestrator::with_defaults(config, Arc::new(StdioPublisher));
            orchestrator.run_command(BusCommand::ListSessions);
        }

        Commands::Switch { pid } => {
            let orchestrator =
                Orchestrator::with_defaults(config, Arc::new(StdioPublisher));
            // Refresh discovery so the pid can be known before the
            // switch.
            orchestrator.run_command(BusCommand::ListSessions);
            orchestrator.run_command(BusCommand::SwitchSession { pid });
        }

        Commands::Env => {
            let summary = serde_json::json!({
                "program": config.program,
                "process_filter": config.process_filter,
                "bundle_marker": config.bundle_marker,
                "dist_marker": config.dist_marker,
                "launch_command": config.launch_command,
                "install_dir": config.install_dir.display().to_string(),
                "socket_dir": cli_bridge_ipc::socket_dir().display().to_string(),
                "connect_attempts": config.channel.connect_attempts,
                "turn_timeout_secs": config.turn.turn_timeout.as_secs(),
                "grace_window_ms": config.turn.grace_window.as_millis() as u64,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
