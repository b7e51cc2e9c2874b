//! Auto-launch for targets that are not running yet.
//!
//! The target has no ready signal; the launcher spawns it detached and
//! polls discovery until it shows up in the process table or the
//! attempt budget runs out.

use std::process::Command;
use std::process::Stdio;

use tracing::info;

use cli_bridge_common::Sleeper;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::locator::TargetProcess;

/// Spawn a fresh target and wait for discovery to see it.
pub fn launch_target(
    config: &BridgeConfig,
    sleeper: &dyn Sleeper,
    discover: impl Fn() -> Vec<TargetProcess>,
) -> Result<TargetProcess, BridgeError> {
    spawn_detached(config)?;
    info!(command = %config.launch_command, dir = %config.install_dir.display(), "target launched");
    wait_for_target(config, sleeper, discover)
}

fn spawn_detached(config: &BridgeConfig) -> Result<(), BridgeError> {
    let mut command = Command::new(&config.launch_command);
    command
        .current_dir(&config.install_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // Detach from the bridge's process group so the target outlives us
    // and never receives our terminal signals.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Safety: setsid is async-signal-safe and touches no memory
        // shared with the parent.
        unsafe {
            command.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }

    command.spawn()?;
    Ok(())
}

/// Poll discovery on a fixed cadence until a target appears.
pub fn wait_for_target(
    config: &BridgeConfig,
    sleeper: &dyn Sleeper,
    discover: impl Fn() -> Vec<TargetProcess>,
) -> Result<TargetProcess, BridgeError> {
    for _ in 0..config.launch_attempts {
        sleeper.sleep(config.launch_poll);
        if let Some(target) = discover().into_iter().next() {
            return Ok(target);
        }
    }
    Err(BridgeError::LaunchFailure {
        command: config.launch_command.clone(),
        attempts: config.launch_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::MatchTier;
    use cli_bridge_common::MockSleeper;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn target(pid: u32) -> TargetProcess {
        TargetProcess {
            pid,
            tier: MatchTier::Distribution,
            launch_dir: None,
            legacy_protocol: false,
        }
    }

    #[test]
    fn test_wait_returns_once_target_appears() {
        let config = BridgeConfig::default()
            .with_launch_attempts(5)
            .with_launch_poll(Duration::from_secs(1));
        let sleeper = MockSleeper::new();
        let calls = AtomicU32::new(0);

        let found = wait_for_target(&config, &sleeper, || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Vec::new()
            } else {
                vec![target(77)]
            }
        })
        .unwrap();

        assert_eq!(found.pid, 77);
        // Two empty polls plus the successful one, each preceded by a
        // wait.
        assert_eq!(sleeper.call_count(), 3);
    }

    #[test]
    fn test_wait_gives_up_after_attempt_budget() {
        let config = BridgeConfig::default()
            .with_launch_attempts(4)
            .with_launch_poll(Duration::from_secs(1));
        let sleeper = MockSleeper::new();

        let err = wait_for_target(&config, &sleeper, Vec::new).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::LaunchFailure { attempts: 4, .. }
        ));
        assert_eq!(sleeper.call_count(), 4);
        assert_eq!(sleeper.total_duration(), Duration::from_secs(4));
    }
}
