//! Bridge orchestrator.
//!
//! Wires discovery, sessions, the turn driver, the embedded-command
//! extractor, and the UI-automation fallback behind the bus handler
//! interface. Every inbound command runs on a worker thread so a
//! stalled turn never blocks discovery or other sessions. Failures of
//! any kind become `Error: ...` response events; the event loop itself
//! never unwinds.

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::thread;

use tracing::info;
use tracing::warn;

use cli_bridge_common::RealSleeper;
use cli_bridge_common::Sleeper;
use cli_bridge_common::mutex_lock_or_recover;
use cli_bridge_core::EmbeddedCommand;
use cli_bridge_core::TurnResult;
use cli_bridge_core::extract_embedded_command;
use cli_bridge_desktop::Desktop;
use cli_bridge_desktop::FallbackConfig;
use cli_bridge_desktop::FallbackController;
use cli_bridge_desktop::platform_desktop;
use cli_bridge_ipc::ChannelError;
use cli_bridge_ipc::ControlChannel;
use cli_bridge_ipc::RequestEnvelope;
use cli_bridge_ipc::TurnChannel;
use cli_bridge_ipc::control_socket_path;

use crate::bus::BusCommand;
use crate::bus::BusEvent;
use crate::bus::BusHandler;
use crate::bus::BusPublisher;
use crate::bus::publish_best_effort;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::launcher;
use crate::locator;
use crate::locator::LocatorCriteria;
use crate::locator::TargetProcess;
use crate::session::Session;
use crate::session::SessionRegistry;
use crate::turn::run_turn;
use crate::turn::run_turn_with_handled;

/// Seam over channel creation so turns are testable without sockets.
pub trait ChannelOpener: Send + Sync {
    fn open(&self, target: &TargetProcess) -> Result<Box<dyn TurnChannel + Send>, ChannelError>;
}

/// Production opener: pid-addressed socket in the configured directory.
pub struct SocketOpener {
    config: BridgeConfig,
}

impl SocketOpener {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

impl ChannelOpener for SocketOpener {
    fn open(&self, target: &TargetProcess) -> Result<Box<dyn TurnChannel + Send>, ChannelError> {
        let path = control_socket_path(&self.config.program, target.pid);
        let channel = ControlChannel::open(&path, &self.config.channel, &RealSleeper)?;
        Ok(Box::new(channel))
    }
}

/// Seam over process discovery and auto-launch.
pub trait ProcessSource: Send + Sync {
    fn discover(&self) -> Vec<TargetProcess>;

    fn launch(
        &self,
        config: &BridgeConfig,
        sleeper: &dyn Sleeper,
    ) -> Result<TargetProcess, BridgeError>;
}

/// Production source backed by the process table.
pub struct SysinfoSource {
    criteria: LocatorCriteria,
}

impl SysinfoSource {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            criteria: LocatorCriteria::from_config(config),
        }
    }
}

impl ProcessSource for SysinfoSource {
    fn discover(&self) -> Vec<TargetProcess> {
        locator::discover(&self.criteria)
    }

    fn launch(
        &self,
        config: &BridgeConfig,
        sleeper: &dyn Sleeper,
    ) -> Result<TargetProcess, BridgeError> {
        launcher::launch_target(config, sleeper, || locator::discover(&self.criteria))
    }
}

/// Count of command workers still running. Commands are answered by
/// detached threads, so shutdown has to wait on this gate or prompts
/// arriving just before stdin EOF would lose their responses.
#[derive(Default)]
struct WorkerGate {
    count: Mutex<u64>,
    idle: Condvar,
}

impl WorkerGate {
    fn enter(gate: &Arc<WorkerGate>) -> WorkerTicket {
        *mutex_lock_or_recover(&gate.count) += 1;
        WorkerTicket(Arc::clone(gate))
    }

    fn wait_idle(&self) {
        let mut count = mutex_lock_or_recover(&self.count);
        while *count > 0 {
            count = match self.idle.wait(count) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

/// Releases its gate slot on drop, so a panicking worker still lets
/// shutdown proceed.
struct WorkerTicket(Arc<WorkerGate>);

impl Drop for WorkerTicket {
    fn drop(&mut self) {
        let mut count = mutex_lock_or_recover(&self.0.count);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<BridgeConfig>,
    registry: Arc<SessionRegistry>,
    publisher: Arc<dyn BusPublisher>,
    opener: Arc<dyn ChannelOpener>,
    source: Arc<dyn ProcessSource>,
    desktop: Arc<dyn Desktop>,
    sleeper: Arc<dyn Sleeper>,
    workers: Arc<WorkerGate>,
}

impl Orchestrator {
    pub fn new(
        config: BridgeConfig,
        publisher: Arc<dyn BusPublisher>,
        opener: Arc<dyn ChannelOpener>,
        source: Arc<dyn ProcessSource>,
        desktop: Arc<dyn Desktop>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            publisher,
            opener,
            source,
            desktop,
            sleeper,
            workers: Arc::new(WorkerGate::default()),
        }
    }

    /// Production wiring: sysinfo discovery, socket channels, the
    /// platform desktop backend, real clock.
    pub fn with_defaults(config: BridgeConfig, publisher: Arc<dyn BusPublisher>) -> Self {
        let opener = Arc::new(SocketOpener::new(config.clone()));
        let source = Arc::new(SysinfoSource::new(&config));
        Self::new(
            config,
            publisher,
            opener,
            source,
            Arc::from(platform_desktop()),
            Arc::new(RealSleeper),
        )
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Block until every command worker spawned through `on_message`
    /// has finished, so their responses reach the publisher before the
    /// caller shuts the bus down.
    pub fn wait_for_workers(&self) {
        self.workers.wait_idle();
    }

    /// Dispatch one bus command synchronously. `BusHandler::on_message`
    /// runs this on a worker thread.
    pub fn run_command(&self, command: BusCommand) {
        match command {
            BusCommand::Prompt { text, pid } => self.handle_prompt(text, pid),
            BusCommand::ListSessions => self.handle_list_sessions(),
            BusCommand::SwitchSession { pid } => self.handle_switch_session(pid),
        }
    }

    fn handle_prompt(&self, text: String, pid: Option<u32>) {
        // An addressed prompt must hit that exact session; only the
        // unaddressed form may discover or launch a target.
        let session = match pid {
            Some(_) => self.registry.resolve(pid),
            None => self.ensure_session(),
        };
        let session = match session {
            Ok(session) => session,
            Err(err) => {
                self.publish(&BusEvent::Response {
                    text: format!("Error: {err}"),
                });
                return;
            }
        };

        // At most one turn in flight per session; a second prompt
        // queues and is drained here by whichever worker holds the
        // in-flight slot.
        let mut current = self
            .registry
            .with_session(&session, |s| s.begin_turn(text));

        while let Some(prompt) = current {
            self.publish(&BusEvent::Status {
                text: Some("thinking".to_string()),
            });

            let (response, command) = self.run_single_turn(&session, &prompt);

            if let Some(EmbeddedCommand { name, payload }) = command {
                self.publish(&BusEvent::EmbeddedCommand { name, payload });
            }
            self.publish(&BusEvent::Response { text: response });
            self.publish(&BusEvent::Status { text: None });

            current = self.registry.with_session(&session, |s| s.complete_turn());
        }
    }

    fn run_single_turn(
        &self,
        session: &Arc<Mutex<Session>>,
        prompt: &str,
    ) -> (String, Option<EmbeddedCommand>) {
        let target = self.registry.with_session(session, |s| s.target.clone());

        let turn = if target.legacy_protocol {
            // Known to predate the control endpoint; skip the doomed
            // ten-attempt connect loop.
            Err(BridgeError::Channel(ChannelError::Unavailable {
                attempts: 0,
                last_error: "legacy target has no control endpoint".to_string(),
            }))
        } else {
            self.channel_turn(&target, prompt)
        };

        let (text, command) = match turn {
            Ok((result, handled)) => {
                let command = if result.completed {
                    extract_embedded_command(&result.full_text)
                } else {
                    None
                };
                (format_response(&result, handled), command)
            }
            Err(err) if err.channel_unavailable() => {
                info!(pid = target.pid, "no control channel, using ui automation");
                match self.fallback_turn(prompt) {
                    Ok(text) => {
                        let command = extract_embedded_command(&text);
                        (text, command)
                    }
                    Err(err) => (format!("Error: {err}"), None),
                }
            }
            Err(err) => (format!("Error: {err}"), None),
        };

        self.registry
            .with_session(session, |s| s.record_exchange(prompt, &text));
        (text, command)
    }

    fn channel_turn(
        &self,
        target: &TargetProcess,
        prompt: &str,
    ) -> Result<(TurnResult, bool), BridgeError> {
        let mut channel = self.opener.open(target)?;
        run_turn_with_handled(
            channel.as_mut(),
            &RequestEnvelope::prompt(prompt),
            &self.config.turn,
            self.config.read_tick,
            self.sleeper.as_ref(),
        )
    }

    fn fallback_turn(&self, prompt: &str) -> Result<String, BridgeError> {
        let titles: Vec<&str> = self.config.window_titles.iter().map(String::as_str).collect();
        let classes: Vec<&str> = self.config.window_classes.iter().map(String::as_str).collect();
        let fallback = FallbackConfig::default()
            .with_titles(&titles)
            .with_classes(&classes);
        let controller =
            FallbackController::new(self.desktop.as_ref(), self.sleeper.as_ref(), fallback);
        Ok(controller.run_turn(prompt)?)
    }

    fn handle_list_sessions(&self) {
        // Discovery refresh on demand; the registry alone would go
        // stale as targets come and go. The snapshot is authoritative
        // both ways: new pids register, vanished pids are dropped.
        // Workers already holding a removed session keep their Arc and
        // finish on their own.
        let snapshot = self.source.discover();
        let live: Vec<u32> = snapshot.iter().map(|t| t.pid).collect();
        for target in snapshot {
            self.registry.register(target);
        }
        for pid in self.registry.list() {
            if !live.contains(&pid) {
                info!(pid, "session target gone, dropping");
                self.registry.remove(pid);
            }
        }
        self.publish(&BusEvent::Sessions {
            pids: self.registry.list(),
        });
    }

    fn handle_switch_session(&self, pid: u32) {
        let session = match self.registry.switch_active(pid) {
            Ok(session) => session,
            Err(err) => {
                self.publish(&BusEvent::Response {
                    text: format!("Error: {err}"),
                });
                return;
            }
        };

        // Hydrate the hub's view of the conversation being switched
        // into.
        let target = self.registry.with_session(&session, |s| s.target.clone());
        match self.fetch_history(&target) {
            Ok(data) => self.publish(&BusEvent::History { data }),
            Err(err) => self.publish(&BusEvent::Response {
                text: format!("Error: {err}"),
            }),
        }
    }

    fn fetch_history(&self, target: &TargetProcess) -> Result<String, BridgeError> {
        let mut channel = self.opener.open(target)?;
        let result = run_turn(
            channel.as_mut(),
            &RequestEnvelope::GetHistory,
            &self.config.turn,
            self.config.read_tick,
            self.sleeper.as_ref(),
        )?;
        Ok(result.full_text)
    }

    fn ensure_session(&self) -> Result<Arc<Mutex<Session>>, BridgeError> {
        if let Some(session) = self.registry.active() {
            return Ok(session);
        }

        let target = match self.source.discover().into_iter().next() {
            Some(target) => target,
            None if self.config.auto_launch => {
                info!(command = %self.config.launch_command, "no target running, auto-launching");
                self.source.launch(&self.config, self.sleeper.as_ref())?
            }
            None => {
                return Err(BridgeError::DiscoveryFailure {
                    program: self.config.process_filter.clone(),
                });
            }
        };
        Ok(self.registry.register(target))
    }

    fn publish(&self, event: &BusEvent) {
        publish_best_effort(self.publisher.as_ref(), event);
    }
}

impl BusHandler for Orchestrator {
    fn on_open(&self) {
        info!("bus connection open");
    }

    fn on_close(&self) {
        warn!("bus connection closed");
    }

    fn on_error(&self, error: &str) {
        warn!(error, "bus connection error");
    }

    fn on_message(&self, command: BusCommand) {
        let ticket = WorkerGate::enter(&self.workers);
        let worker = self.clone();
        thread::spawn(move || {
            let _ticket = ticket;
            worker.run_command(command);
        });
    }
}

fn format_response(result: &TurnResult, handled: bool) -> String {
    if result.timed_out {
        let partial = result.full_text.trim_end();
        if partial.is_empty() {
            "Error: turn timed out".to_string()
        } else {
            format!("Error: turn timed out; partial output:\n{partial}")
        }
    } else {
        let text = result.full_text.trim_end();
        if text.is_empty() && handled {
            "Command handled.".to_string()
        } else {
            text.to_string()
        }
    }
}
