#![deny(clippy::all)]

mod bus;
mod config;
mod error;
mod launcher;
mod locator;
mod orchestrator;
mod session;
mod turn;

pub use bus::BusCommand;
pub use bus::BusEvent;
pub use bus::BusHandler;
pub use bus::BusPublisher;
pub use bus::RecordingPublisher;
pub use bus::publish_best_effort;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use launcher::launch_target;
pub use launcher::wait_for_target;
pub use locator::CandidateProcess;
pub use locator::LocatorCriteria;
pub use locator::MatchTier;
pub use locator::TargetProcess;
pub use locator::discover;
pub use locator::rank_candidates;
pub use orchestrator::ChannelOpener;
pub use orchestrator::Orchestrator;
pub use orchestrator::ProcessSource;
pub use orchestrator::SocketOpener;
pub use orchestrator::SysinfoSource;
pub use session::Session;
pub use session::SessionRegistry;
pub use turn::run_turn;
pub use turn::run_turn_with_handled;
