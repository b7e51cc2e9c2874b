#![deny(clippy::all)]

mod extract;
mod frame;
mod turn;

pub use extract::EmbeddedCommand;
pub use extract::HUB_COMMAND_MARKER;
pub use extract::extract_embedded_command;
pub use frame::COMMAND_HANDLED_MARKER;
pub use frame::FrameDecoder;
pub use frame::HISTORY_END_MARKER;
pub use frame::HISTORY_START_MARKER;
pub use frame::ResponseMessage;
pub use frame::TURN_FINISHED_MARKER;
pub use turn::TurnAccumulator;
pub use turn::TurnConfig;
pub use turn::TurnResult;
pub use turn::TurnState;
