#![deny(clippy::all)]

mod channel;
mod envelope;
mod error;
mod socket;

pub use channel::ChannelConfig;
pub use channel::ControlChannel;
pub use channel::TurnChannel;
pub use envelope::RequestEnvelope;
pub use error::ChannelError;
pub use socket::control_socket_path;
pub use socket::socket_dir;
