use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("control channel unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("channel I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
}
