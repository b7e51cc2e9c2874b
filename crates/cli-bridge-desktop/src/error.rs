use thiserror::Error;

#[derive(Error, Debug)]
pub enum DesktopError {
    #[error("no window matched titles [{titles}]")]
    WindowNotFound { titles: String },

    #[error("could not bring window to foreground after {attempts} attempts")]
    FocusFailure { attempts: u32 },

    #[error("output never stabilized after {polls} captures")]
    OutputNeverStabilized { polls: u32 },

    #[error("keystroke injection failed: {0}")]
    Input(String),

    #[error("clipboard capture failed: {0}")]
    Clipboard(String),

    #[error("ui automation is not supported on this platform")]
    Unsupported,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
