use std::path::PathBuf;

/// Errors that can occur on the command channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to open the device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The write failed or accepted zero bytes.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device accepted only part of a command.
    #[error("incomplete transfer ({written} of {expected} bytes)")]
    Incomplete { written: usize, expected: usize },

    /// The device was not present when the channel was opened.
    #[error("device {path} is not open")]
    Unavailable { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, ChannelError>;
