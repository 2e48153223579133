use std::path::PathBuf;

/// Errors that can occur on a radio byte channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device or socket at the given path.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to apply line settings (baud rate, flow control) to the device.
    #[error("failed to configure {what}: {source}")]
    Configure {
        what: &'static str,
        source: std::io::Error,
    },

    /// The requested baud rate has no termios equivalent.
    #[error("unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),

    /// An I/O error occurred on the channel.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
