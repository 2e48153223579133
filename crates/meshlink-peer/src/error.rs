use std::time::Duration;

use meshlink_frame::{AtCommand, AtStatus};

/// Errors that can occur in connection, discovery and tunnel operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] meshlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] meshlink_frame::FrameError),

    /// The radio did not complete the session handshake.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,

    /// No response arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The radio answered an AT command with a failure status.
    #[error("AT command {command} failed: {status}")]
    AtStatus { command: AtCommand, status: AtStatus },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to start the decode thread.
    #[error("failed to spawn decode thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl From<PeerError> for std::io::Error {
    fn from(err: PeerError) -> Self {
        use meshlink_frame::FrameError;
        use meshlink_transport::TransportError;
        use std::io::ErrorKind;

        let kind = match &err {
            PeerError::Closed => ErrorKind::NotConnected,
            PeerError::Timeout(_) => ErrorKind::TimedOut,
            PeerError::Frame(FrameError::Io(io)) => io.kind(),
            PeerError::Transport(TransportError::Io(io)) => io.kind(),
            PeerError::Frame(frame) if frame.is_recoverable() => ErrorKind::InvalidData,
            PeerError::Frame(FrameError::Format(_))
            | PeerError::InvalidArgument(_)
            | PeerError::InvalidConfig(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
