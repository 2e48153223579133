use std::fmt;
use std::io;

use meshlink_frame::FrameError;
use meshlink_peer::PeerError;
use meshlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
/// A lookup finished without finding the node.
pub const NOT_FOUND: i32 = 20;
pub const TRANSPORT_ERROR: i32 = 3;
/// The radio refused the session handshake or an AT command.
pub const RADIO_REJECTED: i32 = 4;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::UnsupportedBaudRate(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::Format(_) | FrameError::InvalidCommand(_) | FrameError::InvalidAddress(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other if other.is_recoverable() => {
            CliError::new(DATA_INVALID, format!("{context}: {other}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
        PeerError::HandshakeFailed(_) | PeerError::AtStatus { .. } => {
            CliError::new(RADIO_REJECTED, format!("{context}: {err}"))
        }
        PeerError::InvalidConfig(_) | PeerError::InvalidArgument(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn maps_peer_errors_to_exit_codes() {
        assert_eq!(
            peer_error("x", PeerError::Timeout(Duration::from_secs(1))).code,
            TIMEOUT
        );
        assert_eq!(
            peer_error("x", PeerError::HandshakeFailed("AP".into())).code,
            RADIO_REJECTED
        );
        assert_eq!(
            peer_error("x", PeerError::InvalidArgument("id".into())).code,
            USAGE
        );
        let missing = TransportError::Open {
            path: "/dev/ttyUSB9".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(peer_error("open", missing.into()).code, TRANSPORT_ERROR);
    }

    #[test]
    fn error_message_keeps_context() {
        let err = frame_error("send", FrameError::InvalidCommand("X".into()));
        assert_eq!(err.code, USAGE);
        assert!(err.to_string().starts_with("send: "));
    }
}
