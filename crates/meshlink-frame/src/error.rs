use crate::kind::FrameKind;

/// Errors that can occur while encoding, decoding or building frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Bytes preceding a start marker were discarded.
    #[error("stream out of sync, skipped {skipped} bytes before start marker")]
    Desync { skipped: usize },

    /// A start marker appeared inside a partially received frame.
    #[error("frame interrupted by start marker after {discarded} bytes")]
    Interrupted { discarded: usize },

    /// The frame does not begin with a start marker.
    #[error("frame starts with {found:#04x}, not a start marker")]
    MissingStart { found: u8 },

    /// The frame is shorter than the minimum header plus checksum.
    #[error("frame too short ({len} bytes, min {min})")]
    TooShort { len: usize, min: usize },

    /// The declared length disagrees with the received byte count.
    #[error("length field {declared} does not match frame body {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The checksum byte does not match the frame contents.
    #[error("checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    Checksum { expected: u8, actual: u8 },

    /// The declared length exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A typed frame is shorter than its kind requires.
    #[error("{kind} frame too short ({len} bytes, min {min})")]
    KindTooShort {
        kind: FrameKind,
        len: usize,
        min: usize,
    },

    /// A typed frame has a structurally invalid payload.
    #[error("malformed {kind} frame: {reason}")]
    Malformed {
        kind: FrameKind,
        reason: &'static str,
    },

    /// A builder was given invalid fields.
    #[error("invalid frame field: {0}")]
    Format(String),

    /// An AT command mnemonic is not two printable ASCII characters.
    #[error("invalid AT command {0:?}")]
    InvalidCommand(String),

    /// An address string could not be parsed.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel was closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Returns true for framing errors after which the stream can be
    /// rescanned for the next start marker.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::Desync { .. }
                | FrameError::Interrupted { .. }
                | FrameError::MissingStart { .. }
                | FrameError::TooShort { .. }
                | FrameError::LengthMismatch { .. }
                | FrameError::Checksum { .. }
                | FrameError::FrameTooLarge { .. }
                | FrameError::KindTooShort { .. }
                | FrameError::Malformed { .. }
        )
    }

    /// Returns true for read timeouts on a channel with a read timeout set.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
