//! AT command mnemonics and response status codes.

use std::fmt;
use std::str::FromStr;

use crate::error::{FrameError, Result};

/// `AP` value for API mode with escaping.
pub const API_MODE_ESCAPED: u8 = 2;

/// A two-character AT command mnemonic.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtCommand([u8; 2]);

impl AtCommand {
    /// API mode.
    pub const AP: AtCommand = AtCommand(*b"AP");
    /// Serial number, high 32 bits.
    pub const SH: AtCommand = AtCommand(*b"SH");
    /// Serial number, low 32 bits.
    pub const SL: AtCommand = AtCommand(*b"SL");
    /// 16-bit network address.
    pub const MY: AtCommand = AtCommand(*b"MY");
    /// Node identifier string.
    pub const NI: AtCommand = AtCommand(*b"NI");
    /// Node discovery.
    pub const ND: AtCommand = AtCommand(*b"ND");
    /// Node discovery timeout, in units of 100 ms.
    pub const NT: AtCommand = AtCommand(*b"NT");
    /// DIO6 configuration (1 = RTS flow control).
    pub const D6: AtCommand = AtCommand(*b"D6");
    /// DIO7 configuration (1 = CTS flow control).
    pub const D7: AtCommand = AtCommand(*b"D7");

    /// Parse and validate a mnemonic.
    pub fn new(text: &str) -> Result<Self> {
        let bytes = text.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_graphic) {
            return Err(FrameError::InvalidCommand(text.to_string()));
        }
        Ok(AtCommand([bytes[0], bytes[1]]))
    }

    /// Build from raw payload bytes, validating them.
    pub fn from_bytes(bytes: [u8; 2]) -> Option<Self> {
        bytes
            .iter()
            .all(u8::is_ascii_graphic)
            .then_some(AtCommand(bytes))
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        self.0
    }

    pub fn as_str(&self) -> &str {
        // Construction guarantees printable ASCII.
        std::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl FromStr for AtCommand {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        AtCommand::new(s)
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtCommand({})", self.as_str())
    }
}

/// Status byte of AT and remote AT responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtStatus {
    Ok,
    Error,
    InvalidCommand,
    InvalidParameter,
    TxFailure,
    Other(u8),
}

impl AtStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => AtStatus::Ok,
            1 => AtStatus::Error,
            2 => AtStatus::InvalidCommand,
            3 => AtStatus::InvalidParameter,
            4 => AtStatus::TxFailure,
            other => AtStatus::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            AtStatus::Ok => 0,
            AtStatus::Error => 1,
            AtStatus::InvalidCommand => 2,
            AtStatus::InvalidParameter => 3,
            AtStatus::TxFailure => 4,
            AtStatus::Other(other) => other,
        }
    }

    pub fn is_ok(self) -> bool {
        self == AtStatus::Ok
    }
}

impl fmt::Display for AtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtStatus::Ok => f.write_str("OK"),
            AtStatus::Error => f.write_str("ERROR"),
            AtStatus::InvalidCommand => f.write_str("invalid command"),
            AtStatus::InvalidParameter => f.write_str("invalid parameter"),
            AtStatus::TxFailure => f.write_str("transmission failure"),
            AtStatus::Other(code) => write!(f, "status {code:#04x}"),
        }
    }
}
