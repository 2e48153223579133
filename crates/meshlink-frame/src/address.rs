//! Radio addresses.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FrameError, Result};

/// Network address meaning "not known yet".
pub const UNKNOWN_NETWORK: u16 = 0xFFFE;

/// A radio address.
///
/// The 64-bit serial number is permanent; the 16-bit network address is
/// assigned when the radio joins a network and may change. Equality and
/// hashing only consider the serial number.
///
/// Text form is 16 hex digits with an optional `:NNNN` network suffix, `*`
/// for broadcast or `#` for the coordinator.
#[derive(Clone, Copy)]
pub struct Address {
    serial: [u8; 8],
    network: u16,
}

impl Address {
    /// Broadcast to every node.
    pub const BROADCAST: Address = Address {
        serial: [0, 0, 0, 0, 0, 0, 0xFF, 0xFF],
        network: UNKNOWN_NETWORK,
    };

    /// The network coordinator.
    pub const COORDINATOR: Address = Address {
        serial: [0; 8],
        network: 0x0000,
    };

    pub const fn new(serial: [u8; 8], network: u16) -> Self {
        Self { serial, network }
    }

    /// Address with an unknown network part.
    pub const fn from_serial(serial: u64) -> Self {
        Self {
            serial: serial.to_be_bytes(),
            network: UNKNOWN_NETWORK,
        }
    }

    /// Combine the `SH`/`SL` halves of a serial number.
    pub fn from_halves(high: u32, low: u32, network: u16) -> Self {
        let serial = ((high as u64) << 32) | low as u64;
        Self {
            serial: serial.to_be_bytes(),
            network,
        }
    }

    /// Read 8 serial bytes followed by 2 network bytes.
    pub(crate) fn read(bytes: &[u8]) -> Self {
        let mut serial = [0u8; 8];
        serial.copy_from_slice(&bytes[..8]);
        Self {
            serial,
            network: u16::from_be_bytes([bytes[8], bytes[9]]),
        }
    }

    pub fn serial(&self) -> u64 {
        u64::from_be_bytes(self.serial)
    }

    pub fn serial_bytes(&self) -> [u8; 8] {
        self.serial
    }

    pub fn network(&self) -> u16 {
        self.network
    }

    /// Same serial number with a different network address.
    pub fn with_network(self, network: u16) -> Self {
        Self { network, ..self }
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_coordinator(&self) -> bool {
        *self == Self::COORDINATOR
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}:{:04X}", self.serial(), self.network)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        match text {
            "*" => return Ok(Address::BROADCAST),
            "#" => return Ok(Address::COORDINATOR),
            _ => {}
        }

        let invalid = || FrameError::InvalidAddress(s.to_string());
        let (serial_text, network_text) = match text.split_once(':') {
            Some((serial, network)) => (serial, Some(network)),
            None => (text, None),
        };

        if serial_text.len() != 16 || !serial_text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let serial = u64::from_str_radix(serial_text, 16).map_err(|_| invalid())?;

        let network = match network_text {
            Some(network) => {
                if network.len() != 4 || !network.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(invalid());
                }
                u16::from_str_radix(network, 16).map_err(|_| invalid())?
            }
            None => UNKNOWN_NETWORK,
        };

        Ok(Address::from_serial(serial).with_network(network))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
