//! Frame type bytes and the kind tag.

use std::fmt;

/// Local AT command.
pub const AT: u8 = 0x08;
/// Local AT command response.
pub const AT_RESPONSE: u8 = 0x88;
/// Remote AT command.
pub const REMOTE_AT: u8 = 0x17;
/// Remote AT command response.
pub const REMOTE_AT_RESPONSE: u8 = 0x97;
/// Transmit request.
pub const TX: u8 = 0x10;
/// Transmit status.
pub const TX_STATUS: u8 = 0x8B;
/// Received packet.
pub const RX: u8 = 0x90;
/// Node identification indicator.
pub const NODE_ID: u8 = 0x95;

/// The runtime kind of a parsed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    At,
    AtResponse,
    RemoteAt,
    RemoteAtResponse,
    Tx,
    TxStatus,
    Rx,
    NodeId,
    /// An `ND` AT response carrying a discovered node.
    NodeDiscoveryResponse,
    Unknown,
}

impl FrameKind {
    /// The kind a type byte maps to before any specialization.
    pub fn from_type(frame_type: u8) -> Self {
        match frame_type {
            AT => FrameKind::At,
            AT_RESPONSE => FrameKind::AtResponse,
            REMOTE_AT => FrameKind::RemoteAt,
            REMOTE_AT_RESPONSE => FrameKind::RemoteAtResponse,
            TX => FrameKind::Tx,
            TX_STATUS => FrameKind::TxStatus,
            RX => FrameKind::Rx,
            NODE_ID => FrameKind::NodeId,
            _ => FrameKind::Unknown,
        }
    }

    /// The type byte of this kind, if it has a fixed one.
    pub fn frame_type(self) -> Option<u8> {
        match self {
            FrameKind::At => Some(AT),
            FrameKind::AtResponse | FrameKind::NodeDiscoveryResponse => Some(AT_RESPONSE),
            FrameKind::RemoteAt => Some(REMOTE_AT),
            FrameKind::RemoteAtResponse => Some(REMOTE_AT_RESPONSE),
            FrameKind::Tx => Some(TX),
            FrameKind::TxStatus => Some(TX_STATUS),
            FrameKind::Rx => Some(RX),
            FrameKind::NodeId => Some(NODE_ID),
            FrameKind::Unknown => None,
        }
    }

    /// Returns true if a frame of this kind is also a frame of kind
    /// `interest`. A discovery response is an AT response.
    pub fn is_a(self, interest: FrameKind) -> bool {
        self == interest
            || (self == FrameKind::NodeDiscoveryResponse && interest == FrameKind::AtResponse)
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameKind::At => "AT",
            FrameKind::AtResponse => "AT_RESPONSE",
            FrameKind::RemoteAt => "REMOTE_AT",
            FrameKind::RemoteAtResponse => "REMOTE_AT_RESPONSE",
            FrameKind::Tx => "TX",
            FrameKind::TxStatus => "TX_STATUS",
            FrameKind::Rx => "RX",
            FrameKind::NodeId => "NODE_ID",
            FrameKind::NodeDiscoveryResponse => "NODE_DISCOVERY_RESPONSE",
            FrameKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
