//! Parsed frames and their typed views.

use std::fmt;

use bytes::Bytes;

use crate::address::Address;
use crate::at::{AtCommand, AtStatus};
use crate::codec::MIN_FRAME_SIZE;
use crate::error::{FrameError, Result};
use crate::kind::{self, FrameKind};

/// Offset of the first payload byte (after start, length and type).
pub(crate) const PAYLOAD_OFFSET: usize = 4;

/// Local AT command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtFrame {
    pub frame_id: u8,
    pub command: AtCommand,
    pub value: Bytes,
}

/// Local AT command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtResponseFrame {
    pub frame_id: u8,
    pub command: AtCommand,
    pub status: AtStatus,
    pub value: Bytes,
}

/// AT command addressed to another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAtFrame {
    pub frame_id: u8,
    pub destination: Address,
    pub options: u8,
    pub command: AtCommand,
    pub value: Bytes,
}

/// Response to a remote AT command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAtResponseFrame {
    pub frame_id: u8,
    pub source: Address,
    pub command: AtCommand,
    pub status: AtStatus,
    pub value: Bytes,
}

/// Outbound data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    pub frame_id: u8,
    pub destination: Address,
    pub radius: u8,
    pub options: u8,
    pub data: Bytes,
}

/// Delivery report for a transmit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStatusFrame {
    pub frame_id: u8,
    pub network: u16,
    pub retries: u8,
    pub delivery_status: u8,
    pub discovery_status: u8,
}

impl TxStatusFrame {
    pub fn is_delivered(&self) -> bool {
        self.delivery_status == 0
    }
}

/// Inbound data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    pub source: Address,
    pub options: u8,
    pub data: Bytes,
}

/// Fields trailing the node-id string in identification and discovery
/// payloads. Older firmware omits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeDetails {
    pub parent_network: Option<u16>,
    pub device_type: Option<u8>,
    pub profile_id: Option<u16>,
    pub manufacturer_id: Option<u16>,
}

/// Node identification broadcast (a node joined or its button was pressed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdFrame {
    pub sender: Address,
    pub options: u8,
    pub remote: Address,
    pub node_id: String,
    pub details: NodeDetails,
}

/// `ND` response describing one discovered node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDiscoveryFrame {
    pub response: AtResponseFrame,
    pub address: Address,
    pub node_id: String,
    pub details: NodeDetails,
}

/// Kind-specific view of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    At(AtFrame),
    AtResponse(AtResponseFrame),
    RemoteAt(RemoteAtFrame),
    RemoteAtResponse(RemoteAtResponseFrame),
    Tx(TxFrame),
    TxStatus(TxStatusFrame),
    Rx(RxFrame),
    NodeId(NodeIdFrame),
    NodeDiscovery(NodeDiscoveryFrame),
    Unknown,
}

/// An immutable, validated frame.
///
/// The raw bytes (start marker through checksum, unescaped) are kept
/// alongside a typed view whose byte fields share the same buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    raw: Bytes,
    body: FrameBody,
}

impl Frame {
    pub(crate) fn from_parts(raw: Bytes, body: FrameBody) -> Self {
        Self { raw, body }
    }

    /// Unescaped wire bytes, start marker through checksum.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Frames always carry a type byte, so this is never true for a parsed
    /// frame.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn frame_type(&self) -> u8 {
        self.raw[3]
    }

    /// Bytes between the type byte and the checksum.
    pub fn payload(&self) -> Bytes {
        self.raw.slice(PAYLOAD_OFFSET..self.raw.len() - 1)
    }

    pub fn checksum(&self) -> u8 {
        self.raw[self.raw.len() - 1]
    }

    pub fn body(&self) -> &FrameBody {
        &self.body
    }

    pub fn kind(&self) -> FrameKind {
        match &self.body {
            FrameBody::At(_) => FrameKind::At,
            FrameBody::AtResponse(_) => FrameKind::AtResponse,
            FrameBody::RemoteAt(_) => FrameKind::RemoteAt,
            FrameBody::RemoteAtResponse(_) => FrameKind::RemoteAtResponse,
            FrameBody::Tx(_) => FrameKind::Tx,
            FrameBody::TxStatus(_) => FrameKind::TxStatus,
            FrameBody::Rx(_) => FrameKind::Rx,
            FrameBody::NodeId(_) => FrameKind::NodeId,
            FrameBody::NodeDiscovery(_) => FrameKind::NodeDiscoveryResponse,
            FrameBody::Unknown => FrameKind::Unknown,
        }
    }

    /// Frame id for kinds that carry one.
    pub fn frame_id(&self) -> Option<u8> {
        match &self.body {
            FrameBody::At(f) => Some(f.frame_id),
            FrameBody::AtResponse(f) => Some(f.frame_id),
            FrameBody::RemoteAt(f) => Some(f.frame_id),
            FrameBody::RemoteAtResponse(f) => Some(f.frame_id),
            FrameBody::Tx(f) => Some(f.frame_id),
            FrameBody::TxStatus(f) => Some(f.frame_id),
            FrameBody::NodeDiscovery(f) => Some(f.response.frame_id),
            FrameBody::Rx(_) | FrameBody::NodeId(_) | FrameBody::Unknown => None,
        }
    }

    /// Returns true if this inbound frame answers `request`.
    ///
    /// AT and remote AT responses match on frame id and command; transmit
    /// status matches on frame id alone. Requests sent with frame id 0 never
    /// get a response.
    pub fn is_response_for(&self, request: &Frame) -> bool {
        match &request.body {
            FrameBody::At(req) => self.at_response().is_some_and(|resp| {
                req.frame_id != 0 && resp.frame_id == req.frame_id && resp.command == req.command
            }),
            FrameBody::RemoteAt(req) => self.remote_at_response().is_some_and(|resp| {
                req.frame_id != 0 && resp.frame_id == req.frame_id && resp.command == req.command
            }),
            FrameBody::Tx(req) => self
                .tx_status()
                .is_some_and(|status| req.frame_id != 0 && status.frame_id == req.frame_id),
            _ => false,
        }
    }

    pub fn at(&self) -> Option<&AtFrame> {
        match &self.body {
            FrameBody::At(f) => Some(f),
            _ => None,
        }
    }

    /// AT response view; discovery responses are AT responses too.
    pub fn at_response(&self) -> Option<&AtResponseFrame> {
        match &self.body {
            FrameBody::AtResponse(f) => Some(f),
            FrameBody::NodeDiscovery(f) => Some(&f.response),
            _ => None,
        }
    }

    pub fn remote_at(&self) -> Option<&RemoteAtFrame> {
        match &self.body {
            FrameBody::RemoteAt(f) => Some(f),
            _ => None,
        }
    }

    pub fn remote_at_response(&self) -> Option<&RemoteAtResponseFrame> {
        match &self.body {
            FrameBody::RemoteAtResponse(f) => Some(f),
            _ => None,
        }
    }

    pub fn tx(&self) -> Option<&TxFrame> {
        match &self.body {
            FrameBody::Tx(f) => Some(f),
            _ => None,
        }
    }

    pub fn tx_status(&self) -> Option<&TxStatusFrame> {
        match &self.body {
            FrameBody::TxStatus(f) => Some(f),
            _ => None,
        }
    }

    pub fn rx(&self) -> Option<&RxFrame> {
        match &self.body {
            FrameBody::Rx(f) => Some(f),
            _ => None,
        }
    }

    pub fn node_id(&self) -> Option<&NodeIdFrame> {
        match &self.body {
            FrameBody::NodeId(f) => Some(f),
            _ => None,
        }
    }

    pub fn node_discovery(&self) -> Option<&NodeDiscoveryFrame> {
        match &self.body {
            FrameBody::NodeDiscovery(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind())
            .field("frame_id", &self.frame_id())
            .field("bytes", &format_args!("{}", hex(&self.raw)))
            .finish()
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

struct KindParser {
    frame_type: u8,
    kind: FrameKind,
    min_payload: usize,
    parse: fn(&Bytes) -> Result<FrameBody>,
}

const PARSERS: [KindParser; 8] = [
    KindParser {
        frame_type: kind::AT,
        kind: FrameKind::At,
        min_payload: 3,
        parse: parse_at,
    },
    KindParser {
        frame_type: kind::AT_RESPONSE,
        kind: FrameKind::AtResponse,
        min_payload: 4,
        parse: parse_at_response,
    },
    KindParser {
        frame_type: kind::REMOTE_AT,
        kind: FrameKind::RemoteAt,
        min_payload: 14,
        parse: parse_remote_at,
    },
    KindParser {
        frame_type: kind::REMOTE_AT_RESPONSE,
        kind: FrameKind::RemoteAtResponse,
        min_payload: 14,
        parse: parse_remote_at_response,
    },
    KindParser {
        frame_type: kind::TX,
        kind: FrameKind::Tx,
        min_payload: 13,
        parse: parse_tx,
    },
    KindParser {
        frame_type: kind::TX_STATUS,
        kind: FrameKind::TxStatus,
        min_payload: 6,
        parse: parse_tx_status,
    },
    KindParser {
        frame_type: kind::RX,
        kind: FrameKind::Rx,
        min_payload: 11,
        parse: parse_rx,
    },
    KindParser {
        frame_type: kind::NODE_ID,
        kind: FrameKind::NodeId,
        min_payload: 21,
        parse: parse_node_id,
    },
];

/// Build the typed view for a frame whose length and checksum are valid.
pub(crate) fn parse_body(frame_type: u8, payload: &Bytes) -> Result<FrameBody> {
    let Some(parser) = PARSERS.iter().find(|p| p.frame_type == frame_type) else {
        return Ok(FrameBody::Unknown);
    };
    if payload.len() < parser.min_payload {
        return Err(FrameError::KindTooShort {
            kind: parser.kind,
            len: payload.len() + MIN_FRAME_SIZE,
            min: parser.min_payload + MIN_FRAME_SIZE,
        });
    }
    (parser.parse)(payload)
}

fn command_at(kind: FrameKind, payload: &[u8], offset: usize) -> Result<AtCommand> {
    AtCommand::from_bytes([payload[offset], payload[offset + 1]]).ok_or(FrameError::Malformed {
        kind,
        reason: "AT command is not printable ASCII",
    })
}

fn parse_at(p: &Bytes) -> Result<FrameBody> {
    Ok(FrameBody::At(AtFrame {
        frame_id: p[0],
        command: command_at(FrameKind::At, p, 1)?,
        value: p.slice(3..),
    }))
}

fn parse_at_response(p: &Bytes) -> Result<FrameBody> {
    let response = AtResponseFrame {
        frame_id: p[0],
        command: command_at(FrameKind::AtResponse, p, 1)?,
        status: AtStatus::from_u8(p[3]),
        value: p.slice(4..),
    };

    // The final `ND` response of a discovery round carries no node.
    if response.command == AtCommand::ND && response.status.is_ok() && !response.value.is_empty()
    {
        return parse_node_discovery(response);
    }
    Ok(FrameBody::AtResponse(response))
}

fn parse_node_discovery(response: AtResponseFrame) -> Result<FrameBody> {
    let v = &response.value;
    if v.len() < 10 {
        return Err(FrameError::Malformed {
            kind: FrameKind::NodeDiscoveryResponse,
            reason: "discovery payload shorter than address fields",
        });
    }
    let network = u16::from_be_bytes([v[0], v[1]]);
    let high = u32::from_be_bytes([v[2], v[3], v[4], v[5]]);
    let low = u32::from_be_bytes([v[6], v[7], v[8], v[9]]);
    let (node_id, rest) = split_node_id(&v[10..]);
    let details = read_details(rest);

    Ok(FrameBody::NodeDiscovery(NodeDiscoveryFrame {
        address: Address::from_halves(high, low, network),
        node_id,
        details,
        response,
    }))
}

fn parse_remote_at(p: &Bytes) -> Result<FrameBody> {
    Ok(FrameBody::RemoteAt(RemoteAtFrame {
        frame_id: p[0],
        destination: Address::read(&p[1..11]),
        options: p[11],
        command: command_at(FrameKind::RemoteAt, p, 12)?,
        value: p.slice(14..),
    }))
}

fn parse_remote_at_response(p: &Bytes) -> Result<FrameBody> {
    Ok(FrameBody::RemoteAtResponse(RemoteAtResponseFrame {
        frame_id: p[0],
        source: Address::read(&p[1..11]),
        command: command_at(FrameKind::RemoteAtResponse, p, 11)?,
        status: AtStatus::from_u8(p[13]),
        value: p.slice(14..),
    }))
}

fn parse_tx(p: &Bytes) -> Result<FrameBody> {
    Ok(FrameBody::Tx(TxFrame {
        frame_id: p[0],
        destination: Address::read(&p[1..11]),
        radius: p[11],
        options: p[12],
        data: p.slice(13..),
    }))
}

fn parse_tx_status(p: &Bytes) -> Result<FrameBody> {
    Ok(FrameBody::TxStatus(TxStatusFrame {
        frame_id: p[0],
        network: u16::from_be_bytes([p[1], p[2]]),
        retries: p[3],
        delivery_status: p[4],
        discovery_status: p[5],
    }))
}

fn parse_rx(p: &Bytes) -> Result<FrameBody> {
    Ok(FrameBody::Rx(RxFrame {
        source: Address::read(&p[0..10]),
        options: p[10],
        data: p.slice(11..),
    }))
}

fn parse_node_id(p: &Bytes) -> Result<FrameBody> {
    let sender = Address::read(&p[0..10]);
    let options = p[10];
    let remote_network = u16::from_be_bytes([p[11], p[12]]);
    let mut remote_serial = [0u8; 8];
    remote_serial.copy_from_slice(&p[13..21]);
    let (node_id, rest) = split_node_id(&p[21..]);

    Ok(FrameBody::NodeId(NodeIdFrame {
        sender,
        options,
        remote: Address::new(remote_serial, remote_network),
        node_id,
        details: read_details(rest),
    }))
}

/// Split a NUL-terminated node id off the front of `bytes`.
///
/// A missing terminator means the id runs to the end of the payload.
fn split_node_id(bytes: &[u8]) -> (String, &[u8]) {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => (
            String::from_utf8_lossy(&bytes[..end]).into_owned(),
            &bytes[end + 1..],
        ),
        None => (String::from_utf8_lossy(bytes).into_owned(), &[]),
    }
}

/// Parent, device type, one status/event byte, profile, manufacturer.
fn read_details(rest: &[u8]) -> NodeDetails {
    let mut details = NodeDetails::default();
    if rest.len() >= 2 {
        details.parent_network = Some(u16::from_be_bytes([rest[0], rest[1]]));
    }
    if rest.len() >= 3 {
        details.device_type = Some(rest[2]);
    }
    if rest.len() >= 6 {
        details.profile_id = Some(u16::from_be_bytes([rest[4], rest[5]]));
    }
    if rest.len() >= 8 {
        details.manufacturer_id = Some(u16::from_be_bytes([rest[6], rest[7]]));
    }
    details
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{checksum, parse};
    use crate::escape::START;

    fn raw_frame(frame_type: u8, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(START);
        buf.put_u16(payload.len() as u16 + 1);
        buf.put_u8(frame_type);
        buf.put_slice(payload);
        let sum = checksum(&buf[3..]);
        buf.put_u8(sum);
        buf.freeze()
    }

    const SERIAL: [u8; 8] = [0x00, 0x13, 0xA2, 0x00, 0x40, 0xA1, 0xB2, 0xC3];

    #[test]
    fn parses_rx_view() {
        let mut payload = SERIAL.to_vec();
        payload.extend_from_slice(&[0x12, 0x34, 0x01]);
        payload.extend_from_slice(b"hello");

        let frame = parse(raw_frame(kind::RX, &payload)).unwrap();
        let rx = frame.rx().unwrap();
        assert_eq!(frame.kind(), FrameKind::Rx);
        assert_eq!(rx.source.serial(), 0x0013_A200_40A1_B2C3);
        assert_eq!(rx.source.network(), 0x1234);
        assert_eq!(rx.options, 0x01);
        assert_eq!(rx.data.as_ref(), b"hello");
        assert_eq!(frame.frame_id(), None);
    }

    #[test]
    fn parses_tx_status_view() {
        let frame =
            parse(raw_frame(kind::TX_STATUS, &[0x07, 0xFF, 0xFE, 0x00, 0x00, 0x01])).unwrap();
        let status = frame.tx_status().unwrap();
        assert_eq!(status.frame_id, 7);
        assert_eq!(status.network, 0xFFFE);
        assert!(status.is_delivered());
        assert_eq!(frame.frame_id(), Some(7));
    }

    #[test]
    fn specializes_node_discovery_response() {
        let mut payload = vec![0x01, b'N', b'D', 0x00];
        payload.extend_from_slice(&[0x12, 0x34]);
        payload.extend_from_slice(&SERIAL);
        payload.extend_from_slice(b"ROUTER-1\0");
        payload.extend_from_slice(&[0xFF, 0xFE, 0x01, 0x00, 0xC1, 0x05, 0x10, 0x1E]);

        let frame = parse(raw_frame(kind::AT_RESPONSE, &payload)).unwrap();
        assert_eq!(frame.kind(), FrameKind::NodeDiscoveryResponse);

        let nd = frame.node_discovery().unwrap();
        assert_eq!(nd.node_id, "ROUTER-1");
        assert_eq!(nd.address.serial(), 0x0013_A200_40A1_B2C3);
        assert_eq!(nd.address.network(), 0x1234);
        assert_eq!(nd.details.parent_network, Some(0xFFFE));
        assert_eq!(nd.details.device_type, Some(0x01));
        assert_eq!(nd.details.profile_id, Some(0xC105));
        assert_eq!(nd.details.manufacturer_id, Some(0x101E));

        let response = frame.at_response().unwrap();
        assert_eq!(response.command, AtCommand::ND);
        assert_eq!(frame.frame_id(), Some(1));
    }

    #[test]
    fn empty_or_failed_nd_response_stays_plain() {
        let done = parse(raw_frame(kind::AT_RESPONSE, &[0x01, b'N', b'D', 0x00])).unwrap();
        assert_eq!(done.kind(), FrameKind::AtResponse);

        let failed =
            parse(raw_frame(kind::AT_RESPONSE, &[0x01, b'N', b'D', 0x01, 0x00, 0x00])).unwrap();
        assert_eq!(failed.kind(), FrameKind::AtResponse);
        assert_eq!(failed.at_response().unwrap().status, AtStatus::Error);
    }

    #[test]
    fn short_nd_value_is_malformed() {
        let err = parse(raw_frame(kind::AT_RESPONSE, &[0x01, b'N', b'D', 0x00, 0x12])).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Malformed {
                kind: FrameKind::NodeDiscoveryResponse,
                ..
            }
        ));
        assert!(err.is_recoverable());
    }

    #[test]
    fn parses_node_identification() {
        let mut payload = SERIAL.to_vec();
        payload.extend_from_slice(&[0x56, 0x78, 0x02]);
        payload.extend_from_slice(&[0x56, 0x78]);
        payload.extend_from_slice(&SERIAL);
        payload.extend_from_slice(b"SENSOR\0");
        payload.extend_from_slice(&[0xFF, 0xFE, 0x02, 0x01, 0xC1, 0x05, 0x10, 0x1E]);

        let frame = parse(raw_frame(kind::NODE_ID, &payload)).unwrap();
        let ni = frame.node_id().unwrap();
        assert_eq!(ni.node_id, "SENSOR");
        assert_eq!(ni.remote.network(), 0x5678);
        assert_eq!(ni.remote, ni.sender);
        assert_eq!(ni.details.device_type, Some(0x02));
    }

    #[test]
    fn node_id_without_trailing_fields() {
        let mut payload = SERIAL.to_vec();
        payload.extend_from_slice(&[0x56, 0x78, 0x02, 0x56, 0x78]);
        payload.extend_from_slice(&SERIAL);
        payload.extend_from_slice(b"BARE");

        let frame = parse(raw_frame(kind::NODE_ID, &payload)).unwrap();
        let ni = frame.node_id().unwrap();
        assert_eq!(ni.node_id, "BARE");
        assert_eq!(ni.details, NodeDetails::default());
    }

    #[test]
    fn rejects_kind_specific_short_frames() {
        let err = parse(raw_frame(kind::TX, &[0x01, 0x02])).unwrap_err();
        assert!(matches!(
            err,
            FrameError::KindTooShort {
                kind: FrameKind::Tx,
                len: 7,
                min: 18
            }
        ));
    }

    #[test]
    fn rejects_binary_command_bytes() {
        let err = parse(raw_frame(kind::AT, &[0x01, 0x00, 0x01])).unwrap_err();
        assert!(matches!(err, FrameError::Malformed { kind: FrameKind::At, .. }));
    }

    #[test]
    fn unknown_type_keeps_raw_payload() {
        let frame = parse(raw_frame(0xA5, &[1, 2, 3])).unwrap();
        assert_eq!(frame.kind(), FrameKind::Unknown);
        assert_eq!(frame.frame_type(), 0xA5);
        assert_eq!(frame.payload().as_ref(), &[1, 2, 3]);
        assert_eq!(frame.frame_id(), None);
    }

    #[test]
    fn debug_shows_kind_and_hex() {
        let frame = parse(raw_frame(kind::AT, &[0x01, b'N', b'I'])).unwrap();
        let text = format!("{frame:?}");
        assert!(text.contains("At"));
        assert!(text.contains("7E 00 04 08 01 4E 49 5F"));
    }
}
