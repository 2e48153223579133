use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::escape::{unescape_prefix, Unescaped, START};
use crate::frame::{parse_body, Frame, PAYLOAD_OFFSET};

/// Start marker, two length bytes, type byte and checksum.
pub const MIN_FRAME_SIZE: usize = 5;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize + 4;

/// Checksum over the type byte and payload.
///
/// ```text
/// checksum = 0xFF - (sum(type, payload...) & 0xFF)
/// ```
pub fn checksum(body: &[u8]) -> u8 {
    let sum = body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0xFF - sum
}

/// Validate an unescaped frame and build its typed view.
///
/// Wire format (before escaping):
/// ```text
/// ┌───────┬──────────────┬──────┬──────────────┬──────────┐
/// │ 0x7E  │ Length (2B)  │ Type │ Payload      │ Checksum │
/// │       │ big endian   │ (1B) │ (Length - 1) │ (1B)     │
/// └───────┴──────────────┴──────┴──────────────┴──────────┘
/// ```
pub fn parse(raw: impl Into<Bytes>) -> Result<Frame> {
    let raw = raw.into();
    if raw.len() < MIN_FRAME_SIZE {
        return Err(FrameError::TooShort {
            len: raw.len(),
            min: MIN_FRAME_SIZE,
        });
    }
    if raw[0] != START {
        return Err(FrameError::MissingStart { found: raw[0] });
    }

    let declared = u16::from_be_bytes([raw[1], raw[2]]) as usize;
    let actual = raw.len() - 4;
    if declared != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }

    let last = raw.len() - 1;
    let expected = checksum(&raw[3..last]);
    if raw[last] != expected {
        return Err(FrameError::Checksum {
            expected,
            actual: raw[last],
        });
    }

    let payload = raw.slice(PAYLOAD_OFFSET..last);
    let body = parse_body(raw[3], &payload)?;
    Ok(Frame::from_parts(raw, body))
}

/// Decode one frame from a buffer of escaped wire bytes.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// Framing errors consume the offending bytes so the next call resumes at
/// the following start marker; they are all [recoverable].
///
/// [recoverable]: FrameError::is_recoverable
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    if src.is_empty() {
        return Ok(None);
    }

    if src[0] != START {
        let skipped = src.iter().position(|&b| b == START).unwrap_or(src.len());
        src.advance(skipped);
        return Err(FrameError::Desync { skipped });
    }

    let mut body = Vec::with_capacity(64);
    let declared = match unescape_prefix(&src[1..], 2, &mut body) {
        Unescaped::Incomplete => return Ok(None),
        Unescaped::Interrupted { at } => return Err(interrupted(src, at)),
        Unescaped::Complete { .. } => u16::from_be_bytes([body[0], body[1]]) as usize,
    };

    let total = declared + 4;
    if total > max_frame_size {
        src.advance(1);
        return Err(FrameError::FrameTooLarge {
            size: total,
            max: max_frame_size,
        });
    }

    body.clear();
    match unescape_prefix(&src[1..], total - 1, &mut body) {
        Unescaped::Incomplete => Ok(None),
        Unescaped::Interrupted { at } => Err(interrupted(src, at)),
        Unescaped::Complete { consumed } => {
            src.advance(1 + consumed);
            let mut raw = BytesMut::with_capacity(total);
            raw.put_u8(START);
            raw.put_slice(&body);
            parse(raw.freeze()).map(Some)
        }
    }
}

/// Drop a partial frame up to (not including) the raw start marker that cut
/// it short.
fn interrupted(src: &mut BytesMut, at: usize) -> FrameError {
    let discarded = 1 + at;
    src.advance(discarded);
    FrameError::Interrupted { discarded }
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame size in bytes (unescaped). Default: [`MAX_FRAME_SIZE`].
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
