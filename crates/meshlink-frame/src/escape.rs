//! Byte stuffing for API mode 2.
//!
//! Control bytes inside a frame are sent as [`ESCAPE`] followed by the
//! original byte XORed with [`ESCAPE_MASK`]. The leading [`START`] of a frame
//! is the only raw control byte on the wire.

use bytes::{BufMut, BytesMut};

/// Frame start marker.
pub const START: u8 = 0x7E;
/// Escape marker.
pub const ESCAPE: u8 = 0x7D;
/// Software flow control: resume.
pub const XON: u8 = 0x11;
/// Software flow control: pause.
pub const XOFF: u8 = 0x13;
/// Mask applied to escaped bytes.
pub const ESCAPE_MASK: u8 = 0x20;

/// Returns true if `byte` must be escaped inside a frame.
pub fn needs_escape(byte: u8) -> bool {
    matches!(byte, START | ESCAPE | XON | XOFF)
}

/// Append the escaped form of `src` to `dst`.
pub fn escape_into(src: &[u8], dst: &mut BytesMut) {
    dst.reserve(src.len() + src.len() / 8);
    for &byte in src {
        if needs_escape(byte) {
            dst.put_u8(ESCAPE);
            dst.put_u8(byte ^ ESCAPE_MASK);
        } else {
            dst.put_u8(byte);
        }
    }
}

/// Escape a byte sequence.
pub fn escape(src: &[u8]) -> Vec<u8> {
    let mut dst = BytesMut::with_capacity(src.len());
    escape_into(src, &mut dst);
    dst.to_vec()
}

/// Unescape a complete byte sequence.
///
/// A trailing escape marker with no following byte is end of stream and is
/// dropped.
pub fn unescape(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut bytes = src.iter();
    while let Some(&byte) = bytes.next() {
        if byte == ESCAPE {
            match bytes.next() {
                Some(&next) => out.push(next ^ ESCAPE_MASK),
                None => break,
            }
        } else {
            out.push(byte);
        }
    }
    out
}

/// Outcome of unescaping the head of a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unescaped {
    /// `want` bytes were produced from the first `consumed` raw bytes.
    Complete { consumed: usize },
    /// More raw bytes are needed.
    Incomplete,
    /// A raw start marker was found at raw offset `at`.
    Interrupted { at: usize },
}

/// Unescape raw bytes from `src` into `dst` until `dst` holds `want` bytes.
pub(crate) fn unescape_prefix(src: &[u8], want: usize, dst: &mut Vec<u8>) -> Unescaped {
    let mut i = 0usize;
    while dst.len() < want {
        let Some(&byte) = src.get(i) else {
            return Unescaped::Incomplete;
        };
        match byte {
            START => return Unescaped::Interrupted { at: i },
            ESCAPE => {
                let Some(&next) = src.get(i + 1) else {
                    return Unescaped::Incomplete;
                };
                if next == START {
                    return Unescaped::Interrupted { at: i + 1 };
                }
                dst.push(next ^ ESCAPE_MASK);
                i += 2;
            }
            other => {
                dst.push(other);
                i += 1;
            }
        }
    }
    Unescaped::Complete { consumed: i }
}
