//! API frame codec for mesh radios.
//!
//! Every frame on the wire looks like:
//! - a start marker `0x7E`
//! - a 2-byte big-endian length counting the type byte and payload
//! - a type byte and the kind-specific payload
//! - a checksum: `0xFF` minus the low byte of the sum of type and payload
//!
//! Every byte after the start marker is escaped so that the start marker,
//! the escape marker and the XON/XOFF flow-control bytes never appear raw
//! inside a frame.
//!
//! Parsed frames are immutable [`Frame`] values carrying a typed view
//! ([`FrameBody`]) over the shared byte buffer.

pub mod address;
pub mod at;
pub mod builder;
pub mod codec;
pub mod error;
pub mod escape;
pub mod frame;
pub mod kind;
pub mod reader;
pub mod writer;

pub use address::Address;
pub use at::{AtCommand, AtStatus, API_MODE_ESCAPED};
pub use builder::{AtBuilder, BuildFrame, FrameBuffer, Outbound, RemoteAtBuilder, TxBuilder};
pub use codec::{checksum, decode_frame, parse, FrameConfig, MAX_FRAME_SIZE, MIN_FRAME_SIZE};
pub use error::{FrameError, Result};
pub use escape::{escape, unescape, ESCAPE, START, XOFF, XON};
pub use frame::{
    AtFrame, AtResponseFrame, Frame, FrameBody, NodeDetails, NodeDiscoveryFrame, NodeIdFrame,
    RemoteAtFrame, RemoteAtResponseFrame, RxFrame, TxFrame, TxStatusFrame,
};
pub use kind::FrameKind;
pub use reader::{DecodeStats, FrameReader};
pub use writer::FrameWriter;
