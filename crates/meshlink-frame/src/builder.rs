//! Outbound frame construction.

use bytes::{BufMut, BytesMut};

use crate::address::Address;
use crate::at::AtCommand;
use crate::codec::{checksum, parse, MIN_FRAME_SIZE};
use crate::error::{FrameError, Result};
use crate::escape::START;
use crate::frame::Frame;
use crate::kind;

/// Remote AT option: apply the change immediately.
pub const REMOTE_AT_APPLY_CHANGES: u8 = 0x02;

/// Growable frame buffer.
///
/// Seeded with the start marker, a placeholder length and the type byte.
/// Fields are appended in kind order; [`finish`](Self::finish) backfills the
/// length and appends the checksum.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new(frame_type: u8) -> Self {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u8(START);
        buf.put_u16(0);
        buf.put_u8(frame_type);
        Self { buf }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Serial number followed by network address.
    pub fn put_address(&mut self, address: &Address) -> &mut Self {
        self.buf.put_slice(&address.serial_bytes());
        self.buf.put_u16(address.network());
        self
    }

    pub fn put_command(&mut self, command: AtCommand) -> &mut Self {
        self.buf.put_slice(&command.as_bytes());
        self
    }

    /// Backfill length and checksum and validate the result.
    pub fn finish(mut self) -> Result<Frame> {
        let length = self.buf.len() - 3;
        if length + MIN_FRAME_SIZE - 1 > crate::codec::MAX_FRAME_SIZE {
            return Err(FrameError::Format(format!(
                "frame body of {length} bytes exceeds the 16-bit length field"
            )));
        }
        let length_bytes = (length as u16).to_be_bytes();
        self.buf[1] = length_bytes[0];
        self.buf[2] = length_bytes[1];
        let sum = checksum(&self.buf[3..]);
        self.buf.put_u8(sum);
        parse(self.buf.freeze())
    }
}

/// A frame that can be stamped with a frame id and built.
pub trait BuildFrame {
    /// Frame id this builder will use; 0 requests no response.
    fn frame_id(&self) -> u8;

    fn set_frame_id(&mut self, frame_id: u8);

    /// Validate the fields and produce the frame.
    fn build(&self) -> Result<Frame>;
}

/// Local AT command builder.
///
/// ```
/// use meshlink_frame::{AtBuilder, BuildFrame};
///
/// let frame = AtBuilder::new("NT").with_value([0x20]).with_frame_id(1).build().unwrap();
/// assert_eq!(frame.at().unwrap().value.as_ref(), &[0x20]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtBuilder {
    frame_id: u8,
    command: String,
    value: Vec<u8>,
}

impl AtBuilder {
    /// Query or set `command`. The mnemonic is validated on build.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            frame_id: 0,
            command: command.into(),
            value: Vec::new(),
        }
    }

    pub fn from_command(command: AtCommand) -> Self {
        Self::new(command.as_str())
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_frame_id(mut self, frame_id: u8) -> Self {
        self.frame_id = frame_id;
        self
    }
}

impl BuildFrame for AtBuilder {
    fn frame_id(&self) -> u8 {
        self.frame_id
    }

    fn set_frame_id(&mut self, frame_id: u8) {
        self.frame_id = frame_id;
    }

    fn build(&self) -> Result<Frame> {
        let command = AtCommand::new(&self.command)?;
        let mut buf = FrameBuffer::new(kind::AT);
        buf.put_u8(self.frame_id)
            .put_command(command)
            .put_slice(&self.value);
        buf.finish()
    }
}

/// Remote AT command builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAtBuilder {
    frame_id: u8,
    destination: Option<Address>,
    options: u8,
    command: String,
    value: Vec<u8>,
}

impl RemoteAtBuilder {
    pub fn new(destination: Address, command: impl Into<String>) -> Self {
        Self::command(command).with_destination(destination)
    }

    /// Builder without a destination yet.
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            frame_id: 0,
            destination: None,
            options: REMOTE_AT_APPLY_CHANGES,
            command: command.into(),
            value: Vec::new(),
        }
    }

    pub fn with_destination(mut self, destination: Address) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_options(mut self, options: u8) -> Self {
        self.options = options;
        self
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_frame_id(mut self, frame_id: u8) -> Self {
        self.frame_id = frame_id;
        self
    }
}

impl BuildFrame for RemoteAtBuilder {
    fn frame_id(&self) -> u8 {
        self.frame_id
    }

    fn set_frame_id(&mut self, frame_id: u8) {
        self.frame_id = frame_id;
    }

    fn build(&self) -> Result<Frame> {
        let destination = self.destination.ok_or_else(|| {
            FrameError::Format("remote AT frame requires a destination address".to_string())
        })?;
        let command = AtCommand::new(&self.command)?;
        let mut buf = FrameBuffer::new(kind::REMOTE_AT);
        buf.put_u8(self.frame_id)
            .put_address(&destination)
            .put_u8(self.options)
            .put_command(command)
            .put_slice(&self.value);
        buf.finish()
    }
}

/// Transmit request builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxBuilder {
    frame_id: u8,
    destination: Option<Address>,
    radius: u8,
    options: u8,
    data: Vec<u8>,
}

impl TxBuilder {
    pub fn new(destination: Address, data: impl Into<Vec<u8>>) -> Self {
        Self::default().with_destination(destination).with_data(data)
    }

    pub fn with_destination(mut self, destination: Address) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Maximum hops; 0 uses the network maximum.
    pub fn with_radius(mut self, radius: u8) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_options(mut self, options: u8) -> Self {
        self.options = options;
        self
    }

    pub fn with_frame_id(mut self, frame_id: u8) -> Self {
        self.frame_id = frame_id;
        self
    }
}

impl BuildFrame for TxBuilder {
    fn frame_id(&self) -> u8 {
        self.frame_id
    }

    fn set_frame_id(&mut self, frame_id: u8) {
        self.frame_id = frame_id;
    }

    fn build(&self) -> Result<Frame> {
        let destination = self.destination.ok_or_else(|| {
            FrameError::Format("transmit frame requires a destination address".to_string())
        })?;
        let mut buf = FrameBuffer::new(kind::TX);
        buf.put_u8(self.frame_id)
            .put_address(&destination)
            .put_u8(self.radius)
            .put_u8(self.options)
            .put_slice(&self.data);
        buf.finish()
    }
}

/// Any outbound request builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    At(AtBuilder),
    RemoteAt(RemoteAtBuilder),
    Tx(TxBuilder),
}

impl BuildFrame for Outbound {
    fn frame_id(&self) -> u8 {
        match self {
            Outbound::At(b) => b.frame_id(),
            Outbound::RemoteAt(b) => b.frame_id(),
            Outbound::Tx(b) => b.frame_id(),
        }
    }

    fn set_frame_id(&mut self, frame_id: u8) {
        match self {
            Outbound::At(b) => b.set_frame_id(frame_id),
            Outbound::RemoteAt(b) => b.set_frame_id(frame_id),
            Outbound::Tx(b) => b.set_frame_id(frame_id),
        }
    }

    fn build(&self) -> Result<Frame> {
        match self {
            Outbound::At(b) => b.build(),
            Outbound::RemoteAt(b) => b.build(),
            Outbound::Tx(b) => b.build(),
        }
    }
}

impl From<AtBuilder> for Outbound {
    fn from(builder: AtBuilder) -> Self {
        Outbound::At(builder)
    }
}

impl From<RemoteAtBuilder> for Outbound {
    fn from(builder: RemoteAtBuilder) -> Self {
        Outbound::RemoteAt(builder)
    }
}

impl From<TxBuilder> for Outbound {
    fn from(builder: TxBuilder) -> Self {
        Outbound::Tx(builder)
    }
}
