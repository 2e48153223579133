use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use meshlink_transport::{ByteChannel, TransportError};

use crate::codec::{decode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::frame::Frame;

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 256;

/// Running counters kept by a [`FrameReader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Frames decoded successfully.
    pub frames: u64,
    /// Bytes thrown away while searching for a start marker or after an
    /// interrupted frame.
    pub skipped_bytes: u64,
    /// Frames rejected for bad length, checksum or layout.
    pub rejected_frames: u64,
}

impl DecodeStats {
    fn record_error(&mut self, err: &FrameError) {
        match err {
            FrameError::Desync { skipped } => self.skipped_bytes += *skipped as u64,
            FrameError::Interrupted { discarded } => {
                self.skipped_bytes += *discarded as u64;
                self.rejected_frames += 1;
            }
            err if err.is_recoverable() => self.rejected_frames += 1,
            _ => {}
        }
    }
}

/// Reads complete frames from any `Read` stream of escaped wire bytes.
///
/// Handles partial reads internally. Unconsumed bytes are kept across calls,
/// so a read timeout never loses a partially received frame. Framing errors
/// are returned once and the reader resumes at the next start marker.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    stats: DecodeStats,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            stats: DecodeStats::default(),
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match decode_frame(&mut self.buf, self.config.max_frame_size) {
                Ok(Some(frame)) => {
                    self.stats.frames += 1;
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(err) => {
                    self.stats.record_error(&err);
                    return Err(err);
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Escaped bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Counters since the reader was created.
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Drop any partially received frame.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame size for subsequent decoding.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: ByteChannel> FrameReader<T> {
    /// Create a frame reader for a radio channel and apply the read timeout
    /// from config.
    pub fn with_config_channel(inner: T, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) => FrameError::Io(io),
        TransportError::Open { source, .. } | TransportError::Configure { source, .. } => {
            FrameError::Io(source)
        }
        TransportError::Shutdown => FrameError::ConnectionClosed,
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
