use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use meshlink_transport::ByteChannel;

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::escape::{escape_into, START};
use crate::frame::Frame;
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes complete frames to any `Write` stream.
///
/// The start marker goes out raw; every following byte is escaped.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_frames(std::slice::from_ref(frame))
    }

    /// Write several frames back to back with a single flush.
    pub fn write_frames(&mut self, frames: &[Frame]) -> Result<()> {
        self.buf.clear();
        for frame in frames {
            if frame.len() > self.config.max_frame_size {
                return Err(FrameError::FrameTooLarge {
                    size: frame.len(),
                    max: self.config.max_frame_size,
                });
            }
            self.buf.put_u8(START);
            escape_into(&frame.as_bytes()[1..], &mut self.buf);
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if self.should_retry(&err) => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if self.should_retry(&err) => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// `WouldBlock` under a write timeout means the timeout expired.
    fn should_retry(&self, err: &std::io::Error) -> bool {
        match err.kind() {
            ErrorKind::Interrupted => true,
            ErrorKind::WouldBlock => self.config.write_timeout.is_none(),
            _ => false,
        }
    }
}

impl<T: ByteChannel> FrameWriter<T> {
    /// Create a frame writer for a radio channel and apply the write timeout
    /// from config.
    pub fn with_config_channel(inner: T, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::address::Address;
    use crate::builder::{AtBuilder, BuildFrame, TxBuilder};
    use crate::codec::{decode_frame, MAX_FRAME_SIZE};
    use crate::escape::{ESCAPE, XOFF, XON};

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn writes_reference_bytes() {
        let frame = AtBuilder::new("NI").with_frame_id(1).build().unwrap();
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.write_frame(&frame).unwrap();

        assert_eq!(
            written(writer),
            vec![0x7E, 0x00, 0x04, 0x08, 0x01, 0x4E, 0x49, 0x5F]
        );
    }

    #[test]
    fn escapes_everything_after_start() {
        let frame = TxBuilder::new(Address::BROADCAST, vec![START, ESCAPE, XON, XOFF])
            .with_frame_id(1)
            .build()
            .unwrap();
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.write_frame(&frame).unwrap();

        let bytes = written(writer);
        assert_eq!(bytes[0], START);
        for &b in &bytes[1..] {
            assert!(![START, XON, XOFF].contains(&b), "raw {b:#04x} on the wire");
        }

        let mut wire = BytesMut::from(bytes.as_slice());
        assert_eq!(decode_frame(&mut wire, MAX_FRAME_SIZE).unwrap().unwrap(), frame);
    }

    #[test]
    fn batches_frames_with_one_flush() {
        let sink = FlushCountingWriter::default();
        let flushes = Arc::clone(&sink.flushes);
        let mut writer = FrameWriter::new(sink);

        let frames: Vec<Frame> = ["AP", "D6", "D7"]
            .iter()
            .enumerate()
            .map(|(i, cmd)| AtBuilder::new(*cmd).with_frame_id(i as u8 + 1).build().unwrap())
            .collect();
        writer.write_frames(&frames).unwrap();

        assert_eq!(flushes.load(Ordering::SeqCst), 1);
        let mut wire = BytesMut::from(writer.get_ref().data.as_slice());
        for frame in &frames {
            assert_eq!(&decode_frame(&mut wire, MAX_FRAME_SIZE).unwrap().unwrap(), frame);
        }
    }

    #[test]
    fn rejects_frame_above_configured_max() {
        let config = FrameConfig {
            max_frame_size: 8,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::new()), config);
        let frame = TxBuilder::new(Address::BROADCAST, b"too long".to_vec())
            .build()
            .unwrap();

        let err = writer.write_frame(&frame).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { max: 8, .. }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn handles_interrupted_and_would_block() {
        let frame = AtBuilder::new("SH").with_frame_id(2).build().unwrap();
        let mut writer = FrameWriter::new(FlakyWriter::default());
        writer.write_frame(&frame).unwrap();

        let mut wire = BytesMut::from(writer.into_inner().data.as_slice());
        assert_eq!(decode_frame(&mut wire, MAX_FRAME_SIZE).unwrap().unwrap(), frame);
    }

    #[test]
    fn would_block_under_write_timeout_is_a_timeout() {
        let frame = AtBuilder::new("SH").with_frame_id(2).build().unwrap();
        let config = FrameConfig {
            write_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(BlockedWriter, config);
        let err = writer.write_frame(&frame).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let frame = AtBuilder::new("SH").build().unwrap();
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.write_frame(&frame).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[derive(Default)]
    struct FlushCountingWriter {
        flushes: Arc<std::sync::atomic::AtomicUsize>,
        data: Vec<u8>,
    }

    impl Write for FlushCountingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlakyWriter {
        calls: usize,
        flush_failed: AtomicBool,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            match self.calls {
                1 => Err(std::io::Error::from(ErrorKind::Interrupted)),
                2 => Err(std::io::Error::from(ErrorKind::WouldBlock)),
                _ => {
                    // Accept at most two bytes per call.
                    let n = buf.len().min(2);
                    self.data.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_failed.swap(true, Ordering::SeqCst) {
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct BlockedWriter;

    impl Write for BlockedWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
