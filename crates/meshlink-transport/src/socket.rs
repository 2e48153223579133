use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::flow::FlowControl;
use crate::traits::ByteChannel;

const DRAIN_CHUNK_SIZE: usize = 1024;

/// A radio channel carried over a connected Unix socket.
///
/// Used for serial-to-socket bridges and for radio simulators. Sockets have
/// no RTS/CTS lines, so the flow-control mask is recorded (and visible to
/// every clone) but has no effect on the byte stream.
pub struct SocketChannel {
    stream: UnixStream,
    flow: Arc<AtomicU8>,
}

impl SocketChannel {
    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            stream,
            flow: Arc::new(AtomicU8::new(FlowControl::NONE.bits())),
        }
    }

    /// Connect to a radio bridge listening on `path`.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected to radio socket");
        Ok(Self::from_stream(stream))
    }

    /// Create a connected pair of channels.
    ///
    /// One end is handed to the connection, the other plays the radio.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_stream(left), Self::from_stream(right)))
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &UnixStream {
        &self.stream
    }

    /// Consume the channel and return the underlying stream.
    pub fn into_inner(self) -> UnixStream {
        self.stream
    }
}

impl Read for SocketChannel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for SocketChannel {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl ByteChannel for SocketChannel {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout).map_err(Into::into)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_write_timeout(timeout).map_err(Into::into)
    }

    fn set_flow_control(&self, mask: FlowControl) -> Result<()> {
        self.flow.store(mask.bits(), Ordering::SeqCst);
        Ok(())
    }

    fn flow_control(&self) -> FlowControl {
        FlowControl::from_bits_truncate(self.flow.load(Ordering::SeqCst))
    }

    fn drain_input(&mut self) -> Result<usize> {
        self.stream.set_nonblocking(true)?;
        let mut drained = 0usize;
        let mut chunk = [0u8; DRAIN_CHUNK_SIZE];
        let outcome = loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break Ok(()),
                Ok(n) => drained += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.stream.set_nonblocking(false)?;
        outcome?;
        if drained > 0 {
            debug!(drained, "discarded stale input");
        }
        Ok(drained)
    }

    fn try_clone_channel(&self) -> Result<Box<dyn ByteChannel>> {
        let stream = self.stream.try_clone()?;
        Ok(Box::new(SocketChannel {
            stream,
            flow: Arc::clone(&self.flow),
        }))
    }

    fn shutdown(&self) -> Result<()> {
        match self.stream.shutdown(std::net::Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already disconnected by the other side.
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for SocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketChannel")
            .field("flow", &self.flow_control())
            .finish()
    }
}
