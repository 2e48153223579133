use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::flow::FlowControl;

/// A duplex byte stream to an attached radio.
///
/// Reads and writes block. A read that runs into the configured read timeout
/// fails with [`std::io::ErrorKind::TimedOut`] or
/// [`std::io::ErrorKind::WouldBlock`]; a read returning `0` means the channel
/// is closed.
///
/// Implementations must support [`try_clone_channel`](Self::try_clone_channel)
/// so the connection can read on a dedicated thread while callers write.
pub trait ByteChannel: Read + Write + Send + std::fmt::Debug {
    /// Set the read timeout. `None` blocks indefinitely.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Set the write timeout. `None` blocks indefinitely.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Apply a hardware flow-control mask to the line.
    fn set_flow_control(&self, mask: FlowControl) -> Result<()>;

    /// Currently applied flow-control mask.
    fn flow_control(&self) -> FlowControl;

    /// Discard any input already buffered on the channel.
    ///
    /// Returns the number of bytes discarded when the channel can tell.
    fn drain_input(&mut self) -> Result<usize>;

    /// Open another handle onto the same underlying channel.
    fn try_clone_channel(&self) -> Result<Box<dyn ByteChannel>>;

    /// Shut the channel down, unblocking readers on every handle.
    fn shutdown(&self) -> Result<()>;
}

impl<C: ByteChannel + ?Sized> ByteChannel for Box<C> {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        (**self).set_write_timeout(timeout)
    }

    fn set_flow_control(&self, mask: FlowControl) -> Result<()> {
        (**self).set_flow_control(mask)
    }

    fn flow_control(&self) -> FlowControl {
        (**self).flow_control()
    }

    fn drain_input(&mut self) -> Result<usize> {
        (**self).drain_input()
    }

    fn try_clone_channel(&self) -> Result<Box<dyn ByteChannel>> {
        (**self).try_clone_channel()
    }

    fn shutdown(&self) -> Result<()> {
        (**self).shutdown()
    }
}
