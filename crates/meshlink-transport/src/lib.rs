//! Duplex byte channel abstraction for API-mode mesh radios.
//!
//! The radio is attached over a serial line that carries escaped API frames
//! in both directions. Everything above this layer talks to a
//! [`ByteChannel`] and never to a concrete port:
//! - [`SerialChannel`]: a termios tty with optional RTS/CTS flow control
//! - [`SocketChannel`]: a connected Unix socket, used for radio bridges and
//!   simulators
//!
//! This is the lowest layer of meshlink.

pub mod error;
pub mod flow;
pub mod traits;

#[cfg(unix)]
pub mod serial;
#[cfg(unix)]
pub mod socket;

pub use error::{Result, TransportError};
pub use flow::FlowControl;
pub use traits::ByteChannel;

#[cfg(unix)]
pub use serial::{SerialChannel, SerialConfig};
#[cfg(unix)]
pub use socket::SocketChannel;
