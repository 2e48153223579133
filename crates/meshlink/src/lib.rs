//! Protocol stack for mesh radios running in escaped API mode.
//!
//! meshlink frames the radio's serial byte stream into typed messages,
//! manages the session with the attached radio, discovers nodes on the mesh
//! and carries point-to-point byte streams over radio data packets.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte channels to the radio (serial tty, Unix sockets)
//! - [`frame`]: Escaped, checksummed API frame codec and builders
//! - [`peer`]: Radio sessions, node discovery and tunnels

/// Re-export transport types.
pub mod transport {
    pub use meshlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use meshlink_frame::*;
}

/// Re-export session, discovery and tunnel types.
pub mod peer {
    pub use meshlink_peer::*;
}
