//! Session layer for API-mode mesh radios.
//!
//! Open a [`Connection`] on a byte channel, then exchange frames with the
//! attached radio, look up nodes through a [`NodeDirectory`] and carry byte
//! streams to a peer over a [`Tunnel`].

pub mod connection;
pub mod discovery;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod node;
pub mod tunnel;

mod history;
mod ids;
mod ring;

#[cfg(test)]
mod testing;

pub use connection::{Connection, ConnectionConfig};
pub use discovery::{DiscoveryConfig, NodeDirectory, MIN_DISCOVERY_WINDOW};
pub use error::{PeerError, Result};
pub use handshake::{SessionState, HANDSHAKE_AP_ID, HANDSHAKE_D6_ID, HANDSHAKE_D7_ID};
pub use listener::{FrameListener, Interest, ListenerId};
pub use node::Node;
pub use tunnel::{Tunnel, TunnelConfig, MAX_TUNNEL_PACKET};
