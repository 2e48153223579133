use std::fmt;

use meshlink_frame::Address;
use serde::{Deserialize, Serialize};

/// A radio on the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub address: Address,
    /// Node-identifier string (`NI`).
    pub id: String,
    /// True for the radio attached to this connection.
    pub local: bool,
}

impl Node {
    pub fn new(address: Address, id: impl Into<String>, local: bool) -> Self {
        Self {
            address,
            id: id.into(),
            local,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = if self.id.is_empty() { "-" } else { &self.id };
        write!(f, "{id} [{}]", self.address)?;
        if self.local {
            f.write_str(" (local)")?;
        }
        Ok(())
    }
}
