//! Hardware flow-control mask.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// RTS/CTS hardware flow-control selection.
///
/// `IN` lets the host hold off the radio (host drives RTS), `OUT` lets the
/// radio hold off the host (radio drives CTS). The two bits combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FlowControl(u8);

impl FlowControl {
    /// No hardware flow control.
    pub const NONE: FlowControl = FlowControl(0);
    /// Inbound (RTS) flow control.
    pub const RTS_CTS_IN: FlowControl = FlowControl(0b01);
    /// Outbound (CTS) flow control.
    pub const RTS_CTS_OUT: FlowControl = FlowControl(0b10);

    /// Raw mask bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw mask bits, ignoring unknown bits.
    pub fn from_bits_truncate(bits: u8) -> Self {
        FlowControl(bits & 0b11)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every bit of `other` is set in `self`.
    pub fn contains(self, other: FlowControl) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FlowControl {
    type Output = FlowControl;

    fn bitor(self, rhs: FlowControl) -> FlowControl {
        FlowControl(self.0 | rhs.0)
    }
}

impl BitOrAssign for FlowControl {
    fn bitor_assign(&mut self, rhs: FlowControl) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            self.contains(Self::RTS_CTS_IN),
            self.contains(Self::RTS_CTS_OUT),
        ) {
            (false, false) => f.write_str("none"),
            (true, false) => f.write_str("rts/cts-in"),
            (false, true) => f.write_str("rts/cts-out"),
            (true, true) => f.write_str("rts/cts-in+out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_and_contains() {
        let both = FlowControl::RTS_CTS_IN | FlowControl::RTS_CTS_OUT;
        assert!(both.contains(FlowControl::RTS_CTS_IN));
        assert!(both.contains(FlowControl::RTS_CTS_OUT));
        assert!(!FlowControl::RTS_CTS_IN.contains(FlowControl::RTS_CTS_OUT));
        assert!(FlowControl::NONE.is_empty());
        assert_eq!(both.bits(), 0b11);
    }

    #[test]
    fn truncates_unknown_bits() {
        assert_eq!(FlowControl::from_bits_truncate(0xFF).bits(), 0b11);
        assert_eq!(FlowControl::from_bits_truncate(0x04), FlowControl::NONE);
    }

    #[test]
    fn display_names() {
        assert_eq!(FlowControl::NONE.to_string(), "none");
        let mut mask = FlowControl::RTS_CTS_OUT;
        assert_eq!(mask.to_string(), "rts/cts-out");
        mask |= FlowControl::RTS_CTS_IN;
        assert_eq!(mask.to_string(), "rts/cts-in+out");
    }
}
