use std::fmt;
use std::time::Duration;

use meshlink_frame::{AtBuilder, AtCommand, AtResponseFrame, BuildFrame, API_MODE_ESCAPED};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{PeerError, Result};

/// Frame ids reserved for the handshake. Nothing else is in flight while
/// the handshake runs.
pub const HANDSHAKE_AP_ID: u8 = 0xFD;
pub const HANDSHAKE_D6_ID: u8 = 0xFE;
pub const HANDSHAKE_D7_ID: u8 = 0xFF;

/// Progress of the session handshake.
///
/// Bits only ever get set while the connection is open; closing clears all
/// of them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionState(u8);

impl SessionState {
    pub const NEW: Self = Self(0);
    /// The radio reported escaped API mode.
    pub const HANDSHAKE_CHECKED: Self = Self(1 << 0);
    /// Inbound (RTS) hardware flow control is enabled on the radio.
    pub const FLOW_IN_ENABLED: Self = Self(1 << 1);
    /// Outbound (CTS) hardware flow control is enabled on the radio.
    pub const FLOW_OUT_ENABLED: Self = Self(1 << 2);

    const ALL: u8 = 0b111;

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Every handshake step has completed.
    pub const fn is_established(self) -> bool {
        self.0 == Self::ALL
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionState({self})")
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("new");
        }
        let names = [
            (Self::HANDSHAKE_CHECKED, "handshake-checked"),
            (Self::FLOW_IN_ENABLED, "flow-in"),
            (Self::FLOW_OUT_ENABLED, "flow-out"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

struct Step {
    id: u8,
    command: AtCommand,
    value: Option<u8>,
    reached: SessionState,
}

const STEPS: [Step; 3] = [
    Step {
        id: HANDSHAKE_AP_ID,
        command: AtCommand::AP,
        value: None,
        reached: SessionState::HANDSHAKE_CHECKED,
    },
    Step {
        id: HANDSHAKE_D6_ID,
        command: AtCommand::D6,
        value: Some(1),
        reached: SessionState::FLOW_IN_ENABLED,
    },
    Step {
        id: HANDSHAKE_D7_ID,
        command: AtCommand::D7,
        value: Some(1),
        reached: SessionState::FLOW_OUT_ENABLED,
    },
];

/// Run the three handshake steps over an open connection.
///
/// Any failure is reported as a single [`PeerError::HandshakeFailed`]
/// naming the step; the caller tears the connection down.
pub(crate) fn perform(conn: &Connection, timeout: Duration) -> Result<()> {
    for step in &STEPS {
        let response = exchange(conn, step, timeout)
            .map_err(|err| PeerError::HandshakeFailed(format!("{}: {err}", step.command)))?;

        if step.command == AtCommand::AP && response.value[..] != [API_MODE_ESCAPED] {
            return Err(PeerError::HandshakeFailed(format!(
                "radio is not in escaped API mode (AP={:02X?}, expected {API_MODE_ESCAPED})",
                response.value.as_ref()
            )));
        }

        conn.advance_state(step.reached);
        debug!(command = %step.command, state = %conn.session_state(), "handshake step complete");
    }
    Ok(())
}

fn exchange(conn: &Connection, step: &Step, timeout: Duration) -> Result<AtResponseFrame> {
    let mut builder = AtBuilder::from_command(step.command).with_frame_id(step.id);
    if let Some(value) = step.value {
        builder = builder.with_value([value]);
    }
    let request = builder.build()?;

    let responses = conn.transact(timeout, &[request])?;
    let response = responses
        .first()
        .and_then(|frame| frame.at_response())
        .cloned()
        .ok_or(if conn.is_closed() {
            PeerError::Closed
        } else {
            PeerError::Timeout(timeout)
        })?;

    if !response.status.is_ok() {
        return Err(PeerError::AtStatus {
            command: step.command,
            status: response.status,
        });
    }
    Ok(response)
}
