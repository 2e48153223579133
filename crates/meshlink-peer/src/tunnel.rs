use std::io::{self, Read, Write};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use meshlink_frame::{Address, BuildFrame, Frame, FrameKind, TxBuilder};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{PeerError, Result};
use crate::listener::{FrameListener, Interest, ListenerId};
use crate::ring::RingBuffer;

/// Largest data payload a single transmit request may carry.
pub const MAX_TUNNEL_PACKET: usize = 255;

/// Tunnel configuration.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Bytes per outbound packet. A full packet is sent immediately.
    pub max_packet: usize,
    /// Unread inbound bytes kept before the oldest are dropped.
    pub buffer_capacity: usize,
    /// How long a read waits for data. `None` waits until data or close.
    pub read_timeout: Option<Duration>,
    /// Transmit hop limit; 0 lets the radio pick.
    pub radius: u8,
    /// Transmit option bits.
    pub options: u8,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            max_packet: 64,
            buffer_capacity: 4096,
            read_timeout: None,
            radius: 0,
            options: 0,
        }
    }
}

impl TunnelConfig {
    fn validate(&self) -> Result<()> {
        if self.max_packet == 0 || self.max_packet > MAX_TUNNEL_PACKET {
            return Err(PeerError::InvalidConfig(format!(
                "max_packet must be between 1 and {MAX_TUNNEL_PACKET}, got {}",
                self.max_packet
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(PeerError::InvalidConfig(
                "buffer_capacity must be non-zero".to_string(),
            ));
        }
        if self.read_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(PeerError::InvalidConfig(
                "read_timeout must be non-zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

struct InboundState {
    ring: RingBuffer,
    closed: bool,
}

/// Receive side of a tunnel, fed by the decode thread.
struct Inbound {
    peer: Address,
    state: Mutex<InboundState>,
    readable: Condvar,
}

impl Inbound {
    fn lock(&self) -> MutexGuard<'_, InboundState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameListener for Inbound {
    fn on_frame(&self, frame: &Frame) {
        let Some(rx) = frame.rx() else {
            return;
        };
        if rx.source != self.peer || rx.data.is_empty() {
            return;
        }
        let dropped = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.ring.push(&rx.data)
        };
        if dropped > 0 {
            warn!(peer = %self.peer, dropped, "tunnel buffer full, dropped oldest bytes");
        }
        self.readable.notify_all();
    }

    fn on_close(&self) {
        self.lock().closed = true;
        self.readable.notify_all();
    }
}

/// A byte stream to one peer, carried in radio data packets.
///
/// Inbound data packets from the peer are buffered for readers; writes are
/// cut into packets of at most `max_packet` bytes. Delivery is not
/// acknowledged: packets are sent with frame id 0, so the radio reports no
/// transmit status.
///
/// `Read` and `Write` are implemented for `&Tunnel` as well, so one thread
/// can block in a read while another writes or closes.
pub struct Tunnel {
    conn: Arc<Connection>,
    inbound: Arc<Inbound>,
    listener: ListenerId,
    outbound: Mutex<Vec<u8>>,
    config: TunnelConfig,
    closed: AtomicBool,
}

impl Tunnel {
    pub(crate) fn open(conn: Arc<Connection>, peer: Address, config: TunnelConfig) -> Result<Self> {
        config.validate()?;
        if conn.is_closed() {
            return Err(PeerError::Closed);
        }

        let inbound = Arc::new(Inbound {
            peer,
            state: Mutex::new(InboundState {
                ring: RingBuffer::new(config.buffer_capacity),
                closed: false,
            }),
            readable: Condvar::new(),
        });
        let listener = conn.add_shared_listener(
            Interest::Kind(FrameKind::Rx),
            Arc::clone(&inbound) as Arc<dyn FrameListener>,
        );
        // The connection may have closed before the listener was in place.
        if conn.is_closed() {
            inbound.on_close();
        }

        info!(%peer, max_packet = config.max_packet, "tunnel opened");
        Ok(Self {
            conn,
            inbound,
            listener,
            outbound: Mutex::new(Vec::with_capacity(config.max_packet)),
            config,
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer(&self) -> Address {
        self.inbound.peer
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Inbound bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.inbound.lock().ring.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.conn.is_closed()
    }

    /// Flush pending output, stop receiving and wake blocked readers.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.conn.is_closed() {
            if let Err(err) = self.send_pending() {
                debug!(peer = %self.peer(), error = %err, "dropping unsent tunnel output");
            }
        }
        self.conn.remove_listener(self.listener);
        self.inbound.on_close();
        info!(peer = %self.peer(), "tunnel closed");
    }

    fn read_bytes(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = self.config.read_timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.inbound.lock();
        loop {
            if !state.ring.is_empty() {
                return Ok(state.ring.pop_into(buf));
            }
            if state.closed {
                return Ok(0);
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "tunnel read timed out",
                        ));
                    }
                    self.inbound
                        .readable
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inbound
                    .readable
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn write_bytes(&self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        let mut pending = lock(&self.outbound);
        write_packets(&mut pending, buf, self.config.max_packet, |packet| {
            self.send_packet(packet)
        })
    }

    fn flush_bytes(&self) -> io::Result<()> {
        self.ensure_open()?;
        self.send_pending().map_err(io::Error::from)
    }

    fn send_pending(&self) -> Result<()> {
        let packet = mem::take(&mut *lock(&self.outbound));
        if packet.is_empty() {
            return Ok(());
        }
        self.send_packet(&packet)
    }

    fn send_packet(&self, packet: &[u8]) -> Result<()> {
        let len = packet.len();
        let frame = TxBuilder::new(self.peer(), packet.to_vec())
            .with_frame_id(0)
            .with_radius(self.config.radius)
            .with_options(self.config.options)
            .build()?;
        self.conn.send_frames(&[frame])?;
        debug!(peer = %self.peer(), len, "tunnel packet sent");
        Ok(())
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "tunnel closed"));
        }
        Ok(())
    }
}

impl Read for &Tunnel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bytes(buf)
    }
}

impl Write for &Tunnel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_bytes()
    }
}

impl Read for Tunnel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bytes(buf)
    }
}

impl Write for Tunnel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_bytes()
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("peer", &self.peer())
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Append `buf` to `pending`, sending each packet as it fills.
///
/// Returns how many bytes of `buf` were accepted. When a send fails, the
/// bytes `buf` put into that packet are taken back out and not counted;
/// bytes left over from earlier writes stay pending. The error surfaces only
/// if nothing was accepted.
fn write_packets(
    pending: &mut Vec<u8>,
    buf: &[u8],
    max_packet: usize,
    mut send: impl FnMut(&[u8]) -> Result<()>,
) -> io::Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        let take = (max_packet - pending.len()).min(buf.len() - written);
        pending.extend_from_slice(&buf[written..written + take]);
        if pending.len() == max_packet {
            if let Err(err) = send(pending.as_slice()) {
                pending.truncate(max_packet - take);
                if written > 0 {
                    return Ok(written);
                }
                return Err(err.into());
            }
            pending.clear();
        }
        written += take;
    }
    Ok(written)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
