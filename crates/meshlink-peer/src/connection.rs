use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use meshlink_frame::{
    Address, AtBuilder, AtResponseFrame, BuildFrame, DecodeStats, Frame, FrameConfig, FrameError,
    FrameReader, FrameWriter, RemoteAtBuilder, RemoteAtResponseFrame, MAX_FRAME_SIZE,
};
use meshlink_transport::{ByteChannel, FlowControl};
use tracing::{debug, error, info, warn};

use crate::error::{PeerError, Result};
use crate::handshake::{self, SessionState};
use crate::history::ResponseHistory;
use crate::ids::FrameIdAllocator;
use crate::listener::{FrameListener, Interest, ListenerId, ListenerRegistry};
use crate::tunnel::{Tunnel, TunnelConfig};

const DECODE_THREAD_NAME: &str = "meshlink-decode";

/// Connection behavior configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long each handshake step waits for the radio. Zero waits forever.
    pub handshake_timeout: Duration,
    /// How often the decode thread wakes up to check for close.
    pub poll_interval: Duration,
    /// Write timeout applied to the channel.
    pub write_timeout: Option<Duration>,
    /// Number of recent responses kept for late waiters.
    pub history_depth: usize,
    /// Largest frame accepted or sent.
    pub max_frame_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(100),
            write_timeout: Some(Duration::from_secs(5)),
            history_depth: 64,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ConnectionConfig {
    fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(PeerError::InvalidConfig(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        if self.write_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(PeerError::InvalidConfig(
                "write_timeout must be non-zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// State shared between the connection handle and its decode thread.
struct Shared {
    writer: Mutex<FrameWriter<Box<dyn ByteChannel>>>,
    control: Mutex<Box<dyn ByteChannel>>,
    listeners: ListenerRegistry,
    ids: FrameIdAllocator,
    history: ResponseHistory,
    state: AtomicU8,
    closed: AtomicBool,
    stats: Mutex<DecodeStats>,
    config: ConnectionConfig,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark closed, stop the channel and wake every listener.
    ///
    /// Returns false if the connection was already closed.
    fn shut_down(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.state.store(SessionState::NEW.bits(), Ordering::SeqCst);
        if let Err(err) = lock(&self.control).shutdown() {
            debug!(error = %err, "channel shutdown failed");
        }
        self.listeners.close_all();
        true
    }
}

/// An open session with an API-mode radio.
///
/// Owns the byte channel and a dedicated decode thread that parses inbound
/// frames and dispatches them to listeners. Sends happen on the caller's
/// thread under a single send lock.
///
/// Opened connections are shared as `Arc<Connection>`; node directories and
/// tunnels keep a clone. Dropping the last clone closes the connection.
pub struct Connection {
    shared: Arc<Shared>,
    decoder: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Open a session with default configuration.
    pub fn open<C: ByteChannel + 'static>(channel: C) -> Result<Arc<Self>> {
        Self::open_with_config(channel, ConnectionConfig::default())
    }

    /// Open a session with explicit configuration.
    ///
    /// Discards stale input, starts the decode thread and runs the
    /// handshake. On failure the partially opened connection is closed.
    pub fn open_with_config<C: ByteChannel + 'static>(
        mut channel: C,
        config: ConnectionConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let drained = channel.drain_input()?;
        if drained > 0 {
            debug!(bytes = drained, "discarded stale input");
        }

        let reader_channel = channel.try_clone_channel()?;
        let control = channel.try_clone_channel()?;

        let frame_config = FrameConfig {
            max_frame_size: config.max_frame_size,
            read_timeout: Some(config.poll_interval),
            write_timeout: config.write_timeout,
        };
        let reader = FrameReader::with_config_channel(reader_channel, frame_config.clone())?;
        let writer_channel: Box<dyn ByteChannel> = Box::new(channel);
        let writer = FrameWriter::with_config_channel(writer_channel, frame_config)?;

        let shared = Arc::new(Shared {
            writer: Mutex::new(writer),
            control: Mutex::new(control),
            listeners: ListenerRegistry::new(),
            ids: FrameIdAllocator::new(),
            history: ResponseHistory::new(config.history_depth),
            state: AtomicU8::new(SessionState::NEW.bits()),
            closed: AtomicBool::new(false),
            stats: Mutex::new(DecodeStats::default()),
            config,
        });

        let decoder = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(DECODE_THREAD_NAME.to_string())
                .spawn(move || decode_loop(&shared, reader))
                .map_err(PeerError::Spawn)?
        };

        let conn = Arc::new(Self {
            shared,
            decoder: Mutex::new(Some(decoder)),
        });

        if let Err(err) = conn.establish() {
            conn.close();
            return Err(err);
        }
        Ok(conn)
    }

    fn establish(&self) -> Result<()> {
        handshake::perform(self, self.shared.config.handshake_timeout)?;
        lock(&self.shared.control).set_flow_control(FlowControl::RTS_CTS_OUT)?;
        info!(state = %self.session_state(), "radio session established");
        Ok(())
    }

    /// Write frames as one contiguous batch.
    ///
    /// A transport failure closes the connection.
    pub fn send_frames(&self, frames: &[Frame]) -> Result<()> {
        if self.is_closed() {
            return Err(PeerError::Closed);
        }

        let mut writer = lock(&self.shared.writer);
        for frame in frames {
            self.shared.history.record_sent(frame);
            debug!(
                kind = %frame.kind(),
                id = ?frame.frame_id(),
                len = frame.len(),
                "sending frame"
            );
        }
        match writer.write_frames(frames) {
            Ok(()) => Ok(()),
            Err(err @ FrameError::FrameTooLarge { .. }) => Err(err.into()),
            Err(err) if err.is_timeout() => Err(err.into()),
            Err(err) => {
                drop(writer);
                error!(error = %err, "failed to write to radio, closing connection");
                self.shared.shut_down();
                Err(err.into())
            }
        }
    }

    /// Stamp each builder with the next frame id, build and send them as one
    /// batch. Returns the frames as sent.
    pub fn send_with_id<I>(&self, builders: I) -> Result<Vec<Frame>>
    where
        I: IntoIterator,
        I::Item: BuildFrame,
    {
        let frames = self.stamp(builders)?;
        self.send_frames(&frames)?;
        Ok(frames)
    }

    /// Wait for responses to previously sent requests.
    ///
    /// Returns as soon as every request that can be answered has a
    /// response, or at the timeout with whatever matched. A zero timeout
    /// waits until the connection closes. Responses are in request order.
    pub fn wait_responses(&self, timeout: Duration, requests: &[Frame]) -> Vec<Frame> {
        self.collect(timeout, requests, false).unwrap_or_default()
    }

    /// Send requests with fresh frame ids and wait for their responses.
    pub fn request<I>(&self, timeout: Duration, builders: I) -> Result<Vec<Frame>>
    where
        I: IntoIterator,
        I::Item: BuildFrame,
    {
        let frames = self.stamp(builders)?;
        self.collect(timeout, &frames, true)
    }

    /// Send already built frames and wait for their responses.
    pub(crate) fn transact(&self, timeout: Duration, frames: &[Frame]) -> Result<Vec<Frame>> {
        self.collect(timeout, frames, true)
    }

    /// Run a local AT command and return its successful response.
    pub fn at(&self, builder: AtBuilder, timeout: Duration) -> Result<AtResponseFrame> {
        let response = self.single_response(timeout, builder)?;
        let view = response
            .at_response()
            .cloned()
            .ok_or(PeerError::Timeout(timeout))?;
        if !view.status.is_ok() {
            return Err(PeerError::AtStatus {
                command: view.command,
                status: view.status,
            });
        }
        Ok(view)
    }

    /// Run an AT command on another node and return its successful response.
    pub fn remote_at(
        &self,
        builder: RemoteAtBuilder,
        timeout: Duration,
    ) -> Result<RemoteAtResponseFrame> {
        let response = self.single_response(timeout, builder)?;
        let view = response
            .remote_at_response()
            .cloned()
            .ok_or(PeerError::Timeout(timeout))?;
        if !view.status.is_ok() {
            return Err(PeerError::AtStatus {
                command: view.command,
                status: view.status,
            });
        }
        Ok(view)
    }

    fn single_response<B: BuildFrame>(&self, timeout: Duration, builder: B) -> Result<Frame> {
        self.request(timeout, [builder])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                if self.is_closed() {
                    PeerError::Closed
                } else {
                    PeerError::Timeout(timeout)
                }
            })
    }

    /// Register a listener for inbound frames.
    pub fn add_listener(
        &self,
        interest: impl Into<Interest>,
        listener: impl FrameListener + 'static,
    ) -> ListenerId {
        self.shared.listeners.add(interest.into(), Arc::new(listener))
    }

    pub(crate) fn add_shared_listener(
        &self,
        interest: Interest,
        listener: Arc<dyn FrameListener>,
    ) -> ListenerId {
        self.shared.listeners.add(interest, listener)
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    /// Open a byte stream to `peer` with default tunnel settings.
    pub fn open_tunnel(self: &Arc<Self>, peer: Address) -> Result<Tunnel> {
        self.open_tunnel_with_config(peer, TunnelConfig::default())
    }

    pub fn open_tunnel_with_config(
        self: &Arc<Self>,
        peer: Address,
        config: TunnelConfig,
    ) -> Result<Tunnel> {
        Tunnel::open(Arc::clone(self), peer, config)
    }

    pub fn session_state(&self) -> SessionState {
        SessionState::from_bits_truncate(self.shared.state.load(Ordering::SeqCst))
    }

    pub(crate) fn advance_state(&self, reached: SessionState) {
        if !self.is_closed() {
            self.shared.state.fetch_or(reached.bits(), Ordering::SeqCst);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Flow-control mask currently applied to the channel.
    pub fn flow_control(&self) -> FlowControl {
        lock(&self.shared.control).flow_control()
    }

    /// Decoder counters.
    pub fn decode_stats(&self) -> DecodeStats {
        *lock(&self.shared.stats)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Close the connection. Idempotent.
    ///
    /// Stops the decode thread and wakes every blocked waiter before
    /// returning.
    pub fn close(&self) {
        let first = self.shared.shut_down();
        if let Some(handle) = lock(&self.decoder).take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("decode thread panicked");
            }
        }
        if first {
            info!("connection closed");
        }
    }

    /// Build frames with fresh ids without sending them.
    pub(crate) fn stamp<I>(&self, builders: I) -> Result<Vec<Frame>>
    where
        I: IntoIterator,
        I::Item: BuildFrame,
    {
        builders
            .into_iter()
            .map(|mut builder| {
                builder.set_frame_id(self.shared.ids.next_id());
                builder.build().map_err(PeerError::from)
            })
            .collect()
    }

    /// Register a collector, optionally send, then wait.
    ///
    /// The collector is registered before the send and before the history
    /// scan, so a response is seen whether it arrives before or after the
    /// wait starts.
    fn collect(&self, timeout: Duration, requests: &[Frame], send: bool) -> Result<Vec<Frame>> {
        let collector = Arc::new(ResponseCollector::new(requests));
        let id = self
            .shared
            .listeners
            .add(Interest::All, Arc::clone(&collector) as Arc<dyn FrameListener>);

        if send {
            if let Err(err) = self.send_frames(requests) {
                self.shared.listeners.remove(id);
                return Err(err);
            }
        }

        for request in requests {
            for response in self.shared.history.responses_to(request) {
                collector.on_frame(&response);
            }
        }
        if self.is_closed() {
            collector.on_close();
        }

        let responses = collector.wait(timeout);
        self.shared.listeners.remove(id);
        Ok(responses)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.session_state())
            .field("closed", &self.is_closed())
            .field("listeners", &self.shared.listeners.len())
            .finish()
    }
}

fn decode_loop(shared: &Shared, mut reader: FrameReader<Box<dyn ByteChannel>>) {
    debug!("decode thread started");
    while !shared.is_closed() {
        let result = reader.read_frame();
        *lock(&shared.stats) = reader.stats();

        match result {
            Ok(frame) => {
                debug!(
                    kind = %frame.kind(),
                    id = ?frame.frame_id(),
                    len = frame.len(),
                    "received frame"
                );
                shared.history.record_received(&frame);
                shared.listeners.dispatch(&frame);
            }
            Err(err) if err.is_timeout() => {}
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "discarding invalid frame data");
            }
            Err(FrameError::ConnectionClosed) => {
                if !shared.is_closed() {
                    info!("radio channel closed");
                }
                break;
            }
            Err(err) => {
                if !shared.is_closed() {
                    error!(error = %err, "radio channel failed");
                }
                break;
            }
        }
    }
    shared.shut_down();
    debug!("decode thread stopped");
}

/// Gathers responses for one wait call.
struct ResponseCollector {
    requests: Vec<Frame>,
    state: Mutex<CollectState>,
    changed: Condvar,
}

struct CollectState {
    responses: Vec<Option<Frame>>,
    closed: bool,
}

impl ResponseCollector {
    fn new(requests: &[Frame]) -> Self {
        Self {
            requests: requests.to_vec(),
            state: Mutex::new(CollectState {
                responses: vec![None; requests.len()],
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn is_complete(&self, state: &CollectState) -> bool {
        self.requests
            .iter()
            .zip(&state.responses)
            .all(|(request, response)| response.is_some() || !expects_response(request))
    }

    fn wait(&self, timeout: Duration) -> Vec<Frame> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        let mut state = lock(&self.state);
        while !state.closed && !self.is_complete(&state) {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    state = self
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                None => {
                    state = self
                        .changed
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        state.responses.iter().flatten().cloned().collect()
    }
}

impl FrameListener for ResponseCollector {
    fn on_frame(&self, frame: &Frame) {
        let mut state = lock(&self.state);
        let slot = self
            .requests
            .iter()
            .zip(state.responses.iter_mut())
            .find(|(request, response)| response.is_none() && frame.is_response_for(request));
        if let Some((_, response)) = slot {
            *response = Some(frame.clone());
            self.changed.notify_all();
        }
    }

    fn on_close(&self) {
        lock(&self.state).closed = true;
        self.changed.notify_all();
    }
}

/// Requests sent with frame id 0, and frames that are not requests, never
/// get a response.
fn expects_response(request: &Frame) -> bool {
    request.frame_id().is_some_and(|id| id != 0)
        && (request.at().is_some() || request.remote_at().is_some() || request.tx().is_some())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use meshlink_frame::{AtCommand, AtStatus, FrameKind, Outbound, TxBuilder};

    use super::*;
    use crate::testing::{rx_frame, test_config, FakeRadio, RadioProfile};

    #[test]
    fn open_runs_handshake_and_enables_flow_control() {
        let (conn, radio) = FakeRadio::connect(RadioProfile::default());

        assert!(conn.session_state().is_established());
        assert_eq!(conn.flow_control(), FlowControl::RTS_CTS_OUT);

        let handshake: Vec<(u8, AtCommand, Vec<u8>)> = radio
            .received_of(FrameKind::At)
            .iter()
            .filter_map(|frame| frame.at().cloned())
            .map(|at| (at.frame_id, at.command, at.value.to_vec()))
            .collect();
        assert_eq!(
            handshake,
            vec![
                (0xFD, AtCommand::AP, vec![]),
                (0xFE, AtCommand::D6, vec![1]),
                (0xFF, AtCommand::D7, vec![1]),
            ]
        );
    }

    #[test]
    fn open_fails_when_radio_is_not_in_escaped_mode() {
        let (channel, _radio) = FakeRadio::start(RadioProfile {
            api_mode: 1,
            ..RadioProfile::default()
        });
        let err = Connection::open_with_config(channel, test_config()).unwrap_err();
        match err {
            PeerError::HandshakeFailed(reason) => assert!(reason.contains("AP"), "{reason}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn open_fails_when_flow_control_is_refused() {
        let (channel, radio) = FakeRadio::start(RadioProfile {
            failing: vec![AtCommand::D7],
            ..RadioProfile::default()
        });
        let err = Connection::open_with_config(channel, test_config()).unwrap_err();
        match err {
            PeerError::HandshakeFailed(reason) => assert!(reason.starts_with("D7"), "{reason}"),
            other => panic!("unexpected error: {other:?}"),
        }
        // The partially opened connection shut the channel down.
        assert!(radio.wait_disconnected(Duration::from_secs(2)));
    }

    #[test]
    fn open_fails_when_radio_is_silent() {
        let (channel, _radio) = FakeRadio::start(RadioProfile {
            silent: vec![AtCommand::AP],
            ..RadioProfile::default()
        });
        let config = ConnectionConfig {
            handshake_timeout: Duration::from_millis(100),
            ..test_config()
        };
        let started = Instant::now();
        let err = Connection::open_with_config(channel, config).unwrap_err();
        assert!(matches!(err, PeerError::HandshakeFailed(_)));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let (channel, _radio) = FakeRadio::start(RadioProfile::default());
        let config = ConnectionConfig {
            poll_interval: Duration::ZERO,
            ..test_config()
        };
        assert!(matches!(
            Connection::open_with_config(channel, config),
            Err(PeerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn send_with_id_assigns_sequential_ids() {
        let (conn, _radio) = FakeRadio::connect(RadioProfile::default());
        let frames = conn
            .send_with_id([AtBuilder::new("SH"), AtBuilder::new("SL")])
            .unwrap();
        let ids: Vec<Option<u8>> = frames.iter().map(Frame::frame_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
    }

    #[test]
    fn request_returns_responses_in_request_order() {
        let (conn, _radio) = FakeRadio::connect(RadioProfile::default());
        let responses = conn
            .request(
                Duration::from_secs(2),
                [AtBuilder::new("SL"), AtBuilder::new("SH"), AtBuilder::new("NI")],
            )
            .unwrap();

        let commands: Vec<AtCommand> = responses
            .iter()
            .filter_map(|frame| frame.at_response())
            .map(|resp| resp.command)
            .collect();
        assert_eq!(commands, vec![AtCommand::SL, AtCommand::SH, AtCommand::NI]);
    }

    #[test]
    fn request_mixes_frame_kinds() {
        let pump = Address::from_serial(0x0013_A200_4000_0002).with_network(0x0042);
        let (conn, _radio) = FakeRadio::connect(RadioProfile {
            remotes: vec![(pump, "PUMP".to_string())],
            ..RadioProfile::default()
        });
        let responses = conn
            .request(
                Duration::from_secs(2),
                [
                    Outbound::from(AtBuilder::new("MY")),
                    Outbound::from(RemoteAtBuilder::new(pump, "NI")),
                    Outbound::from(TxBuilder::new(pump, b"ping".to_vec())),
                ],
            )
            .unwrap();

        let kinds: Vec<FrameKind> = responses.iter().map(Frame::kind).collect();
        assert_eq!(
            kinds,
            vec![FrameKind::AtResponse, FrameKind::RemoteAtResponse, FrameKind::TxStatus]
        );
        let remote = responses[1].remote_at_response().unwrap();
        assert_eq!(remote.value.as_ref(), b"PUMP");
    }

    #[test]
    fn wait_responses_times_out_with_nothing() {
        let (conn, _radio) = FakeRadio::connect(RadioProfile {
            silent: vec![AtCommand::NI],
            ..RadioProfile::default()
        });
        let sent = conn.send_with_id([AtBuilder::new("NI")]).unwrap();

        let started = Instant::now();
        let responses = conn.wait_responses(Duration::from_millis(300), &sent);
        assert!(responses.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn wait_returns_partial_subset_at_timeout() {
        let (conn, _radio) = FakeRadio::connect(RadioProfile {
            silent: vec![AtCommand::MY],
            ..RadioProfile::default()
        });
        let responses = conn
            .request(
                Duration::from_millis(200),
                [AtBuilder::new("MY"), AtBuilder::new("SH")],
            )
            .unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].at_response().unwrap().command, AtCommand::SH);
    }

    #[test]
    fn wait_sees_response_that_arrived_first() {
        let (conn, radio) = FakeRadio::connect(RadioProfile::default());
        let sent = conn.send_with_id([AtBuilder::new("NI")]).unwrap();
        assert!(radio.wait_received(|frames| frames.len() >= 4, Duration::from_secs(2)));
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        let responses = conn.wait_responses(Duration::from_secs(5), &sent);
        assert_eq!(responses.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn fire_and_forget_requests_do_not_wait() {
        let (conn, _radio) = FakeRadio::connect(RadioProfile::default());
        let frame = TxBuilder::new(Address::BROADCAST, b"hi".to_vec())
            .with_frame_id(0)
            .build()
            .unwrap();
        conn.send_frames(std::slice::from_ref(&frame)).unwrap();

        let started = Instant::now();
        assert!(conn.wait_responses(Duration::from_secs(5), &[frame]).is_empty());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn at_helper_surfaces_error_status() {
        let (conn, _radio) = FakeRadio::connect(RadioProfile {
            failing: vec![AtCommand::NI],
            ..RadioProfile::default()
        });
        let err = conn
            .at(AtBuilder::new("NI"), Duration::from_secs(2))
            .unwrap_err();
        assert!(matches!(
            err,
            PeerError::AtStatus {
                command: AtCommand::NI,
                status: AtStatus::Error,
            }
        ));
    }

    #[test]
    fn remote_at_helper_returns_remote_value() {
        let remote = Address::from_serial(0x0013_A200_4000_0002);
        let (conn, _radio) = FakeRadio::connect(RadioProfile {
            remotes: vec![(remote, "PUMP".to_string())],
            ..RadioProfile::default()
        });
        let response = conn
            .remote_at(RemoteAtBuilder::new(remote, "NI"), Duration::from_secs(2))
            .unwrap();
        assert_eq!(response.source, remote);
        assert_eq!(response.value.as_ref(), b"PUMP");
    }

    #[test]
    fn listeners_receive_frames_in_wire_order() {
        let (conn, radio) = FakeRadio::connect(RadioProfile::default());
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        conn.add_listener(FrameKind::Rx, move |frame: &Frame| {
            let data = frame.rx().map(|rx| rx.data.to_vec()).unwrap_or_default();
            let _ = tx.lock().unwrap().send(data);
        });

        let source = Address::from_serial(7);
        for i in 0..5u8 {
            radio.inject(&rx_frame(source, &[i]));
        }

        let received: Vec<Vec<u8>> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(received, (0..5u8).map(|i| vec![i]).collect::<Vec<_>>());
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let (conn, radio) = FakeRadio::connect(RadioProfile::default());
        let (tx, rx) = mpsc::channel::<()>();
        let tx = Mutex::new(tx);
        let id = conn.add_listener(FrameKind::Rx, move |_: &Frame| {
            let _ = tx.lock().unwrap().send(());
        });

        radio.inject(&rx_frame(Address::from_serial(1), b"a"));
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        assert!(conn.remove_listener(id));
        radio.inject(&rx_frame(Address::from_serial(1), b"b"));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn decoder_skips_garbage_between_frames() {
        let (conn, radio) = FakeRadio::connect(RadioProfile::default());
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        conn.add_listener(FrameKind::Rx, move |frame: &Frame| {
            let _ = tx.lock().unwrap().send(frame.clone());
        });

        radio.write_raw(&[0x00, 0x01, 0x02]);
        let frame = rx_frame(Address::from_serial(9), b"ok");
        radio.inject(&frame);

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), frame);
        assert!(conn.decode_stats().skipped_bytes >= 3);
    }

    #[test]
    fn close_wakes_indefinite_waiter() {
        let (conn, _radio) = FakeRadio::connect(RadioProfile {
            silent: vec![AtCommand::NI],
            ..RadioProfile::default()
        });
        let sent = conn.send_with_id([AtBuilder::new("NI")]).unwrap();

        let waiter = {
            let conn = Arc::clone(&conn);
            std::thread::spawn(move || conn.wait_responses(Duration::ZERO, &sent))
        };
        std::thread::sleep(Duration::from_millis(100));
        conn.close();

        assert!(waiter.join().unwrap().is_empty());
    }

    #[test]
    fn close_is_idempotent_and_resets_state() {
        let (conn, _radio) = FakeRadio::connect(RadioProfile::default());
        conn.close();
        conn.close();

        assert!(conn.is_closed());
        assert_eq!(conn.session_state(), SessionState::NEW);
        assert!(matches!(
            conn.send_with_id([AtBuilder::new("NI")]),
            Err(PeerError::Closed)
        ));
    }

    #[test]
    fn radio_disconnect_closes_connection() {
        let (conn, radio) = FakeRadio::connect(RadioProfile::default());
        let (tx, rx) = mpsc::channel::<()>();
        struct CloseSignal(Mutex<mpsc::Sender<()>>);
        impl FrameListener for CloseSignal {
            fn on_frame(&self, _frame: &Frame) {}
            fn on_close(&self) {
                let _ = self.0.lock().unwrap().send(());
            }
        }
        conn.add_listener(Interest::All, CloseSignal(Mutex::new(tx)));

        drop(radio);

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(conn.is_closed());
        assert!(matches!(
            conn.send_frames(&[AtBuilder::new("NI").build().unwrap()]),
            Err(PeerError::Closed)
        ));
    }
}
