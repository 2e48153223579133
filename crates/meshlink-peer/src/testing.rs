//! Scripted radio used by the unit tests.
//!
//! The fake radio sits on the far end of a socket pair, decodes whatever the
//! connection sends and answers the way an attached radio in escaped API
//! mode would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use meshlink_frame::{
    kind, Address, AtCommand, AtFrame, AtStatus, Frame, FrameBuffer, FrameKind, FrameReader,
    FrameWriter, RemoteAtFrame, TxFrame,
};
use meshlink_transport::{ByteChannel, SocketChannel};

use crate::connection::{Connection, ConnectionConfig};

/// How the fake radio identifies itself and misbehaves.
#[derive(Debug, Clone)]
pub(crate) struct RadioProfile {
    pub api_mode: u8,
    pub serial: u64,
    pub network: u16,
    pub node_id: String,
    /// Nodes reachable over the air, with their node-id strings.
    pub remotes: Vec<(Address, String)>,
    /// Local AT commands the radio never answers.
    pub silent: Vec<AtCommand>,
    /// Local AT commands answered with an error status.
    pub failing: Vec<AtCommand>,
}

impl Default for RadioProfile {
    fn default() -> Self {
        Self {
            api_mode: 2,
            serial: 0x0013_A200_40A1_B2C3,
            network: 0x1234,
            node_id: "LOCAL".to_string(),
            remotes: Vec::new(),
            silent: Vec::new(),
            failing: Vec::new(),
        }
    }
}

struct Received {
    frames: Mutex<Vec<Frame>>,
    changed: Condvar,
    disconnected: AtomicBool,
}

pub(crate) struct FakeRadio {
    writer: Arc<Mutex<FrameWriter<Box<dyn ByteChannel>>>>,
    control: Box<dyn ByteChannel>,
    received: Arc<Received>,
    thread: Option<JoinHandle<()>>,
}

/// Connection settings that keep tests fast.
pub(crate) fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        handshake_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(20),
        ..ConnectionConfig::default()
    }
}

impl FakeRadio {
    /// Start a radio and return the channel the connection should use.
    pub(crate) fn start(profile: RadioProfile) -> (SocketChannel, FakeRadio) {
        let (host, radio) = SocketChannel::pair().unwrap();
        let control = radio.try_clone_channel().unwrap();
        let writer = Arc::new(Mutex::new(FrameWriter::new(
            radio.try_clone_channel().unwrap(),
        )));
        let received = Arc::new(Received {
            frames: Mutex::new(Vec::new()),
            changed: Condvar::new(),
            disconnected: AtomicBool::new(false),
        });

        let thread = {
            let writer = Arc::clone(&writer);
            let received = Arc::clone(&received);
            thread::spawn(move || serve(profile, FrameReader::new(radio), &writer, &received))
        };

        (
            host,
            FakeRadio {
                writer,
                control,
                received,
                thread: Some(thread),
            },
        )
    }

    /// Start a radio and open a connection to it.
    pub(crate) fn connect(profile: RadioProfile) -> (Arc<Connection>, FakeRadio) {
        let (channel, radio) = Self::start(profile);
        let conn = Connection::open_with_config(channel, test_config()).unwrap();
        (conn, radio)
    }

    /// Send a frame to the host as if the radio produced it.
    pub(crate) fn inject(&self, frame: &Frame) {
        self.writer.lock().unwrap().write_frame(frame).unwrap();
    }

    /// Send raw bytes to the host, bypassing the codec.
    pub(crate) fn write_raw(&self, bytes: &[u8]) {
        let mut writer = self.writer.lock().unwrap();
        std::io::Write::write_all(writer.get_mut(), bytes).unwrap();
    }

    /// Every frame the radio has decoded so far.
    pub(crate) fn received(&self) -> Vec<Frame> {
        self.received.frames.lock().unwrap().clone()
    }

    pub(crate) fn received_of(&self, kind: FrameKind) -> Vec<Frame> {
        self.received()
            .into_iter()
            .filter(|frame| frame.kind() == kind)
            .collect()
    }

    /// Block until `done` holds for the received frames.
    pub(crate) fn wait_received(
        &self,
        done: impl Fn(&[Frame]) -> bool,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut frames = self.received.frames.lock().unwrap();
        while !done(&frames) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            frames = self
                .received
                .changed
                .wait_timeout(frames, deadline - now)
                .unwrap()
                .0;
        }
        true
    }

    /// Block until the host side hangs up.
    pub(crate) fn wait_disconnected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut frames = self.received.frames.lock().unwrap();
        while !self.received.disconnected.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            frames = self
                .received
                .changed
                .wait_timeout(frames, deadline - now)
                .unwrap()
                .0;
        }
        true
    }
}

impl Drop for FakeRadio {
    fn drop(&mut self) {
        let _ = self.control.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve(
    profile: RadioProfile,
    mut reader: FrameReader<SocketChannel>,
    writer: &Mutex<FrameWriter<Box<dyn ByteChannel>>>,
    received: &Received,
) {
    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(err) if err.is_recoverable() => continue,
            Err(_) => break,
        };

        let replies = answer(&profile, &frame);
        {
            let mut frames = received.frames.lock().unwrap();
            frames.push(frame);
            received.changed.notify_all();
        }
        let mut writer = writer.lock().unwrap();
        if writer.write_frames(&replies).is_err() {
            break;
        }
    }
    received.disconnected.store(true, Ordering::SeqCst);
    let _guard = received.frames.lock().unwrap();
    received.changed.notify_all();
}

fn answer(profile: &RadioProfile, frame: &Frame) -> Vec<Frame> {
    if let Some(at) = frame.at() {
        return answer_at(profile, at);
    }
    if let Some(remote) = frame.remote_at() {
        return answer_remote_at(profile, remote).into_iter().collect();
    }
    if let Some(tx) = frame.tx() {
        return answer_tx(tx).into_iter().collect();
    }
    Vec::new()
}

fn answer_at(profile: &RadioProfile, at: &AtFrame) -> Vec<Frame> {
    if at.frame_id == 0 || profile.silent.contains(&at.command) {
        return Vec::new();
    }
    if profile.failing.contains(&at.command) {
        return vec![at_response(at.frame_id, at.command, AtStatus::Error, &[])];
    }

    let value: Vec<u8> = match at.command {
        AtCommand::AP => vec![profile.api_mode],
        AtCommand::SH => ((profile.serial >> 32) as u32).to_be_bytes().to_vec(),
        AtCommand::SL => (profile.serial as u32).to_be_bytes().to_vec(),
        AtCommand::MY => profile.network.to_be_bytes().to_vec(),
        AtCommand::NI => profile.node_id.as_bytes().to_vec(),
        AtCommand::ND => return answer_discovery(profile, at),
        _ => Vec::new(),
    };
    vec![at_response(at.frame_id, at.command, AtStatus::Ok, &value)]
}

/// One discovery response per matching remote. An untargeted scan ends
/// with an empty response.
fn answer_discovery(profile: &RadioProfile, at: &AtFrame) -> Vec<Frame> {
    let target = (!at.value.is_empty()).then(|| at.value.as_ref());
    let mut replies: Vec<Frame> = profile
        .remotes
        .iter()
        .filter(|(_, id)| target.is_none_or(|target| id.as_bytes() == target))
        .map(|(address, id)| discovery_response(at.frame_id, *address, id))
        .collect();
    if target.is_none() {
        replies.push(at_response(at.frame_id, AtCommand::ND, AtStatus::Ok, &[]));
    }
    replies
}

fn answer_remote_at(profile: &RadioProfile, remote: &RemoteAtFrame) -> Option<Frame> {
    if remote.frame_id == 0 {
        return None;
    }
    let known = profile
        .remotes
        .iter()
        .find(|(address, _)| *address == remote.destination);

    let mut buf = FrameBuffer::new(kind::REMOTE_AT_RESPONSE);
    buf.put_u8(remote.frame_id)
        .put_address(&remote.destination)
        .put_command(remote.command);
    match known {
        Some((_, id)) if remote.command == AtCommand::NI => {
            buf.put_u8(AtStatus::Ok.as_u8()).put_slice(id.as_bytes());
        }
        Some(_) => {
            buf.put_u8(AtStatus::Ok.as_u8());
        }
        None => {
            buf.put_u8(AtStatus::TxFailure.as_u8());
        }
    }
    Some(buf.finish().unwrap())
}

fn answer_tx(tx: &TxFrame) -> Option<Frame> {
    if tx.frame_id == 0 {
        return None;
    }
    let mut buf = FrameBuffer::new(kind::TX_STATUS);
    buf.put_u8(tx.frame_id)
        .put_u16(tx.destination.network())
        .put_u8(0)
        .put_u8(0)
        .put_u8(0);
    Some(buf.finish().unwrap())
}

pub(crate) fn at_response(id: u8, command: AtCommand, status: AtStatus, value: &[u8]) -> Frame {
    let mut buf = FrameBuffer::new(kind::AT_RESPONSE);
    buf.put_u8(id)
        .put_command(command)
        .put_u8(status.as_u8())
        .put_slice(value);
    buf.finish().unwrap()
}

pub(crate) fn discovery_response(id: u8, address: Address, node_id: &str) -> Frame {
    let serial = address.serial();
    let mut buf = FrameBuffer::new(kind::AT_RESPONSE);
    buf.put_u8(id)
        .put_command(AtCommand::ND)
        .put_u8(AtStatus::Ok.as_u8())
        .put_u16(address.network())
        .put_slice(&((serial >> 32) as u32).to_be_bytes())
        .put_slice(&(serial as u32).to_be_bytes())
        .put_slice(node_id.as_bytes())
        .put_u8(0);
    buf.finish().unwrap()
}

pub(crate) fn rx_frame(source: Address, data: &[u8]) -> Frame {
    let mut buf = FrameBuffer::new(kind::RX);
    buf.put_address(&source).put_u8(0x01).put_slice(data);
    buf.finish().unwrap()
}

pub(crate) fn node_id_frame(remote: Address, node_id: &str) -> Frame {
    let mut buf = FrameBuffer::new(kind::NODE_ID);
    buf.put_address(&remote)
        .put_u8(0x02)
        .put_u16(remote.network())
        .put_slice(&remote.serial_bytes())
        .put_slice(node_id.as_bytes())
        .put_u8(0);
    buf.finish().unwrap()
}
