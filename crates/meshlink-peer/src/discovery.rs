use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use meshlink_frame::{Address, AtBuilder, AtCommand, Frame, RemoteAtBuilder};
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{PeerError, Result};
use crate::listener::{FrameListener, Interest, ListenerId};
use crate::node::Node;

/// Smallest discovery window the radio accepts for `NT`.
pub const MIN_DISCOVERY_WINDOW: u8 = 0x20;

/// Node discovery configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Discovery window written to `NT`, in radio units.
    pub window: u8,
    /// Length of one radio window unit.
    pub window_unit: Duration,
    /// Attempts for address lookups and the default for id lookups.
    pub attempts: usize,
    /// How long local and remote AT queries wait for an answer.
    pub query_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            window: MIN_DISCOVERY_WINDOW,
            window_unit: Duration::from_millis(100),
            attempts: 3,
            query_timeout: Duration::from_secs(3),
        }
    }
}

impl DiscoveryConfig {
    /// How long one discovery attempt listens for answers.
    pub fn window_duration(&self) -> Duration {
        self.window_unit * u32::from(self.window)
    }

    fn validate(&self) -> Result<()> {
        if self.window < MIN_DISCOVERY_WINDOW {
            return Err(PeerError::InvalidConfig(format!(
                "discovery window {:#04X} is below the radio minimum {MIN_DISCOVERY_WINDOW:#04X}",
                self.window
            )));
        }
        if self.window_unit.is_zero() || self.query_timeout.is_zero() {
            return Err(PeerError::InvalidConfig(
                "discovery durations must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

const SH_BIT: u8 = 1 << 0;
const SL_BIT: u8 = 1 << 1;
const MY_BIT: u8 = 1 << 2;
const NI_BIT: u8 = 1 << 3;
const LOCAL_COMPLETE: u8 = SH_BIT | SL_BIT | MY_BIT | NI_BIT;

const IDENTITY_QUERIES: [AtCommand; 4] =
    [AtCommand::SH, AtCommand::SL, AtCommand::MY, AtCommand::NI];

/// Pieces of the local identity collected so far.
#[derive(Debug, Default)]
struct LocalParts {
    mask: u8,
    high: u32,
    low: u32,
    network: u16,
    node_id: String,
}

#[derive(Default)]
struct Directory {
    /// Identity queries sent by this directory.
    local_queries: Vec<Frame>,
    local_parts: LocalParts,
    local: Option<Node>,
    by_id: HashMap<String, Node>,
    by_address: HashMap<Address, Node>,
    closed: bool,
}

impl Directory {
    fn learn(&mut self, node: Node) {
        if self.by_address.get(&node.address) == Some(&node) {
            return;
        }
        debug!(node = %node, "learned node");
        if !node.id.is_empty() {
            self.by_id.insert(node.id.clone(), node.clone());
        }
        self.by_address.insert(node.address, node);
    }
}

/// Directory state shared with the connection listener.
#[derive(Default)]
struct DirectoryState {
    inner: Mutex<Directory>,
    changed: Condvar,
}

impl DirectoryState {
    fn lock(&self) -> MutexGuard<'_, Directory> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until `found` yields a value, the deadline passes or the
    /// connection closes.
    fn wait_for<T>(
        &self,
        deadline: Instant,
        mut found: impl FnMut(&Directory) -> Option<T>,
    ) -> Option<T> {
        let mut dir = self.lock();
        loop {
            if let Some(value) = found(&dir) {
                return Some(value);
            }
            let now = Instant::now();
            if dir.closed || now >= deadline {
                return None;
            }
            dir = self
                .changed
                .wait_timeout(dir, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn expect_local(&self, queries: &[Frame]) {
        self.lock().local_queries = queries.to_vec();
    }

    /// Take one identity part from a response to our own query.
    fn record_local(&self, frame: &Frame, command: AtCommand, value: &[u8]) {
        let mut dir = self.lock();
        if dir.local.is_some()
            || !dir
                .local_queries
                .iter()
                .any(|query| frame.is_response_for(query))
        {
            return;
        }
        let parts = &mut dir.local_parts;
        match (command, value.len()) {
            (AtCommand::SH, 4) => {
                parts.high = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                parts.mask |= SH_BIT;
            }
            (AtCommand::SL, 4) => {
                parts.low = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                parts.mask |= SL_BIT;
            }
            (AtCommand::MY, 2) => {
                parts.network = u16::from_be_bytes([value[0], value[1]]);
                parts.mask |= MY_BIT;
            }
            (AtCommand::NI, _) => {
                parts.node_id = String::from_utf8_lossy(value).into_owned();
                parts.mask |= NI_BIT;
            }
            _ => return,
        }

        if parts.mask == LOCAL_COMPLETE {
            let address = Address::from_halves(parts.high, parts.low, parts.network);
            let node = Node::new(address, parts.node_id.clone(), true);
            info!(node = %node, "local radio identified");
            dir.local = Some(node.clone());
            dir.learn(node);
        }
        self.changed.notify_all();
    }

    fn record_remote(&self, node: Node) {
        self.lock().learn(node);
        self.changed.notify_all();
    }
}

impl FrameListener for DirectoryState {
    fn on_frame(&self, frame: &Frame) {
        if let Some(discovered) = frame.node_discovery() {
            self.record_remote(Node::new(
                discovered.address,
                discovered.node_id.clone(),
                false,
            ));
        } else if let Some(response) = frame.at_response() {
            if response.status.is_ok() {
                self.record_local(frame, response.command, &response.value);
            }
        } else if let Some(announced) = frame.node_id() {
            self.record_remote(Node::new(announced.remote, announced.node_id.clone(), false));
        }
    }

    fn on_close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }
}

/// Tracks the local radio and the remote nodes seen on the mesh.
///
/// Creating a directory queries the local radio's identity. Remote nodes are
/// learned from discovery answers and from identification broadcasts, and
/// stay cached for the life of the directory.
pub struct NodeDirectory {
    conn: Arc<Connection>,
    state: Arc<DirectoryState>,
    listener: ListenerId,
    config: DiscoveryConfig,
}

impl NodeDirectory {
    pub fn new(conn: Arc<Connection>) -> Result<Self> {
        Self::with_config(conn, DiscoveryConfig::default())
    }

    pub fn with_config(conn: Arc<Connection>, config: DiscoveryConfig) -> Result<Self> {
        config.validate()?;

        let state = Arc::new(DirectoryState::default());
        let listener = conn.add_shared_listener(
            Interest::All,
            Arc::clone(&state) as Arc<dyn FrameListener>,
        );

        let queries = IDENTITY_QUERIES.map(AtBuilder::from_command);
        let sent = conn.stamp(queries).and_then(|frames| {
            state.expect_local(&frames);
            conn.send_frames(&frames)
        });
        if let Err(err) = sent {
            conn.remove_listener(listener);
            return Err(err);
        }

        Ok(Self {
            conn,
            state,
            listener,
            config,
        })
    }

    /// The attached radio, once all four identity queries have answered.
    ///
    /// Waits up to the query timeout.
    pub fn local_node(&self) -> Result<Node> {
        let deadline = Instant::now() + self.config.query_timeout;
        match self.state.wait_for(deadline, |dir| dir.local.clone()) {
            Some(node) => Ok(node),
            None if self.conn.is_closed() => Err(PeerError::Closed),
            None => Err(PeerError::Timeout(self.config.query_timeout)),
        }
    }

    /// Find a node by its node-identifier string.
    ///
    /// Cached nodes are returned without radio traffic. Otherwise the
    /// discovery window is written once and a targeted `ND` is broadcast up
    /// to `attempts` times, each listening for one window. Zero attempts
    /// only consults the cache. Returns `Ok(None)` if nobody answered.
    pub fn resolve_by_id(&self, id: &str, attempts: usize) -> Result<Option<Node>> {
        if id.is_empty() {
            return Err(PeerError::InvalidArgument(
                "node id must not be empty".to_string(),
            ));
        }
        if let Some(node) = self.state.lock().by_id.get(id).cloned() {
            return Ok(Some(node));
        }
        if attempts == 0 {
            return Ok(None);
        }

        self.conn.at(
            AtBuilder::from_command(AtCommand::NT).with_value([self.config.window]),
            self.config.query_timeout,
        )?;

        let window = self.config.window_duration();
        for attempt in 1..=attempts {
            debug!(id, attempt, "broadcasting node discovery");
            self.conn.send_with_id([AtBuilder::from_command(AtCommand::ND)
                .with_value(id.as_bytes().to_vec())])?;

            let deadline = Instant::now() + window;
            if let Some(node) = self
                .state
                .wait_for(deadline, |dir| dir.by_id.get(id).cloned())
            {
                return Ok(Some(node));
            }
            if self.conn.is_closed() {
                return Err(PeerError::Closed);
            }
        }

        debug!(id, attempts, "node not found");
        Ok(None)
    }

    /// Find a node by address, asking it for its node identifier.
    ///
    /// Returns `Ok(None)` if the node did not answer within the configured
    /// attempts.
    pub fn resolve_by_address(&self, address: Address) -> Result<Option<Node>> {
        if let Some(node) = self.state.lock().by_address.get(&address).cloned() {
            return Ok(Some(node));
        }

        for attempt in 1..=self.config.attempts {
            debug!(%address, attempt, "querying remote node identifier");
            match self.conn.remote_at(
                RemoteAtBuilder::new(address, "NI"),
                self.config.query_timeout,
            ) {
                Ok(response) => {
                    let node = Node::new(
                        response.source,
                        String::from_utf8_lossy(&response.value).into_owned(),
                        false,
                    );
                    self.state.record_remote(node.clone());
                    return Ok(Some(node));
                }
                Err(PeerError::Timeout(_)) | Err(PeerError::AtStatus { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        debug!(%address, "node did not answer");
        Ok(None)
    }

    /// Every node seen so far, local radio first.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.state.lock().by_address.values().cloned().collect();
        nodes.sort_by(|a, b| {
            b.local
                .cmp(&a.local)
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.address.serial().cmp(&b.address.serial()))
        });
        nodes
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }
}

impl Drop for NodeDirectory {
    fn drop(&mut self) {
        self.conn.remove_listener(self.listener);
    }
}
