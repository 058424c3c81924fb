//! Gossip engine
//!
//! Owns one UDP socket and a dedicated network thread. The thread receives
//! and authenticates frames, maintains the neighbor table, answers HELLOs and
//! migrations, sends the periodic HELLO and evicts silent peers. It hands
//! HELLO and formula arrivals to the application through the [`EventQueue`].
//!
//! The application thread only sends. Neighbor-table locks are held for
//! table bookkeeping and never across socket I/O.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use swarm_common::{
    AuthKey, NodeId, Result, SwarmError, DEFAULT_HELLO_INTERVAL_SECS, DEFAULT_STALE_AFTER_SECS,
    EVENT_QUEUE_CAPACITY, NEIGHBOR_CAPACITY,
};
use swarm_darwinian::Formula;
use tracing::{debug, info, trace, warn};

use crate::events::{EventQueue, QueueFull, SwarmEvent};
use crate::neighbor::{Neighbor, NeighborTable, Upsert};
use crate::stats::{EngineStats, StatsSnapshot};
use crate::wire::{NetMessage, WireCodec, ACK_ACCEPTED, ACK_QUEUE_FULL, MAX_FRAME_LEN};

/// Longest single blocking receive; bounds how long `stop` waits
const RECV_SLICE: Duration = Duration::from_millis(20);

/// Oversized so frames longer than any valid one are seen at full length
const RECV_BUF_LEN: usize = MAX_FRAME_LEN * 2;

const DEFAULT_POLL_TIMEOUT_MS: u64 = 250;

/// Runtime settings for one engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub node_id: NodeId,
    pub bind_addr: SocketAddr,
    pub key: AuthKey,
    /// Where periodic HELLOs are broadcast; `None` disables broadcasting
    pub broadcast: Option<SocketAddr>,
    pub hello_interval: Duration,
    pub stale_after: Duration,
    /// Upper bound on one network-thread poll
    pub poll_timeout: Duration,
    pub neighbor_capacity: usize,
    pub event_capacity: usize,
}

impl EngineConfig {
    /// Listen on every interface at `port` and broadcast HELLOs to the same port
    pub fn new(node_id: NodeId, port: u16, key: AuthKey) -> Self {
        let broadcast = (port != 0).then(|| SocketAddr::from(([255, 255, 255, 255], port)));
        Self {
            node_id,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            key,
            broadcast,
            hello_interval: Duration::from_secs(DEFAULT_HELLO_INTERVAL_SECS),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            neighbor_capacity: NEIGHBOR_CAPACITY,
            event_capacity: EVENT_QUEUE_CAPACITY,
        }
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_broadcast(mut self, broadcast: Option<SocketAddr>) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub fn with_hello_interval(mut self, interval: Duration) -> Self {
        self.hello_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_neighbor_capacity(mut self, capacity: usize) -> Self {
        self.neighbor_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.hello_interval.is_zero() {
            return Err(SwarmError::Config("hello interval must be positive".into()));
        }
        if self.stale_after <= self.hello_interval {
            return Err(SwarmError::Config(format!(
                "stale_after ({:?}) must exceed the hello interval ({:?})",
                self.stale_after, self.hello_interval
            )));
        }
        if self.poll_timeout.is_zero() {
            return Err(SwarmError::Config("poll timeout must be positive".into()));
        }
        if self.neighbor_capacity == 0 || self.event_capacity == 0 {
            return Err(SwarmError::Config("capacities must be positive".into()));
        }
        Ok(())
    }
}

/// State shared by the application and the network thread
struct Shared {
    node_id: NodeId,
    codec: WireCodec,
    neighbors: Mutex<NeighborTable>,
    events: EventQueue,
    stats: EngineStats,
    running: AtomicBool,
    broadcast: Option<SocketAddr>,
    hello_interval: Duration,
    stale_after: Duration,
    poll_timeout: Duration,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Send one frame. Failures are counted against `peer` when given.
    fn send(&self, socket: &UdpSocket, frame: &[u8], to: SocketAddr, peer: Option<NodeId>) -> bool {
        match socket.send_to(frame, to) {
            Ok(_) => true,
            Err(e) => {
                EngineStats::incr(&self.stats.send_failures);
                debug!(to = %to, error = %e, "Send failed");
                if let Some(id) = peer {
                    self.neighbors.lock().record_failure(id).ok();
                }
                false
            }
        }
    }

    /// HELLO to the broadcast address and to every known neighbor
    fn announce(&self, socket: &UdpSocket) -> usize {
        let frame = self.codec.encode(&NetMessage::Hello {
            node_id: self.node_id,
        });
        let mut sent = 0;
        if let Some(broadcast) = self.broadcast {
            if self.send(socket, &frame, broadcast, None) {
                sent += 1;
            }
        }

        for (id, address) in self.peers() {
            if self.send(socket, &frame, address, Some(id)) {
                sent += 1;
            }
        }
        EngineStats::add(&self.stats.hellos_sent, sent as u64);
        sent
    }

    fn peers(&self) -> Vec<(NodeId, SocketAddr)> {
        self.neighbors
            .lock()
            .iter()
            .map(|n| (n.id, n.address))
            .collect()
    }

    fn observe(&self, id: NodeId, address: SocketAddr) -> Option<Upsert> {
        let outcome = self.neighbors.lock().upsert(id, address, Instant::now());
        match outcome {
            Ok(Upsert::Inserted) => {
                info!(node_id = self.node_id, peer = id, address = %address, "Discovered neighbor");
                Some(Upsert::Inserted)
            }
            Ok(upsert) => Some(upsert),
            Err(e) => {
                warn!(peer = id, address = %address, error = %e, "Neighbor not tracked");
                None
            }
        }
    }

    fn deliver(&self, event: SwarmEvent) -> bool {
        match self.events.push(event) {
            Ok(()) => true,
            Err(QueueFull(event)) => {
                EngineStats::incr(&self.stats.events_rejected);
                warn!(peer = event.sender(), "Event queue full, dropping event");
                false
            }
        }
    }

    fn evict_stale(&self, now: Instant) {
        let evicted = self.neighbors.lock().evict_stale(now, self.stale_after);
        for neighbor in &evicted {
            info!(peer = neighbor.id, address = %neighbor.address, "Evicted silent neighbor");
        }
        EngineStats::add(&self.stats.neighbors_evicted, evicted.len() as u64);
    }

    fn handle_datagram(&self, socket: &UdpSocket, frame: &[u8], from: SocketAddr) {
        EngineStats::incr(&self.stats.datagrams_received);

        let message = match self.codec.decode(frame) {
            Ok(message) => message,
            Err(_) => {
                EngineStats::incr(&self.stats.datagrams_dropped);
                trace!(from = %from, len = frame.len(), "Dropped datagram");
                return;
            }
        };

        if message.node_id() == Some(self.node_id) {
            return;
        }

        match message {
            NetMessage::Hello { node_id } => {
                if self.observe(node_id, from) == Some(Upsert::Inserted) {
                    let reply = self.codec.encode(&NetMessage::Hello {
                        node_id: self.node_id,
                    });
                    if self.send(socket, &reply, from, Some(node_id)) {
                        EngineStats::incr(&self.stats.hellos_sent);
                    }
                }
                self.deliver(SwarmEvent::Hello {
                    id: node_id,
                    address: from,
                });
            }
            NetMessage::MigrateFormula {
                node_id,
                gene,
                fitness,
            } => {
                self.observe(node_id, from);
                debug!(peer = node_id, gene = %gene, fitness, "Formula received");

                let accepted = self.deliver(SwarmEvent::Formula {
                    id: node_id,
                    address: from,
                    formula: Formula::with_fitness(gene, fitness),
                });
                let status = if accepted { ACK_ACCEPTED } else { ACK_QUEUE_FULL };
                let ack = self.codec.encode(&NetMessage::Ack { status });
                if self.send(socket, &ack, from, Some(node_id)) {
                    EngineStats::incr(&self.stats.acks_sent);
                }
            }
            NetMessage::Ack { status } => {
                EngineStats::incr(&self.stats.acks_received);
                let peer = self.neighbors.lock().touch_address(from, Instant::now());
                trace!(from = %from, ?peer, status, "Ack received");
            }
        }
    }
}

/// Network thread body
struct NetworkLoop {
    shared: Arc<Shared>,
    socket: Arc<UdpSocket>,
    buf: [u8; RECV_BUF_LEN],
}

impl NetworkLoop {
    fn run(mut self) {
        debug!(node_id = self.shared.node_id, "Network thread started");

        let mut next_hello = Instant::now();
        while self.shared.is_running() {
            let now = Instant::now();
            if now >= next_hello {
                self.shared.announce(&self.socket);
                next_hello = now + self.shared.hello_interval;
            }
            self.shared.evict_stale(now);

            let until_hello = next_hello.saturating_duration_since(Instant::now());
            self.poll(self.shared.poll_timeout.min(until_hello));
        }

        debug!(node_id = self.shared.node_id, "Network thread stopped");
    }

    /// Wait up to `timeout` for one datagram and handle it.
    ///
    /// Returns false on timeout or when the engine is stopping.
    fn poll(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok((len, from)) => {
                    self.shared
                        .handle_datagram(&self.socket, &self.buf[..len], from);
                    return true;
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(e) => {
                    trace!(error = %e, "Receive failed");
                    thread::sleep(RECV_SLICE.min(deadline.saturating_duration_since(Instant::now())));
                }
            }

            if !self.shared.is_running() || Instant::now() >= deadline {
                return false;
            }
        }
    }
}

/// Handle to a running gossip node.
///
/// Dropping the engine stops it.
pub struct GossipEngine {
    node_id: NodeId,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    socket: Option<Arc<UdpSocket>>,
    worker: Option<JoinHandle<()>>,
}

impl GossipEngine {
    /// Start with default settings on `port` (0 picks an ephemeral port)
    pub fn start(node_id: NodeId, port: u16, secret: &[u8]) -> Result<Self> {
        let key = AuthKey::for_frames(secret)?;
        Self::start_with_config(EngineConfig::new(node_id, port, key))
    }

    /// Bind the socket and spawn the network thread.
    ///
    /// On error nothing stays behind: the socket is closed and no thread runs.
    pub fn start_with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let socket = UdpSocket::bind(config.bind_addr).map_err(|e| {
            SwarmError::Network(format!("bind {}: {}", config.bind_addr, e))
        })?;
        socket.set_read_timeout(Some(RECV_SLICE))?;
        if config.broadcast.is_some() {
            socket.set_broadcast(true)?;
        }
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);

        let shared = Arc::new(Shared {
            node_id: config.node_id,
            codec: WireCodec::new(config.key),
            neighbors: Mutex::new(NeighborTable::with_capacity(config.neighbor_capacity)),
            events: EventQueue::with_capacity(config.event_capacity),
            stats: EngineStats::default(),
            running: AtomicBool::new(true),
            broadcast: config.broadcast,
            hello_interval: config.hello_interval,
            stale_after: config.stale_after,
            poll_timeout: config.poll_timeout,
        });

        let network = NetworkLoop {
            shared: Arc::clone(&shared),
            socket: Arc::clone(&socket),
            buf: [0u8; RECV_BUF_LEN],
        };
        let worker = thread::Builder::new()
            .name(format!("swarm-net-{}", config.node_id))
            .spawn(move || network.run())
            .map_err(|e| SwarmError::Internal(format!("spawn network thread: {}", e)))?;

        info!(
            node_id = config.node_id,
            local_addr = %local_addr,
            broadcast = ?config.broadcast,
            "Gossip engine started"
        );

        Ok(Self {
            node_id: config.node_id,
            local_addr,
            shared,
            socket: Some(socket),
            worker: Some(worker),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket.as_deref().ok_or(SwarmError::NotRunning)
    }

    /// Announce liveness now instead of waiting for the next interval.
    /// Returns the number of frames sent.
    pub fn send_hello(&self) -> Result<usize> {
        let socket = self.socket()?;
        Ok(self.shared.announce(socket))
    }

    /// Track a peer that broadcast discovery cannot reach and greet it
    pub fn add_static_neighbor(&self, address: SocketAddr, id: NodeId) -> Result<()> {
        let socket = self.socket()?;
        if id == self.node_id {
            return Err(SwarmError::Config(format!(
                "static neighbor {} uses this node's id",
                address
            )));
        }

        self.shared
            .neighbors
            .lock()
            .upsert(id, address, Instant::now())?;
        debug!(peer = id, address = %address, "Static neighbor added");

        let hello = self.shared.codec.encode(&NetMessage::Hello {
            node_id: self.node_id,
        });
        if self.shared.send(socket, &hello, address, Some(id)) {
            EngineStats::incr(&self.shared.stats.hellos_sent);
        }
        Ok(())
    }

    /// Migrate `formula` to the neighbor at index `rand mod len`.
    ///
    /// Returns the chosen peer, or `None` when the table is empty. A failed
    /// send still counts as chosen; it shows up in that peer's failure count.
    pub fn send_to_random(&self, rand: u64, formula: &Formula) -> Result<Option<NodeId>> {
        let socket = self.socket()?;
        let target = self
            .shared
            .neighbors
            .lock()
            .pick(rand)
            .map(|n| (n.id, n.address));
        let Some((id, address)) = target else {
            return Ok(None);
        };

        let frame = self.shared.codec.encode(&NetMessage::migrate(self.node_id, formula));
        if self.shared.send(socket, &frame, address, Some(id)) {
            EngineStats::incr(&self.shared.stats.formulas_sent);
        }
        debug!(peer = id, gene = %formula.gene, fitness = formula.fitness, "Formula sent");
        Ok(Some(id))
    }

    /// Migrate `formula` to every neighbor and the broadcast address.
    ///
    /// Peers reachable both ways receive it twice; absorbing is idempotent.
    pub fn send_to_all(&self, formula: &Formula) -> Result<usize> {
        let socket = self.socket()?;
        let frame = self.shared.codec.encode(&NetMessage::migrate(self.node_id, formula));

        let mut sent = 0;
        for (id, address) in self.shared.peers() {
            if self.shared.send(socket, &frame, address, Some(id)) {
                sent += 1;
            }
        }
        if let Some(broadcast) = self.shared.broadcast {
            if self.shared.send(socket, &frame, broadcast, None) {
                sent += 1;
            }
        }
        EngineStats::add(&self.shared.stats.formulas_sent, sent as u64);
        Ok(sent)
    }

    /// Copy of the neighbor table
    pub fn neighbors(&self) -> Vec<Neighbor> {
        self.shared.neighbors.lock().snapshot()
    }

    pub fn neighbor(&self, id: NodeId) -> Option<Neighbor> {
        self.shared.neighbors.lock().get(id).cloned()
    }

    pub fn neighbor_count(&self) -> usize {
        self.shared.neighbors.lock().len()
    }

    pub fn events(&self) -> &EventQueue {
        &self.shared.events
    }

    /// Next pending event, without blocking
    pub fn next_event(&self) -> Option<SwarmEvent> {
        self.shared.events.pop()
    }

    /// Next pending event, waiting up to `timeout`
    pub fn wait_event(&self, timeout: Duration) -> Option<SwarmEvent> {
        self.shared.events.pop_timeout(timeout)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Stop the network thread and close the socket. Safe to call twice.
    ///
    /// Events already queued stay readable.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.running.store(false, Ordering::Release);
        if worker.join().is_err() {
            warn!(node_id = self.node_id, "Network thread panicked");
        }
        self.socket = None;
        info!(node_id = self.node_id, "Gossip engine stopped");
    }
}

impl Drop for GossipEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
