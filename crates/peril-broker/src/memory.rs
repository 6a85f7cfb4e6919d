//! In-process broker with AMQP-like semantics.
//!
//! [`MemoryBroker`] plays the role of the broker server. Each call to
//! [`MemoryBroker::connect`] returns a [`MemoryConnection`] (the client's
//! connection), which opens [`MemoryChannel`]s exactly like the AMQP
//! implementation does.
//!
//! Supported behaviour:
//!
//! - direct, topic and fanout exchanges; unroutable messages are dropped
//! - per-queue FIFO with round-robin across consumers
//! - prefetch: message count and byte ceiling, per consumer or across the
//!   whole channel when `global` is set
//! - ack, nack with requeue (message goes back to the head of the queue,
//!   flagged as redelivered) and nack without requeue (dead-lettered)
//! - exclusive auto-delete queues removed when their connection closes
//! - closing a channel returns its unacknowledged messages to the queue
//!
//! Every resolution is recorded so tests can assert on the exact
//! acknowledgment traffic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::{
    topic_matches, Broker, BrokerChannel, Delivery, DeliveryStream, Durability, ExchangeKind,
    Prefetch, QueueInfo, TopologyError, TransportError,
};

/// A message sitting in a queue (or handed out and not yet resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

/// How a delivery was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Ack,
    NackRequeue,
    NackDiscard,
}

/// One entry in the broker's resolution ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRecord {
    pub queue: String,
    pub routing_key: String,
    pub resolution: Resolution,
}

// ---------------------------------------------------------------------------
// Broker state
// ---------------------------------------------------------------------------

/// Deliveries handed out and not yet resolved.
#[derive(Debug, Clone, Copy, Default)]
struct InFlight {
    count: usize,
    bytes: usize,
}

impl InFlight {
    /// Whether one more message of `len` bytes fits under `limit`. A zero
    /// count or size means unlimited. A message bigger than the byte
    /// ceiling still goes out when nothing else is outstanding.
    fn admits(self, limit: Prefetch, len: usize) -> bool {
        let count_ok = limit.count == 0 || self.count < usize::from(limit.count);
        let ceiling = usize::try_from(limit.size).unwrap_or(usize::MAX);
        let size_ok = limit.size == 0 || self.count == 0 || self.bytes + len <= ceiling;
        count_ok && size_ok
    }

    fn add(&mut self, len: usize) {
        self.count += 1;
        self.bytes += len;
    }

    fn remove(&mut self, len: usize) {
        self.count = self.count.saturating_sub(1);
        self.bytes = self.bytes.saturating_sub(len);
    }
}

struct ConsumerSlot {
    id: u64,
    channel: u64,
    prefetch: Option<Prefetch>,
    in_flight: InFlight,
    tx: mpsc::UnboundedSender<MemoryDelivery>,
}

struct QueueState {
    durability: Durability,
    owner: Option<u64>,
    dead_letter_exchange: Option<String>,
    ready: VecDeque<StoredMessage>,
    consumers: Vec<ConsumerSlot>,
    next_consumer: usize,
}

struct Binding {
    exchange: String,
    queue: String,
    key: String,
}

struct Unacked {
    queue: String,
    consumer: u64,
    channel: u64,
    message: StoredMessage,
}

#[derive(Default)]
struct Inner {
    exchanges: HashMap<String, ExchangeKind>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<Binding>,
    unacked: HashMap<u64, Unacked>,
    closed_channels: HashSet<u64>,
    closed_connections: HashSet<u64>,
    prefetch: HashMap<u64, Prefetch>,
    channel_in_flight: HashMap<u64, InFlight>,
    ledger: Vec<ResolutionRecord>,
    next_id: u64,
    dropped: usize,
}

type Shared = Arc<Mutex<Inner>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Queues `message` on every queue bound to `exchange` whose binding
    /// matches. Returns how many queues received it.
    fn route(&mut self, message: StoredMessage) -> Result<usize, TransportError> {
        let kind = *self
            .exchanges
            .get(&message.exchange)
            .ok_or_else(|| TransportError::Publish {
                exchange: message.exchange.clone(),
                routing_key: message.routing_key.clone(),
                source: format!("no exchange {:?}", message.exchange).into(),
            })?;

        let mut targets: Vec<String> = Vec::new();
        for binding in self.bindings.iter().filter(|b| b.exchange == message.exchange) {
            let matched = match kind {
                ExchangeKind::Direct => binding.key == message.routing_key,
                ExchangeKind::Topic => topic_matches(&binding.key, &message.routing_key),
                ExchangeKind::Fanout => true,
            };
            if matched && !targets.contains(&binding.queue) {
                targets.push(binding.queue.clone());
            }
        }

        if targets.is_empty() {
            self.dropped += 1;
            tracing::trace!(
                exchange = %message.exchange,
                routing_key = %message.routing_key,
                "unroutable message dropped"
            );
            return Ok(0);
        }

        for queue in &targets {
            if let Some(state) = self.queues.get_mut(queue) {
                state.ready.push_back(message.clone());
            }
        }
        for queue in &targets {
            self.pump(queue);
        }
        Ok(targets.len())
    }

    /// Hands ready messages to consumers with spare prefetch capacity.
    fn pump(&mut self, queue: &str) {
        loop {
            let tag = self.next_id();
            let Inner {
                queues,
                unacked,
                channel_in_flight,
                ..
            } = self;
            let Some(state) = queues.get_mut(queue) else {
                return;
            };
            let Some(len) = state.ready.front().map(|m| m.body.len()) else {
                return;
            };
            if state.consumers.is_empty() {
                return;
            }

            let count = state.consumers.len();
            let pick = (0..count)
                .map(|offset| (state.next_consumer + offset) % count)
                .find(|&i| {
                    let slot = &state.consumers[i];
                    slot.prefetch.is_none_or(|limit| {
                        let usage = if limit.global {
                            channel_in_flight
                                .get(&slot.channel)
                                .copied()
                                .unwrap_or_default()
                        } else {
                            slot.in_flight
                        };
                        usage.admits(limit, len)
                    })
                });
            let Some(index) = pick else {
                return;
            };
            let Some(message) = state.ready.pop_front() else {
                return;
            };
            state.next_consumer = (index + 1) % count;

            let slot = &mut state.consumers[index];
            let delivery = MemoryDelivery {
                tag,
                message: message.clone(),
                shared: None,
            };
            unacked.insert(
                tag,
                Unacked {
                    queue: queue.to_string(),
                    consumer: slot.id,
                    channel: slot.channel,
                    message,
                },
            );
            slot.in_flight.add(len);
            channel_in_flight.entry(slot.channel).or_default().add(len);
            if slot.tx.send(delivery).is_err() {
                // Consumer went away; take the message back and drop the slot.
                if let Some(usage) = channel_in_flight.get_mut(&slot.channel) {
                    usage.remove(len);
                }
                if let Some(entry) = unacked.remove(&tag) {
                    state.ready.push_front(entry.message);
                }
                state.consumers.remove(index);
                state.next_consumer = 0;
            }
        }
    }

    fn resolve(&mut self, tag: u64, resolution: Resolution) -> Result<(), TransportError> {
        let entry = self.unacked.remove(&tag).ok_or_else(|| {
            TransportError::Closed(format!("delivery tag {tag} is unknown or already resolved"))
        })?;

        self.ledger.push(ResolutionRecord {
            queue: entry.queue.clone(),
            routing_key: entry.message.routing_key.clone(),
            resolution,
        });

        let len = entry.message.body.len();
        if let Some(usage) = self.channel_in_flight.get_mut(&entry.channel) {
            usage.remove(len);
        }
        let mut dead_letter = None;
        if let Some(state) = self.queues.get_mut(&entry.queue) {
            if let Some(slot) = state.consumers.iter_mut().find(|c| c.id == entry.consumer) {
                slot.in_flight.remove(len);
            }
            match resolution {
                Resolution::Ack => {}
                Resolution::NackRequeue => {
                    let mut message = entry.message;
                    message.redelivered = true;
                    state.ready.push_front(message);
                }
                Resolution::NackDiscard => {
                    dead_letter = state
                        .dead_letter_exchange
                        .clone()
                        .map(|dlx| (dlx, entry.message));
                }
            }
        }

        if let Some((dlx, message)) = dead_letter {
            let message = StoredMessage {
                exchange: dlx,
                redelivered: false,
                ..message
            };
            if self.route(message).is_err() {
                self.dropped += 1;
            }
        }

        self.pump(&entry.queue);
        // Capacity freed on a global limit may unblock the channel's other
        // consumers.
        let siblings: Vec<String> = self
            .queues
            .iter()
            .filter(|(name, q)| {
                **name != entry.queue && q.consumers.iter().any(|c| c.channel == entry.channel)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for queue in siblings {
            self.pump(&queue);
        }
        Ok(())
    }

    fn close_channel(&mut self, channel: u64) {
        if !self.closed_channels.insert(channel) {
            return;
        }
        self.prefetch.remove(&channel);
        self.channel_in_flight.remove(&channel);

        for state in self.queues.values_mut() {
            state.consumers.retain(|c| c.channel != channel);
            state.next_consumer = 0;
        }

        let mut tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, u)| u.channel == channel)
            .map(|(tag, _)| *tag)
            .collect();
        let mut touched = Vec::new();
        // Newest pushed first so the oldest ends up at the head.
        tags.sort_unstable_by(|a, b| b.cmp(a));
        for tag in tags {
            if let Some(entry) = self.unacked.remove(&tag) {
                if let Some(state) = self.queues.get_mut(&entry.queue) {
                    let mut message = entry.message;
                    message.redelivered = true;
                    state.ready.push_front(message);
                }
                if !touched.contains(&entry.queue) {
                    touched.push(entry.queue);
                }
            }
        }
        for queue in touched {
            self.pump(&queue);
        }
    }

    fn close_connection(&mut self, connection: u64, channels: &[u64]) {
        for channel in channels {
            self.close_channel(*channel);
        }
        self.closed_connections.insert(connection);
        let doomed: Vec<String> = self
            .queues
            .iter()
            .filter(|(_, q)| q.owner == Some(connection) && q.durability.is_auto_delete())
            .map(|(name, _)| name.clone())
            .collect();
        for name in doomed {
            self.queues.remove(&name);
            self.bindings.retain(|b| b.queue != name);
            tracing::debug!(queue = %name, "transient queue deleted");
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

/// An in-process message broker.
///
/// Cheap to clone; clones share the same exchanges and queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Shared,
}

impl MemoryBroker {
    /// Creates an empty broker with no exchanges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a client connection.
    pub fn connect(&self) -> MemoryConnection {
        let id = lock(&self.shared).next_id();
        MemoryConnection {
            id,
            shared: Arc::clone(&self.shared),
            channels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of ready (not handed out) messages in `queue`.
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        lock(&self.shared).queues.get(queue).map(|q| q.ready.len())
    }

    /// Copies of the ready messages in `queue`, head first.
    pub fn peek(&self, queue: &str) -> Vec<StoredMessage> {
        lock(&self.shared)
            .queues
            .get(queue)
            .map(|q| q.ready.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if `queue` currently exists.
    pub fn has_queue(&self, queue: &str) -> bool {
        lock(&self.shared).queues.contains_key(queue)
    }

    /// Deliveries handed out and not yet resolved.
    pub fn unacked_count(&self) -> usize {
        lock(&self.shared).unacked.len()
    }

    /// Every ack / nack the broker has received, in order.
    pub fn ledger(&self) -> Vec<ResolutionRecord> {
        lock(&self.shared).ledger.clone()
    }

    /// Ledger entries for one queue.
    pub fn resolutions(&self, queue: &str) -> Vec<Resolution> {
        lock(&self.shared)
            .ledger
            .iter()
            .filter(|r| r.queue == queue)
            .map(|r| r.resolution)
            .collect()
    }

    /// Messages dropped because no queue matched.
    pub fn dropped_count(&self) -> usize {
        lock(&self.shared).dropped
    }
}

// ---------------------------------------------------------------------------
// MemoryConnection
// ---------------------------------------------------------------------------

/// A client connection to a [`MemoryBroker`].
#[derive(Clone)]
pub struct MemoryConnection {
    id: u64,
    shared: Shared,
    channels: Arc<Mutex<Vec<u64>>>,
}

impl MemoryConnection {
    /// Closes the connection: every channel closes and transient queues
    /// declared by this connection are deleted.
    pub fn close(&self) {
        let channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        lock(&self.shared).close_connection(self.id, &channels);
    }
}

impl Broker for MemoryConnection {
    type Channel = MemoryChannel;

    async fn open_channel(&self) -> Result<MemoryChannel, TransportError> {
        let id = {
            let mut inner = lock(&self.shared);
            if inner.closed_connections.contains(&self.id) {
                return Err(TransportError::Closed("connection closed".into()));
            }
            inner.next_id()
        };
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
        Ok(MemoryChannel {
            id,
            connection: self.id,
            shared: Arc::clone(&self.shared),
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryChannel
// ---------------------------------------------------------------------------

/// A channel on a [`MemoryConnection`].
pub struct MemoryChannel {
    id: u64,
    connection: u64,
    shared: Shared,
}

impl MemoryChannel {
    fn ensure_open(&self, inner: &Inner) -> Result<(), TransportError> {
        if inner.closed_channels.contains(&self.id) {
            return Err(TransportError::Closed(format!("channel {} closed", self.id)));
        }
        Ok(())
    }
}

impl BrokerChannel for MemoryChannel {
    type Deliveries = MemoryDeliveries;

    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), TopologyError> {
        let mut inner = lock(&self.shared);
        match inner.exchanges.get(name) {
            Some(existing) if *existing != kind => Err(TopologyError::Exchange {
                exchange: name.to_string(),
                source: format!("exists as {existing:?}, requested {kind:?}").into(),
            }),
            Some(_) => Ok(()),
            None => {
                inner.exchanges.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }

    async fn declare_queue(
        &self,
        name: &str,
        durability: Durability,
        dead_letter_exchange: Option<&str>,
    ) -> Result<QueueInfo, TopologyError> {
        let mut inner = lock(&self.shared);
        if let Err(e) = self.ensure_open(&inner) {
            return Err(TopologyError::Declare {
                queue: name.to_string(),
                source: Box::new(e),
            });
        }
        let owner = durability.is_exclusive().then_some(self.connection);
        let state = inner
            .queues
            .entry(name.to_string())
            .or_insert_with(|| QueueState {
                durability,
                owner,
                dead_letter_exchange: dead_letter_exchange.map(str::to_string),
                ready: VecDeque::new(),
                consumers: Vec::new(),
                next_consumer: 0,
            });
        if state.durability != durability {
            return Err(TopologyError::DurabilityMismatch {
                queue: name.to_string(),
            });
        }
        if state.owner.is_some_and(|o| o != self.connection) {
            return Err(TopologyError::Locked {
                queue: name.to_string(),
            });
        }
        Ok(QueueInfo {
            name: name.to_string(),
            message_count: u32::try_from(state.ready.len()).unwrap_or(u32::MAX),
            consumer_count: u32::try_from(state.consumers.len()).unwrap_or(u32::MAX),
        })
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        binding_key: &str,
    ) -> Result<(), TopologyError> {
        let mut inner = lock(&self.shared);
        let bind_error = |reason: String| TopologyError::Bind {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            binding_key: binding_key.to_string(),
            source: reason.into(),
        };
        if !inner.exchanges.contains_key(exchange) {
            return Err(bind_error(format!("no exchange {exchange:?}")));
        }
        if !inner.queues.contains_key(queue) {
            return Err(bind_error(format!("no queue {queue:?}")));
        }
        let exists = inner
            .bindings
            .iter()
            .any(|b| b.exchange == exchange && b.queue == queue && b.key == binding_key);
        if !exists {
            inner.bindings.push(Binding {
                exchange: exchange.to_string(),
                queue: queue.to_string(),
                key: binding_key.to_string(),
            });
        }
        Ok(())
    }

    async fn set_prefetch(&self, prefetch: Prefetch) -> Result<(), TransportError> {
        let mut inner = lock(&self.shared);
        self.ensure_open(&inner)?;
        inner.prefetch.insert(self.id, prefetch);
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<(), TransportError> {
        let mut inner = lock(&self.shared);
        self.ensure_open(&inner)?;
        inner.route(StoredMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            content_type: Some(content_type.to_string()),
            body: body.to_vec(),
            redelivered: false,
        })?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<MemoryDeliveries, TransportError> {
        let mut inner = lock(&self.shared);
        self.ensure_open(&inner)?;
        let id = inner.next_id();
        let prefetch = inner.prefetch.get(&self.id).copied();
        let (tx, rx) = mpsc::unbounded_channel();
        let state = inner.queues.get_mut(queue).ok_or_else(|| TransportError::Consume {
            queue: queue.to_string(),
            source: format!("no queue {queue:?}").into(),
        })?;
        if state.owner.is_some_and(|o| o != self.connection) {
            return Err(TransportError::Consume {
                queue: queue.to_string(),
                source: "queue is exclusive to another connection".into(),
            });
        }
        state.consumers.push(ConsumerSlot {
            id,
            channel: self.id,
            prefetch,
            in_flight: InFlight::default(),
            tx,
        });
        inner.pump(queue);
        Ok(MemoryDeliveries {
            rx,
            shared: Arc::clone(&self.shared),
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        lock(&self.shared).close_channel(self.id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

/// The delivery stream of one in-memory consumer.
pub struct MemoryDeliveries {
    rx: mpsc::UnboundedReceiver<MemoryDelivery>,
    shared: Shared,
}

impl DeliveryStream for MemoryDeliveries {
    type Delivery = MemoryDelivery;

    async fn next(&mut self) -> Option<Result<MemoryDelivery, TransportError>> {
        let mut delivery = self.rx.recv().await?;
        delivery.shared = Some(Arc::clone(&self.shared));
        Some(Ok(delivery))
    }
}

/// A delivery from a [`MemoryBroker`] queue.
pub struct MemoryDelivery {
    tag: u64,
    message: StoredMessage,
    shared: Option<Shared>,
}

impl MemoryDelivery {
    fn settle(self, resolution: Resolution) -> Result<(), TransportError> {
        let shared = self
            .shared
            .ok_or_else(|| TransportError::Closed("delivery detached from broker".into()))?;
        lock(&shared).resolve(self.tag, resolution)
    }
}

impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.message.body
    }

    fn content_type(&self) -> Option<&str> {
        self.message.content_type.as_deref()
    }

    fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    async fn ack(self) -> Result<(), TransportError> {
        self.settle(Resolution::Ack)
    }

    async fn nack(self, requeue: bool) -> Result<(), TransportError> {
        self.settle(if requeue {
            Resolution::NackRequeue
        } else {
            Resolution::NackDiscard
        })
    }
}
