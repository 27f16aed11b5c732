//! In-process broker
//!
//! Implements the parts of AMQP the consumers rely on: direct-exchange
//! routing, durable queues that outlive consumers, manual acknowledgement and
//! redelivery of unacknowledged messages when a session goes away. Queues are
//! dispatched round-robin with no prefetch limit.
//!
//! It also exposes fault injection (refused connects, forced channel closes)
//! and per-queue counters so reconnect behaviour can be exercised without a
//! RabbitMQ server.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::BrokerError;
use crate::transport::{
    receiver_stream, Acknowledge, Broker, CloseReason, Delivery, Session, Subscription, Topology,
};

type Shared = Arc<Mutex<Inner>>;

#[derive(Default)]
struct Inner {
    exchanges: HashSet<String>,
    bindings: HashMap<(String, String), BTreeSet<String>>,
    queues: HashMap<String, QueueState>,
    sessions: HashMap<u64, SessionState>,
    next_session: u64,
    next_tag: u64,
    refused_connects: usize,
    connect_attempts: usize,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Vec<u8>>,
    consumers: Vec<u64>,
    next_consumer: usize,
    acked: usize,
    nacked: usize,
}

struct SessionState {
    queue: String,
    deliveries: mpsc::UnboundedSender<Result<Delivery, BrokerError>>,
    closed: mpsc::UnboundedSender<CloseReason>,
    unacked: HashMap<u64, Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Shared,
}

fn lock(shared: &Shared) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` subscribe calls fail as if the server was down
    pub fn refuse_connections(&self, count: usize) {
        lock(&self.inner).refused_connects = count;
    }

    /// Close every open channel, as a broker restart would.
    ///
    /// Unacknowledged deliveries go back to their queues.
    pub fn close_channels(&self, reason: &str) {
        let mut inner = lock(&self.inner);
        let ids: Vec<u64> = inner.sessions.keys().copied().collect();
        for id in ids {
            if let Some(session) = inner.sessions.get(&id) {
                let _ = session
                    .closed
                    .send(CloseReason::Channel(reason.to_string()));
            }
            end_session(&mut inner, &self.inner, id);
        }
    }

    pub fn connect_attempts(&self) -> usize {
        lock(&self.inner).connect_attempts
    }

    /// Messages waiting in `queue` that no consumer holds
    pub fn ready(&self, queue: &str) -> usize {
        lock(&self.inner)
            .queues
            .get(queue)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    /// Messages delivered from `queue` and not yet settled
    pub fn unacked(&self, queue: &str) -> usize {
        lock(&self.inner)
            .sessions
            .values()
            .filter(|s| s.queue == queue)
            .map(|s| s.unacked.len())
            .sum()
    }

    pub fn acked(&self, queue: &str) -> usize {
        lock(&self.inner)
            .queues
            .get(queue)
            .map(|q| q.acked)
            .unwrap_or(0)
    }

    pub fn nacked(&self, queue: &str) -> usize {
        lock(&self.inner)
            .queues
            .get(queue)
            .map(|q| q.nacked)
            .unwrap_or(0)
    }

    /// Number of live consumer sessions on `queue`
    pub fn consumers(&self, queue: &str) -> usize {
        lock(&self.inner)
            .queues
            .get(queue)
            .map(|q| q.consumers.len())
            .unwrap_or(0)
    }
}

/// Hand ready messages to consumers until one side runs out
fn dispatch(inner: &mut Inner, shared: &Shared, queue_name: &str) {
    let Inner {
        queues,
        sessions,
        next_tag,
        ..
    } = inner;

    let Some(queue) = queues.get_mut(queue_name) else {
        return;
    };

    while !queue.ready.is_empty() && !queue.consumers.is_empty() {
        let slot = queue.next_consumer % queue.consumers.len();
        let session_id = queue.consumers[slot];
        queue.next_consumer = slot + 1;

        let Some(session) = sessions.get_mut(&session_id) else {
            queue.consumers.remove(slot);
            continue;
        };

        let Some(payload) = queue.ready.pop_front() else {
            break;
        };

        *next_tag += 1;
        let tag = *next_tag;
        let acker = MemoryAcker {
            shared: shared.clone(),
            session: session_id,
            tag,
        };

        if session
            .deliveries
            .send(Ok(Delivery::new(payload.clone(), acker)))
            .is_err()
        {
            // Receiver is gone, the consumer dropped its subscription
            queue.ready.push_front(payload);
            queue.consumers.remove(slot);
            continue;
        }

        session.unacked.insert(tag, payload);
    }
}

/// Remove a session and requeue what it still held
fn end_session(inner: &mut Inner, shared: &Shared, session_id: u64) {
    let Some(session) = inner.sessions.remove(&session_id) else {
        return;
    };

    let queue_name = session.queue.clone();
    if let Some(queue) = inner.queues.get_mut(&queue_name) {
        queue.consumers.retain(|id| *id != session_id);

        let mut unacked: Vec<(u64, Vec<u8>)> = session.unacked.into_iter().collect();
        unacked.sort_by_key(|(tag, _)| *tag);
        for (_, payload) in unacked.into_iter().rev() {
            queue.ready.push_front(payload);
        }
    }

    debug!(session = session_id, queue = %queue_name, "Memory broker session ended");
    dispatch(inner, shared, &queue_name);
}

struct MemoryAcker {
    shared: Shared,
    session: u64,
    tag: u64,
}

impl MemoryAcker {
    fn settle(&self, requeue: Option<bool>) -> Result<(), BrokerError> {
        let mut inner = lock(&self.shared);

        let (queue_name, payload) = match inner.sessions.get_mut(&self.session) {
            Some(session) => match session.unacked.remove(&self.tag) {
                Some(payload) => (session.queue.clone(), payload),
                None => {
                    return Err(BrokerError::Ack(format!(
                        "unknown delivery tag {}",
                        self.tag
                    )))
                }
            },
            None => return Err(BrokerError::Ack("channel is closed".into())),
        };

        let Some(queue) = inner.queues.get_mut(&queue_name) else {
            return Ok(());
        };

        match requeue {
            None => queue.acked += 1,
            Some(requeue) => {
                queue.nacked += 1;
                if requeue {
                    queue.ready.push_back(payload);
                }
            }
        }

        dispatch(&mut inner, &self.shared, &queue_name);
        Ok(())
    }
}

#[async_trait]
impl Acknowledge for MemoryAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.settle(None)
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.settle(Some(requeue))
    }
}

struct MemorySession {
    shared: Shared,
    id: u64,
}

#[async_trait]
impl Session for MemorySession {
    async fn close(&mut self) {
        let mut inner = lock(&self.shared);
        end_session(&mut inner, &self.shared, self.id);
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let mut inner = lock(&self.shared);
        end_session(&mut inner, &self.shared, self.id);
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(&self, topology: &Topology) -> Result<Subscription, BrokerError> {
        let mut inner = lock(&self.inner);
        inner.connect_attempts += 1;

        if inner.refused_connects > 0 {
            inner.refused_connects -= 1;
            return Err(BrokerError::Connect("connection refused".into()));
        }

        inner.exchanges.insert(topology.exchange.clone());
        inner.queues.entry(topology.queue.clone()).or_default();
        inner
            .bindings
            .entry((topology.exchange.clone(), topology.routing_key.clone()))
            .or_default()
            .insert(topology.queue.clone());

        inner.next_session += 1;
        let id = inner.next_session;
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();

        inner.sessions.insert(
            id,
            SessionState {
                queue: topology.queue.clone(),
                deliveries: delivery_tx,
                closed: closed_tx,
                unacked: HashMap::new(),
            },
        );
        if let Some(queue) = inner.queues.get_mut(&topology.queue) {
            queue.consumers.push(id);
        }

        dispatch(&mut inner, &self.inner, &topology.queue);

        Ok(Subscription {
            deliveries: receiver_stream(delivery_rx),
            closed: receiver_stream(closed_rx),
            session: Box::new(MemorySession {
                shared: self.inner.clone(),
                id,
            }),
        })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        let mut inner = lock(&self.inner);
        inner.exchanges.insert(exchange.to_string());

        let targets: Vec<String> = inner
            .bindings
            .get(&(exchange.to_string(), routing_key.to_string()))
            .map(|queues| queues.iter().cloned().collect())
            .unwrap_or_default();

        if targets.is_empty() {
            debug!(exchange, routing_key, "No queue bound, message dropped");
            return Ok(());
        }

        for queue_name in targets {
            if let Some(queue) = inner.queues.get_mut(&queue_name) {
                queue.ready.push_back(payload.to_vec());
            }
            dispatch(&mut inner, &self.inner, &queue_name);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn topology() -> Topology {
        Topology::new("social", "friend_requests", "friend_request")
    }

    #[tokio::test]
    async fn test_routes_by_binding() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&topology()).await.unwrap();

        broker
            .publish("social", "friend_request", b"hello")
            .await
            .unwrap();
        broker
            .publish("social", "team_request", b"nobody listens")
            .await
            .unwrap();

        let delivery = sub.deliveries.next().await.unwrap().unwrap();
        assert_eq!(delivery.payload(), b"hello");
        delivery.ack().await.unwrap();

        assert_eq!(broker.acked("friend_requests"), 1);
        assert_eq!(broker.ready("friend_requests"), 0);
    }

    #[tokio::test]
    async fn test_queue_keeps_messages_without_consumers() {
        let broker = MemoryBroker::new();
        let sub = broker.subscribe(&topology()).await.unwrap();
        drop(sub);

        broker.publish("social", "friend_request", b"a").await.unwrap();
        broker.publish("social", "friend_request", b"b").await.unwrap();
        assert_eq!(broker.ready("friend_requests"), 2);
        assert_eq!(broker.consumers("friend_requests"), 0);

        let mut sub = broker.subscribe(&topology()).await.unwrap();
        let first = sub.deliveries.next().await.unwrap().unwrap();
        assert_eq!(first.payload(), b"a");
    }

    #[tokio::test]
    async fn test_nack_requeues() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&topology()).await.unwrap();
        broker.publish("social", "friend_request", b"x").await.unwrap();

        let first = sub.deliveries.next().await.unwrap().unwrap();
        first.nack(true).await.unwrap();

        let again = sub.deliveries.next().await.unwrap().unwrap();
        assert_eq!(again.payload(), b"x");
        again.ack().await.unwrap();

        assert_eq!(broker.nacked("friend_requests"), 1);
        assert_eq!(broker.acked("friend_requests"), 1);
    }

    #[tokio::test]
    async fn test_close_requeues_unacked_and_rejects_late_ack() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&topology()).await.unwrap();
        broker.publish("social", "friend_request", b"x").await.unwrap();

        let delivery = sub.deliveries.next().await.unwrap().unwrap();
        assert_eq!(broker.unacked("friend_requests"), 1);

        broker.close_channels("broker restarting");

        let reason = sub.closed.next().await.unwrap();
        assert!(matches!(reason, CloseReason::Channel(_)));
        assert!(delivery.ack().await.is_err());
        assert_eq!(broker.ready("friend_requests"), 1);
        assert_eq!(broker.unacked("friend_requests"), 0);
    }

    #[tokio::test]
    async fn test_refused_connections() {
        let broker = MemoryBroker::new();
        broker.refuse_connections(2);

        assert!(broker.subscribe(&topology()).await.is_err());
        assert!(broker.subscribe(&topology()).await.is_err());
        assert!(broker.subscribe(&topology()).await.is_ok());
        assert_eq!(broker.connect_attempts(), 3);
    }
}
