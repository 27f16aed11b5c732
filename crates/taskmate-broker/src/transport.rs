//! Broker seam
//!
//! The consumer and producer only talk to a [`Broker`]. A subscription bundles
//! everything one consumer session needs: the delivery stream, a stream of
//! close notifications, and the handles to release when the session ends.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::error::BrokerError;

/// Where a consumer reads from: a durable queue bound to a direct exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

impl Topology {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
        }
    }
}

/// Why a subscription stopped being usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Connection(String),
    Channel(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Connection(reason) => write!(f, "connection closed: {}", reason),
            CloseReason::Channel(reason) => write!(f, "channel closed: {}", reason),
        }
    }
}

/// Settles a single delivery with the broker
#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// Connection/channel handles held for the lifetime of a subscription
#[async_trait]
pub trait Session: Send {
    /// Release the handles. Safe to call on an already broken session.
    async fn close(&mut self);
}

/// One message taken from a queue, not yet settled
pub struct Delivery {
    payload: Vec<u8>,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(payload: Vec<u8>, acker: impl Acknowledge + 'static) -> Self {
        Self {
            payload,
            acker: Box::new(acker),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// A live consumer session
pub struct Subscription {
    pub deliveries: BoxStream<'static, Result<Delivery, BrokerError>>,
    pub closed: BoxStream<'static, CloseReason>,
    pub session: Box<dyn Session>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Connect, declare the topology and start consuming with manual acks
    async fn subscribe(&self, topology: &Topology) -> Result<Subscription, BrokerError>;

    /// Publish one JSON payload to `exchange` with `routing_key`
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError>;
}

pub(crate) fn receiver_stream<T: Send + 'static>(
    rx: mpsc::UnboundedReceiver<T>,
) -> BoxStream<'static, T> {
    futures::stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((item, rx))
    })
    .boxed()
}
