//! Generic reconnecting consumer
//!
//! A [`Consumer`] owns one queue subscription at a time. It decodes each
//! delivery into the handler's message type and acknowledges it only after
//! the handler returned `Ok`. Decode and handler failures are negatively
//! acknowledged with requeue, so the broker delivers the message again. Losing
//! the connection or channel closes the session, waits the fixed backoff and
//! subscribes again, forever, until the cancellation token fires.
//!
//! Cancellation is only observed while waiting for the next event, never while
//! a handler is running. Deliveries that were not acknowledged when the
//! consumer stops are redelivered by the broker.

use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reconnect::{ReconnectManager, ReconnectPolicy};
use crate::transport::{Broker, Delivery, Subscription, Topology};

/// Error returned by a [`MessageHandler`]; any error requeues the message
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Business logic run for every decoded message
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    type Message: DeserializeOwned + std::fmt::Debug + Send;

    async fn handle(&self, message: Self::Message) -> Result<(), HandlerError>;
}

/// Something the supervisor can run until cancelled
#[async_trait]
pub trait RunnableConsumer: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, cancel: CancellationToken);
}

enum SessionEnd {
    Cancelled,
    Lost(String),
}

pub struct Consumer<H> {
    name: String,
    topology: Topology,
    handler: H,
    broker: Arc<dyn Broker>,
    policy: ReconnectPolicy,
}

impl<H: MessageHandler> Consumer<H> {
    pub fn new(
        name: impl Into<String>,
        topology: Topology,
        handler: H,
        broker: Arc<dyn Broker>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            topology,
            handler,
            broker,
            policy,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Pump one subscription until it breaks or we are cancelled
    async fn consume(
        &self,
        subscription: &mut Subscription,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return SessionEnd::Cancelled,

                reason = subscription.closed.next() => {
                    let reason = reason
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "close notifier dropped".to_string());
                    return SessionEnd::Lost(reason);
                }

                next = subscription.deliveries.next() => match next {
                    Some(Ok(delivery)) => self.process(delivery).await,
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("delivery stream ended".to_string()),
                },
            }
        }
    }

    async fn process(&self, delivery: Delivery) {
        let message: H::Message = match serde_json::from_slice(delivery.payload()) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    consumer = %self.name,
                    error = %e,
                    payload = %String::from_utf8_lossy(delivery.payload()),
                    "Failed to decode message, requeueing"
                );
                if let Err(e) = delivery.nack(true).await {
                    warn!(consumer = %self.name, error = %e, "Failed to nack message");
                }
                return;
            }
        };

        debug!(consumer = %self.name, message = ?message, "Processing message");

        match self.handler.handle(message).await {
            Ok(()) => {
                if let Err(e) = delivery.ack().await {
                    warn!(consumer = %self.name, error = %e, "Failed to ack message");
                }
            }
            Err(e) => {
                error!(consumer = %self.name, error = %e, "Handler failed, requeueing");
                if let Err(e) = delivery.nack(true).await {
                    warn!(consumer = %self.name, error = %e, "Failed to nack message");
                }
            }
        }
    }
}

#[async_trait]
impl<H: MessageHandler> RunnableConsumer for Consumer<H> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut reconnect = ReconnectManager::new(self.policy.clone());

        info!(
            consumer = %self.name,
            queue = %self.topology.queue,
            routing_key = %self.topology.routing_key,
            "Starting consumer"
        );

        loop {
            let subscribed = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.broker.subscribe(&self.topology) => result,
            };

            let mut subscription = match subscribed {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!(
                        consumer = %self.name,
                        error = %e,
                        attempt = reconnect.attempt() + 1,
                        "Failed to subscribe, retrying in {}s",
                        reconnect.interval().as_secs_f64()
                    );
                    if reconnect.wait(&cancel).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            reconnect.reset();
            info!(consumer = %self.name, queue = %self.topology.queue, "Consumer subscribed");

            let end = self.consume(&mut subscription, &cancel).await;
            subscription.session.close().await;

            match end {
                SessionEnd::Cancelled => break,
                SessionEnd::Lost(reason) => {
                    warn!(
                        consumer = %self.name,
                        reason = %reason,
                        "Broker session lost, reconnecting in {}s",
                        reconnect.interval().as_secs_f64()
                    );
                    if reconnect.wait(&cancel).await.is_err() {
                        break;
                    }
                }
            }
        }

        info!(consumer = %self.name, "Consumer stopped");
    }
}
