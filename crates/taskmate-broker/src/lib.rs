//! Reliable message consumption for taskmate
//!
//! This crate provides:
//! - A [`Broker`] seam with a RabbitMQ implementation ([`AmqpBroker`]) and an
//!   in-process one ([`MemoryBroker`])
//! - A generic [`Consumer`] that reconnects forever with a fixed backoff and
//!   acknowledges each delivery only after its handler succeeded
//! - A [`ConsumerSupervisor`] that runs consumers and stops them together
//! - A [`Producer`] that routes envelopes by message kind

pub mod amqp;
pub mod config;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod producer;
pub mod reconnect;
pub mod supervisor;
pub mod transport;

pub use amqp::AmqpBroker;
pub use config::{BrokerConfig, QueueConfig};
pub use consumer::{Consumer, HandlerError, MessageHandler, RunnableConsumer};
pub use error::BrokerError;
pub use memory::MemoryBroker;
pub use producer::Producer;
pub use reconnect::{ReconnectError, ReconnectManager, ReconnectPolicy};
pub use supervisor::ConsumerSupervisor;
pub use transport::{
    Acknowledge, Broker, CloseReason, Delivery, Session, Subscription, Topology,
};

use std::sync::Arc;

/// Build the broker for a DSN.
///
/// `memory://` selects the in-process broker, anything else is treated as an
/// AMQP URI.
pub fn connect(dsn: &str) -> Arc<dyn Broker> {
    if dsn.starts_with("memory://") {
        Arc::new(MemoryBroker::new())
    } else {
        Arc::new(AmqpBroker::new(dsn))
    }
}
