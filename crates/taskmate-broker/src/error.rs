//! Broker errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Failed to connect to broker: {0}")]
    Connect(String),

    #[error("Failed to open channel: {0}")]
    Channel(String),

    #[error("Failed to declare {0}")]
    Declare(String),

    #[error("Failed to bind queue: {0}")]
    Bind(String),

    #[error("Failed to start consuming: {0}")]
    Consume(String),

    #[error("Failed to publish: {0}")]
    Publish(String),

    #[error("Failed to acknowledge delivery: {0}")]
    Ack(String),

    #[error("No route configured for {0} messages")]
    MissingRoute(String),

    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] taskmate_proto::ProtoError),

    #[error("Invalid broker configuration: {0}")]
    InvalidConfig(String),
}
