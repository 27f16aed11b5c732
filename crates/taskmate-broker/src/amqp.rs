//! RabbitMQ broker (AMQP 0-9-1 via lapin)

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    publisher_confirm::Confirmation,
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use taskmate_proto::CONTENT_TYPE;

use crate::error::BrokerError;
use crate::transport::{
    receiver_stream, Acknowledge, Broker, CloseReason, Delivery, Session, Subscription, Topology,
};

/// Broker backed by a RabbitMQ server.
///
/// Every subscription gets its own connection and channel. Publishing reuses
/// one connection, reopened when it is found closed, with a channel per
/// message.
pub struct AmqpBroker {
    dsn: String,
    publisher: Mutex<Option<Connection>>,
}

impl AmqpBroker {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            publisher: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<Connection, BrokerError> {
        Connection::connect(&self.dsn, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))
    }

    async fn publisher_channel(&self) -> Result<Channel, BrokerError> {
        let mut publisher = self.publisher.lock().await;

        if let Some(connection) = publisher.as_ref() {
            if connection.status().connected() {
                return connection
                    .create_channel()
                    .await
                    .map_err(|e| BrokerError::Channel(e.to_string()));
            }
        }

        let connection = self.connect().await?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        *publisher = Some(connection);

        Ok(channel)
    }
}

async fn declare_exchange(channel: &Channel, exchange: &str) -> Result<(), BrokerError> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::Declare(format!("exchange {}: {}", exchange, e)))
}

/// Declare the topology on `channel` and start a manual-ack consumer
async fn open_consumer(
    channel: &Channel,
    topology: &Topology,
) -> Result<lapin::Consumer, BrokerError> {
    declare_exchange(channel, &topology.exchange).await?;

    channel
        .queue_declare(
            &topology.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::Declare(format!("queue {}: {}", topology.queue, e)))?;

    channel
        .queue_bind(
            &topology.queue,
            &topology.exchange,
            &topology.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::Bind(e.to_string()))?;

    channel
        .basic_consume(
            &topology.queue,
            &format!("taskmate-{}", topology.queue),
            BasicConsumeOptions {
                no_ack: false,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::Consume(e.to_string()))
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn subscribe(&self, topology: &Topology) -> Result<Subscription, BrokerError> {
        let connection = self.connect().await?;
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();

        let notify = closed_tx.clone();
        connection.on_error(move |err| {
            let _ = notify.send(CloseReason::Connection(err.to_string()));
        });

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(200, "OK").await;
                return Err(BrokerError::Channel(e.to_string()));
            }
        };

        let notify = closed_tx;
        channel.on_error(move |err| {
            let _ = notify.send(CloseReason::Channel(err.to_string()));
        });

        let consumer = match open_consumer(&channel, topology).await {
            Ok(consumer) => consumer,
            Err(e) => {
                let mut session = AmqpSession {
                    channel: Some(channel),
                    connection: Some(connection),
                };
                session.close().await;
                return Err(e);
            }
        };

        info!(
            exchange = %topology.exchange,
            queue = %topology.queue,
            routing_key = %topology.routing_key,
            "Subscribed to RabbitMQ queue"
        );

        let deliveries = consumer
            .map(|item| {
                item.map(|delivery| Delivery::new(delivery.data, AmqpAcker(delivery.acker)))
                    .map_err(|e| BrokerError::Consume(e.to_string()))
            })
            .boxed();

        Ok(Subscription {
            deliveries,
            closed: receiver_stream(closed_rx),
            session: Box::new(AmqpSession {
                channel: Some(channel),
                connection: Some(connection),
            }),
        })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        let channel = self.publisher_channel().await?;

        let result: Result<(), BrokerError> = async {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|e| BrokerError::Channel(e.to_string()))?;
            declare_exchange(&channel, exchange).await?;

            let confirmation = channel
                .basic_publish(
                    exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    payload,
                    BasicProperties::default().with_content_type(CONTENT_TYPE.into()),
                )
                .await
                .map_err(|e| BrokerError::Publish(e.to_string()))?
                .await
                .map_err(|e| BrokerError::Publish(e.to_string()))?;

            check_confirmation(confirmation, exchange, routing_key)
        }
        .await;

        if let Err(e) = channel.close(200, "OK").await {
            debug!("Failed to close publish channel: {}", e);
        }

        result
    }
}

/// Only a broker ack counts as published
fn check_confirmation(
    confirmation: Confirmation,
    exchange: &str,
    routing_key: &str,
) -> Result<(), BrokerError> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(BrokerError::Publish(format!(
            "broker nacked message for {}/{}",
            exchange, routing_key
        ))),
        Confirmation::NotRequested => Err(BrokerError::Publish(
            "publisher confirms are not enabled on the channel".to_string(),
        )),
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledge for AmqpAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}

struct AmqpSession {
    channel: Option<Channel>,
    connection: Option<Connection>,
}

#[async_trait]
impl Session for AmqpSession {
    async fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            if channel.status().connected() {
                if let Err(e) = channel.close(200, "OK").await {
                    debug!("Failed to close channel: {}", e);
                }
            }
        }

        if let Some(connection) = self.connection.take() {
            if connection.status().connected() {
                if let Err(e) = connection.close(200, "OK").await {
                    debug!("Failed to close connection: {}", e);
                }
            }
        }
    }
}
