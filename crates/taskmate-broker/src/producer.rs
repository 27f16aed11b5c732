//! Envelope publishing
//!
//! The routing key is chosen from the message kind alone. Failures are
//! returned to the caller as-is: no retry, no buffering.

use std::collections::HashMap;
use std::sync::Arc;
use taskmate_proto::{Envelope, MessageKind};
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::transport::Broker;

pub struct Producer {
    broker: Arc<dyn Broker>,
    exchange: String,
    routes: HashMap<MessageKind, String>,
}

impl Producer {
    pub fn new(broker: Arc<dyn Broker>, exchange: impl Into<String>) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            routes: HashMap::new(),
        }
    }

    pub fn with_route(mut self, kind: MessageKind, routing_key: impl Into<String>) -> Self {
        self.routes.insert(kind, routing_key.into());
        self
    }

    /// Producer routing to the queues configured for the consumers
    pub fn from_config(broker: Arc<dyn Broker>, config: &BrokerConfig) -> Self {
        let mut producer = Self::new(broker, config.exchange.clone());
        for kind in [MessageKind::Friend, MessageKind::Team] {
            if let Ok(queue) = config.queue(kind) {
                producer = producer.with_route(kind, queue.routing_key.clone());
            }
        }
        producer
    }

    pub async fn publish(&self, envelope: &Envelope) -> Result<(), BrokerError> {
        let routing_key = self
            .routes
            .get(&envelope.message_kind)
            .ok_or_else(|| BrokerError::MissingRoute(envelope.message_kind.to_string()))?;

        let payload = envelope.to_json()?;

        if let Err(e) = self
            .broker
            .publish(&self.exchange, routing_key, &payload)
            .await
        {
            warn!(
                kind = %envelope.message_kind,
                relation_id = envelope.relation_id,
                error = %e,
                "Failed to publish envelope"
            );
            return Err(e);
        }

        debug!(
            exchange = %self.exchange,
            routing_key = %routing_key,
            relation_id = envelope.relation_id,
            "Published envelope"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockBroker;
    use std::sync::Mutex;
    use taskmate_proto::Action;

    type Published = Arc<Mutex<Vec<(String, String, Vec<u8>)>>>;

    fn recording_broker(published: &Published) -> MockBroker {
        let published = published.clone();
        let mut broker = MockBroker::new();
        broker
            .expect_publish()
            .returning(move |exchange, routing_key, payload| {
                published.lock().unwrap().push((
                    exchange.to_string(),
                    routing_key.to_string(),
                    payload.to_vec(),
                ));
                Ok(())
            });
        broker
    }

    #[tokio::test]
    async fn test_routes_by_message_kind() {
        let published: Published = Arc::default();
        let broker = recording_broker(&published);
        let producer = Producer::from_config(Arc::new(broker), &BrokerConfig::new("memory://"));

        producer
            .publish(&Envelope::friend(Action::Accept, 7, 1, 2))
            .await
            .unwrap();
        producer
            .publish(&Envelope::team(Action::Accept, 3, 1, 2))
            .await
            .unwrap();

        let published = published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, "social");
        assert_eq!(published[0].1, "friend_request");
        assert_eq!(published[1].0, "social");
        assert_eq!(published[1].1, "team_request");

        let decoded = Envelope::from_json(&published[0].2).unwrap();
        assert_eq!(decoded, Envelope::friend(Action::Accept, 7, 1, 2));
    }

    #[tokio::test]
    async fn test_missing_route_is_an_error() {
        let mut broker = MockBroker::new();
        broker.expect_publish().never();

        let producer = Producer::new(Arc::new(broker), "social")
            .with_route(MessageKind::Friend, "friend_request");

        let err = producer
            .publish(&Envelope::team(Action::Accept, 3, 1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::MissingRoute(_)));
    }

    #[tokio::test]
    async fn test_broker_failure_is_returned() {
        let mut broker = MockBroker::new();
        broker
            .expect_publish()
            .times(1)
            .returning(|_, _, _| Err(BrokerError::Connect("connection refused".into())));

        let producer = Producer::from_config(Arc::new(broker), &BrokerConfig::new("memory://"));
        let err = producer
            .publish(&Envelope::friend(Action::Reject, 7, 1, 2))
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::Connect(_)));
    }
}
