use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::{BrokerEvent, BrokerMessage, OrderId, Result};

/// A stream of delivered messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = BrokerMessage> + Send>>;

/// Core trait for publishing to the broker.
///
/// Only transport-level failures are reported; there is no delivery
/// confirmation beyond the returned error.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes a prepared message.
    async fn publish_message(&self, message: BrokerMessage) -> Result<()>;
}

/// Core trait for reading from the broker.
#[async_trait]
pub trait MessageSubscriber: Send + Sync {
    /// Subscribes to a topic.
    ///
    /// The stream yields messages in publish order per key and ends when
    /// the broker shuts down.
    async fn subscribe(&self, topic: &str) -> Result<MessageStream>;
}

/// Extension trait providing keyed publishing helpers.
#[async_trait]
pub trait EventPublisherExt: EventPublisher {
    /// Serializes `payload` and publishes it keyed by `order-<id>`.
    async fn publish<T>(&self, topic: &str, order_id: OrderId, payload: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let message = BrokerMessage::json(topic, order_id.message_key(), payload)?;
        self.publish_message(message).await
    }

    /// Publishes an event to its own topic.
    async fn publish_event<E: BrokerEvent>(&self, event: &E) -> Result<()> {
        self.publish(E::TOPIC, event.order_id(), event).await
    }
}

// Blanket implementation for all EventPublisher implementations
impl<T: EventPublisher + ?Sized> EventPublisherExt for T {}
