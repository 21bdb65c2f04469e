//! Bounded background publishing.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::{BrokerError, BrokerEvent, BrokerMessage, EventPublisher, Result};

/// Hands messages to a single background worker through a bounded queue.
///
/// [`dispatch`](Self::dispatch) never waits: when the queue is full or the
/// worker has stopped the message is dropped and an error is returned. The
/// worker publishes in queue order, so messages dispatched from one task
/// reach the broker in the order they were dispatched.
#[derive(Clone)]
pub struct BackgroundPublisher {
    tx: mpsc::Sender<BrokerMessage>,
}

impl BackgroundPublisher {
    /// Spawns the worker and returns a handle to its queue.
    ///
    /// The worker exits once every clone of the returned publisher is
    /// dropped and the queue has drained.
    pub fn spawn<P>(publisher: Arc<P>, capacity: usize) -> (Self, JoinHandle<()>)
    where
        P: EventPublisher + ?Sized + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<BrokerMessage>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let topic = message.topic.clone();
                let key = message.key.clone();
                match publisher.publish_message(message).await {
                    Ok(()) => {
                        metrics::counter!("events_published_total", "topic" => topic.clone())
                            .increment(1);
                        tracing::debug!(%topic, %key, "event published");
                    }
                    Err(error) => {
                        metrics::counter!("events_publish_failed_total", "topic" => topic.clone())
                            .increment(1);
                        tracing::error!(%topic, %key, %error, "event publish failed");
                    }
                }
            }
            tracing::debug!("publish queue drained");
        });

        (Self { tx }, worker)
    }

    /// Queues a message without waiting.
    pub fn dispatch(&self, message: BrokerMessage) -> Result<()> {
        self.tx.try_send(message).map_err(|error| {
            let (reason, message) = match error {
                TrySendError::Full(message) => (BrokerError::QueueFull, message),
                TrySendError::Closed(message) => (BrokerError::QueueClosed, message),
            };
            metrics::counter!("events_publish_failed_total", "topic" => message.topic.clone())
                .increment(1);
            tracing::error!(topic = %message.topic, key = %message.key, error = %reason, "event dropped");
            reason
        })
    }

    /// Serializes an event and queues it on its own topic.
    pub fn dispatch_event<E: BrokerEvent>(&self, event: &E) -> Result<()> {
        let message = BrokerMessage::json(E::TOPIC, event.order_id().message_key(), event)?;
        self.dispatch(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryBroker, OrderId, PaymentOutcomeEvent, ProductStockUpdateEvent, topics};
    use async_trait::async_trait;

    #[tokio::test]
    async fn dispatched_events_reach_broker_in_order() {
        let broker = Arc::new(InMemoryBroker::new());
        let (publisher, worker) = BackgroundPublisher::spawn(broker.clone(), 16);

        let order = OrderId::new(9);
        publisher
            .dispatch(BrokerMessage::json(topics::ORDER_CREATED, order.message_key(), &1).unwrap())
            .unwrap();
        publisher
            .dispatch_event(&ProductStockUpdateEvent::new(order, vec![]))
            .unwrap();

        drop(publisher);
        worker.await.unwrap();

        assert_eq!(broker.message_count(topics::ORDER_CREATED).await, 1);
        let updates = broker.messages(topics::PRODUCT_STOCK_UPDATE).await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].key, "order-9");
    }

    /// Publisher that never completes, to keep the queue occupied.
    struct StalledPublisher;

    #[async_trait]
    impl EventPublisher for StalledPublisher {
        async fn publish_message(&self, _message: BrokerMessage) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let (publisher, worker) = BackgroundPublisher::spawn(Arc::new(StalledPublisher), 1);
        let event = PaymentOutcomeEvent {
            order_id: OrderId::new(1),
        };
        let message = || BrokerMessage::json(topics::PAYMENT_SUCCESS, "order-1", &event).unwrap();

        // The worker may already hold the first message; fill past capacity.
        let results: Vec<_> = (0..4).map(|_| publisher.dispatch(message())).collect();

        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(BrokerError::QueueFull)))
        );
        worker.abort();
    }

    #[tokio::test]
    async fn stopped_worker_reports_closed_queue() {
        let broker = Arc::new(InMemoryBroker::new());
        let (publisher, worker) = BackgroundPublisher::spawn(broker, 4);
        worker.abort();
        let _ = worker.await;

        let result = publisher.dispatch(BrokerMessage::new("t", "order-1", b"{}".to_vec()));
        assert!(matches!(result, Err(BrokerError::QueueClosed)));
    }

    #[tokio::test]
    async fn broker_failures_are_absorbed_by_worker() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.fail_next_publishes(topics::ORDER_CREATED, 1).await;
        let (publisher, worker) = BackgroundPublisher::spawn(broker.clone(), 4);

        for _ in 0..2 {
            publisher
                .dispatch(BrokerMessage::new(topics::ORDER_CREATED, "order-1", b"{}".to_vec()))
                .unwrap();
        }
        drop(publisher);
        worker.await.unwrap();

        assert_eq!(broker.message_count(topics::ORDER_CREATED).await, 1);
    }
}
