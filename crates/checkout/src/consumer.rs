//! Payment-outcome consumers: apply the outcome, then move stock.

use std::sync::Arc;

use broker::{
    BrokerMessage, DeadLetter, EventPublisher, EventPublisherExt, MessageSubscriber,
    PaymentOutcomeEvent, ProductItem, ProductStockRollbackEvent, ProductStockUpdateEvent, topics,
};
use chrono::Utc;
use futures_util::StreamExt;
use order_store::{OrderStatus, OrderStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ConsumerError;
use crate::retry::RetryPolicy;

/// Which payment outcome a consumer handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentOutcome {
    /// `payment.success`: complete the order and confirm the reservation.
    Success,
    /// `payment.failed`: cancel the order and release the reservation.
    Failure,
}

impl PaymentOutcome {
    /// The topic this outcome arrives on.
    pub fn topic(&self) -> &'static str {
        match self {
            PaymentOutcome::Success => topics::PAYMENT_SUCCESS,
            PaymentOutcome::Failure => topics::PAYMENT_FAILED,
        }
    }

    /// The status an order moves to.
    pub fn target_status(&self) -> OrderStatus {
        match self {
            PaymentOutcome::Success => OrderStatus::Completed,
            PaymentOutcome::Failure => OrderStatus::Cancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Success => "success",
            PaymentOutcome::Failure => "failure",
        }
    }
}

/// What happened to a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The outcome was applied and the stock event published.
    Applied,
    /// Processing failed and the message went to the dead-letter topic.
    DeadLettered,
    /// Processing failed and the message was dropped.
    Skipped,
}

/// Consumes one payment-outcome topic.
///
/// Messages are handled one at a time. For each message the store moves
/// the order to the outcome's status, checking the transition under its
/// row lock, then the products recorded at checkout are published as a
/// stock confirmation or a stock rollback. A redelivered outcome whose
/// status is already applied writes nothing and publishes the stock event
/// again. An outcome for an order already in the opposite terminal status
/// is dead-lettered.
pub struct PaymentOutcomeConsumer<S, P>
where
    S: OrderStore,
    P: EventPublisher + ?Sized,
{
    outcome: PaymentOutcome,
    store: S,
    publisher: Arc<P>,
    policy: RetryPolicy,
}

impl<S, P> PaymentOutcomeConsumer<S, P>
where
    S: OrderStore,
    P: EventPublisher + ?Sized,
{
    /// Creates a consumer for `outcome`.
    pub fn new(outcome: PaymentOutcome, store: S, publisher: Arc<P>, policy: RetryPolicy) -> Self {
        Self {
            outcome,
            store,
            publisher,
            policy,
        }
    }

    /// Returns the outcome this consumer handles.
    pub fn outcome(&self) -> PaymentOutcome {
        self.outcome
    }

    /// Reads the outcome topic until the stream ends or `shutdown` is cancelled.
    ///
    /// Shutdown is only observed between messages.
    pub async fn run<M>(&self, subscriber: &M, shutdown: CancellationToken) -> broker::Result<()>
    where
        M: MessageSubscriber + ?Sized,
    {
        let topic = self.outcome.topic();
        let mut stream = subscriber.subscribe(topic).await?;
        tracing::info!(topic, "payment outcome consumer started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = stream.next() => match next {
                    Some(message) => {
                        self.handle_message(&message).await;
                    }
                    None => break,
                },
            }
        }

        tracing::info!(topic, "payment outcome consumer stopped");
        Ok(())
    }

    /// Processes one message under the retry policy.
    #[tracing::instrument(
        skip(self, message),
        fields(outcome = self.outcome.as_str(), key = %message.key)
    )]
    pub async fn handle_message(&self, message: &BrokerMessage) -> Disposition {
        let mut attempt = 1;
        loop {
            match self.apply(message).await {
                Ok(()) => {
                    metrics::counter!(
                        "payment_outcomes_processed_total",
                        "outcome" => self.outcome.as_str()
                    )
                    .increment(1);
                    return Disposition::Applied;
                }
                Err(error) if !error.is_permanent() && self.policy.should_retry(attempt) => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(attempt, ?delay, %error, "payment outcome failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return self.give_up(message, error, attempt).await,
            }
        }
    }

    async fn apply(&self, message: &BrokerMessage) -> Result<(), ConsumerError> {
        let event: PaymentOutcomeEvent = message.decode().map_err(ConsumerError::Decode)?;
        let order_id = event.order_id;
        let target = self.outcome.target_status();

        let change = self.store.update_status(order_id, target).await?;
        if change.is_unchanged() {
            tracing::debug!(%order_id, status = %target, "status already applied");
        }

        let detail = self
            .store
            .get_order_detail(change.order.order_detail_id)
            .await?;
        let products: Vec<ProductItem> = detail
            .products
            .items()
            .iter()
            .map(|item| ProductItem {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect();

        let published = match self.outcome {
            PaymentOutcome::Success => {
                self.publisher
                    .publish_event(&ProductStockUpdateEvent::new(order_id, products))
                    .await
            }
            PaymentOutcome::Failure => {
                self.publisher
                    .publish_event(&ProductStockRollbackEvent::new(order_id, products))
                    .await
            }
        };
        published.map_err(ConsumerError::Publish)?;

        tracing::info!(%order_id, status = %target, "payment outcome applied");
        Ok(())
    }

    async fn give_up(
        &self,
        message: &BrokerMessage,
        error: ConsumerError,
        attempts: u32,
    ) -> Disposition {
        if !self.policy.dead_letter {
            tracing::error!(attempts, %error, "payment outcome skipped");
            return Disposition::Skipped;
        }

        let dead_letter = DeadLetter {
            source_topic: message.topic.clone(),
            key: message.key.clone(),
            payload: message.payload_lossy(),
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
        };
        let dlq_topic = topics::dead_letter(&message.topic);
        let sent = match BrokerMessage::json(dlq_topic.as_str(), message.key.as_str(), &dead_letter) {
            Ok(dlq_message) => self.publisher.publish_message(dlq_message).await,
            Err(encode_error) => Err(encode_error),
        };

        match sent {
            Ok(()) => {
                metrics::counter!(
                    "payment_outcomes_dead_lettered_total",
                    "outcome" => self.outcome.as_str()
                )
                .increment(1);
                tracing::error!(attempts, %error, topic = %dlq_topic, "payment outcome dead-lettered");
                Disposition::DeadLettered
            }
            Err(dlq_error) => {
                tracing::error!(attempts, %error, %dlq_error, "dead-letter publish failed, payment outcome skipped");
                Disposition::Skipped
            }
        }
    }
}

impl<S, P> PaymentOutcomeConsumer<S, P>
where
    S: OrderStore + 'static,
    P: EventPublisher + ?Sized + 'static,
{
    /// Runs the consumer on its own task.
    pub fn spawn<M>(self, subscriber: Arc<M>, shutdown: CancellationToken) -> JoinHandle<()>
    where
        M: MessageSubscriber + ?Sized + 'static,
    {
        tokio::spawn(async move {
            if let Err(error) = self.run(subscriber.as_ref(), shutdown).await {
                tracing::error!(topic = self.outcome.topic(), %error, "payment outcome consumer failed");
            }
        })
    }
}
