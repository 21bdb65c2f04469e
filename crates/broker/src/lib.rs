//! At-least-once pub/sub transport for saga events.
//!
//! Every message about an order is keyed `order-<id>`, so all events for
//! one order land in the same partition and reach a subscriber in publish
//! order. The [`BackgroundPublisher`] hands messages to a bounded queue so
//! request paths never wait on the broker.

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod memory;
pub mod message;
pub mod publisher;

pub use common::{OrderId, ProductId};
pub use dispatcher::BackgroundPublisher;
pub use error::{BrokerError, Result};
pub use events::{
    BrokerEvent, DeadLetter, OrderCreatedEvent, PaymentOutcomeEvent, ProductItem,
    ProductStockRollbackEvent, ProductStockUpdateEvent, topics,
};
pub use memory::InMemoryBroker;
pub use message::BrokerMessage;
pub use publisher::{EventPublisher, EventPublisherExt, MessageStream, MessageSubscriber};
