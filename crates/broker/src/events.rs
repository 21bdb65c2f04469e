//! Wire events exchanged with the payment and inventory services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderId, ProductId};

/// Topic names.
pub mod topics {
    /// Published after an order commits; consumed by the payment service.
    pub const ORDER_CREATED: &str = "order.created";
    /// Stock reservation intent at checkout, and confirmation after payment.
    pub const PRODUCT_STOCK_UPDATE: &str = "product.stock.update";
    /// Releases reserved stock after a failed payment.
    pub const PRODUCT_STOCK_ROLLBACK: &str = "product.stock.rollback";
    /// Successful payment outcomes.
    pub const PAYMENT_SUCCESS: &str = "payment.success";
    /// Failed payment outcomes.
    pub const PAYMENT_FAILED: &str = "payment.failed";

    /// Returns the dead-letter topic for a source topic.
    pub fn dead_letter(topic: &str) -> String {
        format!("{topic}.dlq")
    }
}

/// An event with a fixed topic, keyed by the order it concerns.
pub trait BrokerEvent: Serialize + Send + Sync {
    /// The topic this event is published to.
    const TOPIC: &'static str;

    /// The order used as the message key.
    fn order_id(&self) -> OrderId;
}

/// Payload of `order.created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub user_id: common::UserId,
    pub total_amount: f64,
    pub total_qty: i64,
    pub payment_method: String,
    pub shipping_address: String,
}

impl BrokerEvent for OrderCreatedEvent {
    const TOPIC: &'static str = topics::ORDER_CREATED;

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

/// A product and the quantity affected by a stock event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductItem {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Payload of `product.stock.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStockUpdateEvent {
    pub order_id: OrderId,
    pub products: Vec<ProductItem>,
    pub event_time: DateTime<Utc>,
}

impl ProductStockUpdateEvent {
    /// Creates a stock update stamped with the current time.
    pub fn new(order_id: OrderId, products: Vec<ProductItem>) -> Self {
        Self {
            order_id,
            products,
            event_time: Utc::now(),
        }
    }
}

impl BrokerEvent for ProductStockUpdateEvent {
    const TOPIC: &'static str = topics::PRODUCT_STOCK_UPDATE;

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

/// Payload of `product.stock.rollback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStockRollbackEvent {
    pub order_id: OrderId,
    pub products: Vec<ProductItem>,
    pub event_time: DateTime<Utc>,
}

impl ProductStockRollbackEvent {
    /// Creates a stock rollback stamped with the current time.
    pub fn new(order_id: OrderId, products: Vec<ProductItem>) -> Self {
        Self {
            order_id,
            products,
            event_time: Utc::now(),
        }
    }
}

impl BrokerEvent for ProductStockRollbackEvent {
    const TOPIC: &'static str = topics::PRODUCT_STOCK_ROLLBACK;

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

/// Payload of `payment.success` and `payment.failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutcomeEvent {
    pub order_id: OrderId,
}

/// A message that could not be processed, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source_topic: String,
    pub key: String,
    /// Original payload, lossily decoded as UTF-8.
    pub payload: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}
