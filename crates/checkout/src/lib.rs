//! Checkout saga: order acceptance and payment-outcome handling.
//!
//! The saga is choreographed through the broker:
//! 1. [`CheckoutOrchestrator`] validates a cart against the catalog, commits
//!    the order with its detail row, and queues `order.created` and
//!    `product.stock.update` (reservation intent)
//! 2. The payment service answers on `payment.success` or `payment.failed`
//! 3. [`PaymentOutcomeConsumer`] completes or cancels the order and publishes
//!    a stock confirmation or a stock rollback
//!
//! There is no central coordinator and delivery is at-least-once.

pub mod catalog;
pub mod consumer;
pub mod error;
pub mod orchestrator;
pub mod request;
pub mod retry;

pub use catalog::{CatalogClient, CatalogError, HttpCatalogClient, InMemoryCatalog, Product};
pub use consumer::{Disposition, PaymentOutcome, PaymentOutcomeConsumer};
pub use error::{CheckoutError, ConsumerError, Result, ValidationError};
pub use orchestrator::{CheckoutConfig, CheckoutOrchestrator, IdempotencyMode};
pub use request::{CheckoutItem, CheckoutRequest, MAX_QUANTITY, MIN_QUANTITY};
pub use retry::RetryPolicy;
