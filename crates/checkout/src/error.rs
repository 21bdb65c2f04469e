//! Checkout and consumer error types.

use broker::BrokerError;
use order_store::{OrderId, OrderStatus, ProductId, StoreError};
use thiserror::Error;

/// Reasons a cart is rejected during validation.
///
/// Always caused by the request itself. Never retried and never leaves
/// side effects behind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The request has no line items.
    #[error("Cart is empty")]
    EmptyCart,

    /// The same product appears on more than one line.
    #[error("Product {0} appears more than once")]
    DuplicateLineItem(ProductId),

    /// Quantity is outside the accepted range.
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    /// The client's price differs from the catalog price.
    #[error("Price mismatch for product {product_id}: claimed {claimed}, catalog {actual}")]
    PriceMismatch {
        product_id: ProductId,
        claimed: f64,
        actual: f64,
    },

    /// Not enough stock for the requested quantity.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },
}

impl ValidationError {
    /// Returns a stable machine-readable name.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::EmptyCart => "empty_cart",
            ValidationError::DuplicateLineItem(_) => "duplicate_line_item",
            ValidationError::InvalidQuantity { .. } => "invalid_quantity",
            ValidationError::PriceMismatch { .. } => "price_mismatch",
            ValidationError::InsufficientStock { .. } => "insufficient_stock",
        }
    }
}

/// Errors returned by [`CheckoutOrchestrator::checkout`](crate::CheckoutOrchestrator::checkout).
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart failed validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A checkout with the same idempotency token was already accepted.
    #[error("Duplicate submission for idempotency token '{0}'")]
    DuplicateSubmission(String),

    /// The catalog could not be reached or did not answer in time.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The order could not be persisted. The transaction was rolled back.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl CheckoutError {
    /// Returns a stable machine-readable name.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::Validation(inner) => inner.kind(),
            CheckoutError::DuplicateSubmission(_) => "duplicate_submission",
            CheckoutError::CatalogUnavailable(_) => "catalog_unavailable",
            CheckoutError::Persistence(_) => "persistence_failure",
        }
    }
}

/// Errors raised while applying a payment outcome.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The message payload is not a valid payment outcome.
    #[error("Malformed payment outcome: {0}")]
    Decode(#[source] BrokerError),

    /// The order cannot move to the requested status.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The store failed.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// The follow-up stock event could not be published.
    #[error("Publish error: {0}")]
    Publish(#[source] BrokerError),
}

impl From<StoreError> for ConsumerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::InvalidTransition { order_id, from, to } => {
                ConsumerError::InvalidTransition { order_id, from, to }
            }
            other => ConsumerError::Store(other),
        }
    }
}

impl ConsumerError {
    /// Returns true if retrying the same message cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            ConsumerError::Decode(_) | ConsumerError::InvalidTransition { .. } => true,
            ConsumerError::Store(error) => error.is_not_found(),
            ConsumerError::Publish(BrokerError::Serialization(_)) => true,
            ConsumerError::Publish(_) => false,
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
