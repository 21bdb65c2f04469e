use thiserror::Error;

use crate::{OrderDetailId, OrderId, OrderStatus};

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No order exists with the given id.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No order detail exists with the given id.
    #[error("Order detail not found: {0}")]
    OrderDetailNotFound(OrderDetailId),

    /// The order's current status does not allow the requested one.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The idempotency token has already been recorded.
    #[error("Idempotency token already recorded: {0}")]
    DuplicateIdempotencyToken(String),

    /// A persisted status code does not map to a known status.
    #[error("Unknown order status code: {0}")]
    UnknownStatus(i16),

    /// The backing store rejected or could not complete the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A snapshot could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the error is caused by a row that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::OrderNotFound(_) | StoreError::OrderDetailNotFound(_)
        )
    }
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
