//! Persisted order rows and the order status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::{ProductsSnapshot, StatusHistory};
use crate::{OrderDetailId, OrderId, Result, StoreError, UserId};

/// The status of an order.
///
/// Stored as a small integer code. Transitions:
/// ```text
/// Created ──┬──► Completed
///           ├──► Cancelled
///           └──► Processing ──┬──► Completed
///                             └──► Cancelled
/// ```
/// `Failed` is reserved for write paths that never commit an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order accepted and persisted, awaiting payment outcome.
    #[default]
    Created,

    /// Payment in progress.
    Processing,

    /// Payment succeeded (terminal state).
    Completed,

    /// Payment failed and reserved stock is released (terminal state).
    Cancelled,

    /// Order could not be persisted.
    Failed,
}

/// Label used for status codes that do not map to a known status.
pub const UNKNOWN_STATUS_LABEL: &str = "Unknown";

impl OrderStatus {
    /// Returns the numeric code stored in the `status` column.
    pub fn code(&self) -> i16 {
        match self {
            OrderStatus::Created => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Completed => 2,
            OrderStatus::Cancelled => 3,
            OrderStatus::Failed => 4,
        }
    }

    /// Parses a stored status code.
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(OrderStatus::Created),
            1 => Some(OrderStatus::Processing),
            2 => Some(OrderStatus::Completed),
            3 => Some(OrderStatus::Cancelled),
            4 => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    /// Returns the display label for a raw status code.
    ///
    /// Total over all codes: anything unrecognized is labelled "Unknown".
    pub fn label_for_code(code: i16) -> &'static str {
        Self::from_code(code)
            .map(|status| status.as_str())
            .unwrap_or(UNKNOWN_STATUS_LABEL)
    }

    /// Returns the display label.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "Created",
            OrderStatus::Processing => "Processing",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Failed => "Failed",
        }
    }

    /// Returns the lowercase name written into the status history snapshot.
    pub fn history_label(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns true if an order in this status may move to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (OrderStatus::Created, OrderStatus::Processing)
            | (OrderStatus::Created, OrderStatus::Completed)
            | (OrderStatus::Created, OrderStatus::Cancelled)
            | (OrderStatus::Processing, OrderStatus::Completed)
            | (OrderStatus::Processing, OrderStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// The detail row written in the same transaction as this order.
    pub order_detail_id: OrderDetailId,
    pub total_amount: f64,
    pub total_qty: i64,
    pub status: OrderStatus,
    pub payment_method: String,
    pub shipping_address: String,
}

impl Order {
    /// Moves the order to `next` following the status machine.
    ///
    /// Requesting the current status is accepted and leaves the order as is.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<StatusChange> {
        let previous = self.status;
        if previous != next {
            if !previous.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    order_id: self.id,
                    from: previous,
                    to: next,
                });
            }
            self.status = next;
        }
        Ok(StatusChange {
            order: self.clone(),
            previous,
        })
    }
}

/// The result of a committed status update.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    /// The order after the update.
    pub order: Order,
    /// The status the order had before the update.
    pub previous: OrderStatus,
}

impl StatusChange {
    /// Returns true if the order already had the requested status.
    pub fn is_unchanged(&self) -> bool {
        self.previous == self.order.status
    }
}

/// An order that has not been inserted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total_amount: f64,
    pub total_qty: i64,
    pub status: OrderStatus,
    pub payment_method: String,
    pub shipping_address: String,
}

impl NewOrder {
    /// Attaches the generated ids, producing the stored row.
    pub fn into_order(self, id: OrderId, order_detail_id: OrderDetailId) -> Order {
        Order {
            id,
            user_id: self.user_id,
            order_detail_id,
            total_amount: self.total_amount,
            total_qty: self.total_qty,
            status: self.status,
            payment_method: self.payment_method,
            shipping_address: self.shipping_address,
        }
    }
}

/// The audit record written alongside an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub id: OrderDetailId,
    /// Items as validated at checkout. Never rewritten.
    pub products: ProductsSnapshot,
    /// Append-only list of status changes.
    pub status_history: StatusHistory,
}

/// An order detail that has not been inserted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderDetail {
    pub products: ProductsSnapshot,
    pub status_history: StatusHistory,
}

/// A recorded idempotency token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub token: String,
    pub created_at: DateTime<Utc>,
    /// The order the token was reserved for, when recorded atomically.
    pub order_id: Option<OrderId>,
}
