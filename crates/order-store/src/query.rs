use serde::{Deserialize, Serialize};

use crate::snapshot::{LineItem, StatusHistoryEntry};
use crate::{OrderId, UserId};

/// Query parameters for listing a user's order history.
///
/// Uses a builder pattern for ergonomic construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Whose orders to list.
    pub user_id: UserId,

    /// Raw status code filter. `None` or `0` lists every status.
    pub status: Option<i16>,
}

impl HistoryQuery {
    /// Creates a query listing every order of a user.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            status: None,
        }
    }

    /// Filters by raw status code.
    pub fn status(mut self, status: i16) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns the status code to filter by, if any.
    ///
    /// A filter of `0` means "all statuses", so `Created` orders cannot
    /// be selected on their own.
    pub fn effective_status(&self) -> Option<i16> {
        self.status.filter(|code| *code > 0)
    }
}

/// One row of a user's order history, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHistoryEntry {
    pub order_id: OrderId,
    pub total_amount: f64,
    pub total_qty: i64,
    /// Display label of the stored status code.
    pub status_label: String,
    pub payment_method: String,
    pub shipping_address: String,
    pub products: Vec<LineItem>,
    pub history: Vec<StatusHistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_filter_means_all_statuses() {
        let user = UserId::new(1);
        assert_eq!(HistoryQuery::for_user(user).effective_status(), None);
        assert_eq!(HistoryQuery::for_user(user).status(0).effective_status(), None);
        assert_eq!(
            HistoryQuery::for_user(user).status(3).effective_status(),
            Some(3)
        );
    }
}
