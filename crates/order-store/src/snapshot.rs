//! Typed, versioned snapshots stored in the order-detail row.
//!
//! Both snapshots serialize as `{"version": N, ...}`. Rows written before
//! versioning held a bare JSON array; those are still readable and come
//! back as version 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProductId;
use crate::model::OrderStatus;

/// Current schema version of both snapshots.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One validated line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price as confirmed by the catalog at checkout.
    pub price: f64,
}

impl LineItem {
    /// Creates a line item.
    pub fn new(product_id: impl Into<ProductId>, quantity: i32, price: f64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }

    /// Returns quantity × unit price.
    pub fn subtotal(&self) -> f64 {
        f64::from(self.quantity) * self.price
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ProductsWire {
    Versioned { version: u32, items: Vec<LineItem> },
    Legacy(Vec<LineItem>),
}

/// Point-in-time list of the products bought with an order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "ProductsWire", into = "ProductsWire")]
pub struct ProductsSnapshot {
    items: Vec<LineItem>,
}

impl ProductsSnapshot {
    /// Creates a snapshot from validated items.
    pub fn new(items: Vec<LineItem>) -> Self {
        Self { items }
    }

    /// Returns the captured items.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Consumes the snapshot, returning its items.
    pub fn into_items(self) -> Vec<LineItem> {
        self.items
    }

    /// Encodes the snapshot as a JSON value for storage.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Decodes a stored snapshot, upgrading legacy rows.
    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

impl TryFrom<ProductsWire> for ProductsSnapshot {
    type Error = String;

    fn try_from(wire: ProductsWire) -> Result<Self, Self::Error> {
        match wire {
            ProductsWire::Versioned { version, items } => {
                check_version(version)?;
                Ok(Self { items })
            }
            ProductsWire::Legacy(items) => Ok(Self { items }),
        }
    }
}

impl From<ProductsSnapshot> for ProductsWire {
    fn from(snapshot: ProductsSnapshot) -> Self {
        ProductsWire::Versioned {
            version: SNAPSHOT_VERSION,
            items: snapshot.items,
        }
    }
}

/// One entry of the status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum HistoryWire {
    Versioned {
        version: u32,
        entries: Vec<StatusHistoryEntry>,
    },
    Legacy(Vec<StatusHistoryEntry>),
}

/// Append-only audit trail of status changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "HistoryWire", into = "HistoryWire")]
pub struct StatusHistory {
    entries: Vec<StatusHistoryEntry>,
}

impl StatusHistory {
    /// Starts a history with the initial `created` entry.
    pub fn created(at: DateTime<Utc>) -> Self {
        let mut history = Self::default();
        history.append(OrderStatus::Created, at);
        history
    }

    /// Appends a status change.
    pub fn append(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.entries.push(StatusHistoryEntry {
            status: status.history_label().to_string(),
            timestamp: at,
        });
    }

    /// Returns the recorded entries, oldest first.
    pub fn entries(&self) -> &[StatusHistoryEntry] {
        &self.entries
    }

    /// Consumes the history, returning its entries.
    pub fn into_entries(self) -> Vec<StatusHistoryEntry> {
        self.entries
    }

    /// Encodes the history as a JSON value for storage.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Decodes a stored history, upgrading legacy rows.
    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

impl TryFrom<HistoryWire> for StatusHistory {
    type Error = String;

    fn try_from(wire: HistoryWire) -> Result<Self, Self::Error> {
        match wire {
            HistoryWire::Versioned { version, entries } => {
                check_version(version)?;
                Ok(Self { entries })
            }
            HistoryWire::Legacy(entries) => Ok(Self { entries }),
        }
    }
}

impl From<StatusHistory> for HistoryWire {
    fn from(history: StatusHistory) -> Self {
        HistoryWire::Versioned {
            version: SNAPSHOT_VERSION,
            entries: history.entries,
        }
    }
}

fn check_version(version: u32) -> Result<(), String> {
    if version == 0 || version > SNAPSHOT_VERSION {
        return Err(format!("unsupported snapshot version {version}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn products_snapshot_is_written_with_version() {
        let snapshot = ProductsSnapshot::new(vec![LineItem::new(1, 2, 10.0)]);
        let json = snapshot.to_json().unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["items"][0]["product_id"], 1);
        assert_eq!(json["items"][0]["quantity"], 2);
    }

    #[test]
    fn legacy_product_array_is_accepted() {
        let legacy = serde_json::json!([
            {"product_id": 3, "quantity": 1, "price": 4.5},
            {"product_id": 9, "quantity": 2, "price": 1.0}
        ]);

        let snapshot = ProductsSnapshot::from_json(legacy).unwrap();
        assert_eq!(snapshot.items().len(), 2);
        assert_eq!(snapshot.items()[1].product_id, ProductId::new(9));
    }

    #[test]
    fn future_snapshot_version_is_rejected() {
        let future = serde_json::json!({"version": 7, "items": []});
        assert!(ProductsSnapshot::from_json(future).is_err());
    }

    #[test]
    fn history_appends_in_order() {
        let start = Utc::now();
        let mut history = StatusHistory::created(start);
        history.append(OrderStatus::Completed, start + chrono::Duration::seconds(5));

        let statuses: Vec<_> = history.entries().iter().map(|e| e.status.as_str()).collect();
        assert_eq!(statuses, vec!["created", "completed"]);
    }

    #[test]
    fn legacy_history_array_is_accepted() {
        let legacy = serde_json::json!([
            {"status": "created", "timestamp": "2024-05-01T10:00:00Z"}
        ]);

        let history = StatusHistory::from_json(legacy).unwrap();
        assert_eq!(history.entries()[0].status, "created");
    }

    #[test]
    fn line_item_subtotal() {
        assert_eq!(LineItem::new(1, 3, 2.5).subtotal(), 7.5);
    }
}
