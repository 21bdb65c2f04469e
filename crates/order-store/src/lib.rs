//! Transactional persistence for checkout orders.
//!
//! An order and its detail row are always written in one transaction.
//! The same store keeps the idempotency-token ledger and serves the
//! order-history read path.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod snapshot;
pub mod store;

pub use common::{OrderDetailId, OrderId, ProductId, UserId};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use model::{
    IdempotencyRecord, NewOrder, NewOrderDetail, Order, OrderDetail, OrderStatus, StatusChange,
};
pub use postgres::PostgresOrderStore;
pub use query::{HistoryQuery, OrderHistoryEntry};
pub use snapshot::{LineItem, ProductsSnapshot, StatusHistory, StatusHistoryEntry};
pub use store::{OrderStore, OrderStoreExt};
