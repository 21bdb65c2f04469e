use async_trait::async_trait;

use crate::{
    HistoryQuery, NewOrder, NewOrderDetail, Order, OrderDetail, OrderDetailId, OrderHistoryEntry,
    OrderId, OrderStatus, Result, StatusChange,
};

/// Core trait for order store implementations.
///
/// All multi-row writes happen inside a single transaction of the backing
/// store. Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Returns true if the idempotency token has been recorded.
    async fn check_idempotency(&self, token: &str) -> Result<bool>;

    /// Records an idempotency token outside of any order transaction.
    ///
    /// Fails with `DuplicateIdempotencyToken` if the token already exists.
    async fn save_idempotency(&self, token: &str) -> Result<()>;

    /// Inserts the detail row and then the order row referencing it.
    ///
    /// Both rows are written atomically - either both are committed or
    /// neither is. When `reserve_token` is set, the token is recorded in
    /// the same transaction and a duplicate token rolls everything back
    /// with `DuplicateIdempotencyToken`.
    ///
    /// Returns the id of the new order.
    async fn insert_order_and_detail(
        &self,
        order: NewOrder,
        detail: NewOrderDetail,
        reserve_token: Option<&str>,
    ) -> Result<OrderId>;

    /// Moves an order to `status` and appends the change to its status
    /// history, in one transaction.
    ///
    /// The status machine is checked against the locked order row, so
    /// concurrent writers cannot move an order out of a terminal status.
    /// Requesting the current status writes nothing and returns an
    /// unchanged [`StatusChange`]; any other disallowed move fails with
    /// `InvalidTransition`.
    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<StatusChange>;

    /// Loads an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Order>;

    /// Loads an order detail by id.
    async fn get_order_detail(&self, detail_id: OrderDetailId) -> Result<OrderDetail>;

    /// Lists a user's orders joined with their details, newest first.
    async fn list_history(&self, query: HistoryQuery) -> Result<Vec<OrderHistoryEntry>>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Loads an order together with its detail row.
    async fn get_order_with_detail(&self, order_id: OrderId) -> Result<(Order, OrderDetail)> {
        let order = self.get_order(order_id).await?;
        let detail = self.get_order_detail(order.order_detail_id).await?;
        Ok((order, detail))
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
