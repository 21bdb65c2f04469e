use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    HistoryQuery, IdempotencyRecord, NewOrder, NewOrderDetail, Order, OrderDetail, OrderDetailId,
    OrderHistoryEntry, OrderId, OrderStatus, Result, StatusChange, StoreError, store::OrderStore,
};

#[derive(Debug, Default)]
struct Tables {
    orders: BTreeMap<OrderId, Order>,
    details: BTreeMap<OrderDetailId, OrderDetail>,
    idempotency: HashMap<String, IdempotencyRecord>,
    order_seq: i64,
    detail_seq: i64,
}

impl Tables {
    fn next_order_id(&mut self) -> OrderId {
        self.order_seq += 1;
        OrderId::new(self.order_seq)
    }

    fn next_detail_id(&mut self) -> OrderDetailId {
        self.detail_seq += 1;
        OrderDetailId::new(self.detail_seq)
    }

    /// Builds a ledger record for `token`, failing if it is already taken.
    fn token_record(&self, token: &str, order_id: Option<OrderId>) -> Result<IdempotencyRecord> {
        if self.idempotency.contains_key(token) {
            return Err(StoreError::DuplicateIdempotencyToken(token.to_string()));
        }
        Ok(IdempotencyRecord {
            token: token.to_string(),
            created_at: Utc::now(),
            order_id,
        })
    }

    fn insert_token(&mut self, record: IdempotencyRecord) {
        self.idempotency.insert(record.token.clone(), record);
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_order_insert: bool,
    fail_on_idempotency_write: bool,
    status_update_failures: u32,
}

/// In-memory order store implementation.
///
/// Every write holds the table lock for its whole duration. The rows a
/// write touches are staged first and reach the tables only after every
/// step succeeded, so a failed write leaves no rows behind. Sequences are
/// not rolled back, like database sequences. Failures can be injected to
/// exercise rollback and retry paths.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every order insert fail after its detail row was staged.
    pub fn set_fail_on_order_insert(&self, fail: bool) {
        self.faults().fail_on_order_insert = fail;
    }

    /// Makes standalone idempotency writes fail.
    pub fn set_fail_on_idempotency_write(&self, fail: bool) {
        self.faults().fail_on_idempotency_write = fail;
    }

    /// Makes the next `count` status updates fail.
    pub fn fail_next_status_updates(&self, count: u32) {
        self.faults().status_update_failures = count;
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of committed order details.
    pub async fn detail_count(&self) -> usize {
        self.tables.read().await.details.len()
    }

    /// Returns the number of recorded idempotency tokens.
    pub async fn idempotency_count(&self) -> usize {
        self.tables.read().await.idempotency.len()
    }

    /// Returns the record stored for a token.
    pub async fn idempotency_record(&self, token: &str) -> Option<IdempotencyRecord> {
        self.tables.read().await.idempotency.get(token).cloned()
    }

    /// Writes an order row directly, bypassing checkout. Used to seed fixtures.
    pub async fn seed_order(&self, order: NewOrder, detail: NewOrderDetail) -> OrderId {
        let mut tables = self.tables.write().await;
        let detail_id = tables.next_detail_id();
        tables.details.insert(
            detail_id,
            OrderDetail {
                id: detail_id,
                products: detail.products,
                status_history: detail.status_history,
            },
        );
        let order_id = tables.next_order_id();
        tables
            .orders
            .insert(order_id, order.into_order(order_id, detail_id));
        order_id
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn check_idempotency(&self, token: &str) -> Result<bool> {
        Ok(self.tables.read().await.idempotency.contains_key(token))
    }

    async fn save_idempotency(&self, token: &str) -> Result<()> {
        if self.faults().fail_on_idempotency_write {
            return Err(StoreError::Unavailable(
                "idempotency ledger write rejected".to_string(),
            ));
        }
        let mut tables = self.tables.write().await;
        let record = tables.token_record(token, None)?;
        tables.insert_token(record);
        Ok(())
    }

    #[tracing::instrument(skip(self, order, detail, reserve_token), fields(user_id = %order.user_id))]
    async fn insert_order_and_detail(
        &self,
        order: NewOrder,
        detail: NewOrderDetail,
        reserve_token: Option<&str>,
    ) -> Result<OrderId> {
        let fail_on_order_insert = self.faults().fail_on_order_insert;
        let mut tables = self.tables.write().await;

        let detail_id = tables.next_detail_id();
        let staged_detail = OrderDetail {
            id: detail_id,
            products: detail.products,
            status_history: detail.status_history,
        };

        if fail_on_order_insert {
            return Err(StoreError::Unavailable("order insert rejected".to_string()));
        }

        let order_id = tables.next_order_id();
        let staged_order = order.into_order(order_id, detail_id);
        let staged_token = reserve_token
            .map(|token| tables.token_record(token, Some(order_id)))
            .transpose()?;

        tables.details.insert(detail_id, staged_detail);
        tables.orders.insert(order_id, staged_order);
        if let Some(record) = staged_token {
            tables.insert_token(record);
        }

        tracing::debug!(%order_id, %detail_id, "order committed");
        Ok(order_id)
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<StatusChange> {
        {
            let mut faults = self.faults();
            if faults.status_update_failures > 0 {
                faults.status_update_failures -= 1;
                return Err(StoreError::Unavailable(
                    "status update rejected".to_string(),
                ));
            }
        }

        let mut tables = self.tables.write().await;
        let mut order = tables
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(StoreError::OrderNotFound(order_id))?;
        let change = order.transition_to(status)?;
        if change.is_unchanged() {
            return Ok(change);
        }

        let detail_id = order.order_detail_id;
        let detail = tables
            .details
            .get_mut(&detail_id)
            .ok_or(StoreError::OrderDetailNotFound(detail_id))?;
        detail.status_history.append(status, Utc::now());
        tables.orders.insert(order_id, order);

        tracing::debug!(from = %change.previous, "order status updated");
        Ok(change)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.tables
            .read()
            .await
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(StoreError::OrderNotFound(order_id))
    }

    async fn get_order_detail(&self, detail_id: OrderDetailId) -> Result<OrderDetail> {
        self.tables
            .read()
            .await
            .details
            .get(&detail_id)
            .cloned()
            .ok_or(StoreError::OrderDetailNotFound(detail_id))
    }

    async fn list_history(&self, query: HistoryQuery) -> Result<Vec<OrderHistoryEntry>> {
        let tables = self.tables.read().await;
        let status_filter = query.effective_status();

        tables
            .orders
            .values()
            .rev()
            .filter(|order| order.user_id == query.user_id)
            .filter(|order| status_filter.is_none_or(|code| order.status.code() == code))
            .map(|order| {
                let detail = tables
                    .details
                    .get(&order.order_detail_id)
                    .ok_or(StoreError::OrderDetailNotFound(order.order_detail_id))?;
                Ok(OrderHistoryEntry {
                    order_id: order.id,
                    total_amount: order.total_amount,
                    total_qty: order.total_qty,
                    status_label: OrderStatus::label_for_code(order.status.code()).to_string(),
                    payment_method: order.payment_method.clone(),
                    shipping_address: order.shipping_address.clone(),
                    products: detail.products.items().to_vec(),
                    history: detail.status_history.entries().to_vec(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LineItem, ProductsSnapshot, StatusHistory, UserId};

    fn new_order(user: i64) -> (NewOrder, NewOrderDetail) {
        let items = vec![LineItem::new(1, 2, 10.0), LineItem::new(2, 1, 5.0)];
        let order = NewOrder {
            user_id: UserId::new(user),
            total_amount: 25.0,
            total_qty: 3,
            status: OrderStatus::Created,
            payment_method: "card".to_string(),
            shipping_address: "1 Main St".to_string(),
        };
        let detail = NewOrderDetail {
            products: ProductsSnapshot::new(items),
            status_history: StatusHistory::created(Utc::now()),
        };
        (order, detail)
    }

    #[tokio::test]
    async fn insert_links_order_to_detail() {
        let store = InMemoryOrderStore::new();
        let (order, detail) = new_order(7);

        let order_id = store
            .insert_order_and_detail(order, detail, None)
            .await
            .unwrap();

        let stored = store.get_order(order_id).await.unwrap();
        let stored_detail = store.get_order_detail(stored.order_detail_id).await.unwrap();
        assert_eq!(stored.user_id, UserId::new(7));
        assert_eq!(stored.status, OrderStatus::Created);
        assert_eq!(stored_detail.products.items().len(), 2);
    }

    #[tokio::test]
    async fn failed_order_insert_rolls_back_detail() {
        let store = InMemoryOrderStore::new();
        store.set_fail_on_order_insert(true);
        let (order, detail) = new_order(1);

        let result = store.insert_order_and_detail(order, detail, None).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.detail_count().await, 0);
    }

    #[tokio::test]
    async fn reserved_token_conflict_rolls_back_order() {
        let store = InMemoryOrderStore::new();
        let (order, detail) = new_order(1);
        store
            .insert_order_and_detail(order, detail, Some("tok-1"))
            .await
            .unwrap();

        let (order, detail) = new_order(1);
        let result = store
            .insert_order_and_detail(order, detail, Some("tok-1"))
            .await;

        assert!(matches!(
            result,
            Err(StoreError::DuplicateIdempotencyToken(_))
        ));
        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.detail_count().await, 1);
        let record = store.idempotency_record("tok-1").await.unwrap();
        assert_eq!(record.order_id, Some(OrderId::new(1)));
    }

    #[tokio::test]
    async fn save_idempotency_is_unique() {
        let store = InMemoryOrderStore::new();
        assert!(!store.check_idempotency("abc").await.unwrap());

        store.save_idempotency("abc").await.unwrap();
        assert!(store.check_idempotency("abc").await.unwrap());

        let second = store.save_idempotency("abc").await;
        assert!(matches!(
            second,
            Err(StoreError::DuplicateIdempotencyToken(_))
        ));
    }

    #[tokio::test]
    async fn update_status_appends_history() {
        let store = InMemoryOrderStore::new();
        let (order, detail) = new_order(1);
        let order_id = store
            .insert_order_and_detail(order, detail, None)
            .await
            .unwrap();

        store
            .update_status(order_id, OrderStatus::Completed)
            .await
            .unwrap();

        let order = store.get_order(order_id).await.unwrap();
        let detail = store.get_order_detail(order.order_detail_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(detail.status_history.entries().len(), 2);
        assert_eq!(detail.status_history.entries()[1].status, "completed");
    }

    #[tokio::test]
    async fn update_status_of_missing_order() {
        let store = InMemoryOrderStore::new();
        let result = store
            .update_status(OrderId::new(99), OrderStatus::Cancelled)
            .await;
        assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn terminal_order_rejects_opposite_status() {
        let store = InMemoryOrderStore::new();
        let (order, detail) = new_order(1);
        let order_id = store.seed_order(order, detail).await;
        store
            .update_status(order_id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let result = store.update_status(order_id, OrderStatus::Completed).await;

        assert!(matches!(
            result,
            Err(StoreError::InvalidTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Completed,
                ..
            })
        ));
        let order = store.get_order(order_id).await.unwrap();
        let detail = store.get_order_detail(order.order_detail_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(detail.status_history.entries().len(), 2);
    }

    #[tokio::test]
    async fn repeated_status_is_unchanged_and_not_recorded() {
        let store = InMemoryOrderStore::new();
        let (order, detail) = new_order(1);
        let order_id = store.seed_order(order, detail).await;

        let first = store
            .update_status(order_id, OrderStatus::Completed)
            .await
            .unwrap();
        let second = store
            .update_status(order_id, OrderStatus::Completed)
            .await
            .unwrap();

        assert!(!first.is_unchanged());
        assert!(second.is_unchanged());
        let detail = store
            .get_order_detail(second.order.order_detail_id)
            .await
            .unwrap();
        assert_eq!(detail.status_history.entries().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_opposite_updates_leave_one_terminal_status() {
        let store = InMemoryOrderStore::new();
        let (order, detail) = new_order(1);
        let order_id = store.seed_order(order, detail).await;

        let (completed, cancelled) = tokio::join!(
            store.update_status(order_id, OrderStatus::Completed),
            store.update_status(order_id, OrderStatus::Cancelled),
        );

        assert_eq!(completed.is_ok() as u8 + cancelled.is_ok() as u8, 1);
        let order = store.get_order(order_id).await.unwrap();
        let detail = store.get_order_detail(order.order_detail_id).await.unwrap();
        assert!(order.status.is_terminal());
        assert_eq!(detail.status_history.entries().len(), 2);
    }

    #[tokio::test]
    async fn injected_status_failures_are_consumed() {
        let store = InMemoryOrderStore::new();
        let (order, detail) = new_order(1);
        let order_id = store.seed_order(order, detail).await;
        store.fail_next_status_updates(1);

        assert!(
            store
                .update_status(order_id, OrderStatus::Completed)
                .await
                .is_err()
        );
        assert!(
            store
                .update_status(order_id, OrderStatus::Completed)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn history_is_newest_first_and_filtered() {
        let store = InMemoryOrderStore::new();
        for _ in 0..3 {
            let (order, detail) = new_order(5);
            store.seed_order(order, detail).await;
        }
        let (order, detail) = new_order(6);
        store.seed_order(order, detail).await;
        store
            .update_status(OrderId::new(2), OrderStatus::Cancelled)
            .await
            .unwrap();

        let all = store
            .list_history(HistoryQuery::for_user(UserId::new(5)))
            .await
            .unwrap();
        let ids: Vec<i64> = all.iter().map(|e| e.order_id.as_i64()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(all[1].status_label, "Cancelled");
        assert_eq!(all[0].products.len(), 2);

        let cancelled = store
            .list_history(HistoryQuery::for_user(UserId::new(5)).status(3))
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].order_id, OrderId::new(2));
        assert_eq!(cancelled[0].history.len(), 2);
    }
}
