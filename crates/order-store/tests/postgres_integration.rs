//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use order_store::{
    HistoryQuery, LineItem, NewOrder, NewOrderDetail, OrderId, OrderStatus, OrderStore,
    OrderStoreExt, PostgresOrderStore, ProductsSnapshot, StatusHistory, StoreError, UserId,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_orders_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_request_log, orders, order_detail RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn new_order(user: i64) -> (NewOrder, NewOrderDetail) {
    let items = vec![LineItem::new(1, 2, 10.0), LineItem::new(4, 1, 3.5)];
    (
        NewOrder {
            user_id: UserId::new(user),
            total_amount: 23.5,
            total_qty: 3,
            status: OrderStatus::Created,
            payment_method: "card".to_string(),
            shipping_address: "42 Harbour Rd".to_string(),
        },
        NewOrderDetail {
            products: ProductsSnapshot::new(items),
            status_history: StatusHistory::created(Utc::now()),
        },
    )
}

async fn detail_rows(store: &PostgresOrderStore) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM order_detail")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn insert_and_load_order_with_detail() {
    let store = get_test_store().await;
    let (order, detail) = new_order(10);

    let order_id = store
        .insert_order_and_detail(order, detail, None)
        .await
        .unwrap();

    let (order, detail) = store.get_order_with_detail(order_id).await.unwrap();
    assert_eq!(order.user_id, UserId::new(10));
    assert_eq!(order.total_qty, 3);
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(detail.products.items()[1].price, 3.5);
    assert_eq!(detail.status_history.entries()[0].status, "created");
}

#[tokio::test]
#[serial]
async fn duplicate_reserved_token_rolls_back_both_rows() {
    let store = get_test_store().await;
    let (order, detail) = new_order(1);
    store
        .insert_order_and_detail(order, detail, Some("token-a"))
        .await
        .unwrap();

    let (order, detail) = new_order(1);
    let result = store
        .insert_order_and_detail(order, detail, Some("token-a"))
        .await;

    assert!(matches!(
        result,
        Err(StoreError::DuplicateIdempotencyToken(_))
    ));
    assert_eq!(detail_rows(&store).await, 1);
    assert!(store.check_idempotency("token-a").await.unwrap());
}

#[tokio::test]
#[serial]
async fn rejected_order_insert_rolls_back_detail_row() {
    let store = get_test_store().await;
    let (mut order, detail) = new_order(1);
    // Violates positive_total_qty after the detail row was inserted
    order.total_qty = 0;

    let result = store
        .insert_order_and_detail(order, detail, Some("token-rollback"))
        .await;

    assert!(matches!(result, Err(StoreError::Database(_))));
    assert_eq!(detail_rows(&store).await, 0);
    assert!(!store.check_idempotency("token-rollback").await.unwrap());
}

#[tokio::test]
#[serial]
async fn long_idempotency_token_is_accepted() {
    let store = get_test_store().await;
    let token = "t".repeat(1024);
    let (order, detail) = new_order(1);

    store
        .insert_order_and_detail(order, detail, Some(&token))
        .await
        .unwrap();

    assert!(store.check_idempotency(&token).await.unwrap());
}

#[tokio::test]
#[serial]
async fn standalone_token_write_is_unique() {
    let store = get_test_store().await;

    store.save_idempotency("token-b").await.unwrap();
    let again = store.save_idempotency("token-b").await;

    assert!(matches!(
        again,
        Err(StoreError::DuplicateIdempotencyToken(_))
    ));
}

#[tokio::test]
#[serial]
async fn update_status_appends_history_entry() {
    let store = get_test_store().await;
    let (order, detail) = new_order(1);
    let order_id = store
        .insert_order_and_detail(order, detail, None)
        .await
        .unwrap();

    store
        .update_status(order_id, OrderStatus::Cancelled)
        .await
        .unwrap();

    let (order, detail) = store.get_order_with_detail(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    let statuses: Vec<_> = detail
        .status_history
        .entries()
        .iter()
        .map(|e| e.status.clone())
        .collect();
    assert_eq!(statuses, vec!["created", "cancelled"]);
}

#[tokio::test]
#[serial]
async fn terminal_order_cannot_change_status() {
    let store = get_test_store().await;
    let (order, detail) = new_order(1);
    let order_id = store
        .insert_order_and_detail(order, detail, None)
        .await
        .unwrap();
    store
        .update_status(order_id, OrderStatus::Completed)
        .await
        .unwrap();

    let repeated = store
        .update_status(order_id, OrderStatus::Completed)
        .await
        .unwrap();
    let opposite = store
        .update_status(order_id, OrderStatus::Cancelled)
        .await;

    assert!(repeated.is_unchanged());
    assert!(matches!(
        opposite,
        Err(StoreError::InvalidTransition {
            from: OrderStatus::Completed,
            to: OrderStatus::Cancelled,
            ..
        })
    ));
    let (order, detail) = store.get_order_with_detail(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(detail.status_history.entries().len(), 2);
}

#[tokio::test]
#[serial]
async fn concurrent_opposite_updates_apply_once() {
    let store = get_test_store().await;
    let (order, detail) = new_order(1);
    let order_id = store
        .insert_order_and_detail(order, detail, None)
        .await
        .unwrap();

    let (completed, cancelled) = tokio::join!(
        store.update_status(order_id, OrderStatus::Completed),
        store.update_status(order_id, OrderStatus::Cancelled),
    );

    assert_eq!(completed.is_ok() as u8 + cancelled.is_ok() as u8, 1);
    let (order, detail) = store.get_order_with_detail(order_id).await.unwrap();
    assert!(order.status.is_terminal());
    assert_eq!(detail.status_history.entries().len(), 2);
}

#[tokio::test]
#[serial]
async fn update_status_of_missing_order_fails() {
    let store = get_test_store().await;
    let result = store
        .update_status(OrderId::new(404), OrderStatus::Completed)
        .await;
    assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
}

#[tokio::test]
#[serial]
async fn history_lists_newest_first_with_filter() {
    let store = get_test_store().await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        let (order, detail) = new_order(77);
        ids.push(
            store
                .insert_order_and_detail(order, detail, None)
                .await
                .unwrap(),
        );
    }
    store
        .update_status(ids[0], OrderStatus::Completed)
        .await
        .unwrap();

    let all = store
        .list_history(HistoryQuery::for_user(UserId::new(77)))
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].order_id, ids[2]);
    assert_eq!(all[2].status_label, "Completed");

    let completed = store
        .list_history(HistoryQuery::for_user(UserId::new(77)).status(2))
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].order_id, ids[0]);
}

#[tokio::test]
#[serial]
async fn unknown_status_code_is_labelled_unknown() {
    let store = get_test_store().await;
    let (order, detail) = new_order(5);
    let order_id = store
        .insert_order_and_detail(order, detail, None)
        .await
        .unwrap();

    sqlx::query("UPDATE orders SET status = 42 WHERE id = $1")
        .bind(order_id.as_i64())
        .execute(store.pool())
        .await
        .unwrap();

    let history = store
        .list_history(HistoryQuery::for_user(UserId::new(5)))
        .await
        .unwrap();
    assert_eq!(history[0].status_label, "Unknown");
}

#[tokio::test]
#[serial]
async fn legacy_array_snapshots_are_readable() {
    let store = get_test_store().await;

    let detail_id: i64 = sqlx::query_scalar(
        "INSERT INTO order_detail (products, order_history) VALUES ($1, $2) RETURNING id",
    )
    .bind(serde_json::json!([{"product_id": 8, "quantity": 1, "price": 2.0}]))
    .bind(serde_json::json!([{"status": "created", "timestamp": "2024-01-01T00:00:00Z"}]))
    .fetch_one(store.pool())
    .await
    .unwrap();

    let detail = store
        .get_order_detail(order_store::OrderDetailId::new(detail_id))
        .await
        .unwrap();
    assert_eq!(detail.products.items()[0].quantity, 1);
    assert_eq!(detail.status_history.entries().len(), 1);
}
