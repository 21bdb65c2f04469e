use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    HistoryQuery, NewOrder, NewOrderDetail, Order, OrderDetail, OrderDetailId,
    OrderHistoryEntry, OrderId, OrderStatus, ProductsSnapshot, Result, StatusChange, StatusHistory,
    StoreError, UserId, store::OrderStore,
};

const IDEMPOTENCY_CONSTRAINT: &str = "unique_idempotency_token";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with a pool of at most `max_connections`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let code: i16 = row.try_get("status")?;
        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            order_detail_id: OrderDetailId::new(row.try_get("order_detail_id")?),
            total_amount: row.try_get("amount")?,
            total_qty: row.try_get("total_qty")?,
            status: OrderStatus::from_code(code).ok_or(StoreError::UnknownStatus(code))?,
            payment_method: row.try_get("payment_method")?,
            shipping_address: row.try_get("shipping_address")?,
        })
    }

    fn row_to_history_entry(row: PgRow) -> Result<OrderHistoryEntry> {
        let code: i16 = row.try_get("status")?;
        let products = ProductsSnapshot::from_json(row.try_get("products")?)?;
        let history = StatusHistory::from_json(row.try_get("order_history")?)?;

        Ok(OrderHistoryEntry {
            order_id: OrderId::new(row.try_get("id")?),
            total_amount: row.try_get("amount")?,
            total_qty: row.try_get("total_qty")?,
            status_label: OrderStatus::label_for_code(code).to_string(),
            payment_method: row.try_get("payment_method")?,
            shipping_address: row.try_get("shipping_address")?,
            products: products.into_items(),
            history: history.into_entries(),
        })
    }

    async fn insert_token(
        tx: &mut Transaction<'_, Postgres>,
        token: &str,
        order_id: Option<OrderId>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_request_log (idempotency_token, order_id, create_time)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(token)
        .bind(order_id.map(|id| id.as_i64()))
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            // Unique constraint violation means the token was already used
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(IDEMPOTENCY_CONSTRAINT)
            {
                return StoreError::DuplicateIdempotencyToken(token.to_string());
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn check_idempotency(&self, token: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM order_request_log WHERE idempotency_token = $1)",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn save_idempotency(&self, token: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_token(&mut tx, token, None).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, order, detail, reserve_token), fields(user_id = %order.user_id))]
    async fn insert_order_and_detail(
        &self,
        order: NewOrder,
        detail: NewOrderDetail,
        reserve_token: Option<&str>,
    ) -> Result<OrderId> {
        let products = detail.products.to_json()?;
        let history = detail.status_history.to_json()?;

        // Dropping the transaction without commit rolls it back
        let mut tx = self.pool.begin().await?;

        let detail_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_detail (products, order_history)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(products)
        .bind(history)
        .fetch_one(&mut *tx)
        .await?;

        let order_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (user_id, order_detail_id, amount, total_qty, status, payment_method, shipping_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(order.user_id.as_i64())
        .bind(detail_id)
        .bind(order.total_amount)
        .bind(order.total_qty)
        .bind(order.status.code())
        .bind(&order.payment_method)
        .bind(&order.shipping_address)
        .fetch_one(&mut *tx)
        .await?;

        let order_id = OrderId::new(order_id);
        if let Some(token) = reserve_token {
            Self::insert_token(&mut tx, token, Some(order_id)).await?;
        }

        tx.commit().await?;
        tracing::debug!(%order_id, detail_id, "order committed");
        Ok(order_id)
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<StatusChange> {
        let mut tx = self.pool.begin().await?;

        // The row lock serializes concurrent outcome handlers for one order
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, user_id, order_detail_id, amount, total_qty, status, payment_method, shipping_address
            FROM orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;
        let mut order = match row {
            Some(row) => Self::row_to_order(&row)?,
            None => return Err(StoreError::OrderNotFound(order_id)),
        };

        let change = order.transition_to(status)?;
        if change.is_unchanged() {
            return Ok(change);
        }

        sqlx::query("UPDATE orders SET status = $1, update_time = NOW() WHERE id = $2")
            .bind(status.code())
            .bind(order_id.as_i64())
            .execute(&mut *tx)
            .await?;

        let detail_id = order.order_detail_id;
        let history_json: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT order_history FROM order_detail WHERE id = $1 FOR UPDATE")
                .bind(detail_id.as_i64())
                .fetch_optional(&mut *tx)
                .await?;
        let history_json = history_json.ok_or(StoreError::OrderDetailNotFound(detail_id))?;

        let mut history = StatusHistory::from_json(history_json)?;
        history.append(status, Utc::now());

        sqlx::query("UPDATE order_detail SET order_history = $1 WHERE id = $2")
            .bind(history.to_json()?)
            .bind(detail_id.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(from = %change.previous, "order status updated");
        Ok(change)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, user_id, order_detail_id, amount, total_qty, status, payment_method, shipping_address
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_order(&row),
            None => Err(StoreError::OrderNotFound(order_id)),
        }
    }

    async fn get_order_detail(&self, detail_id: OrderDetailId) -> Result<OrderDetail> {
        let row: Option<PgRow> =
            sqlx::query("SELECT id, products, order_history FROM order_detail WHERE id = $1")
                .bind(detail_id.as_i64())
                .fetch_optional(&self.pool)
                .await?;

        let row = row.ok_or(StoreError::OrderDetailNotFound(detail_id))?;
        Ok(OrderDetail {
            id: OrderDetailId::new(row.try_get("id")?),
            products: ProductsSnapshot::from_json(row.try_get("products")?)?,
            status_history: StatusHistory::from_json(row.try_get("order_history")?)?,
        })
    }

    async fn list_history(&self, query: HistoryQuery) -> Result<Vec<OrderHistoryEntry>> {
        let mut sql = String::from(
            r#"
            SELECT o.id, o.amount, o.total_qty, o.status, o.payment_method, o.shipping_address,
                   od.products, od.order_history
            FROM orders o
            JOIN order_detail od ON od.id = o.order_detail_id
            WHERE o.user_id = $1
            "#,
        );
        let status = query.effective_status();
        if status.is_some() {
            sql.push_str(" AND o.status = $2");
        }
        sql.push_str(" ORDER BY o.id DESC");

        let mut sqlx_query = sqlx::query(&sql).bind(query.user_id.as_i64());
        if let Some(status) = status {
            sqlx_query = sqlx_query.bind(status);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_history_entry).collect()
    }
}
