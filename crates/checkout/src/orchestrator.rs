//! Checkout orchestration: validate, persist, then hand off events.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use broker::{BackgroundPublisher, OrderCreatedEvent, ProductItem, ProductStockUpdateEvent};
use chrono::Utc;
use order_store::{
    LineItem, NewOrder, NewOrderDetail, OrderId, OrderStatus, OrderStore, ProductId,
    ProductsSnapshot, StatusHistory, StoreError,
};

use crate::catalog::{CatalogClient, Product};
use crate::error::{CheckoutError, Result, ValidationError};
use crate::request::{CheckoutItem, CheckoutRequest};

/// When the idempotency token is recorded relative to the order insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdempotencyMode {
    /// The token is reserved inside the order transaction. Of two
    /// concurrent checkouts with one token, exactly one commits.
    #[default]
    Atomic,

    /// The token is written after the order commits and a failed write is
    /// only logged. Concurrent checkouts with one token can both commit.
    BestEffort,
}

impl IdempotencyMode {
    /// Parses `atomic` or `best_effort`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "atomic" => Some(IdempotencyMode::Atomic),
            "best_effort" | "best-effort" => Some(IdempotencyMode::BestEffort),
            _ => None,
        }
    }

    /// Returns the configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyMode::Atomic => "atomic",
            IdempotencyMode::BestEffort => "best_effort",
        }
    }
}

/// Tunables for [`CheckoutOrchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Deadline for each catalog lookup.
    pub catalog_timeout: Duration,
    pub idempotency_mode: IdempotencyMode,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            catalog_timeout: Duration::from_millis(2000),
            idempotency_mode: IdempotencyMode::Atomic,
        }
    }
}

/// Accepts checkouts.
///
/// A checkout is validated against the catalog, persisted as an order and
/// its detail row in one transaction, and announced with `order.created`
/// followed by `product.stock.update`. Events are queued on the
/// [`BackgroundPublisher`]; the caller gets the order id as soon as the
/// transaction commits, whatever happens to the events afterwards.
pub struct CheckoutOrchestrator<S, C>
where
    S: OrderStore,
    C: CatalogClient,
{
    store: S,
    catalog: C,
    publisher: BackgroundPublisher,
    config: CheckoutConfig,
}

impl<S, C> CheckoutOrchestrator<S, C>
where
    S: OrderStore,
    C: CatalogClient,
{
    /// Creates a new orchestrator.
    pub fn new(store: S, catalog: C, publisher: BackgroundPublisher, config: CheckoutConfig) -> Self {
        Self {
            store,
            catalog,
            publisher,
            config,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Validates and persists a checkout, returning the new order id.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.user_id, items = request.items.len())
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<OrderId> {
        metrics::counter!("checkout_requests_total").increment(1);
        let start = Instant::now();

        let result = self.run_checkout(&request).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(order_id) => tracing::info!(%order_id, "checkout accepted"),
            Err(error) => {
                metrics::counter!("checkout_rejected_total", "kind" => error.kind()).increment(1);
                tracing::warn!(kind = error.kind(), %error, "checkout rejected");
            }
        }
        result
    }

    async fn run_checkout(&self, request: &CheckoutRequest) -> Result<OrderId> {
        if request.items.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }

        let token = request.token();
        if let Some(token) = token {
            if self.store.check_idempotency(token).await? {
                return Err(CheckoutError::DuplicateSubmission(token.to_string()));
            }
        }

        let items = self.validate(&request.items).await?;

        let total_qty: i64 = items.iter().map(|item| i64::from(item.quantity)).sum();
        let total_amount: f64 = items.iter().map(LineItem::subtotal).sum();

        let order = NewOrder {
            user_id: request.user_id,
            total_amount,
            total_qty,
            status: OrderStatus::Created,
            payment_method: request.payment_method.clone(),
            shipping_address: request.shipping_address.clone(),
        };
        let detail = NewOrderDetail {
            products: ProductsSnapshot::new(items.clone()),
            status_history: StatusHistory::created(Utc::now()),
        };

        let reserve_token = match self.config.idempotency_mode {
            IdempotencyMode::Atomic => token,
            IdempotencyMode::BestEffort => None,
        };

        let order_id = self
            .store
            .insert_order_and_detail(order, detail, reserve_token)
            .await
            .map_err(|error| match error {
                StoreError::DuplicateIdempotencyToken(token) => {
                    CheckoutError::DuplicateSubmission(token)
                }
                other => CheckoutError::Persistence(other),
            })?;

        if self.config.idempotency_mode == IdempotencyMode::BestEffort {
            if let Some(token) = token {
                // The order is committed; a lost token only weakens duplicate detection.
                if let Err(error) = self.store.save_idempotency(token).await {
                    tracing::warn!(%order_id, %error, "failed to record idempotency token");
                }
            }
        }

        self.announce(order_id, request, total_amount, total_qty, &items);
        Ok(order_id)
    }

    /// Checks every line in order and stops at the first violation.
    async fn validate(&self, items: &[CheckoutItem]) -> Result<Vec<LineItem>> {
        let mut seen = HashSet::with_capacity(items.len());
        let mut validated = Vec::with_capacity(items.len());

        for item in items {
            if !seen.insert(item.product_id) {
                return Err(ValidationError::DuplicateLineItem(item.product_id).into());
            }

            let product = self.lookup(item.product_id).await?;

            if !item.has_valid_quantity() {
                return Err(ValidationError::InvalidQuantity {
                    product_id: item.product_id,
                    quantity: item.quantity,
                }
                .into());
            }
            if item.price != product.price {
                return Err(ValidationError::PriceMismatch {
                    product_id: item.product_id,
                    claimed: item.price,
                    actual: product.price,
                }
                .into());
            }
            if item.quantity > product.stock {
                return Err(ValidationError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: product.stock,
                }
                .into());
            }

            validated.push(LineItem::new(item.product_id, item.quantity, product.price));
        }

        Ok(validated)
    }

    async fn lookup(&self, product_id: ProductId) -> Result<Product> {
        let deadline = self.config.catalog_timeout;
        match tokio::time::timeout(deadline, self.catalog.product(product_id)).await {
            Ok(Ok(product)) => Ok(product),
            Ok(Err(error)) => Err(CheckoutError::CatalogUnavailable(error.to_string())),
            Err(_) => Err(CheckoutError::CatalogUnavailable(format!(
                "lookup of product {product_id} timed out after {deadline:?}"
            ))),
        }
    }

    fn announce(
        &self,
        order_id: OrderId,
        request: &CheckoutRequest,
        total_amount: f64,
        total_qty: i64,
        items: &[LineItem],
    ) {
        let created = OrderCreatedEvent {
            order_id,
            user_id: request.user_id,
            total_amount,
            total_qty,
            payment_method: request.payment_method.clone(),
            shipping_address: request.shipping_address.clone(),
        };
        let reserve = ProductStockUpdateEvent::new(
            order_id,
            items
                .iter()
                .map(|item| ProductItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
        );

        // Dispatch failures are logged and counted by the publisher.
        let _ = self.publisher.dispatch_event(&created);
        let _ = self.publisher.dispatch_event(&reserve);
    }
}
