//! Checkout and order history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use checkout::{
    CatalogClient, CheckoutItem, CheckoutOrchestrator, CheckoutRequest, ValidationError,
};
use order_store::{HistoryQuery, OrderHistoryEntry, OrderStore};
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore> {
    pub orchestrator: CheckoutOrchestrator<S, Arc<dyn CatalogClient>>,
    pub store: S,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutBody {
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    pub payment_method: String,
    pub shipping_address: String,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    /// Status code filter; absent or 0 lists every status.
    pub status: Option<i16>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: i64,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub data: Vec<HistoryItemResponse>,
}

#[derive(Serialize)]
pub struct HistoryItemResponse {
    pub order_id: i64,
    pub total_amount: f64,
    pub total_qty: i64,
    pub status: String,
    pub payment_method: String,
    pub shipping_address: String,
    pub products: Vec<ProductResponse>,
    pub history: Vec<StatusChangeResponse>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub product_id: i64,
    pub quantity: i32,
    pub price: f64,
}

#[derive(Serialize)]
pub struct StatusChangeResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl From<OrderHistoryEntry> for HistoryItemResponse {
    fn from(entry: OrderHistoryEntry) -> Self {
        Self {
            order_id: entry.order_id.as_i64(),
            total_amount: entry.total_amount,
            total_qty: entry.total_qty,
            status: entry.status_label,
            payment_method: entry.payment_method,
            shipping_address: entry.shipping_address,
            products: entry
                .products
                .into_iter()
                .map(|item| ProductResponse {
                    product_id: item.product_id.as_i64(),
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            history: entry
                .history
                .into_iter()
                .map(|change| StatusChangeResponse {
                    status: change.status,
                    timestamp: change.timestamp,
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /v1/order/checkout: validate and place an order.
#[tracing::instrument(skip(state, caller, body), fields(user_id = %caller.0))]
pub async fn checkout<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    ApiJson(body): ApiJson<CheckoutBody>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    if body.items.is_empty() {
        return Err(ApiError::Checkout(ValidationError::EmptyCart.into()));
    }

    let mut request = CheckoutRequest::new(
        caller.0,
        body.items,
        body.payment_method,
        body.shipping_address,
    );
    request.idempotency_token = body.idempotency_token;

    let order_id = state.orchestrator.checkout(request).await?;

    Ok(Json(CheckoutResponse {
        order_id: order_id.as_i64(),
    }))
}

/// GET /v1/order/history: list the caller's orders, newest first.
#[tracing::instrument(skip(state, caller, params), fields(user_id = %caller.0, status = ?params.status))]
pub async fn history<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let mut query = HistoryQuery::for_user(caller.0);
    if let Some(status) = params.status {
        query = query.status(status);
    }

    let entries = state.store.list_history(query).await?;
    metrics::counter!("order_history_requests_total").increment(1);

    Ok(Json(HistoryResponse {
        data: entries.into_iter().map(HistoryItemResponse::from).collect(),
    }))
}
