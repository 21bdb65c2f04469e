//! HTTP API server with observability for the checkout saga.
//!
//! Exposes checkout and order history, runs the payment-outcome consumers,
//! and reports structured logs (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use broker::{BackgroundPublisher, InMemoryBroker};
use checkout::{
    CatalogClient, CheckoutOrchestrator, PaymentOutcome, PaymentOutcomeConsumer, RetryPolicy,
};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/v1/order/checkout", post(routes::orders::checkout::<S>))
        .route("/v1/order/history", get(routes::orders::history::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around `store` and `catalog`.
///
/// Events go to an in-memory broker through a background publisher whose
/// worker handle is returned; the worker exits once the state is dropped
/// and its queue has drained.
pub fn create_default_state<S: OrderStore + Clone + 'static>(
    store: S,
    catalog: Arc<dyn CatalogClient>,
    config: &Config,
) -> (Arc<AppState<S>>, Arc<InMemoryBroker>, JoinHandle<()>) {
    let broker = Arc::new(InMemoryBroker::new().with_retention(config.broker_retention));
    let (publisher, publisher_worker) =
        BackgroundPublisher::spawn(broker.clone(), config.publish_queue_capacity);

    let orchestrator =
        CheckoutOrchestrator::new(store.clone(), catalog, publisher, config.checkout_config());

    let state = Arc::new(AppState {
        orchestrator,
        store,
    });

    (state, broker, publisher_worker)
}

/// Starts one consumer per payment outcome.
pub fn spawn_consumers<S: OrderStore + Clone + 'static>(
    store: S,
    broker: Arc<InMemoryBroker>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    [PaymentOutcome::Success, PaymentOutcome::Failure]
        .into_iter()
        .map(|outcome| {
            PaymentOutcomeConsumer::new(outcome, store.clone(), broker.clone(), policy)
                .spawn(broker.clone(), shutdown.clone())
        })
        .collect()
}
