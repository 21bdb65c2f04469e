//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use checkout::{CatalogClient, HttpCatalogClient};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Runs the server and consumers until shutdown, then drains the publish queue.
async fn serve<S: OrderStore + Clone + 'static>(
    store: S,
    config: Config,
    metrics_handle: PrometheusHandle,
) {
    let catalog: Arc<dyn CatalogClient> =
        Arc::new(HttpCatalogClient::new(config.product_host.as_str()));
    let (state, broker, publisher_worker) =
        api::create_default_state(store.clone(), catalog, &config);

    let shutdown = CancellationToken::new();
    let consumers = api::spawn_consumers(store, broker, config.retry_policy(), shutdown.clone());

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(
        %addr,
        idempotency_mode = config.idempotency_mode.as_str(),
        "starting API server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Consumers finish their current message before exiting.
    shutdown.cancel();
    for consumer in consumers {
        if let Err(error) = consumer.await {
            tracing::error!(%error, "payment outcome consumer panicked");
        }
    }
    if let Err(error) = publisher_worker.await {
        tracing::error!(%error, "publish worker panicked");
    }

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Select the order store and run
    match config.database_url.clone() {
        Some(database_url) => {
            let store = PostgresOrderStore::connect(&database_url, 10)
                .await
                .expect("failed to connect to database");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL order store");
            serve(store, config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory order store");
            serve(InMemoryOrderStore::new(), config, metrics_handle).await;
        }
    }
}
