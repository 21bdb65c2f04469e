//! Catalog lookup trait, HTTP client and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use order_store::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authoritative product data as served by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub stock: i32,
    #[serde(default)]
    pub category_id: i64,
}

impl Product {
    /// Creates a product with the fields checkout relies on.
    pub fn new(id: impl Into<ProductId>, price: f64, stock: i32) -> Self {
        let id = id.into();
        Self {
            id,
            name: format!("product-{id}"),
            description: String::new(),
            price,
            stock,
            category_id: 0,
        }
    }
}

/// Errors from a catalog lookup.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog answered with a non-success status.
    #[error("Catalog returned status {status} for product {product_id}")]
    Status { product_id: ProductId, status: u16 },

    /// The request did not reach the catalog or the body was unreadable.
    #[error("Catalog request failed: {0}")]
    Transport(String),
}

/// Trait for product lookups against the catalog service.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetches the current price and stock of a product.
    async fn product(&self, product_id: ProductId) -> Result<Product, CatalogError>;
}

#[async_trait]
impl<T: CatalogClient + ?Sized> CatalogClient for Arc<T> {
    async fn product(&self, product_id: ProductId) -> Result<Product, CatalogError> {
        self.as_ref().product(product_id).await
    }
}

#[derive(Deserialize)]
struct ProductEnvelope {
    product: Product,
}

/// Catalog client speaking `GET {host}/v1/product/{id}`.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    /// Creates a client for the catalog at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Creates a client reusing an existing connection pool.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn product_url(&self, product_id: ProductId) -> String {
        format!("{}/v1/product/{}", self.base_url, product_id)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    async fn product(&self, product_id: ProductId) -> Result<Product, CatalogError> {
        let response = self
            .http
            .get(self.product_url(product_id))
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                product_id,
                status: status.as_u16(),
            });
        }

        let envelope: ProductEnvelope = response
            .json()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        Ok(envelope.product)
    }
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, Product>,
    lookups: usize,
    fail_on_lookup: bool,
    delay: Option<Duration>,
}

/// In-memory catalog for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding `products`.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let catalog = Self::new();
        for product in products {
            catalog.upsert(product);
        }
        catalog
    }

    /// Adds or replaces a product.
    pub fn upsert(&self, product: Product) {
        self.write().products.insert(product.id, product);
    }

    /// Makes every lookup fail as if the catalog were down.
    pub fn set_fail_on_lookup(&self, fail: bool) {
        self.write().fail_on_lookup = fail;
    }

    /// Delays every lookup by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Returns the number of lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookups
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryCatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CatalogClient for InMemoryCatalog {
    async fn product(&self, product_id: ProductId) -> Result<Product, CatalogError> {
        let (delay, result) = {
            let mut state = self.write();
            state.lookups += 1;
            let result = if state.fail_on_lookup {
                Err(CatalogError::Transport("connection refused".to_string()))
            } else {
                state
                    .products
                    .get(&product_id)
                    .cloned()
                    .ok_or(CatalogError::Status {
                        product_id,
                        status: 404,
                    })
            };
            (state.delay, result)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}
