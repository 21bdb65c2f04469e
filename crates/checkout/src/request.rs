use order_store::{ProductId, UserId};
use serde::{Deserialize, Serialize};

/// Smallest quantity accepted per line.
pub const MIN_QUANTITY: i32 = 1;

/// Largest quantity accepted per line.
pub const MAX_QUANTITY: i32 = 1000;

/// A cart line as submitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price the client believes is current.
    pub price: f64,
}

impl CheckoutItem {
    /// Creates a cart line.
    pub fn new(product_id: impl Into<ProductId>, quantity: i32, price: f64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }

    /// Returns true if the quantity is within the accepted range.
    pub fn has_valid_quantity(&self) -> bool {
        (MIN_QUANTITY..=MAX_QUANTITY).contains(&self.quantity)
    }
}

/// A checkout submitted on behalf of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub items: Vec<CheckoutItem>,
    pub payment_method: String,
    pub shipping_address: String,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

impl CheckoutRequest {
    /// Creates a request without an idempotency token.
    pub fn new(
        user_id: impl Into<UserId>,
        items: Vec<CheckoutItem>,
        payment_method: impl Into<String>,
        shipping_address: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            items,
            payment_method: payment_method.into(),
            shipping_address: shipping_address.into(),
            idempotency_token: None,
        }
    }

    /// Sets the idempotency token.
    pub fn with_idempotency_token(mut self, token: impl Into<String>) -> Self {
        self.idempotency_token = Some(token.into());
        self
    }

    /// Returns the idempotency token, treating an empty string as absent.
    pub fn token(&self) -> Option<&str> {
        self.idempotency_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}
