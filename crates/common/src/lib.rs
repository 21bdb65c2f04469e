//! Shared identifier types used across the checkout workspace.

pub mod types;

pub use types::{OrderDetailId, OrderId, ProductId, UserId};
