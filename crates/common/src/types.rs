use serde::{Deserialize, Serialize};

/// Declares a row identifier backed by a database-generated `BIGINT`.
///
/// Each identifier is its own type so an order id can never be passed
/// where a detail id or product id is expected.
macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from a raw value.
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

int_id!(
    /// Identifier of a persisted order row.
    OrderId
);

int_id!(
    /// Identifier of the order-detail row that belongs to exactly one order.
    OrderDetailId
);

int_id!(
    /// Identifier of the authenticated caller placing the order.
    UserId
);

int_id!(
    /// Catalog product identifier.
    ProductId
);

impl OrderId {
    /// Returns the broker message key for this order.
    ///
    /// Every event about one order carries the same key so the broker
    /// routes them to the same partition.
    pub fn message_key(&self) -> String {
        format!("order-{}", self.0)
    }
}
