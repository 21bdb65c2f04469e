//! Caller identity set by the upstream auth gateway.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use order_store::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, taken from the `x-user-id` header.
///
/// A missing, non-numeric or non-positive id is rejected with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;

        raw.to_str()
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(|id| Caller(UserId::new(id)))
            .ok_or_else(|| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))
    }
}
