//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use order_store::StoreError;

/// API-level error type that maps to HTTP responses.
///
/// Every error renders as `{"error": <kind>, "detail": <message>}`.
#[derive(Debug)]
pub enum ApiError {
    /// The caller could not be identified.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout rejected or failed.
    Checkout(CheckoutError),
    /// Order store failure on a read path.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Store(err) => {
                tracing::error!(error = %err, "order store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "persistence_failure",
                    err.to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": kind, "detail": detail });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, &'static str, String) {
    let status = match &err {
        CheckoutError::Validation(_) => StatusCode::BAD_REQUEST,
        CheckoutError::DuplicateSubmission(_) => StatusCode::CONFLICT,
        CheckoutError::CatalogUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutError::Persistence(_) => {
            tracing::error!(error = %err, "checkout persistence failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.kind(), err.to_string())
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
