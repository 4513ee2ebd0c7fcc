//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. The response is always the
//! JSON error envelope:
//!
//! ```json
//! { "success": false, "error": "Order not found", "code": "NOT_FOUND" }
//! ```
//!
//! Server errors are captured to Sentry and logged before responding, and
//! their details never reach the client.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use vitrina_core::cart::CartError;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::orders::OrderError;
use crate::services::payments::PaymentError;
use crate::services::settings::SettingsError;
use crate::services::shipping::QuoteError;

/// Machine-readable error codes sent in the envelope.
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const CONFLICT: &str = "CONFLICT";
    pub const INSUFFICIENT_STOCK: &str = "INSUFFICIENT_STOCK";
    pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";
    pub const PAYMENT_ERROR: &str = "PAYMENT_ERROR";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const CSRF_REJECTED: &str = "CSRF_REJECTED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Order operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Payment gateway operation failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Settings operation failed.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Shipping quote failed.
    #[error("Shipping error: {0}")]
    Shipping(#[from] QuoteError),

    /// Cart could not be priced.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Well-formed request with invalid values.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request conflicts with existing data.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Cross-site request rejected.
    #[error("Cross-site request rejected")]
    CsrfRejected,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

const INTERNAL_MESSAGE: &str = "Internal server error";

impl AppError {
    /// Status, code and client-facing message for this error.
    #[must_use]
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        use codes::*;

        let internal = || {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_ERROR,
                INTERNAL_MESSAGE.to_string(),
            )
        };

        match self {
            Self::Database(err) => repository_parts(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    UNAUTHORIZED,
                    "Invalid credentials".to_string(),
                ),
                AuthError::UserNotFound => {
                    (StatusCode::NOT_FOUND, NOT_FOUND, "User not found".to_string())
                }
                AuthError::UserAlreadyExists => (
                    StatusCode::CONFLICT,
                    CONFLICT,
                    "An account with this email already exists".to_string(),
                ),
                AuthError::InvalidEmail(_) => (
                    StatusCode::BAD_REQUEST,
                    VALIDATION_ERROR,
                    "Invalid email address".to_string(),
                ),
                AuthError::WeakPassword(msg) | AuthError::InvalidName(msg) => {
                    (StatusCode::BAD_REQUEST, VALIDATION_ERROR, msg.clone())
                }
                AuthError::CannotDemoteSelf => {
                    (StatusCode::FORBIDDEN, FORBIDDEN, err.to_string())
                }
                AuthError::Repository(err) => repository_parts(err),
                AuthError::PasswordHash => internal(),
            },
            Self::Order(err) => match err {
                OrderError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, VALIDATION_ERROR, msg.clone())
                }
                OrderError::InvalidEmail(_) => (
                    StatusCode::BAD_REQUEST,
                    VALIDATION_ERROR,
                    "Invalid email address".to_string(),
                ),
                OrderError::Cart(err) => cart_parts(err),
                OrderError::Shipping(err) => quote_parts(err),
                OrderError::PaymentMethodUnavailable(_) => {
                    (StatusCode::BAD_REQUEST, VALIDATION_ERROR, err.to_string())
                }
                OrderError::NotFound => {
                    (StatusCode::NOT_FOUND, NOT_FOUND, "Order not found".to_string())
                }
                OrderError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, INVALID_TRANSITION, err.to_string())
                }
                OrderError::InsufficientStock { .. } => {
                    (StatusCode::CONFLICT, INSUFFICIENT_STOCK, err.to_string())
                }
                OrderError::Settings(err) => settings_parts(err),
                OrderError::Repository(err) => repository_parts(err),
            },
            Self::Payment(err) => match err {
                PaymentError::NotConfigured => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    PAYMENT_ERROR,
                    "Online payments are not available".to_string(),
                ),
                PaymentError::InvalidSignature(_) => (
                    StatusCode::UNAUTHORIZED,
                    UNAUTHORIZED,
                    "Invalid signature".to_string(),
                ),
                PaymentError::Http(_) | PaymentError::Api { .. } | PaymentError::Parse(_) => (
                    StatusCode::BAD_GATEWAY,
                    PAYMENT_ERROR,
                    "Payment provider error".to_string(),
                ),
            },
            Self::Settings(err) => settings_parts(err),
            Self::Shipping(err) => quote_parts(err),
            Self::Cart(err) => cart_parts(err),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, NOT_FOUND, format!("{what} not found")),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, UNAUTHORIZED, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, FORBIDDEN, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, BAD_REQUEST, msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, VALIDATION_ERROR, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, CONFLICT, msg.clone()),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                RATE_LIMITED,
                "Too many requests".to_string(),
            ),
            Self::CsrfRejected => (
                StatusCode::FORBIDDEN,
                CSRF_REJECTED,
                "Cross-site request rejected".to_string(),
            ),
            Self::Internal(_) => internal(),
        }
    }
}

fn repository_parts(err: &RepositoryError) -> (StatusCode, &'static str, String) {
    match err {
        RepositoryError::NotFound => (
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            "Not found".to_string(),
        ),
        RepositoryError::Conflict(msg) => (StatusCode::CONFLICT, codes::CONFLICT, msg.clone()),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            INTERNAL_MESSAGE.to_string(),
        ),
    }
}

fn cart_parts(err: &CartError) -> (StatusCode, &'static str, String) {
    match err {
        CartError::InsufficientStock { .. } => (
            StatusCode::CONFLICT,
            codes::INSUFFICIENT_STOCK,
            err.to_string(),
        ),
        _ => (
            StatusCode::BAD_REQUEST,
            codes::VALIDATION_ERROR,
            err.to_string(),
        ),
    }
}

fn quote_parts(err: &QuoteError) -> (StatusCode, &'static str, String) {
    match err {
        QuoteError::Calculation(_) => (
            StatusCode::BAD_REQUEST,
            codes::VALIDATION_ERROR,
            err.to_string(),
        ),
        QuoteError::Settings(err) => settings_parts(err),
    }
}

fn settings_parts(err: &SettingsError) -> (StatusCode, &'static str, String) {
    match err {
        SettingsError::InvalidKey(_) | SettingsError::InvalidValue { .. } => (
            StatusCode::BAD_REQUEST,
            codes::VALIDATION_ERROR,
            err.to_string(),
        ),
        SettingsError::Repository(err) => repository_parts(err),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, code, "Request rejected");
        }

        error_response(status, code, message)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => Self::Validation(err.body_text()),
            other => Self::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Build an error envelope response.
///
/// Used directly by middleware that rejects before a handler runs.
pub fn error_response(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        success: false,
        error: message.into(),
        code,
    };
    (status, Json(body)).into_response()
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the current request.
///
/// Only the user ID is attached; emails stay out of Sentry.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;
    use vitrina_core::{OrderStatus, ProductId};

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn body_json(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(get_status(AppError::CsrfRejected), StatusCode::FORBIDDEN);
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let (status, body) = body_json(AppError::NotFound("Product".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Product not found");
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption(
            "order 7 has email 'x'".to_string(),
        ));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], INTERNAL_MESSAGE);
        assert_eq!(body["code"], "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_order_error_codes() {
        let (status, body) = body_json(AppError::Order(OrderError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Pending,
        }))
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "INVALID_TRANSITION");

        let (status, body) = body_json(AppError::Order(OrderError::Cart(
            CartError::InsufficientStock {
                product_id: ProductId::new(4),
                variant_id: None,
                name: "Remera".to_string(),
                requested: 3,
                available: 1,
            },
        )))
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "INSUFFICIENT_STOCK");

        let (status, body) =
            body_json(AppError::Order(OrderError::Cart(CartError::Empty))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_auth_error_codes() {
        let (status, body) = body_json(AppError::Auth(AuthError::InvalidCredentials)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");

        let (status, body) = body_json(AppError::Auth(AuthError::UserAlreadyExists)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        let (status, _) = body_json(AppError::Auth(AuthError::CannotDemoteSelf)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_payment_error_codes() {
        let (status, body) = body_json(AppError::Payment(PaymentError::Api {
            status: 500,
            message: "secret upstream detail".to_string(),
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "PAYMENT_ERROR");
        assert_eq!(body["error"], "Payment provider error");
    }

    #[tokio::test]
    async fn test_repository_conflict_keeps_message() {
        let (status, body) = body_json(AppError::Database(RepositoryError::Conflict(
            "slug already exists".to_string(),
        )))
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "slug already exists");
    }
}
