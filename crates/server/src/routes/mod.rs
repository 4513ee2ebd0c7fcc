//! HTTP route handlers.
//!
//! Every `/api` response is a JSON envelope: `{"success": true, "data": ...}`
//! on success, `{"success": false, "error": ..., "code": ...}` on failure
//! (see [`crate::error`]).
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness
//! GET    /health/ready                    - Readiness (database)
//!
//! # Auth
//! POST   /api/auth/register               - Create account and log in
//! POST   /api/auth/login                  - Log in
//! POST   /api/auth/logout                 - Log out
//! GET    /api/auth/me                     - Current user
//!
//! # Catalog
//! GET    /api/products                    - List (?category=&q=&featured=&ids=&page=&per_page=)
//! GET    /api/products/{id_or_slug}       - Detail
//! POST   /api/products                    - Create (admin)
//! PUT    /api/products/{id}               - Update (admin)
//! DELETE /api/products/{id}               - Delete (admin)
//! POST   /api/products/{id}/variants/generate - Preview color x size variants (admin)
//! PUT    /api/products/{id}/variants      - Replace variants (admin)
//! GET    /api/categories                  - List
//! GET    /api/categories/{id_or_slug}     - Detail
//! POST   /api/categories                  - Create (admin)
//! PUT    /api/categories/{id}             - Update (admin)
//! DELETE /api/categories/{id}             - Delete (admin)
//!
//! # Checkout
//! POST   /api/cart/validate               - Reprice a client-held cart
//! POST   /api/shipping/quote              - Shipping options for a destination
//! POST   /api/orders                      - Checkout
//! GET    /api/orders                      - List (admin)
//! GET    /api/orders/{id}                 - Detail (admin)
//! PATCH  /api/orders/{id}                 - Status/notes/payment (admin)
//! POST   /api/payments/mercadopago/preference - Start a MercadoPago checkout
//! POST   /api/payments/mercadopago/webhook    - MercadoPago notifications
//!
//! # Back-office
//! GET    /api/settings                    - List (admin)
//! GET    /api/settings/{key}              - Read (public keys anonymous)
//! PUT    /api/settings/{key}              - Write (admin)
//! GET    /api/users                       - List (admin)
//! PATCH  /api/users/{id}/admin            - Grant/revoke admin (admin)
//! ```

pub mod auth;
pub mod cart;
pub mod categories;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;
pub mod settings;
pub mod shipping;
pub mod users;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts},
    http::StatusCode,
    routing::{get, patch, post, put},
};
use serde::{Deserialize, Serialize};

use crate::db::page_bounds;
use crate::error::AppError;
use crate::middleware::{auth_rate_limiter, checkout_rate_limiter};
use crate::state::AppState;

// =============================================================================
// Extractors and envelopes
// =============================================================================

/// JSON body extractor whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor whose rejections use the error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Path extractor whose rejections use the error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

/// Wrap `data` in the success envelope.
pub const fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Wrap `data` in the success envelope with `201 Created`.
pub const fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok(data))
}

/// Paging parameters shared by list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// One page of a listing.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> Page<T> {
    /// Build a page from the bounds [`page_bounds`] produced.
    #[must_use]
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            items,
            total,
            page: offset / limit.max(1) + 1,
            per_page: limit,
        }
    }
}

impl PageQuery {
    /// `(limit, offset)` for this query.
    #[must_use]
    pub fn bounds(self) -> (i64, i64) {
        page_bounds(self.page, self.per_page)
    }
}

/// A path segment that is either a numeric ID or a slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrSlug {
    Id(i32),
    Slug(String),
}

impl IdOrSlug {
    #[must_use]
    pub fn parse(segment: &str) -> Self {
        segment
            .parse::<i32>()
            .map_or_else(|_| Self::Slug(segment.to_owned()), Self::Id)
    }
}

// =============================================================================
// Routers
// =============================================================================

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    let limited = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(auth_rate_limiter());

    Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .merge(limited)
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
        .route("/{id}/variants", put(products::replace_variants))
        .route("/{id}/variants/generate", post(products::generate_variants))
}

/// Create the category routes router.
pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(categories::index).post(categories::create))
        .route(
            "/{id}",
            get(categories::show)
                .put(categories::update)
                .delete(categories::delete),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(orders::create)
                .layer(checkout_rate_limiter())
                .get(orders::index),
        )
        .route("/{id}", get(orders::show).patch(orders::update))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/mercadopago/preference",
            post(payments::create_preference).layer(checkout_rate_limiter()),
        )
        .route("/mercadopago/webhook", post(payments::webhook))
}

/// Create the settings routes router.
pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(settings::index))
        .route("/{key}", get(settings::show).put(settings::update))
}

/// Create the user management routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::index))
        .route("/{id}/admin", patch(users::set_admin))
}

/// Create all `/api` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/products", product_routes())
        .nest("/categories", category_routes())
        .route("/cart/validate", post(cart::validate))
        .route("/shipping/quote", post(shipping::quote))
        .nest("/orders", order_routes())
        .nest("/payments", payment_routes())
        .nest("/settings", settings_routes())
        .nest("/users", user_routes())
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_or_slug() {
        assert_eq!(IdOrSlug::parse("42"), IdOrSlug::Id(42));
        assert_eq!(
            IdOrSlug::parse("remera-basica"),
            IdOrSlug::Slug("remera-basica".to_owned())
        );
        assert_eq!(
            IdOrSlug::parse("99999999999"),
            IdOrSlug::Slug("99999999999".to_owned())
        );
    }

    #[test]
    fn test_page_numbers() {
        let page: Page<()> = Page::new(Vec::new(), 45, 20, 40);
        assert_eq!(page.page, 3);
        assert_eq!(page.per_page, 20);
        assert_eq!(page.total, 45);
    }
}
