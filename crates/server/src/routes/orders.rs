//! Order route handlers.
//!
//! Checkout is anonymous; everything else is back-office.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::info;

use vitrina_core::{OrderId, OrderStatus};

use crate::db::page_bounds;
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{Order, OrderSummary};
use crate::routes::{ApiJson, ApiPath, ApiQuery, ApiResponse, Page, created, ok};
use crate::services::orders::{CheckoutInput, OrderUpdate, OrderUpdateOutcome};
use crate::state::AppState;

/// Query parameters for order listing.
#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Place an order.
///
/// Prices and shipping are recomputed on the server; client totals are never
/// trusted.
///
/// POST /api/orders
///
/// # Errors
///
/// Returns `AppError::Order` for invalid customer data, cart problems,
/// unavailable shipping or a disabled payment method.
pub async fn create(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<CheckoutInput>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>)> {
    let order = state.orders().create_order(input).await?;
    Ok(created(order))
}

/// List orders, newest first.
///
/// GET /api/orders
///
/// # Errors
///
/// Returns `AppError::Order` if the query fails.
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiQuery(query): ApiQuery<OrderQuery>,
) -> Result<Json<ApiResponse<Page<OrderSummary>>>> {
    let (limit, offset) = page_bounds(query.page, query.per_page);
    let (orders, total) = state
        .orders()
        .list(query.status, query.page, query.per_page)
        .await?;
    Ok(ok(Page::new(orders, total, limit, offset)))
}

/// Order detail with items.
///
/// GET /api/orders/{id}
///
/// # Errors
///
/// Returns `AppError::Order` (not found) if the order does not exist.
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<ApiResponse<Order>>> {
    let order = state.orders().get(id).await?;
    Ok(ok(order))
}

/// Change an order's status, notes or payment reference.
///
/// PATCH /api/orders/{id}
///
/// # Errors
///
/// Returns `AppError::Order` for unknown orders, invalid transitions and
/// insufficient stock.
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(update): ApiJson<OrderUpdate>,
) -> Result<Json<ApiResponse<OrderUpdateOutcome>>> {
    let outcome = state.orders().update_order(id, update).await?;

    info!(
        order_id = %id,
        admin_id = %admin.id,
        status = %outcome.order.status,
        "Order changed from back-office"
    );
    if outcome.trigger_shipment {
        info!(order_id = %id, "Order ready for dispatch");
    }
    Ok(ok(outcome))
}
