//! Cart validation.
//!
//! The cart lives on the client. Before showing totals (and again at
//! checkout) the client sends its lines here to get them repriced against
//! the current catalog and stock.

use axum::{Json, extract::State};
use serde::Deserialize;

use vitrina_core::cart::{CartLine, PricedCart, price_cart};

use crate::db::ProductRepository;
use crate::error::Result;
use crate::routes::{ApiJson, ApiResponse, ok};
use crate::state::AppState;

/// Lines to validate.
#[derive(Debug, Deserialize)]
pub struct CartRequest {
    pub items: Vec<CartLine>,
}

/// Reprice `items` against the catalog.
///
/// # Errors
///
/// Returns `AppError::Cart` for empty carts, unknown or inactive products,
/// bad variants and insufficient stock.
pub async fn price_items(state: &AppState, items: &[CartLine]) -> Result<PricedCart> {
    let mut ids: Vec<_> = items.iter().map(|line| line.product_id).collect();
    ids.sort_unstable();
    ids.dedup();

    let catalog = ProductRepository::new(state.pool()).catalog(&ids).await?;
    Ok(price_cart(items, &catalog)?)
}

/// Validate and reprice a cart.
///
/// POST /api/cart/validate
///
/// # Errors
///
/// See [`price_items`].
pub async fn validate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CartRequest>,
) -> Result<Json<ApiResponse<PricedCart>>> {
    let priced = price_items(&state, &req.items).await?;
    Ok(ok(priced))
}
