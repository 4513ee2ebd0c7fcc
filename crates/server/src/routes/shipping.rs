//! Shipping quotes.

use axum::{Json, extract::State};
use serde::Deserialize;

use vitrina_core::Money;
use vitrina_core::cart::CartLine;
use vitrina_core::shipping::ShippingQuote;

use crate::error::Result;
use crate::routes::cart::price_items;
use crate::routes::{ApiJson, ApiResponse, ok};
use crate::state::AppState;

/// Destination to quote.
///
/// The subtotal decides free shipping. When `items` is given the subtotal is
/// computed from the catalog and any client-sent `subtotal` is ignored.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub subtotal: Option<Money>,
    #[serde(default)]
    pub items: Option<Vec<CartLine>>,
}

/// Every shipping option available for a destination.
///
/// POST /api/shipping/quote
///
/// # Errors
///
/// Returns `AppError::Cart` if `items` cannot be priced, or
/// `AppError::Shipping` if the rate table cannot be loaded.
pub async fn quote(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<QuoteRequest>,
) -> Result<Json<ApiResponse<Vec<ShippingQuote>>>> {
    let subtotal = match req.items.as_deref() {
        Some(items) => price_items(&state, items).await?.subtotal,
        None => req.subtotal.unwrap_or(Money::ZERO),
    };

    let quotes = state
        .shipping()
        .quote_all(
            req.province.as_deref(),
            req.postal_code.as_deref(),
            subtotal,
        )
        .await?;
    Ok(ok(quotes))
}
