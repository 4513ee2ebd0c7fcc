//! Shipping quotes.
//!
//! Local quotes come from the rate table in the `shipping` setting. When a
//! carrier endpoint is configured, carrier quotes are fetched concurrently and
//! offered next to the local ones; a carrier that fails or times out is
//! logged and left out rather than failing the whole quote.

use std::time::Duration;

use futures::future::join_all;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

use vitrina_core::Money;
use vitrina_core::shipping::{self, ShippingError, ShippingMethod, ShippingQuote};

use crate::config::ShippingQuoteConfig;
use crate::services::settings::{SettingsError, SettingsService};

const CARRIER_TIMEOUT: Duration = Duration::from_secs(8);

/// Errors from quoting.
#[derive(Debug, Error)]
pub enum QuoteError {
    /// The rate table rejected the request.
    #[error(transparent)]
    Calculation(#[from] ShippingError),

    /// Rates could not be loaded.
    #[error("could not load shipping rates: {0}")]
    Settings(#[from] SettingsError),
}

/// Errors from the carrier endpoint.
#[derive(Debug, Error)]
pub enum CarrierError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status.
    #[error("carrier returned {status}")]
    Status { status: u16 },

    /// Token could not be used as a header value.
    #[error("invalid carrier token")]
    InvalidToken,
}

#[derive(Debug, Serialize)]
struct CarrierRequest<'a> {
    method: ShippingMethod,
    province: &'a str,
    postal_code: Option<&'a str>,
    subtotal: Money,
}

#[derive(Debug, Deserialize)]
struct CarrierResponse {
    cost: Money,
    #[serde(default)]
    carrier: Option<String>,
}

/// Client for an external carrier quote endpoint.
#[derive(Clone)]
pub struct CarrierClient {
    client: reqwest::Client,
    url: String,
}

impl CarrierClient {
    /// Create a carrier client.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the HTTP client fails to build.
    pub fn new(config: &ShippingQuoteConfig) -> Result<Self, CarrierError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|_| CarrierError::InvalidToken)?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(CARRIER_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// Ask the carrier for one method's price.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is not a quote.
    pub async fn quote(
        &self,
        method: ShippingMethod,
        province: &str,
        postal_code: Option<&str>,
        subtotal: Money,
    ) -> Result<ShippingQuote, CarrierError> {
        let response = self
            .client
            .post(&self.url)
            .json(&CarrierRequest {
                method,
                province,
                postal_code,
                subtotal,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CarrierError::Status {
                status: status.as_u16(),
            });
        }

        let body: CarrierResponse = response.json().await?;
        Ok(ShippingQuote {
            method,
            free: body.cost.is_zero(),
            cost: body.cost,
            source: body.carrier.unwrap_or_else(|| "carrier".to_owned()),
        })
    }
}

impl CarrierClient {
    /// Ask the carrier for every delivery method at once.
    ///
    /// Failed methods are logged and left out, so a carrier that is down
    /// yields an empty list.
    pub async fn quote_all(
        &self,
        province: &str,
        postal_code: Option<&str>,
        subtotal: Money,
    ) -> Vec<ShippingQuote> {
        let requests = ShippingMethod::ALL
            .into_iter()
            .filter(|m| m.requires_address())
            .map(|method| async move {
                (method, self.quote(method, province, postal_code, subtotal).await)
            });

        let mut quotes = Vec::new();
        for (method, result) in join_all(requests).await {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(e) => warn!(?method, error = %e, "Carrier quote failed"),
            }
        }
        quotes
    }
}

/// Shipping quotes from local rates and, optionally, a carrier.
#[derive(Clone)]
pub struct ShippingService {
    settings: SettingsService,
    carrier: Option<CarrierClient>,
}

impl ShippingService {
    /// Create a shipping service.
    #[must_use]
    pub const fn new(settings: SettingsService, carrier: Option<CarrierClient>) -> Self {
        Self { settings, carrier }
    }

    /// Quote one method from the local rate table.
    ///
    /// This is the price charged at checkout.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError` if rates cannot be loaded or the method is unavailable.
    pub async fn quote(
        &self,
        method: ShippingMethod,
        province: Option<&str>,
        subtotal: Money,
    ) -> Result<ShippingQuote, QuoteError> {
        let rates = self.settings.shipping_rates().await?;
        Ok(shipping::calculate(&rates, method, province, subtotal)?)
    }

    /// Quote every available option for a destination.
    ///
    /// Local quotes come first in method order; methods the rate table cannot
    /// serve are left out. Carrier quotes follow, fetched concurrently.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError::Settings` if rates cannot be loaded.
    #[instrument(skip(self))]
    pub async fn quote_all(
        &self,
        province: Option<&str>,
        postal_code: Option<&str>,
        subtotal: Money,
    ) -> Result<Vec<ShippingQuote>, QuoteError> {
        let rates = self.settings.shipping_rates().await?;

        let mut quotes: Vec<ShippingQuote> = ShippingMethod::ALL
            .into_iter()
            .filter_map(|method| shipping::calculate(&rates, method, province, subtotal).ok())
            .collect();

        if let (Some(carrier), Some(province)) =
            (&self.carrier, province.map(str::trim).filter(|p| !p.is_empty()))
        {
            quotes.extend(carrier.quote_all(province, postal_code, subtotal).await);
        }

        Ok(quotes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;

    /// Start a carrier stub on a random port and return its quote URL.
    async fn spawn_carrier(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/quote")
    }

    fn client(url: String) -> CarrierClient {
        CarrierClient::new(&ShippingQuoteConfig { url, token: None }).unwrap()
    }

    fn subtotal() -> Money {
        Money::from_cents(2_000_000).unwrap()
    }

    #[tokio::test]
    async fn test_carrier_keeps_successful_quotes() {
        // Standard is quoted, express fails upstream.
        let router = Router::new().route(
            "/quote",
            post(|Json(body): Json<Value>| async move {
                if body["method"] == "standard" {
                    Ok(Json(json!({ "cost": "5400.00", "carrier": "andreani" })))
                } else {
                    Err(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }),
        );
        let carrier = client(spawn_carrier(router).await);

        let quotes = carrier.quote_all("Córdoba", Some("5000"), subtotal()).await;
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].method, ShippingMethod::Standard);
        assert_eq!(quotes[0].cost, Money::from_cents(540_000).unwrap());
        assert_eq!(quotes[0].source, "andreani");
        assert!(!quotes[0].free);
    }

    #[tokio::test]
    async fn test_carrier_down_yields_no_quotes() {
        let router = Router::new().route(
            "/quote",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let carrier = client(spawn_carrier(router).await);

        let quotes = carrier.quote_all("Córdoba", None, subtotal()).await;
        assert!(quotes.is_empty());
    }

    #[tokio::test]
    async fn test_carrier_status_error() {
        let router = Router::new().route("/quote", post(|| async { StatusCode::BAD_GATEWAY }));
        let carrier = client(spawn_carrier(router).await);

        let err = carrier
            .quote(ShippingMethod::Express, "Salta", None, subtotal())
            .await
            .unwrap_err();
        assert!(matches!(err, CarrierError::Status { status: 502 }));
    }
}
