//! MercadoPago Checkout Pro client.
//!
//! - Creates a payment preference per order and hands the customer the
//!   `init_point` URL to pay.
//! - Fetches payments named by webhook notifications; the notification body
//!   itself is never trusted for the status.
//! - Verifies the `x-signature` header of webhook notifications.

use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use rust_decimal::prelude::ToPrimitive;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument};

use vitrina_core::{Money, OrderStatus};

use crate::config::MercadoPagoConfig;
use crate::models::Order;

/// Currency all prices are charged in.
const CURRENCY_ID: &str = "ARS";

/// Errors that can occur when interacting with MercadoPago.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Webhook signature missing, malformed or wrong.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Payments are not configured.
    #[error("MercadoPago is not configured")]
    NotConfigured,
}

/// Map a MercadoPago payment status to an order status.
#[must_use]
pub fn map_payment_status(status: &str) -> Option<OrderStatus> {
    match status {
        "approved" => Some(OrderStatus::Processed),
        "authorized" | "in_process" | "in_mediation" | "pending" => {
            Some(OrderStatus::PendingPayment)
        }
        "rejected" | "cancelled" | "refunded" | "charged_back" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

// =============================================================================
// API types
// =============================================================================

#[derive(Debug, Serialize)]
struct PreferenceRequest {
    items: Vec<PreferenceItem>,
    payer: PreferencePayer,
    external_reference: String,
    back_urls: BackUrls,
    notification_url: String,
    auto_return: &'static str,
}

#[derive(Debug, Serialize)]
struct PreferenceItem {
    id: String,
    title: String,
    quantity: i32,
    unit_price: f64,
    currency_id: &'static str,
}

#[derive(Debug, Serialize)]
struct PreferencePayer {
    name: String,
    email: String,
}

#[derive(Debug, Serialize)]
struct BackUrls {
    success: String,
    failure: String,
    pending: String,
}

/// A created checkout preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    /// Preference ID.
    pub id: String,
    /// Checkout URL for the customer.
    pub init_point: String,
    /// Sandbox checkout URL.
    #[serde(default)]
    pub sandbox_init_point: Option<String>,
}

/// A payment as reported by `GET /v1/payments/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Payment {
    /// Payment ID.
    pub id: i64,
    /// Gateway status (`approved`, `rejected`, ...).
    pub status: String,
    /// Detail for the status.
    #[serde(default)]
    pub status_detail: Option<String>,
    /// Order ID sent when the preference was created.
    #[serde(default)]
    pub external_reference: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// MercadoPago API client.
#[derive(Clone)]
pub struct MercadoPagoClient {
    client: reqwest::Client,
    api_url: String,
    base_url: String,
    webhook_secret: Option<SecretString>,
}

impl MercadoPagoClient {
    /// Create a new client.
    ///
    /// `base_url` is the shop's public URL, used for return and notification URLs.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the HTTP client fails to build.
    pub fn new(config: &MercadoPagoConfig, base_url: &str) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.access_token.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| PaymentError::Parse(format!("Invalid access token format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    /// Create a Checkout Pro preference for `order`.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn create_preference(&self, order: &Order) -> Result<Preference, PaymentError> {
        let request = self.preference_request(order)?;
        let url = format!("{}/checkout/preferences", self.api_url);

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let preference: Preference = response
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;
        debug!(preference_id = %preference.id, "Preference created");
        Ok(preference)
    }

    /// Fetch a payment.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: &str) -> Result<Payment, PaymentError> {
        if payment_id.is_empty() || !payment_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(PaymentError::Parse(format!("invalid payment id: {payment_id}")));
        }
        let url = format!("{}/v1/payments/{payment_id}", self.api_url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))
    }

    /// Check a webhook's `x-signature` header.
    ///
    /// Returns `Ok(false)` without checking when no secret is configured.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidSignature` if the signature does not match.
    pub fn check_signature(
        &self,
        x_signature: Option<&str>,
        x_request_id: Option<&str>,
        data_id: &str,
    ) -> Result<bool, PaymentError> {
        let Some(secret) = &self.webhook_secret else {
            return Ok(false);
        };
        let x_signature = x_signature
            .ok_or_else(|| PaymentError::InvalidSignature("missing x-signature".to_owned()))?;
        verify_webhook_signature(
            x_signature,
            x_request_id.unwrap_or_default(),
            data_id,
            secret.expose_secret(),
        )?;
        Ok(true)
    }

    fn preference_request(&self, order: &Order) -> Result<PreferenceRequest, PaymentError> {
        let mut items = order
            .items
            .iter()
            .map(|item| {
                let title = match &item.variant_label {
                    Some(label) => format!("{} ({label})", item.product_name),
                    None => item.product_name.clone(),
                };
                Ok(PreferenceItem {
                    id: item.product_id.to_string(),
                    title,
                    quantity: item.quantity,
                    unit_price: to_amount(item.unit_price)?,
                    currency_id: CURRENCY_ID,
                })
            })
            .collect::<Result<Vec<_>, PaymentError>>()?;

        if !order.shipping_cost.is_zero() {
            items.push(PreferenceItem {
                id: "shipping".to_owned(),
                title: "Envío".to_owned(),
                quantity: 1,
                unit_price: to_amount(order.shipping_cost)?,
                currency_id: CURRENCY_ID,
            });
        }

        Ok(PreferenceRequest {
            items,
            payer: PreferencePayer {
                name: order.customer_name.clone(),
                email: order.customer_email.to_string(),
            },
            external_reference: order.id.to_string(),
            back_urls: BackUrls {
                success: format!("{}/checkout/success", self.base_url),
                failure: format!("{}/checkout/failure", self.base_url),
                pending: format!("{}/checkout/pending", self.base_url),
            },
            notification_url: format!("{}/api/payments/mercadopago/webhook", self.base_url),
            auto_return: "approved",
        })
    }
}

fn to_amount(money: Money) -> Result<f64, PaymentError> {
    money
        .amount()
        .to_f64()
        .ok_or_else(|| PaymentError::Parse(format!("amount out of range: {money}")))
}

/// Verify a MercadoPago webhook signature.
///
/// The header looks like `ts=1704908010,v1=618c8534...`. The signed manifest is
/// `id:<data_id>;request-id:<x_request_id>;ts:<ts>;` where alphanumeric data
/// IDs are lowercased.
///
/// # Errors
///
/// Returns `PaymentError::InvalidSignature` if the header is malformed or the
/// HMAC-SHA256 does not match.
pub fn verify_webhook_signature(
    x_signature: &str,
    x_request_id: &str,
    data_id: &str,
    secret: &str,
) -> Result<(), PaymentError> {
    let mut ts = None;
    let mut v1 = None;
    for part in x_signature.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }
    let ts = ts.ok_or_else(|| PaymentError::InvalidSignature("missing ts".to_owned()))?;
    let v1 = v1.ok_or_else(|| PaymentError::InvalidSignature("missing v1".to_owned()))?;
    let expected =
        hex::decode(v1).map_err(|_| PaymentError::InvalidSignature("v1 is not hex".to_owned()))?;

    let data_id = if data_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        data_id.to_ascii_lowercase()
    } else {
        data_id.to_owned()
    };
    let manifest = format!("id:{data_id};request-id:{x_request_id};ts:{ts};");

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(manifest.as_bytes());

    // Constant-time comparison
    mac.verify_slice(&expected)
        .map_err(|_| PaymentError::InvalidSignature("Signature mismatch".to_owned()))
}
