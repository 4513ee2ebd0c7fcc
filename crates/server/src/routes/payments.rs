//! MercadoPago route handlers.
//!
//! # Webhook policy
//!
//! Once a notification has been parsed (and its signature checked, when a
//! secret is configured) the handler answers 200 no matter what happens next.
//! MercadoPago retries anything else, and a retried notification racing a
//! slow first delivery is worse than a lost one: failures are logged with
//! `critical = true` for a human to reconcile.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use vitrina_core::{OrderId, OrderStatus, PaymentMethod};

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::redact::redact_json;
use crate::routes::{ApiJson, ApiQuery, ApiResponse, ok};
use crate::services::orders::PaymentUpdateResult;
use crate::services::payments::{MERCADOPAGO, PaymentError};
use crate::state::AppState;

// =============================================================================
// Preference
// =============================================================================

/// Body for starting a MercadoPago checkout.
#[derive(Debug, Deserialize)]
pub struct PreferenceRequest {
    pub order_id: OrderId,
}

/// Where to send the customer to pay.
#[derive(Debug, Serialize)]
pub struct PreferenceResponse {
    pub preference_id: String,
    pub init_point: String,
    pub sandbox_init_point: Option<String>,
}

/// Create a Checkout Pro preference for an unpaid order.
///
/// POST /api/payments/mercadopago/preference
///
/// # Errors
///
/// Returns `AppError::Payment` (503) when MercadoPago is not configured,
/// `AppError::NotFound` for unknown orders, `AppError::Conflict` when the
/// order is not a MercadoPago order awaiting payment, and `AppError::Payment`
/// (502) when the gateway call fails.
pub async fn create_preference(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PreferenceRequest>,
) -> Result<Json<ApiResponse<PreferenceResponse>>> {
    let client = state.mercadopago().ok_or(PaymentError::NotConfigured)?;

    let orders = OrderRepository::new(state.pool());
    let order = orders
        .get(req.order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_owned()))?;

    if order.payment_method != PaymentMethod::MercadoPago {
        return Err(AppError::Conflict(format!(
            "order {} is paid by {}",
            order.id, order.payment_method
        )));
    }
    if !matches!(
        order.status,
        OrderStatus::Pending | OrderStatus::PendingPayment
    ) {
        return Err(AppError::Conflict(format!(
            "order {} is {} and cannot be paid",
            order.id, order.status
        )));
    }

    let preference = client.create_preference(&order).await?;
    orders.set_preference_id(order.id, &preference.id).await?;

    info!(
        order_id = %order.id,
        preference_id = %preference.id,
        "MercadoPago preference created"
    );
    Ok(ok(PreferenceResponse {
        preference_id: preference.id,
        init_point: preference.init_point,
        sandbox_init_point: preference.sandbox_init_point,
    }))
}

// =============================================================================
// Webhook
// =============================================================================

/// Query parameters MercadoPago appends to the notification URL.
///
/// Webhooks send `data.id` and `type`; legacy IPN sends `id` and `topic`.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
    pub topic: Option<String>,
}

/// Acknowledgement body.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub result: &'static str,
}

/// A parsed notification.
#[derive(Debug, PartialEq, Eq)]
struct Notification {
    kind: String,
    data_id: String,
}

/// Pull the notification type and resource ID from the query string, falling
/// back to the JSON body.
fn parse_notification(query: &WebhookQuery, body: Option<&Value>) -> Option<Notification> {
    let body_kind = body
        .and_then(|b| b.get("type").or_else(|| b.get("topic")))
        .and_then(Value::as_str);
    let body_id = body
        .and_then(|b| b.pointer("/data/id"))
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    let kind = query
        .kind
        .as_deref()
        .or(query.topic.as_deref())
        .or(body_kind)?
        .to_owned();
    let data_id = query
        .data_id
        .clone()
        .or_else(|| query.id.clone())
        .or(body_id)
        .filter(|id| !id.trim().is_empty())?;

    Some(Notification {
        kind,
        data_id: data_id.trim().to_owned(),
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

const fn ack(result: &'static str) -> Json<ApiResponse<WebhookAck>> {
    ok(WebhookAck {
        received: true,
        result,
    })
}

/// Receive a MercadoPago notification.
///
/// POST /api/payments/mercadopago/webhook
///
/// # Errors
///
/// Returns `AppError::Payment` (503) when MercadoPago is not configured,
/// `AppError::BadRequest` when the notification cannot be parsed, and
/// `AppError::Payment` (401) when its signature is invalid. Everything after
/// that is acknowledged with 200.
pub async fn webhook(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>> {
    let client = state.mercadopago().ok_or(PaymentError::NotConfigured)?;

    let payload: Option<Value> = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice(&body)
                .map_err(|e| AppError::BadRequest(format!("invalid notification body: {e}")))?,
        )
    };
    if let Some(payload) = &payload {
        debug!(payload = %redact_json(payload), "MercadoPago notification");
    }

    let notification = parse_notification(&query, payload.as_ref())
        .ok_or_else(|| AppError::BadRequest("notification without type or id".to_owned()))?;

    let verified = client
        .check_signature(
            header(&headers, "x-signature"),
            header(&headers, "x-request-id"),
            &notification.data_id,
        )
        .inspect_err(|e| {
            warn!(data_id = %notification.data_id, error = %e, "Rejected MercadoPago notification");
        })?;
    if !verified {
        warn!("MercadoPago webhook secret not configured; signature not checked");
    }

    if notification.kind != "payment" {
        debug!(kind = %notification.kind, "Ignoring non-payment notification");
        return Ok(ack("ignored"));
    }

    let payment = match client.get_payment(&notification.data_id).await {
        Ok(payment) => payment,
        Err(e) => {
            error!(
                critical = true,
                payment_id = %notification.data_id,
                error = %e,
                "Could not fetch MercadoPago payment"
            );
            return Ok(ack("error"));
        }
    };

    let payment_id = payment.id.to_string();
    let result = state
        .orders()
        .apply_payment_update(
            MERCADOPAGO,
            &payment_id,
            &payment.status,
            payment.external_reference.as_deref(),
        )
        .await;

    let outcome = match result {
        Ok(PaymentUpdateResult::Applied(outcome)) => {
            info!(
                order_id = %outcome.order.id,
                payment_id = %payment_id,
                payment_status = %payment.status,
                status = %outcome.order.status,
                stock_committed_now = outcome.stock_committed_now,
                stock_restored = outcome.stock_restored,
                "Payment applied"
            );
            if outcome.trigger_shipment {
                info!(order_id = %outcome.order.id, "Order ready for dispatch");
            }
            "applied"
        }
        Ok(PaymentUpdateResult::AlreadyProcessed) => {
            debug!(payment_id = %payment_id, "Duplicate MercadoPago notification");
            "duplicate"
        }
        Ok(PaymentUpdateResult::Ignored(reason)) => {
            info!(payment_id = %payment_id, %reason, "Payment notification ignored");
            "ignored"
        }
        Err(e) => {
            error!(
                critical = true,
                payment_id = %payment_id,
                payment_status = %payment.status,
                external_reference = ?payment.external_reference,
                error = %e,
                "Payment could not be applied to order"
            );
            "error"
        }
    };
    Ok(ack(outcome))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_notification_from_query() {
        let query = WebhookQuery {
            data_id: Some("123456".to_owned()),
            kind: Some("payment".to_owned()),
            ..WebhookQuery::default()
        };
        assert_eq!(
            parse_notification(&query, None),
            Some(Notification {
                kind: "payment".to_owned(),
                data_id: "123456".to_owned(),
            })
        );
    }

    #[test]
    fn test_parse_notification_legacy_ipn() {
        let query = WebhookQuery {
            id: Some("987".to_owned()),
            topic: Some("merchant_order".to_owned()),
            ..WebhookQuery::default()
        };
        let notification = parse_notification(&query, None).unwrap();
        assert_eq!(notification.kind, "merchant_order");
        assert_eq!(notification.data_id, "987");
    }

    #[test]
    fn test_parse_notification_from_body() {
        let body = json!({
            "action": "payment.updated",
            "type": "payment",
            "data": { "id": 42 }
        });
        let notification = parse_notification(&WebhookQuery::default(), Some(&body)).unwrap();
        assert_eq!(notification.kind, "payment");
        assert_eq!(notification.data_id, "42");
    }

    #[test]
    fn test_parse_notification_missing_id() {
        let body = json!({ "type": "payment", "data": {} });
        assert!(parse_notification(&WebhookQuery::default(), Some(&body)).is_none());
    }
}
