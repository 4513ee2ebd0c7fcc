//! Payment gateway integrations.
//!
//! Only MercadoPago Checkout Pro is supported. Gateway statuses are mapped to
//! order statuses here so [`crate::services::orders::OrderService`] stays
//! provider-agnostic.

pub mod mercadopago;

pub use mercadopago::{
    MercadoPagoClient, Payment, PaymentError, Preference, verify_webhook_signature,
};

use vitrina_core::OrderStatus;

/// Provider name recorded with MercadoPago payment events.
pub const MERCADOPAGO: &str = "mercadopago";

/// Map a gateway payment status to the order status it implies.
///
/// Returns `None` for unknown providers and statuses that carry no order
/// change; those notifications are recorded and otherwise ignored.
#[must_use]
pub fn map_payment_status(provider: &str, status: &str) -> Option<OrderStatus> {
    match provider {
        MERCADOPAGO => mercadopago::map_payment_status(status),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_maps_nothing() {
        assert_eq!(map_payment_status("paypal", "approved"), None);
        assert_eq!(
            map_payment_status(MERCADOPAGO, "approved"),
            Some(OrderStatus::Processed)
        );
    }
}
