//! Order lifecycle and payment method enums.
//!
//! The order status is a small state machine:
//!
//! ```text
//! PENDING ──────────┬──> PENDING_PAYMENT ──┬──> RESERVED ──┬──> PROCESSED ──> DELIVERED
//!    │              │          │           │       │       │        │
//!    │              └──────────┼───────────┴───────┼───────┘        │
//!    └─────────────────────────┴───────────────────┴────────────────┴──> CANCELLED
//! ```
//!
//! `RESERVED`, `PROCESSED` and `DELIVERED` hold stock: entering any of them
//! for the first time decrements inventory for every line item.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Order payment / fulfilment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.order_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created at checkout, waiting for manual payment (cash, transfer).
    #[default]
    Pending,
    /// Waiting on the payment gateway.
    PendingPayment,
    /// Stock held for the customer before payment is confirmed.
    Reserved,
    /// Paid and being prepared.
    Processed,
    /// Handed to the customer.
    Delivered,
    /// Cancelled, rejected or refunded.
    Cancelled,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::PendingPayment,
        Self::Reserved,
        Self::Processed,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Whether an order may move from `self` to `next`.
    ///
    /// Staying in the same status is always allowed and means "no change".
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use OrderStatus::{Cancelled, Delivered, Pending, PendingPayment, Processed, Reserved};

        if self as u8 == next as u8 {
            return true;
        }
        matches!(
            (self, next),
            (Pending, PendingPayment | Reserved | Processed | Cancelled)
                | (PendingPayment, Reserved | Processed | Cancelled)
                | (Reserved, Processed | Cancelled)
                | (Processed, Delivered | Cancelled)
        )
    }

    /// Whether orders in this status have their stock taken out of inventory.
    #[must_use]
    pub const fn commits_stock(self) -> bool {
        matches!(self, Self::Reserved | Self::Processed | Self::Delivered)
    }

    /// Wire / database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Reserved => "RESERVED",
            Self::Processed => "PROCESSED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// MercadoPago Checkout Pro.
    #[serde(alias = "mercadopago")]
    MercadoPago,
    /// Manual bank transfer.
    BankTransfer,
    /// Cash on pickup or delivery.
    Cash,
}

impl PaymentMethod {
    /// Status a freshly created order starts in.
    #[must_use]
    pub const fn initial_status(self) -> OrderStatus {
        match self {
            Self::MercadoPago => OrderStatus::PendingPayment,
            Self::BankTransfer | Self::Cash => OrderStatus::Pending,
        }
    }

    /// Key used in the `payment_methods` setting.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MercadoPago => "mercado_pago",
            Self::BankTransfer => "bank_transfer",
            Self::Cash => "cash",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(PendingPayment));
        assert!(Pending.can_transition_to(Processed));
        assert!(PendingPayment.can_transition_to(Reserved));
        assert!(Reserved.can_transition_to(Processed));
        assert!(Processed.can_transition_to(Delivered));
        assert!(Processed.can_transition_to(Cancelled));
    }

    #[test]
    fn test_backward_and_terminal_transitions_rejected() {
        use OrderStatus::*;
        assert!(!Processed.can_transition_to(PendingPayment));
        assert!(!Reserved.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Delivered));
        for next in OrderStatus::ALL {
            if next != Delivered {
                assert!(!Delivered.can_transition_to(next), "DELIVERED -> {next}");
            }
            if next != Cancelled {
                assert!(!Cancelled.can_transition_to(next), "CANCELLED -> {next}");
            }
        }
    }

    #[test]
    fn test_same_status_is_allowed() {
        for status in OrderStatus::ALL {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn test_commits_stock() {
        assert!(!OrderStatus::Pending.commits_stock());
        assert!(!OrderStatus::PendingPayment.commits_stock());
        assert!(OrderStatus::Reserved.commits_stock());
        assert!(OrderStatus::Processed.commits_stock());
        assert!(OrderStatus::Delivered.commits_stock());
        assert!(!OrderStatus::Cancelled.commits_stock());
    }

    #[test]
    fn test_parse_and_serde() {
        assert_eq!(
            "pending_payment".parse::<OrderStatus>().unwrap(),
            OrderStatus::PendingPayment
        );
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&OrderStatus::PendingPayment).unwrap(),
            "\"PENDING_PAYMENT\""
        );
    }

    #[test]
    fn test_payment_method_initial_status() {
        assert_eq!(
            PaymentMethod::MercadoPago.initial_status(),
            OrderStatus::PendingPayment
        );
        assert_eq!(PaymentMethod::Cash.initial_status(), OrderStatus::Pending);
        let parsed: PaymentMethod = serde_json::from_str("\"mercadopago\"").unwrap();
        assert_eq!(parsed, PaymentMethod::MercadoPago);
    }
}
