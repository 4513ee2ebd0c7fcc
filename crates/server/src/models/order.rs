//! Order domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vitrina_core::shipping::ShippingMethod;
use vitrina_core::{
    Email, Money, OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, VariantId,
};

/// An order with its line items.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub customer_name: String,
    pub customer_email: Email,
    pub customer_phone: Option<String>,
    pub shipping_method: ShippingMethod,
    pub shipping_address: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_province: Option<String>,
    pub shipping_postal_code: Option<String>,
    pub shipping_cost: Money,
    pub subtotal: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    /// Gateway payment ID once a payment was reported.
    pub payment_id: Option<String>,
    /// MercadoPago preference ID once checkout started.
    pub preference_id: Option<String>,
    /// Whether this order's items have been taken out of stock.
    pub stock_committed: bool,
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item, with name and price captured at checkout.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub variant_label: Option<String>,
    pub unit_price: Money,
    pub quantity: i32,
}

impl OrderItem {
    /// `unit_price * quantity`; `None` on overflow or a corrupt quantity.
    #[must_use]
    pub fn line_total(&self) -> Option<Money> {
        let quantity = u32::try_from(self.quantity).ok()?;
        self.unit_price.times(quantity).ok()
    }
}

/// Row shown in the admin order list.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub status: OrderStatus,
    pub customer_name: String,
    pub customer_email: Email,
    pub shipping_method: ShippingMethod,
    pub payment_method: PaymentMethod,
    pub total: Money,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
}
