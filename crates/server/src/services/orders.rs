//! Order lifecycle: checkout, status changes and payment reconciliation.
//!
//! # Stock
//!
//! Checkout does not touch inventory. Stock is taken out exactly once, the
//! first time an order enters a status that holds stock (`RESERVED`,
//! `PROCESSED`, `DELIVERED`), and the `stock_committed` flag records that it
//! happened. Cancelling a committed order puts the stock back and clears the
//! flag.
//!
//! Every change runs in one transaction that locks the order row and the
//! touched product/variant rows (`FOR UPDATE`, in ID order), so two admins or
//! a webhook racing an admin cannot commit the same stock twice.
//!
//! # Payment notifications
//!
//! Each `(provider, payment_id, status)` triple is recorded in
//! `payment_event` inside the same transaction as the order change; a
//! duplicate notification finds its triple already there and changes nothing.
//! A status that is not a valid transition (a late `pending` after
//! `approved`) is recorded and ignored.

use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{info, instrument, warn};

use vitrina_core::cart::{CartError, CartLine, price_cart};
use vitrina_core::shipping::ShippingMethod;
use vitrina_core::{
    Email, EmailError, OrderId, OrderStatus, PaymentMethod, ProductId, VariantId,
};

use crate::db::orders::{self, NewOrder, OrderStateChange};
use crate::db::products::{adjust_stock, load_catalog};
use crate::db::{OrderRepository, RepositoryError, page_bounds};
use crate::models::{Order, OrderItem, OrderSummary};
use crate::redact::redact_email;
use crate::services::payments::map_payment_status;
use crate::services::settings::{SettingsError, SettingsService};
use crate::services::shipping::{QuoteError, ShippingService};

const MAX_NAME_LENGTH: usize = 120;
const MAX_FIELD_LENGTH: usize = 255;
const MAX_NOTES_LENGTH: usize = 1000;

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Checkout or update input is invalid.
    #[error("{0}")]
    Validation(String),

    /// Customer email is invalid.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// The cart could not be priced.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Shipping could not be quoted.
    #[error(transparent)]
    Shipping(#[from] QuoteError),

    /// The payment method is switched off in settings.
    #[error("payment method {0} is not available")]
    PaymentMethodUnavailable(PaymentMethod),

    /// Order does not exist.
    #[error("order not found")]
    NotFound,

    /// The requested status is not reachable from the current one.
    #[error("cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Not enough stock to commit an order line.
    #[error("insufficient stock for {name}")]
    InsufficientStock {
        product_id: ProductId,
        variant_id: Option<VariantId>,
        name: String,
    },

    /// Settings could not be read.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

// =============================================================================
// Inputs and outcomes
// =============================================================================

/// Checkout request.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub shipping_method: ShippingMethod,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub shipping_city: Option<String>,
    #[serde(default)]
    pub shipping_province: Option<String>,
    #[serde(default)]
    pub shipping_postal_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Back-office changes to an order. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderUpdate {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
}

/// Result of a status change.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrderUpdateOutcome {
    /// The order after the change.
    pub order: Order,
    /// Stock was taken out by this change.
    pub stock_committed_now: bool,
    /// Stock was put back by this change.
    pub stock_restored: bool,
    /// The order just entered `PROCESSED` and must be dispatched.
    pub trigger_shipment: bool,
}

/// Result of applying a payment notification.
#[derive(Debug, Clone)]
pub enum PaymentUpdateResult {
    /// The order moved (or stayed) according to the payment.
    Applied(Box<OrderUpdateOutcome>),
    /// Same notification seen before; nothing changed.
    AlreadyProcessed,
    /// Recorded but not applied.
    Ignored(String),
}

/// What a transition does to inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAction {
    /// Leave stock alone.
    None,
    /// Take the order's items out of stock.
    Commit,
    /// Put the order's items back.
    Restore,
}

impl StockAction {
    /// Value of the `stock_committed` flag after this action.
    #[must_use]
    pub const fn committed_after(self, committed: bool) -> bool {
        match self {
            Self::Commit => true,
            Self::Restore => false,
            Self::None => committed,
        }
    }
}

/// Decided effects of a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    pub stock: StockAction,
    /// The order enters `PROCESSED` with this change.
    pub enters_processed: bool,
}

/// Decide what moving from `from` to `to` does.
///
/// # Errors
///
/// Returns `OrderError::InvalidTransition` if the move is not allowed.
pub fn plan_transition(
    from: OrderStatus,
    to: OrderStatus,
    stock_committed: bool,
) -> Result<TransitionPlan, OrderError> {
    if !from.can_transition_to(to) {
        return Err(OrderError::InvalidTransition { from, to });
    }
    let stock = if to.commits_stock() && !stock_committed {
        StockAction::Commit
    } else if matches!(to, OrderStatus::Cancelled) && stock_committed {
        StockAction::Restore
    } else {
        StockAction::None
    };
    Ok(TransitionPlan {
        stock,
        enters_processed: matches!(to, OrderStatus::Processed)
            && !matches!(from, OrderStatus::Processed),
    })
}

/// What a recorded payment notification does to its order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PaymentStep {
    /// The `(provider, payment_id, status)` triple was already recorded.
    AlreadyProcessed,
    /// Recorded, order left alone.
    Ignore(String),
    /// Move the order to this status.
    Transition(OrderStatus),
}

/// Decide a payment notification.
///
/// `first_time` is whether the event row was new, `current` the order's
/// status (if the order exists) and `target` the status the gateway status
/// maps to.
fn decide_payment(
    first_time: bool,
    current: Option<OrderStatus>,
    target: Option<OrderStatus>,
    gateway_status: &str,
) -> PaymentStep {
    if !first_time {
        return PaymentStep::AlreadyProcessed;
    }
    let Some(current) = current else {
        return PaymentStep::Ignore("unknown order".to_owned());
    };
    let Some(target) = target else {
        return PaymentStep::Ignore(format!("status {gateway_status} has no order effect"));
    };
    if !current.can_transition_to(target) {
        return PaymentStep::Ignore(format!("{current} -> {target} not allowed"));
    }
    PaymentStep::Transition(target)
}

/// One stock change for an order line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StockMove {
    product_id: ProductId,
    variant_id: Option<VariantId>,
    delta: i32,
    name: String,
}

/// Stock changes for `items` under `action`.
///
/// Committing fails as a whole if any line's variant was deleted since
/// checkout. Restoring skips such lines.
fn stock_moves(items: &[OrderItem], action: StockAction) -> Result<Vec<StockMove>, OrderError> {
    let sign = match action {
        StockAction::None => return Ok(Vec::new()),
        StockAction::Commit => -1,
        StockAction::Restore => 1,
    };

    let mut moves = Vec::with_capacity(items.len());
    for item in items {
        let variant_gone = item.variant_id.is_none() && item.variant_label.is_some();
        if variant_gone {
            if action == StockAction::Commit {
                return Err(OrderError::InsufficientStock {
                    product_id: item.product_id,
                    variant_id: None,
                    name: item_name(item),
                });
            }
            warn!(product_id = %item.product_id, "Variant gone, stock not restored");
            continue;
        }
        moves.push(StockMove {
            product_id: item.product_id,
            variant_id: item.variant_id,
            delta: sign * item.quantity,
            name: item_name(item),
        });
    }
    Ok(moves)
}

// =============================================================================
// Service
// =============================================================================

/// Order service.
pub struct OrderService<'a> {
    pool: &'a PgPool,
    shipping: &'a ShippingService,
    settings: &'a SettingsService,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        shipping: &'a ShippingService,
        settings: &'a SettingsService,
    ) -> Self {
        Self {
            pool,
            shipping,
            settings,
        }
    }

    /// Turn a client-held cart into an order.
    ///
    /// Prices come from the catalog rows locked in the transaction; the client
    /// only supplies product/variant IDs and quantities.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation`/`InvalidEmail` on bad customer data,
    /// `OrderError::Cart` when the cart cannot be priced (including
    /// insufficient stock), `OrderError::Shipping` when shipping cannot be
    /// quoted, and `OrderError::PaymentMethodUnavailable` when the method is
    /// switched off.
    #[instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn create_order(&self, input: CheckoutInput) -> Result<Order, OrderError> {
        let checkout = validate_checkout(input)?;
        self.ensure_payment_method_enabled(checkout.payment_method)
            .await?;

        let mut tx = self.pool.begin().await?;

        let product_ids: Vec<ProductId> = checkout.items.iter().map(|l| l.product_id).collect();
        let catalog = load_catalog(&mut tx, &product_ids, true).await?;
        let cart = price_cart(&checkout.items, &catalog)?;

        let quote = self
            .shipping
            .quote(
                checkout.shipping_method,
                checkout.shipping_province.as_deref(),
                cart.subtotal,
            )
            .await?;

        let new_order = NewOrder {
            status: checkout.payment_method.initial_status(),
            customer_name: checkout.customer_name,
            customer_email: checkout.customer_email,
            customer_phone: checkout.customer_phone,
            shipping_method: checkout.shipping_method,
            shipping_address: checkout.shipping_address,
            shipping_city: checkout.shipping_city,
            shipping_province: checkout.shipping_province,
            shipping_postal_code: checkout.shipping_postal_code,
            shipping_cost: quote.cost,
            subtotal: cart.subtotal,
            total: cart.subtotal + quote.cost,
            payment_method: checkout.payment_method,
            notes: checkout.notes,
        };

        let id = orders::insert(&mut tx, &new_order, &cart).await?;
        let order = orders::fetch(&mut tx, id, false)
            .await?
            .ok_or(OrderError::NotFound)?;
        tx.commit().await?;

        info!(
            order_id = %order.id,
            customer = %redact_email(order.customer_email.as_str()),
            total = %order.total,
            status = %order.status,
            "Order created"
        );

        Ok(order)
    }

    /// Get an order with its items.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    pub async fn get(&self, id: OrderId) -> Result<Order, OrderError> {
        OrderRepository::new(self.pool)
            .get(id)
            .await?
            .ok_or(OrderError::NotFound)
    }

    /// List orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<(Vec<OrderSummary>, i64), OrderError> {
        let (limit, offset) = page_bounds(page, per_page);
        Ok(OrderRepository::new(self.pool)
            .list(status, limit, offset)
            .await?)
    }

    /// Apply a back-office change.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound`, `OrderError::InvalidTransition`, or
    /// `OrderError::InsufficientStock` (the whole change is rolled back).
    #[instrument(skip(self, update))]
    pub async fn update_order(
        &self,
        id: OrderId,
        update: OrderUpdate,
    ) -> Result<OrderUpdateOutcome, OrderError> {
        let notes = match update.notes {
            Some(notes) => Some(limit_text(&notes, "notes", MAX_NOTES_LENGTH)?),
            None => None,
        };
        let payment_id = update
            .payment_id
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty());

        let mut tx = self.pool.begin().await?;
        let order = orders::fetch(&mut tx, id, true)
            .await?
            .ok_or(OrderError::NotFound)?;
        let target = update.status.unwrap_or(order.status);

        let outcome = transition(&mut tx, order, target, notes, payment_id).await?;
        tx.commit().await?;

        info!(
            order_id = %id,
            status = %outcome.order.status,
            stock_committed_now = outcome.stock_committed_now,
            stock_restored = outcome.stock_restored,
            "Order updated"
        );
        Ok(outcome)
    }

    /// Apply a payment gateway notification.
    ///
    /// `external_reference` is the order ID sent when the payment was created.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InsufficientStock` if an approved payment cannot
    /// take its stock (nothing is recorded), or `OrderError::Repository`.
    #[instrument(skip(self))]
    pub async fn apply_payment_update(
        &self,
        provider: &str,
        payment_id: &str,
        gateway_status: &str,
        external_reference: Option<&str>,
    ) -> Result<PaymentUpdateResult, OrderError> {
        let order_id = external_reference.and_then(|r| r.trim().parse::<OrderId>().ok());

        let mut tx = self.pool.begin().await?;

        let order = match order_id {
            Some(id) => orders::fetch(&mut tx, id, true).await?,
            None => None,
        };

        let first_time = orders::record_payment_event(
            &mut tx,
            provider,
            payment_id,
            gateway_status,
            order.as_ref().map(|o| o.id),
        )
        .await?;

        let target = map_payment_status(provider, gateway_status);
        let step = decide_payment(first_time, order.as_ref().map(|o| o.status), target, gateway_status);
        let target = match step {
            PaymentStep::AlreadyProcessed => return Ok(PaymentUpdateResult::AlreadyProcessed),
            PaymentStep::Ignore(reason) => {
                tx.commit().await?;
                match &order {
                    None => warn!(payment_id, ?external_reference, "Payment for unknown order"),
                    Some(order) => info!(
                        order_id = %order.id,
                        status = %order.status,
                        gateway_status,
                        %reason,
                        "Payment recorded without order change"
                    ),
                }
                return Ok(PaymentUpdateResult::Ignored(reason));
            }
            PaymentStep::Transition(target) => target,
        };
        // A transition is only decided for an existing order.
        let order = order.ok_or(OrderError::NotFound)?;

        let order_id = order.id;
        let outcome = transition(&mut tx, order, target, None, Some(payment_id.to_owned())).await?;
        tx.commit().await?;

        info!(
            %order_id,
            payment_id,
            gateway_status,
            status = %outcome.order.status,
            "Payment applied"
        );
        Ok(PaymentUpdateResult::Applied(Box::new(outcome)))
    }

    async fn ensure_payment_method_enabled(&self, method: PaymentMethod) -> Result<(), OrderError> {
        let settings = self.settings.get("payment_methods").await?;
        if payment_method_enabled(settings.as_ref(), method) {
            Ok(())
        } else {
            Err(OrderError::PaymentMethodUnavailable(method))
        }
    }
}

/// Move a locked order to `target`, applying the stock effect.
async fn transition(
    conn: &mut PgConnection,
    order: Order,
    target: OrderStatus,
    notes: Option<String>,
    payment_id: Option<String>,
) -> Result<OrderUpdateOutcome, OrderError> {
    let plan = plan_transition(order.status, target, order.stock_committed)?;

    let moves = stock_moves(&order.items, plan.stock)?;
    if !moves.is_empty() {
        lock_items(conn, &order.items).await?;
        apply_stock_moves(conn, &moves, plan.stock).await?;
    }
    let stock_committed = plan.stock.committed_after(order.stock_committed);

    orders::save_state(
        conn,
        order.id,
        &OrderStateChange {
            status: target,
            stock_committed,
            notes,
            payment_id,
        },
    )
    .await?;

    let updated = orders::fetch(conn, order.id, false)
        .await?
        .ok_or(OrderError::NotFound)?;

    Ok(OrderUpdateOutcome {
        trigger_shipment: plan.enters_processed && updated.shipping_method.requires_address(),
        stock_committed_now: plan.stock == StockAction::Commit,
        stock_restored: plan.stock == StockAction::Restore,
        order: updated,
    })
}

/// Lock the rows behind `items` in ID order.
async fn lock_items(conn: &mut PgConnection, items: &[OrderItem]) -> Result<(), OrderError> {
    let ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
    load_catalog(conn, &ids, true).await?;
    Ok(())
}

/// Apply `moves`. A commit that would drive stock negative fails and leaves
/// the caller's transaction to roll back.
async fn apply_stock_moves(
    conn: &mut PgConnection,
    moves: &[StockMove],
    action: StockAction,
) -> Result<(), OrderError> {
    for m in moves {
        if adjust_stock(conn, m.product_id, m.variant_id, m.delta).await? {
            continue;
        }
        if action == StockAction::Commit {
            return Err(OrderError::InsufficientStock {
                product_id: m.product_id,
                variant_id: m.variant_id,
                name: m.name.clone(),
            });
        }
        warn!(product_id = %m.product_id, "Product gone, stock not restored");
    }
    Ok(())
}

fn item_name(item: &OrderItem) -> String {
    match &item.variant_label {
        Some(label) => format!("{} ({label})", item.product_name),
        None => item.product_name.clone(),
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Checkout input after validation.
#[derive(Debug, Clone)]
struct ValidCheckout {
    customer_name: String,
    customer_email: Email,
    customer_phone: Option<String>,
    shipping_method: ShippingMethod,
    shipping_address: Option<String>,
    shipping_city: Option<String>,
    shipping_province: Option<String>,
    shipping_postal_code: Option<String>,
    payment_method: PaymentMethod,
    items: Vec<CartLine>,
    notes: Option<String>,
}

fn validate_checkout(input: CheckoutInput) -> Result<ValidCheckout, OrderError> {
    let customer_name = required(&input.customer_name, "customer_name", MAX_NAME_LENGTH)?;
    let customer_email = Email::parse(&input.customer_email)?;

    let customer_phone = optional(input.customer_phone.as_deref(), "customer_phone", 40)?;
    if let Some(phone) = &customer_phone {
        let digits = phone.chars().filter(char::is_ascii_digit).count();
        if !(6..=15).contains(&digits) {
            return Err(OrderError::Validation(
                "customer_phone must have between 6 and 15 digits".to_owned(),
            ));
        }
    }

    let shipping_address = optional(input.shipping_address.as_deref(), "shipping_address", MAX_FIELD_LENGTH)?;
    let shipping_city = optional(input.shipping_city.as_deref(), "shipping_city", MAX_FIELD_LENGTH)?;
    let shipping_province = optional(input.shipping_province.as_deref(), "shipping_province", MAX_FIELD_LENGTH)?;
    let shipping_postal_code = optional(input.shipping_postal_code.as_deref(), "shipping_postal_code", 20)?;

    if input.shipping_method.requires_address() {
        for (value, field) in [
            (&shipping_address, "shipping_address"),
            (&shipping_city, "shipping_city"),
            (&shipping_province, "shipping_province"),
        ] {
            if value.is_none() {
                return Err(OrderError::Validation(format!(
                    "{field} is required for home delivery"
                )));
            }
        }
    }

    if input.items.is_empty() {
        return Err(OrderError::Cart(CartError::Empty));
    }

    let notes = optional(input.notes.as_deref(), "notes", MAX_NOTES_LENGTH)?;

    Ok(ValidCheckout {
        customer_name,
        customer_email,
        customer_phone,
        shipping_method: input.shipping_method,
        shipping_address,
        shipping_city,
        shipping_province,
        shipping_postal_code,
        payment_method: input.payment_method,
        items: input.items,
        notes,
    })
}

fn required(value: &str, field: &str, max: usize) -> Result<String, OrderError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(OrderError::Validation(format!("{field} is required")));
    }
    limit_text(value, field, max)
}

fn optional(value: Option<&str>, field: &str, max: usize) -> Result<Option<String>, OrderError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => limit_text(v, field, max).map(Some),
        None => Ok(None),
    }
}

fn limit_text(value: &str, field: &str, max: usize) -> Result<String, OrderError> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(OrderError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_owned())
}

/// Whether the `payment_methods` setting allows `method`.
///
/// The setting maps method keys to `{"enabled": bool, ...}`. A missing
/// setting or a missing entry leaves the method enabled.
fn payment_method_enabled(settings: Option<&serde_json::Value>, method: PaymentMethod) -> bool {
    settings
        .and_then(|s| s.get(method.as_str()))
        .and_then(|entry| entry.get("enabled"))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn checkout(method: ShippingMethod) -> CheckoutInput {
        CheckoutInput {
            customer_name: "  Lucía Fernández ".to_owned(),
            customer_email: "Lucia@Example.com".to_owned(),
            customer_phone: Some("+54 9 341 555-0101".to_owned()),
            shipping_method: method,
            shipping_address: Some("Bv. Oroño 1234".to_owned()),
            shipping_city: Some("Rosario".to_owned()),
            shipping_province: Some("Santa Fe".to_owned()),
            shipping_postal_code: Some("2000".to_owned()),
            payment_method: PaymentMethod::MercadoPago,
            items: vec![CartLine {
                product_id: ProductId::new(1),
                variant_id: None,
                quantity: 1,
            }],
            notes: Some("   ".to_owned()),
        }
    }

    #[test]
    fn test_plan_commit_once() {
        let plan = plan_transition(OrderStatus::Pending, OrderStatus::Reserved, false).unwrap();
        assert_eq!(plan.stock, StockAction::Commit);
        assert!(!plan.enters_processed);

        let plan = plan_transition(OrderStatus::Reserved, OrderStatus::Processed, true).unwrap();
        assert_eq!(plan.stock, StockAction::None);
        assert!(plan.enters_processed);

        let plan = plan_transition(OrderStatus::Processed, OrderStatus::Delivered, true).unwrap();
        assert_eq!(plan.stock, StockAction::None);
    }

    #[test]
    fn test_plan_restore_on_cancel() {
        let plan = plan_transition(OrderStatus::Processed, OrderStatus::Cancelled, true).unwrap();
        assert_eq!(plan.stock, StockAction::Restore);

        let plan = plan_transition(OrderStatus::PendingPayment, OrderStatus::Cancelled, false)
            .unwrap();
        assert_eq!(plan.stock, StockAction::None);
    }

    #[test]
    fn test_plan_same_status_is_noop() {
        let plan = plan_transition(OrderStatus::Processed, OrderStatus::Processed, true).unwrap();
        assert_eq!(plan.stock, StockAction::None);
        assert!(!plan.enters_processed);
    }

    #[test]
    fn test_plan_rejects_invalid_transition() {
        assert!(matches!(
            plan_transition(OrderStatus::Processed, OrderStatus::PendingPayment, true),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Processed,
                to: OrderStatus::PendingPayment
            })
        ));
        assert!(plan_transition(OrderStatus::Cancelled, OrderStatus::Processed, false).is_err());
    }

    #[test]
    fn test_validate_checkout_normalizes() {
        let valid = validate_checkout(checkout(ShippingMethod::Standard)).unwrap();
        assert_eq!(valid.customer_name, "Lucía Fernández");
        assert_eq!(valid.customer_email.as_str(), "lucia@example.com");
        assert!(valid.notes.is_none());
    }

    #[test]
    fn test_validate_checkout_requires_address_for_delivery() {
        let mut input = checkout(ShippingMethod::Express);
        input.shipping_city = Some(" ".to_owned());
        let err = validate_checkout(input).unwrap_err();
        assert!(matches!(err, OrderError::Validation(msg) if msg.contains("shipping_city")));

        let mut pickup = checkout(ShippingMethod::Pickup);
        pickup.shipping_address = None;
        pickup.shipping_city = None;
        pickup.shipping_province = None;
        assert!(validate_checkout(pickup).is_ok());
    }

    #[test]
    fn test_validate_checkout_rejects_bad_fields() {
        let mut input = checkout(ShippingMethod::Pickup);
        input.customer_email = "nope".to_owned();
        assert!(matches!(
            validate_checkout(input),
            Err(OrderError::InvalidEmail(_))
        ));

        let mut input = checkout(ShippingMethod::Pickup);
        input.customer_phone = Some("12".to_owned());
        assert!(matches!(
            validate_checkout(input),
            Err(OrderError::Validation(_))
        ));

        let mut input = checkout(ShippingMethod::Pickup);
        input.items.clear();
        assert!(matches!(
            validate_checkout(input),
            Err(OrderError::Cart(CartError::Empty))
        ));
    }

    #[test]
    fn test_checkout_input_ignores_client_prices() {
        let input: CheckoutInput = serde_json::from_value(json!({
            "customer_name": "Ana",
            "customer_email": "ana@example.com",
            "shipping_method": "pickup",
            "payment_method": "cash",
            "items": [{"product_id": 3, "quantity": 2, "price": "0.01"}]
        }))
        .unwrap();
        assert_eq!(input.items[0].quantity, 2);
        assert_eq!(input.items[0].variant_id, None);
    }

    #[test]
    fn test_payment_method_enabled() {
        let settings = json!({
            "mercado_pago": {"enabled": true},
            "bank_transfer": {"enabled": false, "cbu": "0000"}
        });
        assert!(payment_method_enabled(None, PaymentMethod::Cash));
        assert!(payment_method_enabled(Some(&settings), PaymentMethod::MercadoPago));
        assert!(!payment_method_enabled(Some(&settings), PaymentMethod::BankTransfer));
        assert!(payment_method_enabled(Some(&settings), PaymentMethod::Cash));
    }

    fn item(id: i32, variant: Option<i32>, label: Option<&str>, quantity: i32) -> OrderItem {
        OrderItem {
            id: vitrina_core::OrderItemId::new(id),
            product_id: ProductId::new(10 + id),
            variant_id: variant.map(VariantId::new),
            product_name: "Remera".to_owned(),
            variant_label: label.map(str::to_owned),
            unit_price: vitrina_core::Money::from_cents(1_500_000).unwrap(),
            quantity,
        }
    }

    #[test]
    fn test_duplicate_payment_changes_nothing() {
        let step = decide_payment(
            false,
            Some(OrderStatus::PendingPayment),
            Some(OrderStatus::Processed),
            "approved",
        );
        assert_eq!(step, PaymentStep::AlreadyProcessed);
    }

    #[test]
    fn test_payment_for_unknown_order_is_ignored() {
        let step = decide_payment(true, None, Some(OrderStatus::Processed), "approved");
        assert_eq!(step, PaymentStep::Ignore("unknown order".to_owned()));
    }

    #[test]
    fn test_payment_status_without_effect() {
        let step = decide_payment(true, Some(OrderStatus::Pending), None, "weird");
        assert!(matches!(step, PaymentStep::Ignore(_)));
    }

    #[test]
    fn test_late_pending_after_approved_is_ignored() {
        let step = decide_payment(
            true,
            Some(OrderStatus::Processed),
            Some(OrderStatus::PendingPayment),
            "pending",
        );
        assert_eq!(
            step,
            PaymentStep::Ignore("PROCESSED -> PENDING_PAYMENT not allowed".to_owned())
        );
    }

    #[test]
    fn test_approved_payment_transitions() {
        let step = decide_payment(
            true,
            Some(OrderStatus::PendingPayment),
            Some(OrderStatus::Processed),
            "approved",
        );
        assert_eq!(step, PaymentStep::Transition(OrderStatus::Processed));
    }

    #[test]
    fn test_stock_committed_exactly_once() {
        let path = [
            OrderStatus::PendingPayment,
            OrderStatus::Reserved,
            OrderStatus::Processed,
            OrderStatus::Processed,
            OrderStatus::Delivered,
        ];
        let mut status = OrderStatus::Pending;
        let mut committed = false;
        let mut commits = 0;
        for next in path {
            let plan = plan_transition(status, next, committed).unwrap();
            if plan.stock == StockAction::Commit {
                commits += 1;
            }
            assert_ne!(plan.stock, StockAction::Restore);
            committed = plan.stock.committed_after(committed);
            status = next;
        }
        assert_eq!(commits, 1);
        assert!(committed);
    }

    #[test]
    fn test_cancel_restores_committed_stock() {
        let plan = plan_transition(OrderStatus::Reserved, OrderStatus::Cancelled, true).unwrap();
        assert_eq!(plan.stock, StockAction::Restore);
        assert!(!plan.stock.committed_after(true));

        let items = [item(1, Some(5), Some("Negro / M"), 2), item(2, None, None, 1)];
        let moves = stock_moves(&items, plan.stock).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].variant_id, Some(VariantId::new(5)));
        assert_eq!(moves[0].delta, 2);
        assert_eq!(moves[1].variant_id, None);
        assert_eq!(moves[1].delta, 1);
    }

    #[test]
    fn test_commit_takes_stock_out() {
        let items = [item(1, Some(5), Some("Negro / M"), 3)];
        let moves = stock_moves(&items, StockAction::Commit).unwrap();
        assert_eq!(moves[0].delta, -3);
        assert_eq!(moves[0].name, "Remera (Negro / M)");
        assert!(stock_moves(&items, StockAction::None).unwrap().is_empty());
    }

    #[test]
    fn test_commit_with_deleted_variant_fails_whole_order() {
        // The first line is fine; the second lost its variant after checkout.
        let items = [
            item(1, None, None, 1),
            item(2, None, Some("Blanco / S"), 1),
        ];
        let err = stock_moves(&items, StockAction::Commit).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InsufficientStock { variant_id: None, .. }
        ));
    }

    #[test]
    fn test_restore_skips_deleted_variant() {
        let items = [
            item(1, None, Some("Blanco / S"), 1),
            item(2, Some(8), Some("Negro / L"), 4),
        ];
        let moves = stock_moves(&items, StockAction::Restore).unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].product_id, ProductId::new(12));
    }
}
