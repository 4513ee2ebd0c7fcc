//! Order repository.
//!
//! Functions taking a `&mut PgConnection` are meant to run inside a
//! transaction owned by [`crate::services::orders::OrderService`].

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use vitrina_core::cart::PricedCart;
use vitrina_core::shipping::ShippingMethod;
use vitrina_core::{
    Email, Money, OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, VariantId,
};

use super::RepositoryError;
use crate::models::{Order, OrderItem, OrderSummary};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    status: OrderStatus,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    shipping_method: ShippingMethod,
    shipping_address: Option<String>,
    shipping_city: Option<String>,
    shipping_province: Option<String>,
    shipping_postal_code: Option<String>,
    shipping_cost: Money,
    subtotal: Money,
    total: Money,
    payment_method: PaymentMethod,
    payment_id: Option<String>,
    preference_id: Option<String>,
    stock_committed: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        Ok(Order {
            id: self.id,
            status: self.status,
            customer_name: self.customer_name,
            customer_email: parse_email(&self.customer_email)?,
            customer_phone: self.customer_phone,
            shipping_method: self.shipping_method,
            shipping_address: self.shipping_address,
            shipping_city: self.shipping_city,
            shipping_province: self.shipping_province,
            shipping_postal_code: self.shipping_postal_code,
            shipping_cost: self.shipping_cost,
            subtotal: self.subtotal,
            total: self.total,
            payment_method: self.payment_method,
            payment_id: self.payment_id,
            preference_id: self.preference_id,
            stock_committed: self.stock_committed,
            notes: self.notes,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    product_id: ProductId,
    variant_id: Option<VariantId>,
    product_name: String,
    variant_label: Option<String>,
    unit_price: Money,
    quantity: i32,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            product_name: row.product_name,
            variant_label: row.variant_label,
            unit_price: row.unit_price,
            quantity: row.quantity,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderSummaryRow {
    id: OrderId,
    status: OrderStatus,
    customer_name: String,
    customer_email: String,
    shipping_method: ShippingMethod,
    payment_method: PaymentMethod,
    total: Money,
    item_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderSummaryRow> for OrderSummary {
    type Error = RepositoryError;

    fn try_from(row: OrderSummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            status: row.status,
            customer_name: row.customer_name,
            customer_email: parse_email(&row.customer_email)?,
            shipping_method: row.shipping_method,
            payment_method: row.payment_method,
            total: row.total,
            item_count: row.item_count,
            created_at: row.created_at,
        })
    }
}

fn parse_email(raw: &str) -> Result<Email, RepositoryError> {
    Email::parse(raw)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid email in database: {e}")))
}

const COLUMNS: &str = "id, status, customer_name, customer_email, customer_phone, \
                       shipping_method, shipping_address, shipping_city, shipping_province, \
                       shipping_postal_code, shipping_cost, subtotal, total, payment_method, \
                       payment_id, preference_id, stock_committed, notes, created_at, updated_at";

/// An order ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewOrder {
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
    pub notes: Option<String>,
}

/// New values written by a status change.
#[derive(Debug, Clone)]
pub struct OrderStateChange {
    pub status: OrderStatus,
    pub stock_committed: bool,
    /// `Some` replaces the notes; `None` keeps them.
    pub notes: Option<String>,
    /// `Some` replaces the payment ID; `None` keeps it.
    pub payment_id: Option<String>,
}

/// Repository for order reads outside a transaction.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order with its items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored email is invalid.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id, false).await
    }

    /// List orders newest first, optionally filtered by status, with the total count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<OrderSummary>, i64), RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM shop."order" WHERE ($1::shop.order_status IS NULL OR status = $1)"#,
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, OrderSummaryRow>(
            r#"
            SELECT o.id, o.status, o.customer_name, o.customer_email, o.shipping_method,
                   o.payment_method, o.total,
                   COALESCE((SELECT SUM(i.quantity) FROM shop.order_item i WHERE i.order_id = o.id), 0)::BIGINT
                       AS item_count,
                   o.created_at
            FROM shop."order" o
            WHERE ($1::shop.order_status IS NULL OR o.status = $1)
            ORDER BY o.created_at DESC, o.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let orders = rows
            .into_iter()
            .map(OrderSummary::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((orders, total))
    }

    /// Store the MercadoPago preference created for an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn set_preference_id(
        &self,
        id: OrderId,
        preference_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE shop."order" SET preference_id = $2, updated_at = NOW() WHERE id = $1"#,
        )
        .bind(id)
        .bind(preference_id)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// =============================================================================
// Transactional helpers
// =============================================================================

/// Fetch an order with its items, optionally locking the order row.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
/// Returns `RepositoryError::DataCorruption` if a stored email is invalid.
pub async fn fetch(
    conn: &mut PgConnection,
    id: OrderId,
    for_update: bool,
) -> Result<Option<Order>, RepositoryError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r#"SELECT {COLUMNS} FROM shop."order" WHERE id = $1{lock}"#
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, OrderItemRow>(
        "SELECT id, product_id, variant_id, product_name, variant_label, unit_price, quantity
         FROM shop.order_item
         WHERE order_id = $1
         ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    row.into_order(items.into_iter().map(OrderItem::from).collect())
        .map(Some)
}

/// Insert an order and its priced lines.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn insert(
    conn: &mut PgConnection,
    order: &NewOrder,
    cart: &PricedCart,
) -> Result<OrderId, RepositoryError> {
    let id: OrderId = sqlx::query_scalar(
        r#"
        INSERT INTO shop."order" (
            status, customer_name, customer_email, customer_phone,
            shipping_method, shipping_address, shipping_city, shipping_province,
            shipping_postal_code, shipping_cost, subtotal, total, payment_method, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING id
        "#,
    )
    .bind(order.status)
    .bind(&order.customer_name)
    .bind(order.customer_email.as_str())
    .bind(&order.customer_phone)
    .bind(order.shipping_method)
    .bind(&order.shipping_address)
    .bind(&order.shipping_city)
    .bind(&order.shipping_province)
    .bind(&order.shipping_postal_code)
    .bind(order.shipping_cost)
    .bind(order.subtotal)
    .bind(order.total)
    .bind(order.payment_method)
    .bind(&order.notes)
    .fetch_one(&mut *conn)
    .await?;

    for line in &cart.lines {
        let quantity = i32::try_from(line.quantity)
            .map_err(|_| RepositoryError::DataCorruption("quantity out of range".to_owned()))?;
        sqlx::query(
            "INSERT INTO shop.order_item
                 (order_id, product_id, variant_id, product_name, variant_label, unit_price, quantity)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(&line.product_name)
        .bind(&line.variant_label)
        .bind(line.unit_price)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
    }

    Ok(id)
}

/// Write a status change.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
pub async fn save_state(
    conn: &mut PgConnection,
    id: OrderId,
    change: &OrderStateChange,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r#"
        UPDATE shop."order"
        SET status = $2,
            stock_committed = $3,
            notes = COALESCE($4, notes),
            payment_id = COALESCE($5, payment_id),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(change.status)
    .bind(change.stock_committed)
    .bind(&change.notes)
    .bind(&change.payment_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Record a payment notification.
///
/// Returns `false` when the same `(provider, payment_id, status)` was already
/// recorded, which means the notification is a duplicate.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn record_payment_event(
    conn: &mut PgConnection,
    provider: &str,
    payment_id: &str,
    status: &str,
    order_id: Option<OrderId>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "INSERT INTO shop.payment_event (provider, payment_id, status, order_id)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (provider, payment_id, status) DO NOTHING",
    )
    .bind(provider)
    .bind(payment_id)
    .bind(status)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
