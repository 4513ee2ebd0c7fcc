//! Repricing a client-held cart.
//!
//! The cart lives in the browser, so every price and quantity the client
//! sends is untrusted. [`price_cart`] rebuilds the cart from catalog data:
//! prices come from the catalog, duplicate lines are merged and quantities are
//! checked against current stock. The same function runs for the cart preview
//! endpoint and inside the checkout transaction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::variants::variant_label;
use crate::{Money, MoneyError, ProductId, VariantId};

/// A line as submitted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Product being bought.
    pub product_id: ProductId,
    /// Specific variant, if the product has variants.
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    /// Units requested.
    pub quantity: u32,
}

/// Catalog data for one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogVariant {
    /// Variant ID.
    pub id: VariantId,
    /// Color label.
    pub color: String,
    /// Size label.
    pub size: String,
    /// Units available.
    pub stock: i32,
}

/// Catalog data for one product, as read from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProduct {
    /// Product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Money,
    /// Units available when the product has no variants.
    pub stock: i32,
    /// Whether the product can be sold.
    pub active: bool,
    /// Variants; empty for single-SKU products.
    pub variants: Vec<CatalogVariant>,
}

/// Why a cart could not be priced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    /// The cart has no lines.
    #[error("cart is empty")]
    Empty,
    /// A line asked for zero units.
    #[error("quantity must be at least 1 for product {0}")]
    ZeroQuantity(ProductId),
    /// The product does not exist or is not for sale.
    #[error("product {0} is not available")]
    UnknownProduct(ProductId),
    /// The product has variants and none (or a foreign one) was given.
    #[error("product {product_id} requires a valid variant")]
    InvalidVariant {
        /// Product the line refers to.
        product_id: ProductId,
        /// Variant the client sent.
        variant_id: Option<VariantId>,
    },
    /// Not enough units in stock.
    #[error("insufficient stock for {name}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Product ID.
        product_id: ProductId,
        /// Variant ID, when the stock belongs to a variant.
        variant_id: Option<VariantId>,
        /// Product name (with variant label) for the error message.
        name: String,
        /// Units requested.
        requested: u32,
        /// Units in stock.
        available: i32,
    },
    /// Totals overflowed.
    #[error("cart total overflow")]
    Overflow,
}

impl From<MoneyError> for CartError {
    fn from(_: MoneyError) -> Self {
        Self::Overflow
    }
}

/// A repriced line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
    /// Product ID.
    pub product_id: ProductId,
    /// Variant ID.
    pub variant_id: Option<VariantId>,
    /// Product name snapshot.
    pub product_name: String,
    /// Variant label snapshot (`Negro / M`), if any.
    pub variant_label: Option<String>,
    /// Catalog unit price.
    pub unit_price: Money,
    /// Units.
    pub quantity: u32,
    /// `unit_price * quantity`.
    pub line_total: Money,
}

/// A repriced cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedCart {
    /// Lines, in the order each product/variant first appeared.
    pub lines: Vec<PricedLine>,
    /// Sum of line totals.
    pub subtotal: Money,
    /// Total units.
    pub item_count: u32,
}

/// Merge lines that point at the same product/variant, keeping first-seen order.
#[must_use]
pub fn merge_lines(lines: &[CartLine]) -> Vec<CartLine> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if let Some(existing) = merged
            .iter_mut()
            .find(|m| m.product_id == line.product_id && m.variant_id == line.variant_id)
        {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
        } else {
            merged.push(*line);
        }
    }
    merged
}

/// Reprice `lines` against `catalog`.
///
/// # Errors
///
/// Returns the first [`CartError`] found, checking lines in merged order.
pub fn price_cart(
    lines: &[CartLine],
    catalog: &HashMap<ProductId, CatalogProduct>,
) -> Result<PricedCart, CartError> {
    let merged = merge_lines(lines);
    if merged.is_empty() {
        return Err(CartError::Empty);
    }

    let mut priced = Vec::with_capacity(merged.len());
    let mut item_count: u32 = 0;

    for line in merged {
        if line.quantity == 0 {
            return Err(CartError::ZeroQuantity(line.product_id));
        }

        let product = catalog
            .get(&line.product_id)
            .filter(|p| p.active)
            .ok_or(CartError::UnknownProduct(line.product_id))?;

        let (available, label) = if product.variants.is_empty() {
            if line.variant_id.is_some() {
                return Err(CartError::InvalidVariant {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                });
            }
            (product.stock, None)
        } else {
            let variant = line
                .variant_id
                .and_then(|vid| product.variants.iter().find(|v| v.id == vid))
                .ok_or(CartError::InvalidVariant {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                })?;
            (
                variant.stock,
                Some(variant_label(&variant.color, &variant.size)),
            )
        };

        let enough = u32::try_from(available).is_ok_and(|stock| stock >= line.quantity);
        if !enough {
            let name = label.as_ref().map_or_else(
                || product.name.clone(),
                |l| format!("{} ({l})", product.name),
            );
            return Err(CartError::InsufficientStock {
                product_id: line.product_id,
                variant_id: line.variant_id,
                name,
                requested: line.quantity,
                available,
            });
        }

        item_count = item_count
            .checked_add(line.quantity)
            .ok_or(CartError::Overflow)?;

        priced.push(PricedLine {
            product_id: line.product_id,
            variant_id: line.variant_id,
            product_name: product.name.clone(),
            variant_label: label,
            unit_price: product.price,
            quantity: line.quantity,
            line_total: product.price.times(line.quantity)?,
        });
    }

    let subtotal = priced.iter().map(|l| l.line_total).sum();

    Ok(PricedCart {
        lines: priced,
        subtotal,
        item_count,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn catalog() -> HashMap<ProductId, CatalogProduct> {
        let mut map = HashMap::new();
        map.insert(
            ProductId::new(1),
            CatalogProduct {
                id: ProductId::new(1),
                name: "Taza".to_owned(),
                price: Money::from_cents(250_000).unwrap(),
                stock: 4,
                active: true,
                variants: Vec::new(),
            },
        );
        map.insert(
            ProductId::new(2),
            CatalogProduct {
                id: ProductId::new(2),
                name: "Remera".to_owned(),
                price: Money::from_cents(1_200_000).unwrap(),
                stock: 0,
                active: true,
                variants: vec![
                    CatalogVariant {
                        id: VariantId::new(20),
                        color: "Negro".to_owned(),
                        size: "M".to_owned(),
                        stock: 2,
                    },
                    CatalogVariant {
                        id: VariantId::new(21),
                        color: "Negro".to_owned(),
                        size: "L".to_owned(),
                        stock: 0,
                    },
                ],
            },
        );
        map.insert(
            ProductId::new(3),
            CatalogProduct {
                id: ProductId::new(3),
                name: "Discontinuado".to_owned(),
                price: Money::from_cents(100).unwrap(),
                stock: 10,
                active: false,
                variants: Vec::new(),
            },
        );
        map
    }

    fn line(product: i32, variant: Option<i32>, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(product),
            variant_id: variant.map(VariantId::new),
            quantity,
        }
    }

    #[test]
    fn test_prices_from_catalog_and_merges() {
        let cart = price_cart(
            &[line(1, None, 1), line(2, Some(20), 1), line(1, None, 2)],
            &catalog(),
        )
        .unwrap();

        assert_eq!(cart.lines.len(), 2);
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(cart.lines[0].line_total.to_string(), "7500.00");
        assert_eq!(cart.lines[1].variant_label.as_deref(), Some("Negro / M"));
        assert_eq!(cart.subtotal.to_string(), "19500.00");
        assert_eq!(cart.item_count, 4);
    }

    #[test]
    fn test_merged_quantity_checked_against_stock() {
        let err = price_cart(&[line(1, None, 3), line(1, None, 2)], &catalog()).unwrap_err();
        assert!(matches!(
            err,
            CartError::InsufficientStock {
                requested: 5,
                available: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_variant_stock_used() {
        let err = price_cart(&[line(2, Some(21), 1)], &catalog()).unwrap_err();
        match err {
            CartError::InsufficientStock { name, .. } => assert_eq!(name, "Remera (Negro / L)"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_variant_required_and_must_belong() {
        assert!(matches!(
            price_cart(&[line(2, None, 1)], &catalog()),
            Err(CartError::InvalidVariant { .. })
        ));
        assert!(matches!(
            price_cart(&[line(2, Some(99), 1)], &catalog()),
            Err(CartError::InvalidVariant { .. })
        ));
        assert!(matches!(
            price_cart(&[line(1, Some(20), 1)], &catalog()),
            Err(CartError::InvalidVariant { .. })
        ));
    }

    #[test]
    fn test_rejections() {
        assert_eq!(price_cart(&[], &catalog()), Err(CartError::Empty));
        assert_eq!(
            price_cart(&[line(1, None, 0)], &catalog()),
            Err(CartError::ZeroQuantity(ProductId::new(1)))
        );
        assert_eq!(
            price_cart(&[line(3, None, 1)], &catalog()),
            Err(CartError::UnknownProduct(ProductId::new(3)))
        );
        assert_eq!(
            price_cart(&[line(404, None, 1)], &catalog()),
            Err(CartError::UnknownProduct(ProductId::new(404)))
        );
    }
}
