//! Product and variant domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vitrina_core::cart::{CatalogProduct, CatalogVariant};
use vitrina_core::variants::variant_label;
use vitrina_core::{CategoryId, Money, ProductId, VariantId};

/// A catalog product with its variants.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Money,
    /// Stock for products without variants.
    pub stock: i32,
    /// Image URLs, first one is the cover.
    pub images: Vec<String>,
    pub category_id: Option<CategoryId>,
    pub featured: bool,
    pub active: bool,
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Units available: the sum over variants, or the product stock.
    #[must_use]
    pub fn total_stock(&self) -> i64 {
        if self.variants.is_empty() {
            i64::from(self.stock)
        } else {
            self.variants.iter().map(|v| i64::from(v.stock)).sum()
        }
    }

    /// Catalog view used when repricing a cart.
    #[must_use]
    pub fn to_catalog(&self) -> CatalogProduct {
        CatalogProduct {
            id: self.id,
            name: self.name.clone(),
            price: self.price,
            stock: self.stock,
            active: self.active,
            variants: self
                .variants
                .iter()
                .map(|v| CatalogVariant {
                    id: v.id,
                    color: v.color.clone(),
                    size: v.size.clone(),
                    stock: v.stock,
                })
                .collect(),
        }
    }
}

/// A color x size variant.
#[derive(Debug, Clone, Serialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub color: String,
    pub size: String,
    pub sku: String,
    pub stock: i32,
}

impl Variant {
    /// Display label, e.g. `Negro / M`.
    #[must_use]
    pub fn label(&self) -> String {
        variant_label(&self.color, &self.size)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(variants: Vec<Variant>) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Remera".to_owned(),
            slug: "remera".to_owned(),
            description: None,
            price: Money::from_cents(1_000).unwrap(),
            stock: 7,
            images: Vec::new(),
            category_id: None,
            featured: false,
            active: true,
            variants,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn variant(id: i32, stock: i32) -> Variant {
        Variant {
            id: VariantId::new(id),
            product_id: ProductId::new(1),
            color: "Negro".to_owned(),
            size: format!("T{id}"),
            sku: format!("REM-NEGRO-T{id}"),
            stock,
        }
    }

    #[test]
    fn test_total_stock() {
        assert_eq!(product(Vec::new()).total_stock(), 7);
        assert_eq!(product(vec![variant(1, 2), variant(2, 3)]).total_stock(), 5);
    }

    #[test]
    fn test_to_catalog_keeps_variants() {
        let catalog = product(vec![variant(1, 2)]).to_catalog();
        assert_eq!(catalog.variants.len(), 1);
        assert_eq!(catalog.variants[0].stock, 2);
        assert_eq!(catalog.price.to_string(), "10.00");
    }
}
