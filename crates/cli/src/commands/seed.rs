//! Seed the catalog from a YAML file.
//!
//! Categories and products are matched by slug: existing rows are updated,
//! missing ones created, so the same file can be applied repeatedly.
//!
//! ```yaml
//! categories:
//!   - name: Remeras
//!     description: Remeras de algodón
//! products:
//!   - name: Remera Básica
//!     category: remeras
//!     price: "15000.00"
//!     stock: 0
//!     featured: true
//!     images:
//!       - https://cdn.example.com/remera.jpg
//!     variants:
//!       colors: [Negro, Blanco]
//!       sizes: [S, M, L]
//!       stock: 5
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use vitrina_core::slug::slugify;
use vitrina_core::variants::generate_variants;
use vitrina_core::{CategoryId, Money};
use vitrina_server::db::categories::CategoryInput;
use vitrina_server::db::products::ProductInput;
use vitrina_server::db::{CategoryRepository, ProductRepository, RepositoryError};

use super::ConnectError;

/// Errors from seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid catalog: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),
}

/// Top-level seed file.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

#[derive(Debug, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductSeed {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Category slug.
    #[serde(default)]
    pub category: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub variants: Option<VariantSeed>,
}

const fn default_active() -> bool {
    true
}

/// Color x size grid generated for a product.
#[derive(Debug, Deserialize)]
pub struct VariantSeed {
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub stock: i32,
}

/// Totals reported after seeding.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub products: usize,
    pub variants: usize,
}

/// Parse and check a catalog file before touching the database.
///
/// # Errors
///
/// Returns `SeedError::Yaml` for malformed YAML and `SeedError::Invalid` for
/// duplicate slugs, unknown categories or negative stock.
pub fn parse_catalog(content: &str) -> Result<CatalogFile, SeedError> {
    let catalog: CatalogFile = serde_yaml::from_str(content)?;

    let mut category_slugs = Vec::with_capacity(catalog.categories.len());
    for category in &catalog.categories {
        let slug = slugify(category.slug.as_deref().unwrap_or(&category.name));
        if slug.is_empty() {
            return Err(SeedError::Invalid(format!(
                "category {:?} has no usable slug",
                category.name
            )));
        }
        if category_slugs.contains(&slug) {
            return Err(SeedError::Invalid(format!("duplicate category slug: {slug}")));
        }
        category_slugs.push(slug);
    }

    let mut product_slugs = Vec::with_capacity(catalog.products.len());
    for product in &catalog.products {
        let slug = slugify(product.slug.as_deref().unwrap_or(&product.name));
        if slug.is_empty() {
            return Err(SeedError::Invalid(format!(
                "product {:?} has no usable slug",
                product.name
            )));
        }
        if product_slugs.contains(&slug) {
            return Err(SeedError::Invalid(format!("duplicate product slug: {slug}")));
        }
        if product.stock < 0 || product.variants.as_ref().is_some_and(|v| v.stock < 0) {
            return Err(SeedError::Invalid(format!("negative stock for {slug}")));
        }
        if let Some(category) = &product.category {
            if !category_slugs.contains(&slugify(category)) {
                return Err(SeedError::Invalid(format!(
                    "product {slug} references unknown category {category}"
                )));
            }
        }
        product_slugs.push(slug);
    }

    Ok(catalog)
}

/// Seed categories and products from `file_path`.
///
/// # Errors
///
/// Returns `SeedError` if the file is unreadable or invalid, or a database
/// write fails.
pub async fn catalog(file_path: &str) -> Result<SeedSummary, SeedError> {
    let content = tokio::fs::read_to_string(Path::new(file_path))
        .await
        .map_err(|source| SeedError::Io {
            path: file_path.to_owned(),
            source,
        })?;
    let catalog = parse_catalog(&content)?;
    info!(
        categories = catalog.categories.len(),
        products = catalog.products.len(),
        "Parsed catalog"
    );

    let pool = super::connect().await?;
    let categories = CategoryRepository::new(&pool);
    let products = ProductRepository::new(&pool);
    let mut summary = SeedSummary::default();

    let mut category_ids: HashMap<String, CategoryId> = HashMap::new();
    for seed in catalog.categories {
        let input = CategoryInput {
            slug: slugify(seed.slug.as_deref().unwrap_or(&seed.name)),
            name: seed.name.trim().to_owned(),
            description: seed.description,
        };
        let category = match categories.get_by_slug(&input.slug).await? {
            Some(existing) => categories.update(existing.id, &input).await?,
            None => categories.create(&input).await?,
        };
        category_ids.insert(category.slug.clone(), category.id);
        summary.categories += 1;
    }

    for seed in catalog.products {
        let slug = slugify(seed.slug.as_deref().unwrap_or(&seed.name));
        let input = ProductInput {
            name: seed.name.trim().to_owned(),
            description: seed.description,
            price: seed.price,
            stock: seed.stock,
            images: seed.images,
            category_id: seed
                .category
                .as_deref()
                .and_then(|c| category_ids.get(&slugify(c)).copied()),
            featured: seed.featured,
            active: seed.active,
            slug,
        };
        let product = match products.get_by_slug(&input.slug).await? {
            Some(existing) => products.update(existing.id, &input).await?,
            None => products.create(&input).await?,
        };

        if let Some(grid) = seed.variants {
            let specs = generate_variants(&product.slug, &grid.colors, &grid.sizes, grid.stock);
            let saved = products.replace_variants(product.id, &specs).await?;
            summary.variants += saved.len();
        }

        info!(slug = %product.slug, id = %product.id, "Product seeded");
        summary.products += 1;
    }

    info!(
        categories = summary.categories,
        products = summary.products,
        variants = summary.variants,
        "Seeding complete!"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
categories:
  - name: Remeras
  - name: Buzos y Camperas
    slug: abrigo
products:
  - name: Remera Básica
    category: remeras
    price: "15000.00"
    featured: true
    variants:
      colors: [Negro, Blanco]
      sizes: [S, M]
      stock: 5
  - name: Buzo Canguro
    category: abrigo
    price: "42000"
    stock: 3
"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = parse_catalog(CATALOG).unwrap();
        assert_eq!(catalog.categories.len(), 2);
        assert_eq!(catalog.products.len(), 2);
        assert!(catalog.products[0].active);
        assert_eq!(
            catalog.products[0].variants.as_ref().map(|v| v.colors.len()),
            Some(2)
        );
    }

    #[test]
    fn test_parse_catalog_unknown_category() {
        let yaml = r#"
products:
  - name: Medias
    category: accesorios
    price: "3000"
"#;
        assert!(matches!(parse_catalog(yaml), Err(SeedError::Invalid(_))));
    }

    #[test]
    fn test_parse_catalog_duplicate_slug() {
        let yaml = r#"
products:
  - name: Gorra
    price: "9000"
  - name: gorra
    price: "9500"
"#;
        assert!(matches!(parse_catalog(yaml), Err(SeedError::Invalid(_))));
    }

    #[test]
    fn test_parse_catalog_rejects_negative_price() {
        let yaml = r#"
products:
  - name: Gorra
    price: "-1"
"#;
        assert!(matches!(parse_catalog(yaml), Err(SeedError::Yaml(_))));
    }
}
