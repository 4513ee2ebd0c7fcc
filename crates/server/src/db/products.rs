//! Product and variant repository.
//!
//! Besides CRUD, this module owns the two queries stock handling relies on:
//! [`load_catalog`] can read products and variants `FOR UPDATE` inside a
//! transaction, and [`adjust_stock`] applies a guarded delta so stock can never
//! go negative.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use vitrina_core::cart::CatalogProduct;
use vitrina_core::variants::VariantSpec;
use vitrina_core::{CategoryId, Money, ProductId, VariantId};

use super::RepositoryError;
use crate::models::{Product, Variant};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    slug: String,
    description: Option<String>,
    price: Money,
    stock: i32,
    images: Json<Vec<String>>,
    category_id: Option<CategoryId>,
    featured: bool,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self, variants: Vec<Variant>) -> Product {
        Product {
            id: self.id,
            name: self.name,
            slug: self.slug,
            description: self.description,
            price: self.price,
            stock: self.stock,
            images: self.images.0,
            category_id: self.category_id,
            featured: self.featured,
            active: self.active,
            variants,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: VariantId,
    product_id: ProductId,
    color: String,
    size: String,
    sku: String,
    stock: i32,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            color: row.color,
            size: row.size,
            sku: row.sku,
            stock: row.stock,
        }
    }
}

const COLUMNS: &str = "p.id, p.name, p.slug, p.description, p.price, p.stock, p.images, \
                       p.category_id, p.featured, p.active, p.created_at, p.updated_at";

const VARIANT_COLUMNS: &str = "id, product_id, color, size, sku, stock";

/// Filters for listing products.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
    /// Case-insensitive match on name or description.
    pub search: Option<String>,
    pub featured: Option<bool>,
    /// Restrict to these IDs (used to refresh a client-held cart).
    pub ids: Option<Vec<ProductId>>,
    /// Include inactive products (back-office only).
    pub include_inactive: bool,
}

/// Fields accepted when creating or updating a product.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Money,
    pub stock: i32,
    pub images: Vec<String>,
    pub category_id: Option<CategoryId>,
    pub featured: bool,
    pub active: bool,
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products matching `filter`, newest first, with the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Product>, i64), RepositoryError> {
        let mut count: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM shop.product p WHERE TRUE");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM shop.product p WHERE TRUE"));
        push_filters(&mut query, filter);
        query.push(" ORDER BY p.featured DESC, p.created_at DESC, p.id DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let rows: Vec<ProductRow> = query.build_query_as().fetch_all(self.pool).await?;
        let products = self.attach_variants(rows).await?;
        Ok((products, total))
    }

    /// Get a product with its variants by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {COLUMNS} FROM shop.product p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        self.with_variants(row).await
    }

    /// Get a product with its variants by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {COLUMNS} FROM shop.product p WHERE p.slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;
        self.with_variants(row).await
    }

    /// Create a product (without variants).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO shop.product AS p
                 (name, slug, description, price, stock, images, category_id, featured, active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        ))
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.stock)
        .bind(Json(&input.images))
        .bind(input.category_id)
        .bind(input.featured)
        .bind(input.active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "product slug"))?;
        Ok(row.into_product(Vec::new()))
    }

    /// Update a product's own fields. Variants are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if the new slug is taken.
    pub async fn update(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE shop.product AS p
             SET name = $2, slug = $3, description = $4, price = $5, stock = $6,
                 images = $7, category_id = $8, featured = $9, active = $10,
                 updated_at = NOW()
             WHERE p.id = $1
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.stock)
        .bind(Json(&input.images))
        .bind(input.category_id)
        .bind(input.featured)
        .bind(input.active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "product slug"))?;
        self.with_variants(row).await?.ok_or(RepositoryError::NotFound)
    }

    /// Delete a product.
    ///
    /// Products referenced by orders cannot be deleted; deactivate them instead.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if orders reference the product.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.product WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_foreign_key_violation()
                {
                    return RepositoryError::Conflict(
                        "product is referenced by orders; deactivate it instead".to_owned(),
                    );
                }
                RepositoryError::Database(e)
            })?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Replace the variant set of a product.
    ///
    /// Variants are matched on color/size: matches keep their ID (so pending
    /// orders keep pointing at them) and take the new SKU and stock, missing
    /// ones are created and the rest are deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` on a duplicate SKU or color/size pair.
    pub async fn replace_variants(
        &self,
        id: ProductId,
        variants: &[VariantSpec],
    ) -> Result<Vec<Variant>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<ProductId> =
            sqlx::query_scalar("SELECT id FROM shop.product WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let colors: Vec<&str> = variants.iter().map(|v| v.color.as_str()).collect();
        let sizes: Vec<&str> = variants.iter().map(|v| v.size.as_str()).collect();
        sqlx::query(
            "DELETE FROM shop.product_variant v
             WHERE v.product_id = $1
               AND NOT EXISTS (
                   SELECT 1 FROM UNNEST($2::TEXT[], $3::TEXT[]) AS keep(color, size)
                   WHERE keep.color = v.color AND keep.size = v.size
               )",
        )
        .bind(id)
        .bind(&colors)
        .bind(&sizes)
        .execute(&mut *tx)
        .await?;

        // Park kept SKUs so a swap between two kept variants cannot collide.
        sqlx::query(
            "UPDATE shop.product_variant SET sku = '~' || id::TEXT || '~' || sku
             WHERE product_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let mut saved = Vec::with_capacity(variants.len());
        for spec in variants {
            let row = sqlx::query_as::<_, VariantRow>(&format!(
                "INSERT INTO shop.product_variant (product_id, color, size, sku, stock)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (product_id, color, size)
                 DO UPDATE SET sku = EXCLUDED.sku, stock = EXCLUDED.stock
                 RETURNING {VARIANT_COLUMNS}"
            ))
            .bind(id)
            .bind(&spec.color)
            .bind(&spec.size)
            .bind(&spec.sku)
            .bind(spec.stock.max(0))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::unique(e, "variant SKU or color/size"))?;
            saved.push(Variant::from(row));
        }

        sqlx::query("UPDATE shop.product SET updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(saved)
    }

    /// Load catalog data for the given products (no locking).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn catalog(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, CatalogProduct>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_catalog(&mut conn, ids, false).await
    }

    async fn with_variants(
        &self,
        row: Option<ProductRow>,
    ) -> Result<Option<Product>, RepositoryError> {
        match row {
            Some(row) => Ok(self.attach_variants(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn attach_variants(&self, rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();
        let variant_rows = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM shop.product_variant
             WHERE product_id = ANY($1)
             ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        let mut by_product: HashMap<ProductId, Vec<Variant>> = HashMap::new();
        for row in variant_rows {
            by_product
                .entry(row.product_id)
                .or_default()
                .push(Variant::from(row));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let variants = by_product.remove(&row.id).unwrap_or_default();
                row.into_product(variants)
            })
            .collect())
    }
}

/// Append `WHERE` conditions for `filter` to a query that already ends in `WHERE TRUE`.
fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    if !filter.include_inactive {
        query.push(" AND p.active");
    }
    if let Some(category_id) = filter.category_id {
        query.push(" AND p.category_id = ");
        query.push_bind(category_id);
    }
    if let Some(featured) = filter.featured {
        query.push(" AND p.featured = ");
        query.push_bind(featured);
    }
    if let Some(ids) = &filter.ids {
        let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        query.push(" AND p.id = ANY(");
        query.push_bind(ids);
        query.push(")");
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        query.push(" AND (p.name ILIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR p.description ILIKE ");
        query.push_bind(pattern);
        query.push(")");
    }
}

/// Build an `ILIKE` pattern matching `term` anywhere, escaping wildcards.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// =============================================================================
// Transactional helpers
// =============================================================================

/// Load catalog data for `ids`, optionally locking the product and variant rows.
///
/// With `for_update` the rows stay locked until the surrounding transaction
/// ends, so concurrent checkouts and stock commits serialize on them.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn load_catalog(
    conn: &mut PgConnection,
    ids: &[ProductId],
    for_update: bool,
) -> Result<HashMap<ProductId, CatalogProduct>, RepositoryError> {
    let mut ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
    ids.sort_unstable();
    ids.dedup();
    let lock = if for_update { " FOR UPDATE" } else { "" };

    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {COLUMNS} FROM shop.product p WHERE p.id = ANY($1) ORDER BY p.id{lock}"
    ))
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let variant_rows = sqlx::query_as::<_, VariantRow>(&format!(
        "SELECT {VARIANT_COLUMNS} FROM shop.product_variant
         WHERE product_id = ANY($1)
         ORDER BY id{lock}"
    ))
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_product: HashMap<ProductId, Vec<Variant>> = HashMap::new();
    for row in variant_rows {
        by_product
            .entry(row.product_id)
            .or_default()
            .push(Variant::from(row));
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let variants = by_product.remove(&row.id).unwrap_or_default();
            let product = row.into_product(variants);
            (product.id, product.to_catalog())
        })
        .collect())
}

/// Add `delta` to the stock of a variant (when given) or a product.
///
/// Returns `false`, changing nothing, if the result would be negative or the
/// row does not exist.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn adjust_stock(
    conn: &mut PgConnection,
    product_id: ProductId,
    variant_id: Option<VariantId>,
    delta: i32,
) -> Result<bool, RepositoryError> {
    let result = match variant_id {
        Some(variant_id) => {
            sqlx::query(
                "UPDATE shop.product_variant SET stock = stock + $3
                 WHERE id = $1 AND product_id = $2 AND stock + $3 >= 0",
            )
            .bind(variant_id)
            .bind(product_id)
            .bind(delta)
            .execute(&mut *conn)
            .await?
        }
        None => {
            sqlx::query(
                "UPDATE shop.product SET stock = stock + $2, updated_at = NOW()
                 WHERE id = $1 AND stock + $2 >= 0",
            )
            .bind(product_id)
            .bind(delta)
            .execute(&mut *conn)
            .await?
        }
    };
    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("remera"), "%remera%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_push_filters_builds_conditions() {
        let filter = ProductFilter {
            category_id: Some(CategoryId::new(2)),
            search: Some(" buzo ".to_owned()),
            featured: Some(true),
            ids: Some(vec![ProductId::new(1), ProductId::new(5)]),
            include_inactive: false,
        };
        let mut query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM shop.product p WHERE TRUE");
        push_filters(&mut query, &filter);
        let sql = query.sql();
        assert!(sql.contains("AND p.active"));
        assert!(sql.contains("p.category_id = $1"));
        assert!(sql.contains("p.featured = $2"));
        assert!(sql.contains("p.id = ANY($3)"));
        assert!(sql.contains("p.name ILIKE $4 OR p.description ILIKE $5"));
    }

    #[test]
    fn test_push_filters_admin_sees_inactive() {
        let filter = ProductFilter {
            include_inactive: true,
            ..ProductFilter::default()
        };
        let mut query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM shop.product p WHERE TRUE");
        push_filters(&mut query, &filter);
        assert_eq!(query.sql(), "SELECT COUNT(*) FROM shop.product p WHERE TRUE");
    }
}
