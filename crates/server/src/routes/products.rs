//! Product route handlers.
//!
//! Listing and detail are public; inactive products are only visible to
//! admins. Writes require an admin.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use url::Url;

use vitrina_core::slug::slugify;
use vitrina_core::variants::{VariantSpec, build_sku, generate_variants as generate_specs};
use vitrina_core::{CategoryId, Money, ProductId};

use crate::db::products::{ProductFilter, ProductInput};
use crate::db::{CategoryRepository, ProductRepository};
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAdmin};
use crate::models::{Product, Variant};
use crate::routes::{ApiJson, ApiPath, ApiQuery, ApiResponse, IdOrSlug, Page, PageQuery, created, ok};
use crate::state::AppState;

const MAX_NAME_LENGTH: usize = 200;
const MAX_IMAGES: usize = 20;

// =============================================================================
// Request Types
// =============================================================================

/// Query parameters for product listing.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    /// Category ID or slug.
    pub category: Option<String>,
    /// Free-text search.
    pub q: Option<String>,
    pub featured: Option<bool>,
    /// Comma-separated product IDs.
    pub ids: Option<String>,
    /// Include inactive products (admins only).
    #[serde(default)]
    pub include_inactive: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Product create/update body.
#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    /// Defaults to the slugified name.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

/// Body for previewing generated variants.
#[derive(Debug, Deserialize)]
pub struct GenerateVariantsRequest {
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub default_stock: i32,
    /// SKU prefix; defaults to the product slug.
    #[serde(default)]
    pub base_sku: Option<String>,
}

/// One variant in a replace request.
#[derive(Debug, Deserialize)]
pub struct VariantRequest {
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub size: String,
    /// Generated from the product slug, color and size when absent.
    #[serde(default)]
    pub sku: Option<String>,
    pub stock: i32,
}

/// Body for replacing a product's variants.
#[derive(Debug, Deserialize)]
pub struct ReplaceVariantsRequest {
    pub variants: Vec<VariantRequest>,
}

/// Deleted resource marker.
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: i32,
}

// =============================================================================
// Validation
// =============================================================================

fn parse_ids(raw: &str) -> Result<Vec<ProductId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ProductId>()
                .map_err(|_| AppError::BadRequest(format!("invalid product id: {s}")))
        })
        .collect()
}

fn validate_product(req: ProductRequest) -> Result<ProductInput> {
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::Validation(format!(
            "name must be between 1 and {MAX_NAME_LENGTH} characters"
        )));
    }

    let slug = slugify(req.slug.as_deref().unwrap_or(name));
    if slug.is_empty() {
        return Err(AppError::Validation("slug must contain letters or digits".to_owned()));
    }

    if req.stock < 0 {
        return Err(AppError::Validation("stock cannot be negative".to_owned()));
    }

    if req.images.len() > MAX_IMAGES {
        return Err(AppError::Validation(format!(
            "at most {MAX_IMAGES} images are allowed"
        )));
    }
    let images = req
        .images
        .iter()
        .map(|image| {
            let image = image.trim();
            match Url::parse(image) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(image.to_owned()),
                _ => Err(AppError::Validation(format!("invalid image URL: {image}"))),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ProductInput {
        name: name.to_owned(),
        slug,
        description: req
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty()),
        price: req.price,
        stock: req.stock,
        images,
        category_id: req.category_id,
        featured: req.featured,
        active: req.active,
    })
}

fn validate_variants(base_sku: &str, variants: Vec<VariantRequest>) -> Result<Vec<VariantSpec>> {
    let mut specs: Vec<VariantSpec> = Vec::with_capacity(variants.len());
    for variant in variants {
        let color = variant.color.trim().to_owned();
        let size = variant.size.trim().to_owned();
        if color.is_empty() && size.is_empty() {
            return Err(AppError::Validation(
                "each variant needs a color or a size".to_owned(),
            ));
        }
        if variant.stock < 0 {
            return Err(AppError::Validation("stock cannot be negative".to_owned()));
        }
        if specs.iter().any(|s| {
            s.color.eq_ignore_ascii_case(&color) && s.size.eq_ignore_ascii_case(&size)
        }) {
            return Err(AppError::Validation(format!(
                "duplicate variant: {color} / {size}"
            )));
        }

        let sku = match variant.sku.as_deref().map(str::trim) {
            Some(sku) if !sku.is_empty() => sku.to_ascii_uppercase(),
            _ => build_sku(base_sku, &color, &size),
        };
        if specs.iter().any(|s| s.sku == sku) {
            return Err(AppError::Validation(format!("duplicate SKU: {sku}")));
        }

        specs.push(VariantSpec {
            color,
            size,
            sku,
            stock: variant.stock,
        });
    }
    Ok(specs)
}

async fn resolve_category(state: &AppState, category: &str) -> Result<Option<CategoryId>> {
    let categories = CategoryRepository::new(state.pool());
    let found = match IdOrSlug::parse(category.trim()) {
        IdOrSlug::Id(id) => categories.get_by_id(CategoryId::new(id)).await?,
        IdOrSlug::Slug(slug) => categories.get_by_slug(&slug).await?,
    };
    Ok(found.map(|c| c.id))
}

async fn load_product(state: &AppState, id: ProductId) -> Result<Product> {
    ProductRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_owned()))
}

// =============================================================================
// Handlers
// =============================================================================

/// List products.
///
/// GET /api/products
///
/// # Errors
///
/// Returns `AppError::BadRequest` for malformed `ids`.
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<Json<ApiResponse<Page<Product>>>> {
    let (limit, offset) = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .bounds();

    let category_id = match query.category.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(category) => match resolve_category(&state, category).await? {
            Some(id) => Some(id),
            None => return Ok(ok(Page::new(Vec::new(), 0, limit, offset))),
        },
        None => None,
    };

    let filter = ProductFilter {
        category_id,
        search: query.q.map(|q| q.trim().to_owned()).filter(|q| !q.is_empty()),
        featured: query.featured,
        ids: query.ids.as_deref().map(parse_ids).transpose()?,
        include_inactive: query.include_inactive && user.is_some_and(|u| u.is_admin),
    };

    let (products, total) = ProductRepository::new(state.pool())
        .list(&filter, limit, offset)
        .await?;
    Ok(ok(Page::new(products, total, limit, offset)))
}

/// Product detail by ID or slug.
///
/// GET /api/products/{id_or_slug}
///
/// # Errors
///
/// Returns `AppError::NotFound` if the product does not exist or is inactive
/// and the caller is not an admin.
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    ApiPath(id_or_slug): ApiPath<String>,
) -> Result<Json<ApiResponse<Product>>> {
    let products = ProductRepository::new(state.pool());
    let product = match IdOrSlug::parse(&id_or_slug) {
        IdOrSlug::Id(id) => products.get_by_id(ProductId::new(id)).await?,
        IdOrSlug::Slug(slug) => products.get_by_slug(&slug).await?,
    };

    let is_admin = user.is_some_and(|u| u.is_admin);
    product
        .filter(|p| p.active || is_admin)
        .map(ok)
        .ok_or_else(|| AppError::NotFound("Product".to_owned()))
}

/// Create a product.
///
/// POST /api/products
///
/// # Errors
///
/// Returns `AppError::Validation` on invalid fields, `AppError::Database`
/// (conflict) on a taken slug.
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(req): ApiJson<ProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>)> {
    let input = validate_product(req)?;
    let product = ProductRepository::new(state.pool()).create(&input).await?;
    info!(product_id = %product.id, admin_id = %admin.id, "Product created");
    Ok(created(product))
}

/// Update a product.
///
/// PUT /api/products/{id}
///
/// # Errors
///
/// Returns `AppError::NotFound`, `AppError::Validation`, or a conflict on a taken slug.
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<ProductRequest>,
) -> Result<Json<ApiResponse<Product>>> {
    let input = validate_product(req)?;
    let product = ProductRepository::new(state.pool())
        .update(id, &input)
        .await?;
    info!(product_id = %id, admin_id = %admin.id, "Product updated");
    Ok(ok(product))
}

/// Delete a product.
///
/// DELETE /api/products/{id}
///
/// # Errors
///
/// Returns `AppError::NotFound`, or a conflict when orders reference the product.
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<ApiResponse<Deleted>>> {
    ProductRepository::new(state.pool()).delete(id).await?;
    info!(product_id = %id, admin_id = %admin.id, "Product deleted");
    Ok(ok(Deleted { id: id.as_i32() }))
}

/// Preview the color x size variants for a product.
///
/// Nothing is saved; the result is meant to be edited and sent to
/// `PUT /api/products/{id}/variants`.
///
/// POST /api/products/{id}/variants/generate
///
/// # Errors
///
/// Returns `AppError::NotFound` or `AppError::Validation` when no colors or
/// sizes are given.
pub async fn generate_variants(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<GenerateVariantsRequest>,
) -> Result<Json<ApiResponse<Value>>> {
    let product = load_product(&state, id).await?;
    if req.default_stock < 0 {
        return Err(AppError::Validation("default_stock cannot be negative".to_owned()));
    }

    let base_sku = req
        .base_sku
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(&product.slug);
    let variants = generate_specs(base_sku, &req.colors, &req.sizes, req.default_stock);
    if variants.is_empty() {
        return Err(AppError::Validation(
            "at least one color or size is required".to_owned(),
        ));
    }

    Ok(ok(json!({ "product_id": id, "variants": variants })))
}

/// Replace a product's variants.
///
/// PUT /api/products/{id}/variants
///
/// # Errors
///
/// Returns `AppError::NotFound`, `AppError::Validation` on duplicates, or a
/// conflict when a SKU is used by another product.
pub async fn replace_variants(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<ReplaceVariantsRequest>,
) -> Result<Json<ApiResponse<Vec<Variant>>>> {
    let product = load_product(&state, id).await?;
    let specs = validate_variants(&product.slug, req.variants)?;

    let variants = ProductRepository::new(state.pool())
        .replace_variants(id, &specs)
        .await?;
    info!(
        product_id = %id,
        admin_id = %admin.id,
        count = variants.len(),
        "Variants replaced"
    );
    Ok(ok(variants))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(name: &str) -> ProductRequest {
        ProductRequest {
            name: name.to_owned(),
            slug: None,
            description: Some("  ".to_owned()),
            price: Money::from_cents(1_500_000).unwrap(),
            stock: 3,
            images: vec!["https://cdn.example.com/remera.jpg".to_owned()],
            category_id: None,
            featured: false,
            active: true,
        }
    }

    #[test]
    fn test_validate_product_defaults_slug() {
        let input = validate_product(request("  Remera Básica ")).unwrap();
        assert_eq!(input.name, "Remera Básica");
        assert_eq!(input.slug, "remera-basica");
        assert!(input.description.is_none());
    }

    #[test]
    fn test_validate_product_rejects_bad_input() {
        assert!(validate_product(request("   ")).is_err());

        let mut req = request("Buzo");
        req.images = vec!["javascript:alert(1)".to_owned()];
        assert!(matches!(validate_product(req), Err(AppError::Validation(_))));

        let mut req = request("Buzo");
        req.stock = -1;
        assert!(validate_product(req).is_err());
    }

    #[test]
    fn test_parse_ids() {
        let ids = parse_ids("3, 7,,12").unwrap();
        assert_eq!(ids, vec![ProductId::new(3), ProductId::new(7), ProductId::new(12)]);
        assert!(parse_ids("3,abc").is_err());
    }

    #[test]
    fn test_validate_variants() {
        let specs = validate_variants(
            "remera-basica",
            vec![
                VariantRequest {
                    color: " Negro ".to_owned(),
                    size: "M".to_owned(),
                    sku: None,
                    stock: 4,
                },
                VariantRequest {
                    color: "Blanco".to_owned(),
                    size: "M".to_owned(),
                    sku: Some("rem-bla-m".to_owned()),
                    stock: 0,
                },
            ],
        )
        .unwrap();
        assert_eq!(specs[0].color, "Negro");
        assert_eq!(specs[0].sku, "REMERA-BASICA-NEGRO-M");
        assert_eq!(specs[1].sku, "REM-BLA-M");
    }

    #[test]
    fn test_validate_variants_rejects_duplicates() {
        let dup = || VariantRequest {
            color: "Negro".to_owned(),
            size: "m".to_owned(),
            sku: None,
            stock: 1,
        };
        let mut second = dup();
        second.size = "M".to_owned();
        assert!(validate_variants("rem", vec![dup(), second]).is_err());

        let empty = VariantRequest {
            color: String::new(),
            size: " ".to_owned(),
            sku: None,
            stock: 1,
        };
        assert!(validate_variants("rem", vec![empty]).is_err());
    }
}
