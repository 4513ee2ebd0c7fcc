//! Category route handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::info;

use vitrina_core::CategoryId;
use vitrina_core::slug::slugify;

use crate::db::CategoryRepository;
use crate::db::categories::CategoryInput;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::Category;
use crate::routes::products::Deleted;
use crate::routes::{ApiJson, ApiPath, ApiResponse, IdOrSlug, created, ok};
use crate::state::AppState;

const MAX_NAME_LENGTH: usize = 100;

/// Category create/update body.
#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryRequest {
    fn validate(self) -> Result<CategoryInput> {
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
            return Err(AppError::Validation(format!(
                "name must be between 1 and {MAX_NAME_LENGTH} characters"
            )));
        }
        let slug = slugify(self.slug.as_deref().unwrap_or(name));
        if slug.is_empty() {
            return Err(AppError::Validation(
                "slug must contain letters or digits".to_owned(),
            ));
        }
        Ok(CategoryInput {
            name: name.to_owned(),
            slug,
            description: self
                .description
                .map(|d| d.trim().to_owned())
                .filter(|d| !d.is_empty()),
        })
    }
}

/// List categories.
///
/// GET /api/categories
///
/// # Errors
///
/// Returns `AppError::Database` if the query fails.
pub async fn index(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Category>>>> {
    let categories = CategoryRepository::new(state.pool()).list().await?;
    Ok(ok(categories))
}

/// Category by ID or slug.
///
/// GET /api/categories/{id_or_slug}
///
/// # Errors
///
/// Returns `AppError::NotFound` if the category does not exist.
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id_or_slug): ApiPath<String>,
) -> Result<Json<ApiResponse<Category>>> {
    let categories = CategoryRepository::new(state.pool());
    let category = match IdOrSlug::parse(&id_or_slug) {
        IdOrSlug::Id(id) => categories.get_by_id(CategoryId::new(id)).await?,
        IdOrSlug::Slug(slug) => categories.get_by_slug(&slug).await?,
    };
    category
        .map(ok)
        .ok_or_else(|| AppError::NotFound("Category".to_owned()))
}

/// Create a category.
///
/// POST /api/categories
///
/// # Errors
///
/// Returns `AppError::Validation` or a conflict on a taken slug.
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(req): ApiJson<CategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>)> {
    let input = req.validate()?;
    let category = CategoryRepository::new(state.pool()).create(&input).await?;
    info!(category_id = %category.id, admin_id = %admin.id, "Category created");
    Ok(created(category))
}

/// Update a category.
///
/// PUT /api/categories/{id}
///
/// # Errors
///
/// Returns `AppError::NotFound`, `AppError::Validation`, or a conflict on a taken slug.
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
    ApiJson(req): ApiJson<CategoryRequest>,
) -> Result<Json<ApiResponse<Category>>> {
    let input = req.validate()?;
    let category = CategoryRepository::new(state.pool())
        .update(id, &input)
        .await?;
    info!(category_id = %id, admin_id = %admin.id, "Category updated");
    Ok(ok(category))
}

/// Delete a category. Its products become uncategorized.
///
/// DELETE /api/categories/{id}
///
/// # Errors
///
/// Returns `AppError::NotFound` if the category does not exist.
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<Json<ApiResponse<Deleted>>> {
    CategoryRepository::new(state.pool()).delete(id).await?;
    info!(category_id = %id, admin_id = %admin.id, "Category deleted");
    Ok(ok(Deleted { id: id.as_i32() }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_slug_from_name() {
        let input = CategoryRequest {
            name: " Ropa de Niños ".to_owned(),
            slug: None,
            description: None,
        }
        .validate()
        .unwrap();
        assert_eq!(input.name, "Ropa de Niños");
        assert_eq!(input.slug, "ropa-de-ninos");
    }

    #[test]
    fn test_validate_rejects_blank() {
        let req = CategoryRequest {
            name: "  ".to_owned(),
            slug: None,
            description: None,
        };
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }
}
