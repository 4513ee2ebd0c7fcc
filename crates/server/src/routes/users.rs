//! User management route handlers.

use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::info;

use vitrina_core::UserId;

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::User;
use crate::routes::{ApiJson, ApiPath, ApiResponse, ok};
use crate::services::AuthService;
use crate::state::AppState;

/// Body for granting or revoking admin access.
#[derive(Debug, Deserialize)]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

/// List users.
///
/// GET /api/users
///
/// # Errors
///
/// Returns `AppError::Auth` if the query fails.
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<ApiResponse<Vec<User>>>> {
    let users = AuthService::new(state.pool()).list_users().await?;
    Ok(ok(users))
}

/// Grant or revoke admin access.
///
/// PATCH /api/users/{id}/admin
///
/// # Errors
///
/// Returns `AppError::Auth` when the user does not exist or an admin tries to
/// demote themselves.
pub async fn set_admin(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(req): ApiJson<SetAdminRequest>,
) -> Result<Json<ApiResponse<User>>> {
    let user = AuthService::new(state.pool())
        .set_admin(&admin, id, req.is_admin)
        .await?;
    info!(
        user_id = %id,
        admin_id = %admin.id,
        is_admin = user.is_admin,
        "Admin flag changed"
    );
    Ok(ok(user))
}
