//! Site settings route handlers.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::db::settings::SettingEntry;
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAdmin};
use crate::routes::{ApiJson, ApiPath, ApiResponse, ok};
use crate::services::settings::is_public_key;
use crate::state::AppState;

/// A single setting.
#[derive(Debug, Serialize)]
pub struct Setting {
    pub key: String,
    pub value: Value,
}

/// Body for writing a setting.
#[derive(Debug, Deserialize)]
pub struct SettingRequest {
    pub value: Value,
}

/// List every setting.
///
/// GET /api/settings
///
/// # Errors
///
/// Returns `AppError::Settings` if the query fails.
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<ApiResponse<Vec<SettingEntry>>>> {
    let entries = state.settings().list().await?;
    Ok(ok(entries))
}

/// Read a setting. Public keys need no session; the rest need an admin.
///
/// GET /api/settings/{key}
///
/// # Errors
///
/// Returns `AppError::Unauthorized`/`Forbidden` for private keys without an
/// admin session and `AppError::NotFound` when the key is unset.
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    ApiPath(key): ApiPath<String>,
) -> Result<Json<ApiResponse<Setting>>> {
    if !is_public_key(&key) {
        match user {
            None => return Err(AppError::Unauthorized("Login required".to_owned())),
            Some(user) if !user.is_admin => {
                return Err(AppError::Forbidden("Admin access required".to_owned()));
            }
            Some(_) => {}
        }
    }

    let value = state
        .settings()
        .get(&key)
        .await?
        .ok_or_else(|| AppError::NotFound("Setting".to_owned()))?;
    Ok(ok(Setting { key, value }))
}

/// Write a setting.
///
/// PUT /api/settings/{key}
///
/// # Errors
///
/// Returns `AppError::Settings` for malformed keys or values that do not fit
/// the key's shape.
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(key): ApiPath<String>,
    ApiJson(req): ApiJson<SettingRequest>,
) -> Result<Json<ApiResponse<SettingEntry>>> {
    let entry = state.settings().set(&key, &req.value).await?;
    info!(key = %entry.key, admin_id = %admin.id, "Setting written from back-office");
    Ok(ok(entry))
}
