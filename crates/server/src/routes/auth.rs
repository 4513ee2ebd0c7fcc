//! Authentication route handlers.
//!
//! Email/password accounts. The session cookie carries the login; handlers
//! only ever see the [`CurrentUser`] stored in it.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::redact::redact_email;
use crate::routes::{ApiJson, ApiResponse, created, ok};
use crate::services::AuthService;
use crate::state::AppState;

/// Registration request.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Login request.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

async fn start_session(session: &Session, user: &CurrentUser) -> Result<()> {
    set_current_user(session, user)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    set_sentry_user(&user.id);
    Ok(())
}

/// Create an account and log it in.
///
/// POST /api/auth/register
///
/// # Errors
///
/// Returns `AppError::Auth` on invalid input or a taken email.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CurrentUser>>)> {
    let user = AuthService::new(state.pool())
        .register(&req.email, &req.name, &req.password)
        .await?;

    let current = CurrentUser::from(&user);
    start_session(&session, &current).await?;

    info!(
        user_id = %current.id,
        email = %redact_email(current.email.as_str()),
        "User registered"
    );
    Ok(created(current))
}

/// Log in with email and password.
///
/// POST /api/auth/login
///
/// # Errors
///
/// Returns `AppError::Auth` with `InvalidCredentials` for any unknown
/// email/password combination.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<ApiResponse<CurrentUser>>> {
    let user = AuthService::new(state.pool())
        .login(&req.email, &req.password)
        .await
        .inspect_err(|_| {
            info!(email = %redact_email(&req.email), "Failed login");
        })?;

    let current = CurrentUser::from(&user);
    start_session(&session, &current).await?;

    info!(user_id = %current.id, is_admin = current.is_admin, "User logged in");
    Ok(ok(current))
}

/// Log out.
///
/// POST /api/auth/logout
///
/// # Errors
///
/// Returns `AppError::Internal` if the session cannot be cleared.
pub async fn logout(session: Session) -> Result<Json<ApiResponse<()>>> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    clear_sentry_user();
    Ok(ok(()))
}

/// The logged-in user.
///
/// GET /api/auth/me
pub async fn me(RequireAuth(user): RequireAuth) -> Json<ApiResponse<CurrentUser>> {
    ok(user)
}
