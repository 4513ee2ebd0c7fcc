//! Authentication middleware and extractors.
//!
//! API handlers use the extractors, which answer with the JSON error envelope
//! (401 when nobody is logged in, 403 when the user is not an admin).
//! [`RequireAdmin`] confirms the admin flag against the account on every
//! request, so a revoked admin loses access on their next call.
//! [`route_gate`] covers page paths served behind the same origin and
//! answers with redirects instead.

use std::future::Future;

use axum::{
    extract::{FromRequestParts, Request},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use url::form_urlencoded;

use vitrina_core::UserId;

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::error::{codes, error_response};
use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;

/// Extractor that requires a logged-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     Json(user)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires a logged-in admin.
pub struct RequireAdmin(pub CurrentUser);

/// Extractor that optionally gets the current user.
///
/// Never rejects.
pub struct OptionalAuth(pub Option<CurrentUser>);

/// Error returned when an extractor rejects the request.
#[derive(Debug)]
pub enum AuthRejection {
    /// Nobody is logged in.
    Unauthorized,
    /// Logged in, but not allowed.
    Forbidden,
    /// The account could not be checked.
    Unavailable,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => error_response(
                StatusCode::UNAUTHORIZED,
                codes::UNAUTHORIZED,
                "Authentication required",
            ),
            Self::Forbidden => error_response(
                StatusCode::FORBIDDEN,
                codes::FORBIDDEN,
                "Admin access required",
            ),
            Self::Unavailable => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL_ERROR,
                "Internal server error",
            ),
        }
    }
}

/// Read the current user from the session in `extensions`.
async fn session_user(session: Option<&Session>) -> Option<CurrentUser> {
    session?
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_user(parts.extensions.get::<Session>())
            .await
            .map(Self)
            .ok_or(AuthRejection::Unauthorized)
    }
}

/// Source of truth for the admin flag of an account.
///
/// Returns `None` when the account no longer exists.
pub trait AdminLookup: Send + Sync {
    fn admin_flag(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<bool>, RepositoryError>> + Send;
}

impl AdminLookup for AppState {
    fn admin_flag(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<bool>, RepositoryError>> + Send {
        async move {
            let user = UserRepository::new(self.pool()).get_by_id(id).await?;
            Ok(user.map(|u| u.is_admin))
        }
    }
}

/// Decide an admin request from the session user and the stored flag.
fn confirm_admin(
    user: CurrentUser,
    stored: Option<bool>,
) -> Result<CurrentUser, AuthRejection> {
    match stored {
        None => Err(AuthRejection::Unauthorized),
        Some(false) => Err(AuthRejection::Forbidden),
        Some(true) if user.is_admin => Ok(user),
        // Promoted since login.
        Some(true) => Ok(CurrentUser {
            is_admin: true,
            ..user
        }),
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: AdminLookup,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = parts.extensions.get::<Session>().cloned();
        let user = session_user(session.as_ref())
            .await
            .ok_or(AuthRejection::Unauthorized)?;

        let stored = state.admin_flag(user.id).await.map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Could not check admin flag");
            AuthRejection::Unavailable
        })?;
        let was_admin = user.is_admin;
        let result = confirm_admin(user.clone(), stored);

        // Keep the session in line with the account so the route gate agrees.
        if let Some(session) = session {
            match (&result, stored) {
                (Err(_), None) => {
                    let _ = session.flush().await;
                }
                (Err(_), Some(false)) if was_admin => {
                    tracing::info!(user_id = %user.id, "Admin access revoked, updating session");
                    let demoted = CurrentUser {
                        is_admin: false,
                        ..user
                    };
                    let _ = session.insert(session_keys::CURRENT_USER, &demoted).await;
                }
                (Ok(current), _) if !was_admin => {
                    let _ = session.insert(session_keys::CURRENT_USER, current).await;
                }
                _ => {}
            }
        }

        result.map(Self)
    }
}

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_user(parts.extensions.get::<Session>()).await))
    }
}

/// Helper to set the current user in the session.
///
/// The session ID is cycled first so a pre-login session cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

// =============================================================================
// Route gate
// =============================================================================

fn under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn login_redirect(path: &str) -> String {
    let next: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("/login?next={next}")
}

/// Where to send a request for `path`, or `None` to let it through.
///
/// - `/admin/**` needs an admin: anonymous users go to login, others home.
/// - `/account/**` needs a logged-in user.
/// - `/login` and `/register` send logged-in users to `/admin` or `/`.
/// - `/api/**` is never redirected.
#[must_use]
pub fn gate_redirect(path: &str, user: Option<&CurrentUser>) -> Option<String> {
    if under(path, "/api") {
        return None;
    }

    if under(path, "/admin") {
        return match user {
            None => Some(login_redirect(path)),
            Some(u) if !u.is_admin => Some("/".to_owned()),
            Some(_) => None,
        };
    }

    if under(path, "/account") {
        return user.is_none().then(|| login_redirect(path));
    }

    if path == "/login" || path == "/register" {
        return user.map(|u| {
            if u.is_admin {
                "/admin".to_owned()
            } else {
                "/".to_owned()
            }
        });
    }

    None
}

/// Redirect page requests the current user may not see.
pub async fn route_gate(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    if under(&path, "/api") {
        return next.run(request).await;
    }

    let session = request.extensions().get::<Session>().cloned();
    let user = session_user(session.as_ref()).await;
    if let Some(target) = gate_redirect(&path, user.as_ref()) {
        tracing::debug!(%path, %target, "Route gate redirect");
        return Redirect::to(&target).into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::{
        Router,
        body::Body,
        http::{Request, header},
        middleware::from_fn,
        routing::{get, post},
    };
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};
    use vitrina_core::{Email, UserId};

    use super::*;

    /// Admin is account 1, customer is account 2.
    fn user(is_admin: bool) -> CurrentUser {
        CurrentUser {
            id: UserId::new(if is_admin { 1 } else { 2 }),
            email: Email::parse("ana@example.com").unwrap(),
            name: "Ana".to_owned(),
            is_admin,
        }
    }

    #[test]
    fn test_gate_admin_paths() {
        assert_eq!(
            gate_redirect("/admin/orders", None).as_deref(),
            Some("/login?next=%2Fadmin%2Forders")
        );
        assert_eq!(gate_redirect("/admin", Some(&user(false))).as_deref(), Some("/"));
        assert_eq!(gate_redirect("/admin/orders", Some(&user(true))), None);
        // Prefix must end at a segment boundary.
        assert_eq!(gate_redirect("/administrator", None), None);
    }

    #[test]
    fn test_gate_account_and_auth_pages() {
        assert_eq!(
            gate_redirect("/account", None).as_deref(),
            Some("/login?next=%2Faccount")
        );
        assert_eq!(gate_redirect("/account/orders", Some(&user(false))), None);
        assert_eq!(gate_redirect("/login", None), None);
        assert_eq!(gate_redirect("/login", Some(&user(true))).as_deref(), Some("/admin"));
        assert_eq!(gate_redirect("/register", Some(&user(false))).as_deref(), Some("/"));
    }

    #[test]
    fn test_gate_never_redirects_api() {
        assert_eq!(gate_redirect("/api/orders", None), None);
        assert_eq!(gate_redirect("/api/admin/anything", Some(&user(false))), None);
    }

    async fn login(session: Session, body: String) -> StatusCode {
        let is_admin = body == "admin";
        set_current_user(&session, &user(is_admin)).await.unwrap();
        StatusCode::NO_CONTENT
    }

    async fn admin_only(RequireAdmin(user): RequireAdmin) -> String {
        user.name
    }

    async fn whoami(OptionalAuth(user): OptionalAuth) -> String {
        user.map_or_else(|| "guest".to_owned(), |u| u.name)
    }

    /// Accounts keyed by ID with their current admin flag.
    #[derive(Clone, Default)]
    struct Accounts(Arc<Mutex<HashMap<UserId, bool>>>);

    impl Accounts {
        fn set(&self, id: UserId, is_admin: bool) {
            self.0.lock().unwrap().insert(id, is_admin);
        }

        fn remove(&self, id: UserId) {
            self.0.lock().unwrap().remove(&id);
        }
    }

    impl AdminLookup for Accounts {
        fn admin_flag(
            &self,
            id: UserId,
        ) -> impl Future<Output = Result<Option<bool>, RepositoryError>> + Send {
            let flag = self.0.lock().unwrap().get(&id).copied();
            async move { Ok(flag) }
        }
    }

    fn app() -> Router {
        let accounts = Accounts::default();
        accounts.set(UserId::new(1), true);
        accounts.set(UserId::new(2), false);
        app_with(accounts)
    }

    fn app_with(accounts: Accounts) -> Router {
        Router::new()
            .route("/test/login", post(login))
            .route("/admin/dashboard", get(|| async { "dashboard" }))
            .route("/api/admin-only", get(admin_only))
            .route("/api/whoami", get(whoami))
            .layer(from_fn(route_gate))
            .layer(SessionManagerLayer::new(MemoryStore::default()))
            .with_state(accounts)
    }

    async fn login_cookie(app: &Router, role: &str) -> String {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/test/login")
                    .body(Body::from(role.to_owned()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let cookie = response.headers().get(header::SET_COOKIE).unwrap();
        cookie
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_owned()
    }

    async fn get_with(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        app.clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_route_gate_redirects_anonymous() {
        let app = app();
        let response = get_with(&app, "/admin/dashboard", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login?next=%2Fadmin%2Fdashboard"
        );
    }

    #[tokio::test]
    async fn test_route_gate_admin_and_customer() {
        let app = app();

        let customer = login_cookie(&app, "customer").await;
        let response = get_with(&app, "/admin/dashboard", Some(&customer)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");

        let admin = login_cookie(&app, "admin").await;
        let response = get_with(&app, "/admin/dashboard", Some(&admin)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_extractors_answer_with_status() {
        let app = app();

        let response = get_with(&app, "/api/admin-only", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let customer = login_cookie(&app, "customer").await;
        let response = get_with(&app, "/api/admin-only", Some(&customer)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let admin = login_cookie(&app, "admin").await;
        let response = get_with(&app, "/api/admin-only", Some(&admin)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_confirm_admin_uses_stored_flag() {
        assert!(confirm_admin(user(true), Some(true)).is_ok());
        assert!(matches!(
            confirm_admin(user(true), Some(false)),
            Err(AuthRejection::Forbidden)
        ));
        assert!(matches!(
            confirm_admin(user(true), None),
            Err(AuthRejection::Unauthorized)
        ));
        assert!(confirm_admin(user(false), Some(true)).unwrap().is_admin);
    }

    #[tokio::test]
    async fn test_demoted_admin_loses_access() {
        let accounts = Accounts::default();
        accounts.set(UserId::new(1), true);
        let app = app_with(accounts.clone());

        let admin = login_cookie(&app, "admin").await;
        let response = get_with(&app, "/api/admin-only", Some(&admin)).await;
        assert_eq!(response.status(), StatusCode::OK);

        accounts.set(UserId::new(1), false);
        let response = get_with(&app, "/api/admin-only", Some(&admin)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // The session was rewritten, so page routes see a customer too.
        let response = get_with(&app, "/admin/dashboard", Some(&admin)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
    }

    #[tokio::test]
    async fn test_deleted_account_is_unauthorized() {
        let accounts = Accounts::default();
        accounts.set(UserId::new(1), true);
        let app = app_with(accounts.clone());

        let admin = login_cookie(&app, "admin").await;
        accounts.remove(UserId::new(1));
        let response = get_with(&app, "/api/admin-only", Some(&admin)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_optional_auth_guest() {
        let app = app();
        let response = get_with(&app, "/api/whoami", None).await;
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"guest");
    }
}
