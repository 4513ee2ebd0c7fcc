//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions. Session
//! cookies are signed with a key derived from `VITRINA_SESSION_SECRET`, so a
//! forged or edited session ID is treated as no session at all.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha512};
use sqlx::PgPool;
use tower_sessions::cookie::Key;
use tower_sessions::service::SignedCookie;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::ServerConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "vitrina_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session store.
///
/// The `tower_sessions.session` table is created by the store's own
/// migration; run [`PostgresStore::migrate`] before serving.
#[must_use]
pub fn create_session_store(pool: &PgPool) -> PostgresStore {
    PostgresStore::new(pool.clone())
}

/// Cookie signing key for a session secret.
///
/// The secret is stretched to the 64 bytes the key needs with SHA-512.
#[must_use]
pub fn signing_key(secret: &SecretString) -> Key {
    let digest = Sha512::digest(secret.expose_secret().as_bytes());
    Key::from(digest.as_slice())
}

/// Create the session layer.
///
/// Cookies are signed, and `Secure` when the shop is served over HTTPS.
#[must_use]
pub fn create_session_layer(
    store: PostgresStore,
    config: &ServerConfig,
) -> SessionManagerLayer<PostgresStore, SignedCookie> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_https())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
        .with_signed(signing_key(&config.session_secret))
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, header},
        routing::{get, post},
    };
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, Session};

    use super::*;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_owned())
    }

    #[test]
    fn test_signing_key_is_stable_per_secret() {
        let a = signing_key(&secret("k8#Pq2!vX9$mT4&wZ7*rL1@nB6^cF3%h"));
        let b = signing_key(&secret("k8#Pq2!vX9$mT4&wZ7*rL1@nB6^cF3%h"));
        let c = signing_key(&secret("another-secret-with-plenty-of-length!"));
        assert_eq!(a.signing(), b.signing());
        assert_ne!(a.signing(), c.signing());
    }

    async fn remember(session: Session) -> &'static str {
        session.insert("seen", true).await.unwrap();
        "stored"
    }

    async fn recall(session: Session) -> String {
        let seen: Option<bool> = session.get("seen").await.unwrap();
        seen.unwrap_or(false).to_string()
    }

    fn app() -> Router {
        let layer = SessionManagerLayer::new(MemoryStore::default())
            .with_signed(signing_key(&secret("k8#Pq2!vX9$mT4&wZ7*rL1@nB6^cF3%h")));
        Router::new()
            .route("/remember", post(remember))
            .route("/recall", get(recall))
            .layer(layer)
    }

    async fn recall_with(app: &Router, cookie: &str) -> String {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/recall")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_ignored() {
        let app = app();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/remember")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_owned();

        assert_eq!(recall_with(&app, &cookie).await, "true");

        let (name, value) = cookie.split_once('=').unwrap();
        let mut tampered = value.to_owned();
        let last = if tampered.pop() == Some('A') { 'B' } else { 'A' };
        tampered.push(last);
        assert_eq!(recall_with(&app, &format!("{name}={tampered}")).await, "false");
    }
}
