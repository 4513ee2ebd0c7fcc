//! Cross-site request rejection for the JSON API.
//!
//! Session cookies are `SameSite=Lax`, which still lets some cross-site
//! requests through. State-changing API calls are therefore checked against
//! the shop's origin: when the browser sends `Origin` (or, failing that,
//! `Referer`), it must be the configured base URL's origin.
//!
//! Requests carrying neither header (server-to-server callers, curl) pass.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::Url;

use crate::error::AppError;

/// Paths that receive cross-site POSTs by design.
const EXEMPT_PATHS: &[&str] = &["/api/payments/mercadopago/webhook"];

/// The origin allowed to make state-changing API calls.
#[derive(Debug, Clone)]
pub struct AllowedOrigin(pub String);

/// Reject state-changing `/api/` requests from a foreign origin.
pub async fn csrf_middleware(
    State(allowed): State<AllowedOrigin>,
    request: Request,
    next: Next,
) -> Response {
    if needs_check(request.method(), request.uri().path())
        && let Some(origin) = request_origin(request.headers())
        && origin != allowed.0
    {
        tracing::warn!(
            %origin,
            path = %request.uri().path(),
            "Rejected cross-site request"
        );
        return AppError::CsrfRejected.into_response();
    }

    next.run(request).await
}

fn needs_check(method: &Method, path: &str) -> bool {
    let unsafe_method = matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    unsafe_method && path.starts_with("/api/") && !EXEMPT_PATHS.contains(&path)
}

/// Origin of the request, from `Origin` or else `Referer`.
///
/// An unparseable value yields `"null"`, which never matches.
fn request_origin(headers: &HeaderMap) -> Option<String> {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or("null");
        return Some(
            Url::parse(origin)
                .map(|u| u.origin().ascii_serialization())
                .unwrap_or_else(|_| "null".to_owned()),
        );
    }

    headers.get(header::REFERER).map(|referer| {
        referer
            .to_str()
            .ok()
            .and_then(|r| Url::parse(r).ok())
            .map_or_else(|| "null".to_owned(), |u| u.origin().ascii_serialization())
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        Router, body::Body, http::{Request, StatusCode}, middleware::from_fn_with_state,
        routing::post,
    };
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        Router::new()
            .route("/api/orders", post(|| async { "created" }).get(|| async { "list" }))
            .route("/api/payments/mercadopago/webhook", post(|| async { "ok" }))
            .layer(from_fn_with_state(
                AllowedOrigin("https://tienda.example.com".to_owned()),
                csrf_middleware,
            ))
    }

    async fn status(method: Method, uri: &str, headers: &[(&str, &str)]) -> StatusCode {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_same_origin_allowed() {
        let code = status(
            Method::POST,
            "/api/orders",
            &[("origin", "https://tienda.example.com")],
        )
        .await;
        assert_eq!(code, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_foreign_origin_rejected() {
        let code = status(Method::POST, "/api/orders", &[("origin", "https://evil.example")]).await;
        assert_eq!(code, StatusCode::FORBIDDEN);

        let code = status(
            Method::POST,
            "/api/orders",
            &[("referer", "https://evil.example/page")],
        )
        .await;
        assert_eq!(code, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_referer_same_origin_allowed() {
        let code = status(
            Method::POST,
            "/api/orders",
            &[("referer", "https://tienda.example.com/checkout")],
        )
        .await;
        assert_eq!(code, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_headers_and_safe_methods_pass() {
        assert_eq!(status(Method::POST, "/api/orders", &[]).await, StatusCode::OK);
        assert_eq!(
            status(Method::GET, "/api/orders", &[("origin", "https://evil.example")]).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_webhook_exempt() {
        let code = status(
            Method::POST,
            "/api/payments/mercadopago/webhook",
            &[("origin", "https://api.mercadopago.com")],
        )
        .await;
        assert_eq!(code, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rejection_uses_envelope() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/api/orders")
                    .header("origin", "null")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // DELETE is not routed, but the check runs first.
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "CSRF_REJECTED");
        assert_eq!(body["success"], false);
    }
}
