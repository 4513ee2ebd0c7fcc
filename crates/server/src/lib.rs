//! Vitrina server library.
//!
//! The JSON API behind the Vitrina storefront and back-office: catalog,
//! checkout, MercadoPago payments, shipping quotes and site settings. The
//! binary in `main.rs` only wires configuration, logging and the listener;
//! everything else lives here so the CLI and tests can reuse it.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redact;
pub mod routes;
pub mod services;
pub mod state;

use axum::{
    Router,
    body::Body,
    http::Request,
    middleware::{from_fn, from_fn_with_state},
};
use tower_http::trace::TraceLayer;
use tower_sessions::SessionManagerLayer;
use tower_sessions::service::SignedCookie;
use tower_sessions_sqlx_store::PostgresStore;

use crate::middleware::{
    AllowedOrigin, SecurityHeaders, csrf_middleware, request_id_middleware, route_gate,
    security_headers_middleware,
};
use crate::state::AppState;

/// Build the application router with its middleware stack.
///
/// Sentry layers are added by the binary, outside this router.
pub fn app(state: AppState, session_layer: SessionManagerLayer<PostgresStore, SignedCookie>) -> Router {
    let allowed_origin = AllowedOrigin(state.config().origin());
    let security = SecurityHeaders {
        hsts: state.config().is_https(),
    };

    Router::new()
        .merge(routes::routes())
        .layer(from_fn_with_state(allowed_origin, csrf_middleware))
        .layer(from_fn(route_gate))
        .layer(session_layer)
        .layer(from_fn_with_state(security, security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}
