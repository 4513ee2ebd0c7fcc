//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with a `request_id` field)
//! 3. Request ID (fills the span field, response header)
//! 4. Security headers (CSP, HSTS, etc.)
//! 5. Session layer (tower-sessions with `PostgreSQL` store)
//! 6. Route gate (page redirects by role)
//! 7. CSRF origin check for state-changing API calls
//! 8. Rate limiting (governor), per route group

pub mod auth;
pub mod csrf;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    OptionalAuth, RequireAdmin, RequireAuth, clear_current_user, route_gate, set_current_user,
};
pub use csrf::{AllowedOrigin, csrf_middleware};
pub use rate_limit::{auth_rate_limiter, checkout_rate_limiter};
pub use request_id::{RequestId, request_id_middleware};
pub use security_headers::{SecurityHeaders, security_headers_middleware};
pub use session::{create_session_layer, create_session_store};
