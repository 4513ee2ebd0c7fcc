//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Registration, login and admin flag management
//! - `orders` - Checkout, status changes and payment reconciliation
//! - `payments` - MercadoPago Checkout Pro client and webhook verification
//! - `settings` - Cached key/JSON site settings
//! - `shipping` - Shipping quotes from the rate table and an optional carrier
//!
//! Services borrow the pool (`AuthService<'a>`, `OrderService<'a>`) or hold
//! cheaply cloneable handles (`SettingsService`, `ShippingService`) kept in
//! [`AppState`](crate::state::AppState).

pub mod auth;
pub mod orders;
pub mod payments;
pub mod settings;
pub mod shipping;

pub use auth::{AuthError, AuthService};
pub use orders::{OrderError, OrderService};
pub use payments::{MercadoPagoClient, PaymentError};
pub use settings::{SettingsError, SettingsService};
pub use shipping::{CarrierClient, QuoteError, ShippingService};
