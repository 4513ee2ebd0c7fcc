//! Domain models for the shop.
//!
//! These are the validated shapes handlers and services work with; database
//! row types live next to the queries in [`crate::db`].

pub mod category;
pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use category::Category;
pub use order::{Order, OrderItem, OrderSummary};
pub use product::{Product, Variant};
pub use session::{CurrentUser, keys as session_keys};
pub use user::User;
