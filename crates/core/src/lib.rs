//! Vitrina Core - Shared domain library.
//!
//! This crate provides the types and pricing rules used by every Vitrina component:
//! - `server` - JSON API for the storefront and the back-office
//! - `cli` - Command-line tools for migrations, admin users and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database access,
//! no HTTP clients. Anything that must be enforced server-side but was historically
//! computed in the browser (cart totals, shipping cost, variant SKUs) lives here so it
//! can be tested in isolation.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, money, order status and payment methods
//! - [`cart`] - Repricing a client-held cart against the catalog
//! - [`shipping`] - Shipping cost calculation
//! - [`variants`] - Color x size variant and SKU generation
//! - [`slug`] - URL slugs for products and categories

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod shipping;
pub mod slug;
pub mod types;
pub mod variants;

pub use types::*;
