//! OpenSASE Orders
//!
//! Order lifecycle and payment reconciliation for the OpenSASE storefront.
//!
//! ## Features
//! - Order creation with catalog-priced items, tax, shipping and coupons
//! - Variant stock reservation that never oversells
//! - Hosted-checkout payments with synchronous verify and signed webhooks
//! - Idempotent payment confirmation across both channels
//! - Role-scoped, filtered and paginated order listings

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{AppError, Result};
