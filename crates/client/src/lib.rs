//! Shopfront client library.
//!
//! Keeps a locally held cart in sync with a remote commerce service under
//! asynchronous, partially failing network calls. See [`cart`] for the
//! consistency rules.
//!
//! # Modules
//!
//! - [`api`] - Remote commerce service seam and its HTTP implementation
//! - [`session`] - Session store and change notifications
//! - [`catalog`] - TTL-cached product listing
//! - [`cart`] - Cart synchronization core
//! - [`checkout`] - Order submission and history
//! - [`auth`] - Login, registration, logout
//! - [`storefront`] - Facade wiring everything to one session

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod session;
pub mod storefront;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

pub use api::{ApiError, CommerceApi, HttpCommerceApi};
pub use cart::{CartCache, CartState, CartSummary, CartSync};
pub use catalog::Catalog;
pub use checkout::CheckoutOrchestrator;
pub use config::{ClientConfig, ConfigError, LogFormat};
pub use error::{ClientError, Result};
pub use session::{Session, SessionStore};
pub use storefront::Storefront;
