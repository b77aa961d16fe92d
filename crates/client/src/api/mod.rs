//! Remote commerce service API.
//!
//! # Architecture
//!
//! - [`CommerceApi`] is the seam between the synchronization core and the
//!   network; everything above it is transport-agnostic
//! - [`HttpCommerceApi`] implements it with `reqwest` against the JSON REST
//!   contract below
//! - The service is the source of truth - NO local reconstruction of carts,
//!   every mutating call answers with the full cart
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Response |
//! |---|---|---|---|
//! | GET | `/products` | - | `[Product]` |
//! | GET | `/cart` | bearer | cart |
//! | POST | `/cart` | bearer | cart |
//! | DELETE | `/cart/{productId}` | bearer | cart |
//! | GET | `/orders` | bearer | `[Order]` |
//! | POST | `/orders` | bearer | `Order` |
//! | POST | `/auth/login` | - | `{ token, fullName }` |
//! | POST | `/auth/register` | - | status only |

mod http;

use std::future::Future;
use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shopfront_core::{CartSnapshot, Email, Order, Product, ProductId, ShippingAddress};

pub use http::HttpCommerceApi;

/// Errors that can occur when talking to the commerce service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection, timeout, TLS...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The credential was missing or rejected (401/403).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request conflicts with server state (409/422), e.g. no stock left.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configured base URL cannot have path segments appended.
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// An error shared between callers whose requests were coalesced.
    #[error(transparent)]
    Shared(Arc<ApiError>),
}

impl ApiError {
    /// Recover an owned error from one shared by coalesced callers.
    #[must_use]
    pub fn from_shared(shared: Arc<Self>) -> Self {
        Arc::try_unwrap(shared).unwrap_or_else(Self::Shared)
    }
}

/// Body of `POST /cart`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest<'a> {
    pub product_id: &'a ProductId,
    pub quantity: u32,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest<'a> {
    pub shipping_address: &'a ShippingAddress,
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a Email,
    pub password: &'a str,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest<'a> {
    pub full_name: &'a str,
    pub email: &'a Email,
    pub password: &'a str,
}

/// Response of `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Operations offered by the remote commerce service.
///
/// Authenticated calls take the session token; implementations must surface
/// a missing or rejected credential as [`ApiError::Unauthorized`] regardless
/// of the endpoint.
pub trait CommerceApi: Send + Sync {
    /// `GET /products`
    fn list_products(&self) -> impl Future<Output = Result<Vec<Product>, ApiError>> + Send;

    /// `GET /cart`
    fn fetch_cart(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<CartSnapshot, ApiError>> + Send;

    /// `POST /cart`
    fn add_to_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<CartSnapshot, ApiError>> + Send;

    /// `DELETE /cart/{productId}`
    fn remove_from_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<CartSnapshot, ApiError>> + Send;

    /// `POST /orders`
    fn create_order(
        &self,
        token: &SecretString,
        shipping_address: &ShippingAddress,
    ) -> impl Future<Output = Result<Order, ApiError>> + Send;

    /// `GET /orders`
    fn list_orders(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<Vec<Order>, ApiError>> + Send;

    /// `POST /auth/login`
    fn login(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> impl Future<Output = Result<LoginResponse, ApiError>> + Send;

    /// `POST /auth/register`
    fn register(
        &self,
        full_name: &str,
        email: &Email,
        password: &SecretString,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}
