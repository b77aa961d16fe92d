//! `reqwest` implementation of [`CommerceApi`].
//!
//! Every request carries an `x-request-id` header (UUID v4) that is also
//! recorded on the request's tracing span, so client logs can be matched
//! against service logs.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use shopfront_core::{CartSnapshot, Email, Order, Product, ProductId, ShippingAddress};

use super::{
    AddToCartRequest, ApiError, CommerceApi, CreateOrderRequest, LoginRequest, LoginResponse,
    RegisterRequest,
};
use crate::config::ClientConfig;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest error body excerpt kept in an error message.
const ERROR_BODY_LIMIT: usize = 200;

/// Client for the commerce service REST API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct HttpCommerceApi {
    inner: Arc<HttpCommerceApiInner>,
}

struct HttpCommerceApiInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCommerceApi {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::with_timeout(config.api_url.clone(), config.http_timeout)
    }

    /// Create a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build or the URL cannot
    /// be used as a base.
    pub fn with_timeout(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("shopfront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpCommerceApiInner { client, base_url }),
        })
    }

    /// Base URL all endpoints are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Resolve an endpoint by appending path segments to the base URL.
    ///
    /// Segments are percent-encoded, so ids can never escape their segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidBaseUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        Ok(self.inner.client.request(method, self.endpoint(segments)?))
    }

    fn authed(
        &self,
        method: Method,
        segments: &[&str],
        token: &SecretString,
    ) -> Result<RequestBuilder, ApiError> {
        Ok(self
            .request(method, segments)?
            .bearer_auth(token.expose_secret()))
    }

    /// Send a request and return the body of a successful response.
    async fn send_raw(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let request = builder.header(REQUEST_ID_HEADER, &request_id).build()?;

        let span = tracing::debug_span!(
            "commerce_request",
            method = %request.method(),
            path = %request.url().path(),
            request_id = %request_id,
        );

        async move {
            let response = self.inner.client.execute(request).await?;
            let status = response.status();
            let body = response.text().await?;

            if status.is_success() {
                debug!(status = %status, "commerce service responded");
                return Ok(body);
            }

            let message = error_message(status, &body);
            warn!(status = %status, message = %message, "commerce service returned non-success status");
            Err(classify(status, message))
        }
        .instrument(span)
        .await
    }

    /// Send a request and parse the JSON body of a successful response.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send_raw(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse commerce service response"
            );
            ApiError::Parse(e)
        })
    }
}

impl CommerceApi for HttpCommerceApi {
    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        self.send(self.request(Method::GET, &["products"])?).await
    }

    #[instrument(skip(self, token))]
    async fn fetch_cart(&self, token: &SecretString) -> Result<CartSnapshot, ApiError> {
        self.send(self.authed(Method::GET, &["cart"], token)?).await
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn add_to_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot, ApiError> {
        let body = AddToCartRequest {
            product_id,
            quantity,
        };
        self.send(self.authed(Method::POST, &["cart"], token)?.json(&body))
            .await
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn remove_from_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<CartSnapshot, ApiError> {
        self.send(self.authed(Method::DELETE, &["cart", product_id.as_str()], token)?)
            .await
    }

    #[instrument(skip(self, token, shipping_address))]
    async fn create_order(
        &self,
        token: &SecretString,
        shipping_address: &ShippingAddress,
    ) -> Result<Order, ApiError> {
        let body = CreateOrderRequest { shipping_address };
        self.send(self.authed(Method::POST, &["orders"], token)?.json(&body))
            .await
    }

    #[instrument(skip(self, token))]
    async fn list_orders(&self, token: &SecretString) -> Result<Vec<Order>, ApiError> {
        self.send(self.authed(Method::GET, &["orders"], token)?)
            .await
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn login(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<LoginResponse, ApiError> {
        let body = LoginRequest {
            email,
            password: password.expose_secret(),
        };
        self.send(self.request(Method::POST, &["auth", "login"])?.json(&body))
            .await
    }

    #[instrument(skip(self, full_name, password), fields(email = %email))]
    async fn register(
        &self,
        full_name: &str,
        email: &Email,
        password: &SecretString,
    ) -> Result<(), ApiError> {
        let body = RegisterRequest {
            full_name,
            email,
            password: password.expose_secret(),
        };
        self.send_raw(self.request(Method::POST, &["auth", "register"])?.json(&body))
            .await
            .map(|_| ())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Map a non-success status onto the error taxonomy.
fn classify(status: StatusCode, message: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => ApiError::Rejected(message),
        _ => ApiError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// Extract a human-readable message from an error body.
///
/// Prefers a JSON `message` (or `error`) field, falls back to the raw body,
/// and finally to the status reason phrase.
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_owned))
        });

    let message = from_json.unwrap_or_else(|| body.trim().to_owned());
    if message.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned();
    }
    message.chars().take(ERROR_BODY_LIMIT).collect()
}
