//! Unified error handling for storefront intents.
//!
//! Every intent (load, add, remove, checkout, login...) returns
//! `Result<T, ClientError>`. The variants are the outcomes a View Layer needs
//! to tell apart in order to give an actionable message; none of them is
//! retried automatically.

use thiserror::Error;

use shopfront_core::{AddressError, EmailError, ProductId};

use crate::api::ApiError;

/// Caller-facing error type for storefront intents.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No session: the intent was rejected locally without a network call.
    #[error("Not logged in")]
    Unauthenticated,

    /// The commerce service rejected the session credential.
    #[error("Auth error: {0}")]
    Auth(String),

    /// Transport failure or a non-success status with no more specific meaning.
    #[error("Network error: {0}")]
    Network(#[source] ApiError),

    /// Input failed a client-side check and was never sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The product has no stock left.
    #[error("Out of stock: {0}")]
    OutOfStock(ProductId),

    /// The product or cart line does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Checkout was attempted with an empty (or never loaded) cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The user logged out or switched accounts while the request was in
    /// flight. The service's answer belonged to the previous session and was
    /// discarded.
    #[error("Session changed before the request completed")]
    SessionChanged,
}

impl ClientError {
    /// Whether recovering requires the user to log in (again).
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Auth(_))
    }

    /// Whether the failure came from the network rather than from a domain
    /// rule, i.e. whether it is worth reporting to error tracking.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(message) => Self::Auth(message),
            ApiError::NotFound(message) => Self::NotFound(message),
            ApiError::Shared(shared) => match &*shared {
                ApiError::Unauthorized(message) => Self::Auth(message.clone()),
                ApiError::NotFound(message) => Self::NotFound(message.clone()),
                _ => Self::Network(ApiError::Shared(shared)),
            },
            other => Self::Network(other),
        }
    }
}

impl From<EmailError> for ClientError {
    fn from(err: EmailError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<AddressError> for ClientError {
    fn from(err: AddressError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
