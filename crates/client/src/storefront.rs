//! Storefront facade wiring the components together.

use std::sync::Arc;
use std::time::Duration;

use crate::api::{ApiError, CommerceApi, HttpCommerceApi};
use crate::auth::AuthService;
use crate::cart::CartSync;
use crate::catalog::Catalog;
use crate::checkout::CheckoutOrchestrator;
use crate::config::ClientConfig;
use crate::session::SessionStore;

/// Everything a View Layer talks to.
///
/// This struct is cheaply cloneable via `Arc`. All components share one
/// [`SessionStore`], and the cart is subscribed to it.
pub struct Storefront<A> {
    inner: Arc<StorefrontInner<A>>,
}

struct StorefrontInner<A> {
    session: SessionStore,
    catalog: Catalog<A>,
    cart: Arc<CartSync<A>>,
    checkout: CheckoutOrchestrator<A>,
    auth: AuthService<A>,
}

impl<A> Clone for Storefront<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Storefront<HttpCommerceApi> {
    /// Create a storefront talking to the configured commerce service.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn connect(config: &ClientConfig) -> Result<Self, ApiError> {
        let api = HttpCommerceApi::new(config)?;
        Ok(Self::with_api(Arc::new(api), config.catalog_ttl))
    }
}

impl<A: CommerceApi + 'static> Storefront<A> {
    /// Create a storefront over any [`CommerceApi`] implementation.
    #[must_use]
    pub fn with_api(api: Arc<A>, catalog_ttl: Duration) -> Self {
        let session = SessionStore::new();
        let catalog = Catalog::new(Arc::clone(&api), catalog_ttl);
        let cart = CartSync::new(Arc::clone(&api), session.clone(), catalog.clone());
        let checkout = CheckoutOrchestrator::new(Arc::clone(&api), session.clone(), Arc::clone(&cart));
        let auth = AuthService::new(api, session.clone());

        Self {
            inner: Arc::new(StorefrontInner {
                session,
                catalog,
                cart,
                checkout,
                auth,
            }),
        }
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog<A> {
        &self.inner.catalog
    }

    #[must_use]
    pub fn cart(&self) -> &CartSync<A> {
        &self.inner.cart
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutOrchestrator<A> {
        &self.inner.checkout
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService<A> {
        &self.inner.auth
    }

    /// Name to greet the user with, `"Guest"` when logged out.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.inner.session.display_name()
    }
}
