//! Catalog view: the last-fetched product listing.
//!
//! The listing is cached with `moka` under a configurable TTL. Stock checks
//! made before adding to the cart read this view only (never the network);
//! once the TTL lapses the view is treated as unknown until the next fetch.
//! Concurrent fetches of an empty cache are coalesced into one request.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use shopfront_core::{Product, ProductId};

use crate::api::{ApiError, CommerceApi};
use crate::error::Result;

/// Cache key for catalog data.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum CacheKey {
    Products,
}

/// Cached product listing, in server order.
pub type Listing = Arc<Vec<Product>>;

/// Shared, cheaply cloneable catalog view.
pub struct Catalog<A> {
    inner: Arc<CatalogInner<A>>,
}

struct CatalogInner<A> {
    api: Arc<A>,
    cache: Cache<CacheKey, Listing>,
}

impl<A> Clone for Catalog<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: CommerceApi + 'static> Catalog<A> {
    /// Create a catalog view whose listing is trusted for `ttl`.
    #[must_use]
    pub fn new(api: Arc<A>, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(1).time_to_live(ttl).build();

        Self {
            inner: Arc::new(CatalogInner { api, cache }),
        }
    }

    /// The cached listing, fetching it if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing has to be fetched and the request fails.
    #[instrument(skip(self))]
    pub async fn products(&self) -> Result<Listing> {
        let api = Arc::clone(&self.inner.api);
        self.inner
            .cache
            .try_get_with(CacheKey::Products, async move {
                debug!("Cache miss for products");
                api.list_products().await.map(Arc::new)
            })
            .await
            .map_err(|e| ApiError::from_shared(e).into())
    }

    /// Fetch the listing unconditionally and replace the cached one.
    ///
    /// Used after a cart mutation so displayed stock levels follow the
    /// server.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; the previous listing is kept.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Listing> {
        let listing = Arc::new(self.inner.api.list_products().await?);
        self.inner
            .cache
            .insert(CacheKey::Products, Arc::clone(&listing))
            .await;
        Ok(listing)
    }

    /// Look up a product in the current view without network access.
    pub async fn product(&self, product_id: &ProductId) -> Option<Product> {
        self.inner
            .cache
            .get(&CacheKey::Products)
            .await
            .and_then(|listing| listing.iter().find(|p| &p.id == product_id).cloned())
    }

    /// Forget the current view.
    pub async fn invalidate(&self) {
        self.inner.cache.invalidate(&CacheKey::Products).await;
    }
}
