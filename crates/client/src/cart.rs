//! Cart synchronization core.
//!
//! Keeps a local, read-consistent copy of the user's cart in step with the
//! commerce service.
//!
//! # Consistency rules
//!
//! - The cache only ever holds a complete snapshot confirmed by the service;
//!   mutations replace it wholesale with the snapshot the service answers
//!   with, and nothing is merged locally
//! - Every request takes a sequence number when it is dispatched. A response
//!   is applied only if it is newer than the last applied one, so a slow
//!   `load_cart` cannot overwrite the result of a later add or remove
//! - Every request also carries the session generation it was issued under.
//!   Login and logout reset the cache (through [`SessionListener`]), and any
//!   response from an earlier generation is dropped on arrival and never
//!   handed back to the caller
//! - A request that fails, or whose future is dropped, leaves the previous
//!   snapshot in place; the cache never stays `Loading` without a request in
//!   flight

use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use shopfront_core::{CartSnapshot, Price, ProductId};

use crate::api::{ApiError, CommerceApi};
use crate::catalog::Catalog;
use crate::error::{ClientError, Result};
use crate::session::{SessionEvent, SessionListener, SessionStore};

/// Observable state of the cart cache.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CartState {
    /// Nothing confirmed for the current session.
    #[default]
    Unloaded,
    /// At least one request is in flight; `previous` is the last confirmed
    /// snapshot, still valid for display.
    Loading { previous: Option<CartSnapshot> },
    /// The last confirmed snapshot.
    Loaded(CartSnapshot),
}

impl CartState {
    /// Last confirmed snapshot, if any.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&CartSnapshot> {
        match self {
            Self::Loaded(snapshot)
            | Self::Loading {
                previous: Some(snapshot),
            } => Some(snapshot),
            Self::Unloaded | Self::Loading { previous: None } => None,
        }
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    fn into_snapshot(self) -> Option<CartSnapshot> {
        match self {
            Self::Loaded(snapshot) => Some(snapshot),
            Self::Loading { previous } => previous,
            Self::Unloaded => None,
        }
    }
}

/// Totals for the cart badge and summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartSummary {
    pub item_count: u32,
    pub total_price: Price,
}

impl CartSummary {
    fn of(snapshot: Option<&CartSnapshot>) -> Self {
        snapshot.map_or(
            Self {
                item_count: 0,
                total_price: Price::ZERO,
            },
            |s| Self {
                item_count: s.total_item_count(),
                total_price: s.total_price(),
            },
        )
    }
}

/// Identifies a dispatched request.
#[derive(Debug, Clone, Copy)]
struct Ticket {
    epoch: u64,
    seq: u64,
}

/// What happened to a response at apply time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Apply {
    /// Installed as the new snapshot.
    Applied,
    /// Same session, but a newer response was already applied (or the
    /// request failed).
    Superseded,
    /// Issued under a session that has since ended.
    Expired,
}

/// The cart cache with its sequencing bookkeeping.
///
/// Published through a `watch` channel; see [`CartSync::subscribe`].
#[derive(Debug, Clone, Default)]
pub struct CartCache {
    state: CartState,
    /// Session generation the cache belongs to.
    epoch: u64,
    next_seq: u64,
    applied_seq: u64,
    in_flight: usize,
}

impl CartCache {
    #[must_use]
    pub const fn state(&self) -> &CartState {
        &self.state
    }

    #[must_use]
    pub fn summary(&self) -> CartSummary {
        CartSummary::of(self.state.snapshot())
    }

    /// Register a request issued under session `generation`.
    fn begin(&mut self, generation: u64) -> Ticket {
        self.next_seq += 1;
        let ticket = Ticket {
            epoch: generation,
            seq: self.next_seq,
        };

        // A credential read just before a session change is already stale
        if generation == self.epoch {
            self.in_flight += 1;
            let previous = std::mem::take(&mut self.state).into_snapshot();
            self.state = CartState::Loading { previous };
        }
        ticket
    }

    /// Settle a request with its response, or `None` if it failed.
    fn finish(&mut self, ticket: Ticket, response: Option<&CartSnapshot>) -> Apply {
        if ticket.epoch != self.epoch {
            return Apply::Expired;
        }

        self.in_flight = self.in_flight.saturating_sub(1);
        let mut confirmed = std::mem::take(&mut self.state).into_snapshot();
        let mut outcome = Apply::Superseded;

        if let Some(snapshot) = response.filter(|_| ticket.seq > self.applied_seq) {
            self.applied_seq = ticket.seq;
            confirmed = Some(snapshot.clone());
            outcome = Apply::Applied;
        }

        self.state = match (self.in_flight, confirmed) {
            (0, Some(snapshot)) => CartState::Loaded(snapshot),
            (0, None) => CartState::Unloaded,
            (_, previous) => CartState::Loading { previous },
        };
        outcome
    }

    /// Forget the snapshot and any response still in flight.
    fn discard(&mut self) {
        self.applied_seq = self.next_seq;
        self.state = if self.in_flight > 0 {
            CartState::Loading { previous: None }
        } else {
            CartState::Unloaded
        };
    }

    /// Start over for a new session generation.
    fn reset(&mut self, generation: u64) {
        self.epoch = generation;
        self.in_flight = 0;
        self.applied_seq = self.next_seq;
        self.state = CartState::Unloaded;
    }
}

/// Settles its ticket when dropped, so an abandoned request never leaves the
/// cache loading.
struct Dispatch<'a> {
    cache: &'a watch::Sender<CartCache>,
    ticket: Option<Ticket>,
}

impl Dispatch<'_> {
    fn complete(mut self, response: Option<&CartSnapshot>) -> Apply {
        match self.ticket.take() {
            Some(ticket) => settle(self.cache, ticket, response),
            None => Apply::Expired,
        }
    }
}

impl Drop for Dispatch<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            debug!(seq = ticket.seq, "cart request abandoned");
            settle(self.cache, ticket, None);
        }
    }
}

fn settle(
    cache: &watch::Sender<CartCache>,
    ticket: Ticket,
    response: Option<&CartSnapshot>,
) -> Apply {
    let mut outcome = Apply::Expired;
    cache.send_if_modified(|cache| {
        outcome = cache.finish(ticket, response);
        outcome != Apply::Expired
    });
    outcome
}

/// Mediates cart intents between the View Layer and the commerce service.
pub struct CartSync<A> {
    api: Arc<A>,
    session: SessionStore,
    catalog: Catalog<A>,
    cache: watch::Sender<CartCache>,
}

impl<A: CommerceApi + 'static> CartSync<A> {
    /// Create the cart core and subscribe it to `session`.
    #[must_use]
    pub fn new(api: Arc<A>, session: SessionStore, catalog: Catalog<A>) -> Arc<Self> {
        let (cache, _) = watch::channel(CartCache::default());
        let cart = Arc::new(Self {
            api,
            session,
            catalog,
            cache,
        });

        let listener: Weak<dyn SessionListener> = Arc::downgrade(&cart) as Weak<dyn SessionListener>;
        cart.session.subscribe(listener);
        // Subscribed first, so no change can slip between these two steps
        let generation = cart.session.generation();
        cart.cache.send_modify(|cache| cache.reset(generation));

        cart
    }

    /// Fetch the authoritative cart and replace the cache with it.
    ///
    /// If a newer response has been applied by the time this one arrives,
    /// it is dropped and the newer snapshot is returned instead. If the
    /// session changed while the request was in flight, the answer is
    /// discarded and the cart of the current session is fetched.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a session; `Auth` if the credential is
    /// rejected; `Network` on transport failure.
    #[instrument(skip(self))]
    pub async fn load_cart(&self) -> Result<CartSnapshot> {
        loop {
            let credential = self.session.credential().ok_or(ClientError::Unauthenticated)?;
            let dispatch = self.dispatch(credential.generation);

            let snapshot = match self.api.fetch_cart(&credential.token).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    if dispatch.complete(None) == Apply::Expired {
                        debug!(error = %e, "cart load failed after session change, reloading");
                        continue;
                    }
                    warn!(error = %e, "failed to load cart");
                    return Err(e.into());
                }
            };

            match dispatch.complete(Some(&snapshot)) {
                Apply::Applied => return Ok(snapshot),
                Apply::Superseded => {
                    debug!("stale cart load dropped");
                    return Ok(self.snapshot().unwrap_or(snapshot));
                }
                Apply::Expired => debug!("cart load outlived its session, reloading"),
            }
        }
    }

    /// Add `quantity` units of a product.
    ///
    /// The product must be in the current catalog view with stock left. On
    /// success the snapshot the service answers with replaces the cache.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, `Validation` for a zero quantity, `NotFound` if the
    /// product is not in the catalog view, `OutOfStock` if the view or the
    /// service says there is no stock, `Auth` or `Network` from the request,
    /// `SessionChanged` if another user logged in before the answer arrived.
    #[instrument(skip(self))]
    pub async fn add_item(&self, product_id: &ProductId, quantity: u32) -> Result<CartSnapshot> {
        let credential = self.session.credential().ok_or(ClientError::Unauthenticated)?;
        if quantity == 0 {
            return Err(ClientError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let product = self.catalog.product(product_id).await.ok_or_else(|| {
            ClientError::NotFound(format!("product {product_id} is not in the catalog"))
        })?;
        if !product.in_stock() {
            return Err(ClientError::OutOfStock(product_id.clone()));
        }

        let dispatch = self.dispatch(credential.generation);
        let err = match self
            .api
            .add_to_cart(&credential.token, product_id, quantity)
            .await
        {
            Ok(snapshot) => return self.apply(dispatch, snapshot),
            Err(e) => e,
        };
        if dispatch.complete(None) == Apply::Expired {
            return Err(self.session_ended());
        }

        match err {
            ApiError::Rejected(message) => {
                warn!(message = %message, "add to cart rejected");
                Err(ClientError::OutOfStock(product_id.clone()))
            }
            e => {
                warn!(error = %e, "failed to add to cart");
                Err(e.into())
            }
        }
    }

    /// Remove the line for a product.
    ///
    /// When a snapshot is cached, a product without a line is reported
    /// without a network call.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, `NotFound` if there is no such line, `Auth` or
    /// `Network` from the request, `SessionChanged` if another user logged
    /// in before the answer arrived.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, product_id: &ProductId) -> Result<CartSnapshot> {
        let credential = self.session.credential().ok_or(ClientError::Unauthenticated)?;
        if self.snapshot().is_some_and(|s| !s.contains(product_id)) {
            return Err(ClientError::NotFound(format!(
                "product {product_id} is not in the cart"
            )));
        }

        let dispatch = self.dispatch(credential.generation);
        match self
            .api
            .remove_from_cart(&credential.token, product_id)
            .await
        {
            Ok(snapshot) => self.apply(dispatch, snapshot),
            Err(e) => {
                if dispatch.complete(None) == Apply::Expired {
                    return Err(self.session_ended());
                }
                warn!(error = %e, "failed to remove from cart");
                Err(e.into())
            }
        }
    }

    /// Units across all cached lines.
    #[must_use]
    pub fn total_item_count(&self) -> u32 {
        self.summary().item_count
    }

    /// Sum of captured unit price times quantity over the cached lines.
    #[must_use]
    pub fn total_price(&self) -> Price {
        self.summary().total_price
    }

    #[must_use]
    pub fn summary(&self) -> CartSummary {
        self.cache.borrow().summary()
    }

    #[must_use]
    pub fn state(&self) -> CartState {
        self.cache.borrow().state.clone()
    }

    /// Last confirmed snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<CartSnapshot> {
        self.cache.borrow().state.snapshot().cloned()
    }

    /// Watch the cache; the receiver is notified on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartCache> {
        self.cache.subscribe()
    }

    /// Mark the cache untrusted until the next load.
    ///
    /// Responses to requests already in flight are dropped.
    pub fn invalidate(&self) {
        self.cache.send_modify(CartCache::discard);
    }

    fn dispatch(&self, generation: u64) -> Dispatch<'_> {
        let mut ticket = None;
        self.cache.send_modify(|cache| ticket = Some(cache.begin(generation)));
        Dispatch {
            cache: &self.cache,
            ticket,
        }
    }

    /// Settle a mutation. A snapshot from an ended session is never handed
    /// to the caller; one overtaken within the same session still is.
    fn apply(&self, dispatch: Dispatch<'_>, snapshot: CartSnapshot) -> Result<CartSnapshot> {
        match dispatch.complete(Some(&snapshot)) {
            Apply::Applied => Ok(snapshot),
            Apply::Superseded => {
                debug!("stale cart response dropped");
                Ok(snapshot)
            }
            Apply::Expired => Err(self.session_ended()),
        }
    }

    fn session_ended(&self) -> ClientError {
        debug!("cart response outlived its session");
        if self.session.current_session().is_some() {
            ClientError::SessionChanged
        } else {
            ClientError::Unauthenticated
        }
    }
}

impl<A: CommerceApi + 'static> SessionListener for CartSync<A> {
    fn on_session_change(&self, event: SessionEvent, generation: u64) {
        debug!(?event, generation, "session changed, cart unloaded");
        self.cache.send_modify(|cache| cache.reset(generation));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::Session;
    use crate::testing::{FakeCommerceApi, product};

    const TOKEN: &str = "tok";

    struct Fixture {
        api: Arc<FakeCommerceApi>,
        session: SessionStore,
        cart: Arc<CartSync<FakeCommerceApi>>,
    }

    async fn fixture() -> Fixture {
        let api = Arc::new(FakeCommerceApi::with_products(vec![
            product("p1", 999, 5),
            product("p2", 2500, 0),
            product("p3", 150, 10),
        ]));
        api.issue_token(TOKEN);

        let session = SessionStore::new();
        session.login(Session::new(TOKEN, "Ada"));

        let catalog = Catalog::new(Arc::clone(&api), Duration::from_secs(60));
        catalog.products().await.unwrap();

        let cart = CartSync::new(Arc::clone(&api), session.clone(), catalog);
        Fixture { api, session, cart }
    }

    fn quantity_of(snapshot: &CartSnapshot, id: &str) -> u32 {
        snapshot
            .line_for(&ProductId::new(id))
            .map_or(0, |line| line.quantity)
    }

    #[tokio::test]
    async fn test_starts_unloaded() {
        let f = fixture().await;
        assert_eq!(f.cart.state(), CartState::Unloaded);
        assert_eq!(f.cart.total_item_count(), 0);
        assert_eq!(f.cart.total_price(), Price::ZERO);
    }

    #[tokio::test]
    async fn test_load_cart_replaces_cache() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 2);

        let snapshot = f.cart.load_cart().await.unwrap();

        assert_eq!(quantity_of(&snapshot, "p1"), 2);
        assert_eq!(f.cart.state(), CartState::Loaded(snapshot));
    }

    #[tokio::test]
    async fn test_add_item_uses_server_snapshot_and_totals() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 2);
        f.cart.load_cart().await.unwrap();

        let snapshot = f.cart.add_item(&ProductId::new("p1"), 1).await.unwrap();

        assert_eq!(snapshot.lines().len(), 1);
        assert_eq!(quantity_of(&snapshot, "p1"), 3);
        assert_eq!(f.cart.total_item_count(), 3);
        assert_eq!(f.cart.total_price(), Price::from_cents(2997).unwrap());
        assert!(matches!(f.cart.state(), CartState::Loaded(_)));
    }

    #[tokio::test]
    async fn test_total_price_tracks_lines_after_mixed_intents() {
        let f = fixture().await;
        f.cart.load_cart().await.unwrap();
        f.cart.add_item(&ProductId::new("p1"), 2).await.unwrap();
        f.cart.add_item(&ProductId::new("p3"), 3).await.unwrap();
        f.cart.remove_item(&ProductId::new("p1")).await.unwrap();
        f.cart.add_item(&ProductId::new("p1"), 1).await.unwrap();

        let snapshot = f.cart.snapshot().unwrap();
        let expected: Price = snapshot
            .lines()
            .iter()
            .map(|line| line.product.price * line.quantity)
            .sum();
        assert_eq!(f.cart.total_price(), expected);
        assert_eq!(f.cart.total_price(), Price::from_cents(999 + 450).unwrap());
        assert_eq!(f.cart.total_item_count(), 4);
    }

    #[tokio::test]
    async fn test_add_item_out_of_stock_leaves_cache_untouched() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 1);
        f.cart.load_cart().await.unwrap();
        let before = f.cart.state();

        let err = f.cart.add_item(&ProductId::new("p2"), 1).await.unwrap_err();

        assert!(matches!(err, ClientError::OutOfStock(id) if id.as_str() == "p2"));
        assert_eq!(f.cart.state(), before);
        assert_eq!(f.api.calls("add_to_cart"), 0);
    }

    #[tokio::test]
    async fn test_add_item_rejected_by_server_is_out_of_stock() {
        let f = fixture().await;
        f.cart.load_cart().await.unwrap();
        let before = f.cart.state();
        // Catalog view still says 5 left
        f.api.set_stock(&ProductId::new("p1"), 0);

        let err = f.cart.add_item(&ProductId::new("p1"), 1).await.unwrap_err();

        assert!(matches!(err, ClientError::OutOfStock(_)));
        assert_eq!(f.cart.state(), before);
        assert_eq!(f.api.calls("add_to_cart"), 1);
    }

    #[tokio::test]
    async fn test_add_item_preconditions_make_no_call() {
        let f = fixture().await;

        let err = f.cart.add_item(&ProductId::new("p1"), 0).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));

        let err = f.cart.add_item(&ProductId::new("p9"), 1).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));

        f.session.logout();
        let err = f.cart.add_item(&ProductId::new("p1"), 1).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated));

        assert_eq!(f.api.calls("add_to_cart"), 0);
        assert_eq!(f.cart.state(), CartState::Unloaded);
    }

    #[tokio::test]
    async fn test_add_item_network_failure_keeps_previous_snapshot() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 1);
        let loaded = f.cart.load_cart().await.unwrap();

        f.api.fail_next(ApiError::Status {
            status: 502,
            message: "bad gateway".to_string(),
        });
        let err = f.cart.add_item(&ProductId::new("p1"), 1).await.unwrap_err();

        assert!(err.is_network());
        assert_eq!(f.cart.state(), CartState::Loaded(loaded));
    }

    #[tokio::test]
    async fn test_rejected_credential_is_auth_error() {
        let f = fixture().await;
        f.api.revoke(TOKEN);

        let err = f.cart.load_cart().await.unwrap_err();

        assert!(matches!(err, ClientError::Auth(_)));
        assert!(err.requires_login());
        assert_eq!(f.cart.state(), CartState::Unloaded);
    }

    #[tokio::test]
    async fn test_remove_item() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 2);
        f.api.seed_cart(TOKEN, "p3", 1);
        f.cart.load_cart().await.unwrap();

        let snapshot = f.cart.remove_item(&ProductId::new("p1")).await.unwrap();

        assert!(!snapshot.contains(&ProductId::new("p1")));
        assert_eq!(f.cart.total_item_count(), 1);
        assert_eq!(f.cart.total_price(), Price::from_cents(150).unwrap());
    }

    #[tokio::test]
    async fn test_remove_missing_line_is_not_found_and_cache_unchanged() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 2);
        f.cart.load_cart().await.unwrap();
        let before = f.cart.state();

        let err = f.cart.remove_item(&ProductId::new("p3")).await.unwrap_err();

        assert!(matches!(err, ClientError::NotFound(_)));
        assert_eq!(f.cart.state(), before);
        assert_eq!(f.api.calls("remove_from_cart"), 0);
    }

    #[tokio::test]
    async fn test_remove_on_unloaded_cart_asks_the_server() {
        let f = fixture().await;

        let err = f.cart.remove_item(&ProductId::new("p1")).await.unwrap_err();

        assert!(matches!(err, ClientError::NotFound(_)));
        assert_eq!(f.api.calls("remove_from_cart"), 1);
        assert_eq!(f.cart.state(), CartState::Unloaded);
    }

    #[tokio::test]
    async fn test_stale_load_does_not_overwrite_later_mutation() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 1);
        f.cart.load_cart().await.unwrap();

        // The load reads the cart (1 unit) and is held back
        let gate = f.api.hold("fetch_cart");
        let load = tokio::spawn({
            let cart = Arc::clone(&f.cart);
            async move { cart.load_cart().await }
        });
        gate.entered().await;

        // Dispatched later, completes first
        let added = f.cart.add_item(&ProductId::new("p1"), 1).await.unwrap();
        assert_eq!(quantity_of(&added, "p1"), 2);
        assert!(f.cart.state().is_loading());

        gate.release();
        let loaded = load.await.unwrap().unwrap();

        assert_eq!(quantity_of(&loaded, "p1"), 2);
        assert_eq!(f.cart.state(), CartState::Loaded(added));
        assert_eq!(f.cart.total_item_count(), 2);
    }

    #[tokio::test]
    async fn test_loading_keeps_previous_snapshot_visible() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p3", 4);
        let loaded = f.cart.load_cart().await.unwrap();

        let gate = f.api.hold("fetch_cart");
        let load = tokio::spawn({
            let cart = Arc::clone(&f.cart);
            async move { cart.load_cart().await }
        });
        gate.entered().await;

        assert_eq!(
            f.cart.state(),
            CartState::Loading {
                previous: Some(loaded.clone())
            }
        );
        assert_eq!(f.cart.total_item_count(), 4);

        gate.release();
        load.await.unwrap().unwrap();
        assert_eq!(f.cart.state(), CartState::Loaded(loaded));
    }

    #[tokio::test]
    async fn test_failed_load_returns_to_prior_state() {
        let f = fixture().await;

        f.api.fail_next(ApiError::Status {
            status: 500,
            message: "boom".to_string(),
        });
        assert!(f.cart.load_cart().await.unwrap_err().is_network());
        assert_eq!(f.cart.state(), CartState::Unloaded);

        f.api.seed_cart(TOKEN, "p1", 1);
        let loaded = f.cart.load_cart().await.unwrap();

        f.api.fail_next(ApiError::Status {
            status: 500,
            message: "boom".to_string(),
        });
        assert!(f.cart.load_cart().await.is_err());
        assert_eq!(f.cart.state(), CartState::Loaded(loaded));
    }

    #[tokio::test]
    async fn test_abandoned_request_does_not_leave_cart_loading() {
        let f = fixture().await;

        let gate = f.api.hold("fetch_cart");
        let load = tokio::spawn({
            let cart = Arc::clone(&f.cart);
            async move { cart.load_cart().await }
        });
        gate.entered().await;
        assert!(f.cart.state().is_loading());

        load.abort();
        assert!(load.await.unwrap_err().is_cancelled());

        assert_eq!(f.cart.state(), CartState::Unloaded);
    }

    #[tokio::test]
    async fn test_logout_unloads_cart() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 2);
        f.cart.load_cart().await.unwrap();

        f.session.logout();

        assert!(f.session.current_session().is_none());
        assert_eq!(f.cart.state(), CartState::Unloaded);
        assert_eq!(f.cart.total_item_count(), 0);

        // Again, from an already unloaded cart
        f.session.logout();
        assert_eq!(f.cart.state(), CartState::Unloaded);
    }

    #[tokio::test]
    async fn test_response_from_ended_session_is_dropped() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 2);

        let gate = f.api.hold("fetch_cart");
        let load = tokio::spawn({
            let cart = Arc::clone(&f.cart);
            async move { cart.load_cart().await }
        });
        gate.entered().await;

        f.session.logout();
        gate.release();
        let err = load.await.unwrap().unwrap_err();

        assert!(matches!(err, ClientError::Unauthenticated));
        assert_eq!(f.cart.state(), CartState::Unloaded);
    }

    #[tokio::test]
    async fn test_load_across_account_switch_returns_new_users_cart() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 2);
        f.api.issue_token("other");
        f.api.seed_cart("other", "p3", 1);

        let gate = f.api.hold("fetch_cart");
        let load = tokio::spawn({
            let cart = Arc::clone(&f.cart);
            async move { cart.load_cart().await }
        });
        gate.entered().await;

        f.session.logout();
        f.session.login(Session::new("other", "Grace"));
        gate.release();
        let loaded = load.await.unwrap().unwrap();

        assert_eq!(quantity_of(&loaded, "p1"), 0);
        assert_eq!(quantity_of(&loaded, "p3"), 1);
        assert_eq!(f.cart.state(), CartState::Loaded(loaded));
        assert_eq!(f.api.calls("fetch_cart"), 2);
    }

    #[tokio::test]
    async fn test_add_across_account_switch_is_not_returned() {
        let f = fixture().await;
        f.api.issue_token("other");

        let gate = f.api.hold("add_to_cart");
        let add = tokio::spawn({
            let cart = Arc::clone(&f.cart);
            async move { cart.add_item(&ProductId::new("p1"), 2).await }
        });
        gate.entered().await;

        f.session.login(Session::new("other", "Grace"));
        gate.release();
        let err = add.await.unwrap().unwrap_err();

        assert!(matches!(err, ClientError::SessionChanged));
        assert!(!err.requires_login());
        assert_eq!(f.cart.state(), CartState::Unloaded);
        // The add still happened, for the user who issued it
        assert_eq!(quantity_of(&f.api.cart(TOKEN), "p1"), 2);
    }

    #[tokio::test]
    async fn test_remove_after_logout_is_not_returned() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 2);
        f.api.seed_cart(TOKEN, "p3", 1);
        f.cart.load_cart().await.unwrap();

        let gate = f.api.hold("remove_from_cart");
        let remove = tokio::spawn({
            let cart = Arc::clone(&f.cart);
            async move { cart.remove_item(&ProductId::new("p1")).await }
        });
        gate.entered().await;

        f.session.logout();
        gate.release();
        let err = remove.await.unwrap().unwrap_err();

        assert!(matches!(err, ClientError::Unauthenticated));
        assert_eq!(f.cart.state(), CartState::Unloaded);
        assert_eq!(f.cart.total_item_count(), 0);
    }

    #[tokio::test]
    async fn test_login_as_another_user_unloads_cart() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 2);
        f.cart.load_cart().await.unwrap();

        f.api.issue_token("other");
        f.session.login(Session::new("other", "Grace"));
        assert_eq!(f.cart.state(), CartState::Unloaded);

        let snapshot = f.cart.load_cart().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_drops_in_flight_response() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p1", 1);

        let gate = f.api.hold("fetch_cart");
        let load = tokio::spawn({
            let cart = Arc::clone(&f.cart);
            async move { cart.load_cart().await }
        });
        gate.entered().await;

        f.cart.invalidate();
        assert_eq!(f.cart.state(), CartState::Loading { previous: None });

        gate.release();
        load.await.unwrap().unwrap();
        assert_eq!(f.cart.state(), CartState::Unloaded);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let f = fixture().await;
        f.api.seed_cart(TOKEN, "p3", 2);
        let mut rx = f.cart.subscribe();

        f.cart.load_cart().await.unwrap();

        assert!(rx.has_changed().unwrap());
        let summary = rx.borrow_and_update().summary();
        assert_eq!(summary.item_count, 2);
        assert_eq!(summary.total_price, Price::from_cents(300).unwrap());

        f.session.logout();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().state(), &CartState::Unloaded);
    }

    #[test]
    fn test_cache_drops_older_sequence() {
        let mut cache = CartCache::default();
        let first = cache.begin(0);
        let second = cache.begin(0);

        let newer = CartSnapshot::empty();
        assert_eq!(cache.finish(second, Some(&newer)), Apply::Applied);
        assert!(cache.state().is_loading());

        let older = CartSnapshot::new(Vec::new());
        assert_eq!(cache.finish(first, Some(&older)), Apply::Superseded);
        assert_eq!(cache.state(), &CartState::Loaded(newer));
    }

    #[test]
    fn test_cache_ignores_expired_ticket() {
        let mut cache = CartCache::default();
        let ticket = cache.begin(0);
        cache.reset(1);

        assert_eq!(
            cache.finish(ticket, Some(&CartSnapshot::empty())),
            Apply::Expired
        );
        assert_eq!(cache.state(), &CartState::Unloaded);
    }
}
