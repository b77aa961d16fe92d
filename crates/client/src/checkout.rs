//! Checkout orchestrator.
//!
//! Turns the cached cart plus a shipping address into one order-creation
//! request. The cart cache is left alone: the service empties the cart when
//! it creates the order, and the caller reloads (or invalidates) the cart
//! before trusting it again.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use shopfront_core::{Order, ShippingAddress};

use crate::api::CommerceApi;
use crate::cart::CartSync;
use crate::error::{ClientError, Result};
use crate::session::SessionStore;

pub struct CheckoutOrchestrator<A> {
    api: Arc<A>,
    session: SessionStore,
    cart: Arc<CartSync<A>>,
}

impl<A: CommerceApi + 'static> CheckoutOrchestrator<A> {
    #[must_use]
    pub const fn new(api: Arc<A>, session: SessionStore, cart: Arc<CartSync<A>>) -> Self {
        Self { api, session, cart }
    }

    /// Place an order for the current cart.
    ///
    /// Either an [`Order`] is returned or nothing happened.
    ///
    /// # Errors
    ///
    /// Checked in order, the first three without a network call:
    /// `Validation` for a blank address, `Unauthenticated` without a
    /// session, `EmptyCart` if the cached cart is empty or was never loaded;
    /// then `Auth` or `Network` from the request.
    #[instrument(skip(self, shipping_address))]
    pub async fn submit_order(&self, shipping_address: &str) -> Result<Order> {
        let address = ShippingAddress::parse(shipping_address)?;
        let credential = self.session.credential().ok_or(ClientError::Unauthenticated)?;
        if self.cart.snapshot().is_none_or(|cart| cart.is_empty()) {
            return Err(ClientError::EmptyCart);
        }

        let order = self
            .api
            .create_order(&credential.token, &address)
            .await
            .inspect_err(|e| warn!(error = %e, "failed to place order"))?;

        info!(
            order_id = %order.id,
            total = %order.total_price,
            items = order.item_count(),
            "order placed"
        );
        Ok(order)
    }

    /// Orders placed by the current user.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a session; `Auth` or `Network` from the
    /// request.
    #[instrument(skip(self))]
    pub async fn order_history(&self) -> Result<Vec<Order>> {
        let credential = self.session.credential().ok_or(ClientError::Unauthenticated)?;
        Ok(self.api.list_orders(&credential.token).await?)
    }
}
