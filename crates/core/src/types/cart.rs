//! Cart snapshot model and the totals derived from it.
//!
//! A [`CartSnapshot`] is always the complete cart as last confirmed by the
//! commerce service. Totals are computed from the product copy embedded in
//! each line, never from a freshly fetched catalog, so a displayed total is
//! always consistent with the displayed lines.

use serde::{Deserialize, Serialize};

use crate::types::{CartLineId, Price, Product, ProductId};

/// One line of a cart: a product snapshot and how many units of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(rename = "_id")]
    pub id: CartLineId,
    /// Product as it was when the cart was fetched.
    #[serde(rename = "productId")]
    pub product: Product,
    pub quantity: u32,
}

impl CartLine {
    /// Captured unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price * self.quantity
    }
}

/// The two shapes `GET /cart` is known to answer with.
#[derive(Deserialize)]
#[serde(untagged)]
enum CartPayload {
    Lines(Vec<CartLine>),
    Wrapped { items: Vec<CartLine> },
}

impl From<CartPayload> for CartSnapshot {
    fn from(payload: CartPayload) -> Self {
        match payload {
            CartPayload::Lines(lines) | CartPayload::Wrapped { items: lines } => Self::new(lines),
        }
    }
}

/// A complete, server-confirmed cart.
///
/// Lines keep the order the server returned them in. Lines with a quantity
/// of zero are dropped on construction, so every line holds at least one
/// unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "CartPayload")]
pub struct CartSnapshot {
    #[serde(rename = "items")]
    lines: Vec<CartLine>,
}

impl CartSnapshot {
    /// Build a snapshot from server lines.
    #[must_use]
    pub fn new(mut lines: Vec<CartLine>) -> Self {
        lines.retain(|line| line.quantity > 0);
        Self { lines }
    }

    /// A cart with no lines.
    #[must_use]
    pub const fn empty() -> Self {
        Self { lines: Vec::new() }
    }

    /// Lines in server order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The line holding `product_id`, if any.
    #[must_use]
    pub fn line_for(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.product.id == product_id)
    }

    /// Whether the cart already holds `product_id`.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.line_for(product_id).is_some()
    }

    /// Sum of line quantities (the cart badge number).
    #[must_use]
    pub fn total_item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0_u32, |count, line| count.saturating_add(line.quantity))
    }

    /// Sum over lines of captured unit price times quantity.
    #[must_use]
    pub fn total_price(&self) -> Price {
        self.lines.iter().map(CartLine::line_total).sum()
    }
}
