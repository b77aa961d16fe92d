//! Catalog product model.

use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId};

/// A product as listed by the commerce service.
///
/// Immutable from the client's point of view; a fresh copy is obtained by
/// re-fetching the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Image URL.
    #[serde(default)]
    pub image: String,
    /// Units available for sale.
    #[serde(default)]
    pub stock: u32,
}

impl Product {
    /// Whether at least one unit is available.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}
