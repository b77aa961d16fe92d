//! Order model.
//!
//! Orders are created only by the commerce service in response to a checkout
//! submission and are immutable from the client's point of view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OrderId, OrderLineId, OrderStatus, PaymentStatus, Price, Product, UserId};

/// A purchased line: product snapshot, quantity and the unit price charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OrderLineId>,
    #[serde(rename = "productId")]
    pub product: Product,
    pub quantity: u32,
    /// Unit price at the time of purchase.
    pub price: Price,
}

impl OrderLine {
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price * self.quantity
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: OrderId,
    pub user_id: UserId,
    #[serde(rename = "products")]
    pub lines: Vec<OrderLine>,
    /// Total as computed by the commerce service.
    pub total_price: Price,
    pub shipping_address: String,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub order_status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0_u32, |count, line| count.saturating_add(line.quantity))
    }
}
