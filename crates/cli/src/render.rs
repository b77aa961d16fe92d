//! Text rendering of storefront state.

use std::fmt::Write;

use shopfront_client::{CartState, CartSummary};
use shopfront_core::{CartSnapshot, Order, Product};

/// Prompt line carrying the user name and cart badge.
pub fn prompt(display_name: &str, summary: CartSummary) -> String {
    format!(
        "[{display_name} | cart: {} | {}] > ",
        summary.item_count, summary.total_price
    )
}

/// Catalog listing with the label the add button would show.
pub fn products(listing: &[Product], cart: Option<&CartSnapshot>) -> String {
    if listing.is_empty() {
        return "No products available.\n".to_string();
    }

    let mut out = String::new();
    for product in listing {
        let action = if !product.in_stock() {
            "Out of stock"
        } else if cart.is_some_and(|c| c.contains(&product.id)) {
            "Add More"
        } else {
            "Add to Cart"
        };
        let _ = writeln!(
            out,
            "{:<12} {:<30} {:>10}  stock {:<4} [{action}]",
            product.id,
            product.name,
            product.price.to_string(),
            product.stock
        );
    }
    out
}

pub fn cart(state: &CartState) -> String {
    let snapshot = match state {
        CartState::Unloaded => return "Cart not loaded. Run `cart` to load it.\n".to_string(),
        CartState::Loading { previous: None } => return "Loading cart...\n".to_string(),
        CartState::Loading {
            previous: Some(snapshot),
        }
        | CartState::Loaded(snapshot) => snapshot,
    };

    if snapshot.is_empty() {
        return "Your cart is empty.\n".to_string();
    }

    let mut out = String::new();
    for line in snapshot.lines() {
        let _ = writeln!(
            out,
            "{:<12} {:<30} {} x {} = {}",
            line.product.id,
            line.product.name,
            line.product.price,
            line.quantity,
            line.line_total()
        );
    }
    let _ = writeln!(
        out,
        "Total: {} ({} items)",
        snapshot.total_price(),
        snapshot.total_item_count()
    );
    out
}

pub fn order(order: &Order) -> String {
    let mut out = format!(
        "Order {}  {}  payment {}  status {}\n",
        order.id, order.total_price, order.payment_status, order.order_status
    );
    for line in &order.lines {
        let _ = writeln!(
            out,
            "  {} x {} @ {}",
            line.quantity, line.product.name, line.price
        );
    }
    let _ = writeln!(out, "  ship to: {}", order.shipping_address);
    out
}

pub fn orders(orders: &[Order]) -> String {
    if orders.is_empty() {
        return "No orders yet.\n".to_string();
    }
    orders.iter().map(order).collect()
}
