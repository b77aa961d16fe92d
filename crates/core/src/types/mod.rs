//! Core types for Shopfront.
//!
//! This module provides type-safe wrappers for common domain concepts and the
//! models exchanged with the commerce service.

pub mod address;
pub mod cart;
pub mod catalog;
pub mod email;
pub mod id;
pub mod order;
pub mod price;
pub mod status;

pub use address::{AddressError, ShippingAddress};
pub use cart::{CartLine, CartSnapshot};
pub use catalog::Product;
pub use email::{Email, EmailError};
pub use id::*;
pub use order::{Order, OrderLine};
pub use price::{Price, PriceError};
pub use status::*;
