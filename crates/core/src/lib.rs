//! Shopfront Core - Shared types library.
//!
//! This crate provides the types shared by all Shopfront components:
//! - `client` - Cart synchronization, checkout and session handling
//! - `cli` - Interactive terminal storefront
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no async. Everything here is safe to call from a render loop.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, emails, addresses and
//!   statuses, plus the catalog, cart and order models

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
