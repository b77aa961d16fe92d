//! Shipping address captured at checkout.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`ShippingAddress`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The address is empty after trimming whitespace.
    #[error("shipping address is required")]
    Empty,
}

/// A free-form, single-field shipping address.
///
/// The commerce service stores the address as an opaque string, so the only
/// client-side rule is that something other than whitespace was entered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShippingAddress(String);

impl ShippingAddress {
    /// Parse a shipping address from user input, trimming surrounding
    /// whitespace.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::Empty` for empty or whitespace-only input.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShippingAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
