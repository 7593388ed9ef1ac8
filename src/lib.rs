//! Vitrine Cart & Pricing Engine
//!
//! Cart and price-resolution core for the Vitrine storefront.
//!
//! ## Features
//! - Role-aware unit price resolution with public-price fallback
//! - Stock-gated cart mutations (add/update/remove/clear)
//! - One persistent cart per customer, lazily created
//! - Anonymous device-local carts, reconciled into the persistent cart at login
//! - Append-only audit trail of every cart mutation

use thiserror::Error;

pub mod context;
pub mod domain;
pub mod local;
pub mod pricing;
pub mod service;
pub mod store;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("Variant not found")]
    VariantNotFound,

    #[error("Cart not found")]
    CartNotFound,

    #[error("Cart item not found")]
    ItemNotFound,

    #[error("Requested quantity exceeds stock, {available} more available")]
    StockExceeded { available: u32 },

    #[error("Quantity must be a positive integer")]
    InvalidQuantity,

    #[error("Concurrent cart update conflicted")]
    Conflict,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CartError {
    /// Failures worth one fresh attempt: a failed transaction committed
    /// nothing, so retrying the whole operation is safe.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict | Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, CartError>;
