//! Aggregates module
pub mod cart;
pub mod variant;

pub use cart::{Cart, CartItem, CartItemDetail};
pub use variant::{RolePriceOverride, Variant};
