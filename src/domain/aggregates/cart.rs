//! Cart aggregate
//!
//! Persistent cart records plus the pure stock-fold rules every store
//! backend shares. A customer has at most one cart, a cart has at most one
//! row per variant, and a row's quantity never exceeds the variant's stock
//! as read inside the writing transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CartError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cart {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    /// Unit price frozen at the time the item was added; never re-resolved.
    pub unit_price_cents: i64,
    pub added_at: DateTime<Utc>,
}

/// Cart item joined with variant display data for rendering.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItemDetail {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub added_at: DateTime<Utc>,
    pub title: String,
    pub sku: String,
}

/// Anything that contributes a (quantity, frozen unit price) line to totals.
pub trait CartLine {
    fn line_quantity(&self) -> u32;
    fn line_unit_price_cents(&self) -> i64;
}

impl CartLine for CartItem {
    fn line_quantity(&self) -> u32 { self.quantity.max(0) as u32 }
    fn line_unit_price_cents(&self) -> i64 { self.unit_price_cents }
}

impl CartLine for CartItemDetail {
    fn line_quantity(&self) -> u32 { self.quantity.max(0) as u32 }
    fn line_unit_price_cents(&self) -> i64 { self.unit_price_cents }
}

/// Fold a requested quantity into whatever the cart already holds for the
/// variant and gate the result on stock. Returns the new row quantity, or
/// `StockExceeded` carrying how many more units are actually satisfiable.
pub fn fold_quantity(existing: Option<u32>, requested: u32, stock: u32) -> Result<u32> {
    let held = existing.unwrap_or(0);
    let new_quantity = held.saturating_add(requested);
    if new_quantity > stock {
        return Err(CartError::StockExceeded { available: stock.saturating_sub(held) });
    }
    Ok(new_quantity)
}

/// Gate an absolute quantity (quantity update path) on current stock.
pub fn check_quantity(requested: u32, stock: u32) -> Result<()> {
    if requested > stock {
        return Err(CartError::StockExceeded { available: stock });
    }
    Ok(())
}

pub fn total_items<T: CartLine>(items: &[T]) -> u32 {
    items.iter().map(CartLine::line_quantity).sum()
}

pub fn total_price_cents<T: CartLine>(items: &[T]) -> i64 {
    items.iter().map(|i| i.line_unit_price_cents() * i64::from(i.line_quantity())).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_into_empty_cart() {
        assert_eq!(fold_quantity(None, 5, 5).unwrap(), 5);
    }

    #[test]
    fn test_fold_merges_existing_row() {
        assert_eq!(fold_quantity(Some(2), 2, 5).unwrap(), 4);
    }

    #[test]
    fn test_fold_reports_remaining_stock() {
        let err = fold_quantity(Some(3), 4, 5).unwrap_err();
        assert_eq!(err, CartError::StockExceeded { available: 2 });
    }

    #[test]
    fn test_fold_boundary() {
        // Exactly the remaining stock succeeds, one more fails.
        assert_eq!(fold_quantity(Some(3), 2, 5).unwrap(), 5);
        let err = fold_quantity(Some(5), 1, 5).unwrap_err();
        assert_eq!(err, CartError::StockExceeded { available: 0 });
    }

    #[test]
    fn test_check_quantity_against_current_stock() {
        assert!(check_quantity(3, 3).is_ok());
        assert_eq!(check_quantity(4, 3).unwrap_err(), CartError::StockExceeded { available: 3 });
    }

    #[test]
    fn test_totals() {
        let cart_id = Uuid::new_v4();
        let items: Vec<CartItem> = [(2, 1000), (3, 250)]
            .iter()
            .map(|&(quantity, unit_price_cents)| CartItem {
                id: Uuid::new_v4(),
                cart_id,
                variant_id: Uuid::new_v4(),
                quantity,
                unit_price_cents,
                added_at: Utc::now(),
            })
            .collect();
        assert_eq!(total_items(&items), 5);
        assert_eq!(total_price_cents(&items), 2 * 1000 + 3 * 250);
    }
}
