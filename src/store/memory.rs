//! In-memory backend
//!
//! Mutex-guarded maps with the same transactional contract as the Postgres
//! backend: each mutating call holds the cart state lock for its whole
//! read-fold-write sequence. Backs the test suite and in-process tooling.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::aggregates::cart::{check_quantity, fold_quantity};
use crate::domain::aggregates::{Cart, CartItem, CartItemDetail, Variant};
use crate::domain::events::CartEvent;
use crate::pricing::RoleOverrides;
use crate::store::{CartLogSink, CartStore, VariantStore};
use crate::{CartError, Result};

#[derive(Clone, Debug)]
struct VariantEntry {
    variant: Variant,
    overrides: RoleOverrides,
}

#[derive(Clone, Default)]
pub struct MemoryVariantStore {
    inner: Arc<Mutex<HashMap<Uuid, VariantEntry>>>,
}

impl MemoryVariantStore {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&self, variant: Variant) {
        self.insert_with_overrides(variant, RoleOverrides::new());
    }

    pub fn insert_with_overrides(&self, variant: Variant, overrides: RoleOverrides) {
        self.lock().insert(variant.id, VariantEntry { variant, overrides });
    }

    pub fn set_stock(&self, variant_id: Uuid, stock: u32) {
        if let Some(entry) = self.lock().get_mut(&variant_id) {
            entry.variant.stock = stock as i32;
            entry.variant.updated_at = Utc::now();
        }
    }

    fn stock_of(&self, variant_id: Uuid) -> Option<u32> {
        self.lock().get(&variant_id).map(|e| e.variant.available())
    }

    fn display_of(&self, variant_id: Uuid) -> Option<(String, String)> {
        self.lock().get(&variant_id).map(|e| (e.variant.title.clone(), e.variant.sku.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, VariantEntry>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl VariantStore for MemoryVariantStore {
    async fn get_variant(&self, variant_id: Uuid) -> Result<Option<Variant>> {
        Ok(self.lock().get(&variant_id).map(|e| e.variant.clone()))
    }

    async fn role_overrides(&self, variant_id: Uuid) -> Result<RoleOverrides> {
        Ok(self.lock().get(&variant_id).map(|e| e.overrides.clone()).unwrap_or_default())
    }
}

#[derive(Default)]
struct CartState {
    carts: HashMap<Uuid, Cart>,
    items: HashMap<Uuid, CartItem>,
}

#[derive(Clone)]
pub struct MemoryCartStore {
    variants: MemoryVariantStore,
    state: Arc<Mutex<CartState>>,
}

impl MemoryCartStore {
    /// Shares the variant store so stock reads observe test adjustments.
    pub fn new(variants: MemoryVariantStore) -> Self {
        Self { variants, state: Arc::new(Mutex::new(CartState::default())) }
    }

    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CartStore for MemoryCartStore {
    async fn find_cart_by_customer(&self, customer_id: Uuid) -> Result<Option<Cart>> {
        Ok(self.lock().carts.values().find(|c| c.customer_id == customer_id).cloned())
    }

    async fn insert_cart(&self, customer_id: Uuid, currency: &str) -> Result<Cart> {
        let mut state = self.lock();
        if state.carts.values().any(|c| c.customer_id == customer_id) {
            return Err(CartError::Conflict);
        }
        let now = Utc::now();
        let cart = Cart {
            id: Uuid::now_v7(),
            customer_id,
            currency: currency.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn add_item(
        &self,
        cart_id: Uuid,
        variant_id: Uuid,
        quantity: u32,
        unit_price_cents: i64,
    ) -> Result<CartItem> {
        let mut state = self.lock();
        if !state.carts.contains_key(&cart_id) {
            return Err(CartError::CartNotFound);
        }
        let stock = self.variants.stock_of(variant_id).ok_or(CartError::VariantNotFound)?;
        let existing_id = state
            .items
            .values()
            .find(|i| i.cart_id == cart_id && i.variant_id == variant_id)
            .map(|i| i.id);
        let existing_quantity = existing_id
            .and_then(|id| state.items.get(&id))
            .map(|i| i.quantity.max(0) as u32);
        let new_quantity = fold_quantity(existing_quantity, quantity, stock)?;

        let item = match existing_id {
            Some(id) => {
                let item = state.items.get_mut(&id).ok_or(CartError::ItemNotFound)?;
                item.quantity = new_quantity as i32;
                item.clone()
            }
            None => {
                let item = CartItem {
                    id: Uuid::now_v7(),
                    cart_id,
                    variant_id,
                    quantity: new_quantity as i32,
                    unit_price_cents,
                    added_at: Utc::now(),
                };
                state.items.insert(item.id, item.clone());
                item
            }
        };
        if let Some(cart) = state.carts.get_mut(&cart_id) {
            cart.updated_at = Utc::now();
        }
        Ok(item)
    }

    async fn update_item_quantity(&self, item_id: Uuid, quantity: u32) -> Result<CartItem> {
        let mut state = self.lock();
        let variant_id = state.items.get(&item_id).ok_or(CartError::ItemNotFound)?.variant_id;
        let stock = self.variants.stock_of(variant_id).ok_or(CartError::VariantNotFound)?;
        check_quantity(quantity, stock)?;
        let item = state.items.get_mut(&item_id).ok_or(CartError::ItemNotFound)?;
        item.quantity = quantity as i32;
        let item = item.clone();
        if let Some(cart) = state.carts.get_mut(&item.cart_id) {
            cart.updated_at = Utc::now();
        }
        Ok(item)
    }

    async fn remove_item(&self, item_id: Uuid) -> Result<CartItem> {
        let mut state = self.lock();
        let item = state.items.remove(&item_id).ok_or(CartError::ItemNotFound)?;
        if let Some(cart) = state.carts.get_mut(&item.cart_id) {
            cart.updated_at = Utc::now();
        }
        Ok(item)
    }

    async fn clear_items(&self, cart_id: Uuid) -> Result<u64> {
        let mut state = self.lock();
        if !state.carts.contains_key(&cart_id) {
            return Err(CartError::CartNotFound);
        }
        let before = state.items.len();
        state.items.retain(|_, i| i.cart_id != cart_id);
        let removed = (before - state.items.len()) as u64;
        if let Some(cart) = state.carts.get_mut(&cart_id) {
            cart.updated_at = Utc::now();
        }
        Ok(removed)
    }

    async fn list_items(&self, cart_id: Uuid) -> Result<Vec<CartItemDetail>> {
        let state = self.lock();
        let mut items: Vec<CartItem> =
            state.items.values().filter(|i| i.cart_id == cart_id).cloned().collect();
        items.sort_by_key(|i| i.added_at);
        Ok(items
            .into_iter()
            .map(|i| {
                let (title, sku) = self.variants.display_of(i.variant_id).unwrap_or_default();
                CartItemDetail {
                    id: i.id,
                    cart_id: i.cart_id,
                    variant_id: i.variant_id,
                    quantity: i.quantity,
                    unit_price_cents: i.unit_price_cents,
                    added_at: i.added_at,
                    title,
                    sku,
                }
            })
            .collect())
    }

    async fn quantity_of(&self, cart_id: Uuid, variant_id: Uuid) -> Result<u32> {
        Ok(self
            .lock()
            .items
            .values()
            .find(|i| i.cart_id == cart_id && i.variant_id == variant_id)
            .map(|i| i.quantity.max(0) as u32)
            .unwrap_or(0))
    }
}

/// Collects events in memory; tests assert on the recorded trail.
#[derive(Clone, Default)]
pub struct MemoryCartLog {
    entries: Arc<Mutex<Vec<CartEvent>>>,
}

impl MemoryCartLog {
    pub fn new() -> Self { Self::default() }

    pub fn entries(&self) -> Vec<CartEvent> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl CartLogSink for MemoryCartLog {
    async fn append(&self, event: &CartEvent) -> Result<()> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (MemoryVariantStore, MemoryCartStore, Variant) {
        let variants = MemoryVariantStore::new();
        let variant = Variant::new("VLV-100", "Ball valve", 1000, 5);
        variants.insert(variant.clone());
        let carts = MemoryCartStore::new(variants.clone());
        (variants, carts, variant)
    }

    #[tokio::test]
    async fn test_insert_cart_is_unique_per_customer() {
        let (_, carts, _) = fixture();
        let customer = Uuid::new_v4();
        carts.insert_cart(customer, "NGN").await.unwrap();
        assert_eq!(carts.insert_cart(customer, "NGN").await.unwrap_err(), CartError::Conflict);
    }

    #[tokio::test]
    async fn test_add_folds_into_single_row() {
        let (_, carts, variant) = fixture();
        let cart = carts.insert_cart(Uuid::new_v4(), "NGN").await.unwrap();
        carts.add_item(cart.id, variant.id, 2, 1000).await.unwrap();
        let folded = carts.add_item(cart.id, variant.id, 2, 1000).await.unwrap();
        assert_eq!(folded.quantity, 4);
        assert_eq!(carts.list_items(cart.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_whole_stock_then_one_more() {
        let (_, carts, variant) = fixture();
        let cart = carts.insert_cart(Uuid::new_v4(), "NGN").await.unwrap();
        let item = carts.add_item(cart.id, variant.id, 5, 1000).await.unwrap();
        assert_eq!(item.quantity, 5);
        let err = carts.add_item(cart.id, variant.id, 1, 1000).await.unwrap_err();
        assert_eq!(err, CartError::StockExceeded { available: 0 });
    }

    #[tokio::test]
    async fn test_update_revalidates_against_changed_stock() {
        let (variants, carts, variant) = fixture();
        let cart = carts.insert_cart(Uuid::new_v4(), "NGN").await.unwrap();
        let item = carts.add_item(cart.id, variant.id, 4, 1000).await.unwrap();
        variants.set_stock(variant.id, 2);
        let err = carts.update_item_quantity(item.id, 3).await.unwrap_err();
        assert_eq!(err, CartError::StockExceeded { available: 2 });
        let updated = carts.update_item_quantity(item.id, 2).await.unwrap();
        assert_eq!(updated.quantity, 2);
    }

    #[tokio::test]
    async fn test_remove_and_quantity_of() {
        let (_, carts, variant) = fixture();
        let cart = carts.insert_cart(Uuid::new_v4(), "NGN").await.unwrap();
        let item = carts.add_item(cart.id, variant.id, 3, 1000).await.unwrap();
        assert_eq!(carts.quantity_of(cart.id, variant.id).await.unwrap(), 3);
        let removed = carts.remove_item(item.id).await.unwrap();
        assert_eq!(removed.quantity, 3);
        assert_eq!(carts.quantity_of(cart.id, variant.id).await.unwrap(), 0);
        assert_eq!(carts.remove_item(item.id).await.unwrap_err(), CartError::ItemNotFound);
    }

    #[tokio::test]
    async fn test_clear_keeps_cart_row() {
        let (variants, carts, variant) = fixture();
        let other = Variant::new("VLV-200", "Gate valve", 2000, 5);
        variants.insert(other.clone());
        let cart = carts.insert_cart(Uuid::new_v4(), "NGN").await.unwrap();
        carts.add_item(cart.id, variant.id, 1, 1000).await.unwrap();
        carts.add_item(cart.id, other.id, 2, 2000).await.unwrap();
        assert_eq!(carts.clear_items(cart.id).await.unwrap(), 2);
        assert!(carts.list_items(cart.id).await.unwrap().is_empty());
        let found = carts.find_cart_by_customer(cart.customer_id).await.unwrap().unwrap();
        assert_eq!(found.id, cart.id);
    }

    #[tokio::test]
    async fn test_list_items_carries_display_data() {
        let (_, carts, variant) = fixture();
        let cart = carts.insert_cart(Uuid::new_v4(), "NGN").await.unwrap();
        carts.add_item(cart.id, variant.id, 1, 1000).await.unwrap();
        let details = carts.list_items(cart.id).await.unwrap();
        assert_eq!(details[0].title, "Ball valve");
        assert_eq!(details[0].sku, "VLV-100");
    }
}
