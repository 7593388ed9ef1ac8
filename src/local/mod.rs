//! Device-local cart
//!
//! Anonymous visitors accumulate cart items in device storage. Same add/
//! update/remove/clear surface as the persistent path, but nothing here
//! validates against live stock; the items are only authoritative once the
//! reconciliation in [`crate::context`] folds them into a persistent cart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::aggregates::cart::CartLine;
use crate::{CartError, Result};

/// Key-value persistence scoped to one device (a browser's local storage,
/// a desktop profile directory, ...). Values are opaque strings.
pub trait DeviceStore {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryDeviceStore(HashMap<String, String>);

impl MemoryDeviceStore {
    pub fn new() -> Self { Self::default() }
}

impl DeviceStore for MemoryDeviceStore {
    fn get(&self, key: &str) -> Option<String> { self.0.get(key).cloned() }
    fn put(&mut self, key: &str, value: String) { self.0.insert(key.to_string(), value); }
    fn remove(&mut self, key: &str) { self.0.remove(key); }
}

const STORAGE_KEY: &str = "vitrine.cart";

/// CartItem-shaped record with a synthetic id and no owning cart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalCartItem {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub quantity: u32,
    /// Frozen at the moment of addition, carried into reconciliation as-is.
    pub unit_price_cents: i64,
    pub added_at: DateTime<Utc>,
}

impl CartLine for LocalCartItem {
    fn line_quantity(&self) -> u32 { self.quantity }
    fn line_unit_price_cents(&self) -> i64 { self.unit_price_cents }
}

pub struct LocalCart<D: DeviceStore> {
    store: D,
    items: Vec<LocalCartItem>,
}

impl<D: DeviceStore> LocalCart<D> {
    /// Loads the snapshot from device storage. An unreadable snapshot is
    /// discarded; a shopper with corrupt device state starts empty.
    pub fn load(store: D) -> Self {
        let items = match store.get(STORAGE_KEY) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "discarding unreadable device cart snapshot");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Self { store, items }
    }

    pub fn items(&self) -> &[LocalCartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn quantity_of(&self, variant_id: Uuid) -> u32 {
        self.items
            .iter()
            .find(|i| i.variant_id == variant_id)
            .map(|i| i.quantity)
            .unwrap_or(0)
    }

    /// Folds into an existing line for the variant, mirroring the persistent
    /// path's merge-on-add; the first line's frozen price wins.
    pub fn add_item(&mut self, variant_id: Uuid, quantity: u32, unit_price_cents: i64) -> Result<LocalCartItem> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        let item = match self.items.iter_mut().find(|i| i.variant_id == variant_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(quantity);
                existing.clone()
            }
            None => {
                let item = LocalCartItem {
                    id: Uuid::new_v4(),
                    variant_id,
                    quantity,
                    unit_price_cents,
                    added_at: Utc::now(),
                };
                self.items.push(item.clone());
                item
            }
        };
        self.persist();
        Ok(item)
    }

    pub fn update_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<LocalCartItem> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(CartError::ItemNotFound)?;
        item.quantity = quantity;
        let item = item.clone();
        self.persist();
        Ok(item)
    }

    pub fn remove_item(&mut self, item_id: Uuid) -> Result<LocalCartItem> {
        let index = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(CartError::ItemNotFound)?;
        let item = self.items.remove(index);
        self.persist();
        Ok(item)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.store.remove(STORAGE_KEY);
    }

    /// Empties the cart and device storage, handing the items to the caller;
    /// reconciliation consumes these.
    pub fn drain(&mut self) -> Vec<LocalCartItem> {
        let items = std::mem::take(&mut self.items);
        self.store.remove(STORAGE_KEY);
        items
    }

    pub fn into_inner(self) -> D { self.store }

    fn persist(&mut self) {
        match serde_json::to_string(&self.items) {
            Ok(raw) => self.store.put(STORAGE_KEY, raw),
            Err(err) => tracing::warn!(error = %err, "failed to persist device cart snapshot"),
        }
    }
}
