//! Cart audit events
//!
//! Every mutation against a cart emits one of these; sinks append them to
//! the `cart_logs` trail and may republish them. Emission is a side effect
//! of a committed mutation, never part of the write itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::domain::aggregates::CartItem;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartAction {
    ItemAdded,
    QuantityUpdated,
    ItemRemoved,
    Cleared,
}

impl CartAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ItemAdded => "item_added",
            Self::QuantityUpdated => "quantity_updated",
            Self::ItemRemoved => "item_removed",
            Self::Cleared => "cleared",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartEvent {
    pub cart_id: Uuid,
    pub action: CartAction,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl CartEvent {
    pub fn new(cart_id: Uuid, action: CartAction, payload: serde_json::Value) -> Self {
        Self { cart_id, action, payload, recorded_at: Utc::now() }
    }

    pub fn item_added(item: &CartItem) -> Self {
        Self::new(item.cart_id, CartAction::ItemAdded, item_payload(item))
    }

    pub fn quantity_updated(item: &CartItem) -> Self {
        Self::new(item.cart_id, CartAction::QuantityUpdated, item_payload(item))
    }

    /// Carries the removed variant and quantity for traceability.
    pub fn item_removed(item: &CartItem) -> Self {
        Self::new(item.cart_id, CartAction::ItemRemoved, item_payload(item))
    }

    pub fn cleared(cart_id: Uuid, removed_items: u64) -> Self {
        Self::new(cart_id, CartAction::Cleared, json!({ "removed_items": removed_items }))
    }
}

fn item_payload(item: &CartItem) -> serde_json::Value {
    json!({
        "item_id": item.id,
        "variant_id": item.variant_id,
        "quantity": item.quantity,
        "unit_price_cents": item.unit_price_cents,
    })
}
