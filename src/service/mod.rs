//! Cart service
//!
//! Sole writer of the persistent cart store. Validates quantities up front,
//! leaves the atomic stock gate to the store, retries transient store
//! failures once, and emits an audit event after every committed mutation.

use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem, CartItemDetail};
use crate::domain::events::CartEvent;
use crate::domain::value_objects::Quantity;
use crate::store::{CartLogSink, CartStore};
use crate::{CartError, Result};

#[derive(Clone)]
pub struct CartService<S, L> {
    carts: S,
    log: L,
    currency: String,
}

impl<S: CartStore, L: CartLogSink> CartService<S, L> {
    pub fn new(carts: S, log: L, currency: impl Into<String>) -> Self {
        Self { carts, log, currency: currency.into() }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Finds the customer's cart, creating it on first use. Losing the
    /// create race to a concurrent request is fine: the store reports
    /// `Conflict` and the winner's cart is re-fetched.
    pub async fn get_or_create_cart(&self, customer_id: Uuid) -> Result<Cart> {
        if let Some(cart) = self.carts.find_cart_by_customer(customer_id).await? {
            return Ok(cart);
        }
        match self.carts.insert_cart(customer_id, &self.currency).await {
            Ok(cart) => {
                tracing::info!(cart_id = %cart.id, customer_id = %customer_id, "created cart");
                Ok(cart)
            }
            Err(CartError::Conflict) => self
                .carts
                .find_cart_by_customer(customer_id)
                .await?
                .ok_or(CartError::CartNotFound),
            Err(err) => Err(err),
        }
    }

    /// Adds `quantity` units of a variant at the caller-resolved frozen
    /// price. Folds into an existing row; the store gates the folded total
    /// on freshly-read stock.
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        variant_id: Uuid,
        quantity: u32,
        unit_price_cents: i64,
    ) -> Result<CartItem> {
        let quantity = Quantity::new(quantity).ok_or(CartError::InvalidQuantity)?;
        let item = match self
            .carts
            .add_item(cart_id, variant_id, quantity.value(), unit_price_cents)
            .await
        {
            Err(err) if err.is_transient() => {
                self.carts
                    .add_item(cart_id, variant_id, quantity.value(), unit_price_cents)
                    .await?
            }
            other => other?,
        };
        tracing::info!(
            cart_id = %cart_id,
            variant_id = %variant_id,
            quantity = %quantity,
            total_quantity = item.quantity,
            "added cart item"
        );
        self.record(CartEvent::item_added(&item)).await;
        Ok(item)
    }

    /// Sets an absolute quantity, re-validated against current stock (which
    /// may have moved since the item was added).
    pub async fn update_item_quantity(&self, item_id: Uuid, quantity: u32) -> Result<CartItem> {
        let quantity = Quantity::new(quantity).ok_or(CartError::InvalidQuantity)?;
        let item = match self.carts.update_item_quantity(item_id, quantity.value()).await {
            Err(err) if err.is_transient() => {
                self.carts.update_item_quantity(item_id, quantity.value()).await?
            }
            other => other?,
        };
        tracing::info!(cart_id = %item.cart_id, item_id = %item_id, quantity = %quantity, "updated cart item quantity");
        self.record(CartEvent::quantity_updated(&item)).await;
        Ok(item)
    }

    pub async fn remove_item(&self, item_id: Uuid) -> Result<()> {
        let item = match self.carts.remove_item(item_id).await {
            Err(err) if err.is_transient() => self.carts.remove_item(item_id).await?,
            other => other?,
        };
        tracing::info!(cart_id = %item.cart_id, item_id = %item_id, variant_id = %item.variant_id, "removed cart item");
        self.record(CartEvent::item_removed(&item)).await;
        Ok(())
    }

    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<()> {
        let removed = match self.carts.clear_items(cart_id).await {
            Err(err) if err.is_transient() => self.carts.clear_items(cart_id).await?,
            other => other?,
        };
        tracing::info!(cart_id = %cart_id, removed_items = removed, "cleared cart");
        self.record(CartEvent::cleared(cart_id, removed)).await;
        Ok(())
    }

    pub async fn list_items(&self, cart_id: Uuid) -> Result<Vec<CartItemDetail>> {
        self.carts.list_items(cart_id).await
    }

    pub async fn quantity_in_cart(&self, cart_id: Uuid, variant_id: Uuid) -> Result<u32> {
        self.carts.quantity_of(cart_id, variant_id).await
    }

    /// Audit is off the critical write path: a sink failure is logged, not
    /// surfaced to the caller whose mutation already committed.
    async fn record(&self, event: CartEvent) {
        if let Err(err) = self.log.append(&event).await {
            tracing::warn!(cart_id = %event.cart_id, error = %err, "failed to append cart log");
        }
    }
}
