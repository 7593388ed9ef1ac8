//! Postgres backend
//!
//! Each mutating call runs one transaction. The variant row is taken
//! `FOR UPDATE` before the stock read, so a racing add/update on the same
//! variant serializes and the second writer folds against the committed
//! quantity instead of a stale one.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::cart::{check_quantity, fold_quantity};
use crate::domain::aggregates::{Cart, CartItem, CartItemDetail, RolePriceOverride, Variant};
use crate::domain::events::CartEvent;
use crate::pricing::{RoleId, RoleOverrides};
use crate::store::{CartLogSink, CartStore, VariantStore};
use crate::{CartError, Result};

const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for CartError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return CartError::Conflict;
            }
        }
        CartError::Storage(err.to_string())
    }
}

#[derive(Clone)]
pub struct PgVariantStore {
    pool: PgPool,
}

impl PgVariantStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

impl VariantStore for PgVariantStore {
    async fn get_variant(&self, variant_id: Uuid) -> Result<Option<Variant>> {
        let variant = sqlx::query_as::<_, Variant>("SELECT * FROM variants WHERE id = $1")
            .bind(variant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(variant)
    }

    async fn role_overrides(&self, variant_id: Uuid) -> Result<RoleOverrides> {
        let rows = sqlx::query_as::<_, RolePriceOverride>(
            "SELECT * FROM role_price_overrides WHERE variant_id = $1",
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;
        let mut overrides = RoleOverrides::new();
        for row in rows {
            overrides.insert(RoleId::new(row.role_id), row.price_cents);
        }
        Ok(overrides)
    }
}

#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

impl CartStore for PgCartStore {
    async fn find_cart_by_customer(&self, customer_id: Uuid) -> Result<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(cart)
    }

    async fn insert_cart(&self, customer_id: Uuid, currency: &str) -> Result<Cart> {
        let cart = sqlx::query_as::<_, Cart>(
            "INSERT INTO carts (id, customer_id, currency, created_at, updated_at) VALUES ($1, $2, $3, NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(customer_id)
        .bind(currency)
        .fetch_one(&self.pool)
        .await?;
        Ok(cart)
    }

    async fn add_item(
        &self,
        cart_id: Uuid,
        variant_id: Uuid,
        quantity: u32,
        unit_price_cents: i64,
    ) -> Result<CartItem> {
        let mut tx = self.pool.begin().await?;
        let cart_exists = sqlx::query_scalar::<_, Uuid>("SELECT id FROM carts WHERE id = $1")
            .bind(cart_id)
            .fetch_optional(&mut *tx)
            .await?;
        if cart_exists.is_none() {
            return Err(CartError::CartNotFound);
        }
        let stock = sqlx::query_scalar::<_, i32>("SELECT stock FROM variants WHERE id = $1 FOR UPDATE")
            .bind(variant_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CartError::VariantNotFound)?;
        let existing = sqlx::query_scalar::<_, i32>(
            "SELECT quantity FROM cart_items WHERE cart_id = $1 AND variant_id = $2",
        )
        .bind(cart_id)
        .bind(variant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let new_quantity =
            fold_quantity(existing.map(|q| q.max(0) as u32), quantity, stock.max(0) as u32)?;

        // Quantity is set to the folded total computed under the variant
        // lock; the existing row keeps its id, frozen price and added_at.
        let item = sqlx::query_as::<_, CartItem>(
            "INSERT INTO cart_items (id, cart_id, variant_id, quantity, unit_price_cents, added_at) \
             VALUES ($1, $2, $3, $4, $5, NOW()) \
             ON CONFLICT (cart_id, variant_id) DO UPDATE SET quantity = $4 \
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(cart_id)
        .bind(variant_id)
        .bind(new_quantity as i32)
        .bind(unit_price_cents)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn update_item_quantity(&self, item_id: Uuid, quantity: u32) -> Result<CartItem> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, (Uuid, i32)>(
            "SELECT ci.cart_id, v.stock FROM cart_items ci \
             JOIN variants v ON v.id = ci.variant_id \
             WHERE ci.id = $1 FOR UPDATE",
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (cart_id, stock) = row.ok_or(CartError::ItemNotFound)?;
        check_quantity(quantity, stock.max(0) as u32)?;
        let item = sqlx::query_as::<_, CartItem>(
            "UPDATE cart_items SET quantity = $2 WHERE id = $1 RETURNING *",
        )
        .bind(item_id)
        .bind(quantity as i32)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn remove_item(&self, item_id: Uuid) -> Result<CartItem> {
        let mut tx = self.pool.begin().await?;
        let item = sqlx::query_as::<_, CartItem>("DELETE FROM cart_items WHERE id = $1 RETURNING *")
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CartError::ItemNotFound)?;
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(item.cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn clear_items(&self, cart_id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let cart_exists = sqlx::query_scalar::<_, Uuid>("SELECT id FROM carts WHERE id = $1")
            .bind(cart_id)
            .fetch_optional(&mut *tx)
            .await?;
        if cart_exists.is_none() {
            return Err(CartError::CartNotFound);
        }
        let removed = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn list_items(&self, cart_id: Uuid) -> Result<Vec<CartItemDetail>> {
        let items = sqlx::query_as::<_, CartItemDetail>(
            "SELECT ci.id, ci.cart_id, ci.variant_id, ci.quantity, ci.unit_price_cents, ci.added_at, v.title, v.sku \
             FROM cart_items ci \
             JOIN variants v ON v.id = ci.variant_id \
             WHERE ci.cart_id = $1 \
             ORDER BY ci.added_at ASC",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn quantity_of(&self, cart_id: Uuid, variant_id: Uuid) -> Result<u32> {
        let quantity = sqlx::query_scalar::<_, i32>(
            "SELECT quantity FROM cart_items WHERE cart_id = $1 AND variant_id = $2",
        )
        .bind(cart_id)
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(quantity.map(|q| q.max(0) as u32).unwrap_or(0))
    }
}

/// Appends audit rows to `cart_logs` and, when a NATS client is configured,
/// republishes each event for downstream consumers.
#[derive(Clone)]
pub struct PgCartLogSink {
    pool: PgPool,
    nats: Option<async_nats::Client>,
}

impl PgCartLogSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, nats: None }
    }

    pub fn with_nats(mut self, client: async_nats::Client) -> Self {
        self.nats = Some(client);
        self
    }
}

impl CartLogSink for PgCartLogSink {
    async fn append(&self, event: &CartEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO cart_logs (id, cart_id, action, payload, recorded_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::now_v7())
        .bind(event.cart_id)
        .bind(event.action.as_str())
        .bind(&event.payload)
        .bind(event.recorded_at)
        .execute(&self.pool)
        .await?;

        if let Some(nats) = &self.nats {
            match serde_json::to_vec(event) {
                Ok(body) => {
                    if let Err(err) = nats.publish("cart.events".to_string(), body.into()).await {
                        tracing::warn!(cart_id = %event.cart_id, error = %err, "failed to publish cart event");
                    }
                }
                Err(err) => {
                    tracing::warn!(cart_id = %event.cart_id, error = %err, "failed to encode cart event");
                }
            }
        }
        Ok(())
    }
}
