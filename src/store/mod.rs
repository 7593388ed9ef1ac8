//! Storage seams
//!
//! Trait boundaries between the engine and its persistence. Every mutating
//! `CartStore` method is one transactional unit: the stock read, the
//! quantity fold, and the item write happen atomically inside the
//! implementation, with the variant row held against concurrent writers.
//! That closes the read-then-write race on stock for every backend.

use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem, CartItemDetail, Variant};
use crate::domain::events::CartEvent;
use crate::pricing::RoleOverrides;
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCartLog, MemoryCartStore, MemoryVariantStore};
pub use postgres::{PgCartLogSink, PgCartStore, PgVariantStore};

/// Read side of the variant & pricing store. Owned by the catalog; the cart
/// engine never writes it.
#[allow(async_fn_in_trait)]
pub trait VariantStore {
    async fn get_variant(&self, variant_id: Uuid) -> Result<Option<Variant>>;

    /// Snapshot of the variant's role price overrides, loaded once per
    /// request and handed to the price resolver.
    async fn role_overrides(&self, variant_id: Uuid) -> Result<RoleOverrides>;
}

/// Persistent cart storage. Uniqueness of (customer) per cart and
/// (cart, variant) per item is enforced here.
#[allow(async_fn_in_trait)]
pub trait CartStore {
    async fn find_cart_by_customer(&self, customer_id: Uuid) -> Result<Option<Cart>>;

    /// Inserts a fresh cart. A uniqueness violation on the customer maps to
    /// `Conflict` so callers can re-fetch instead of erroring.
    async fn insert_cart(&self, customer_id: Uuid, currency: &str) -> Result<Cart>;

    /// Atomically folds `quantity` into any existing (cart, variant) row,
    /// gates the result on freshly-read stock, upserts the row with the
    /// caller's frozen unit price, and bumps the cart timestamp.
    async fn add_item(
        &self,
        cart_id: Uuid,
        variant_id: Uuid,
        quantity: u32,
        unit_price_cents: i64,
    ) -> Result<CartItem>;

    /// Atomically re-validates the absolute quantity against current stock
    /// and persists it.
    async fn update_item_quantity(&self, item_id: Uuid, quantity: u32) -> Result<CartItem>;

    /// Deletes the item, returning the removed row for audit payloads.
    async fn remove_item(&self, item_id: Uuid) -> Result<CartItem>;

    /// Deletes all items of the cart in one operation, returning how many
    /// rows went away. The cart itself survives.
    async fn clear_items(&self, cart_id: Uuid) -> Result<u64>;

    /// Items joined with variant display data, oldest first.
    async fn list_items(&self, cart_id: Uuid) -> Result<Vec<CartItemDetail>>;

    /// Quantity already in the cart for one variant; 0 when absent.
    async fn quantity_of(&self, cart_id: Uuid, variant_id: Uuid) -> Result<u32>;
}

/// Append-only sink for the cart audit trail. Sinks must never fail a cart
/// mutation; the service logs and moves on when an append errors.
#[allow(async_fn_in_trait)]
pub trait CartLogSink {
    async fn append(&self, event: &CartEvent) -> Result<()>;
}
