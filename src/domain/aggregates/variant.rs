//! Variant read model
//!
//! Purchasable SKUs and their role-specific price overrides. Owned by the
//! product catalog; this engine only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Variant {
    pub id: Uuid,
    pub sku: String,
    pub title: String,
    pub public_price_cents: i64,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    pub fn new(sku: impl Into<String>, title: impl Into<String>, public_price_cents: i64, stock: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            sku: sku.into(),
            title: title.into(),
            public_price_cents,
            stock: stock as i32,
            created_at: now,
            updated_at: now,
        }
    }

    /// Units currently available for sale. The column is non-negative by
    /// constraint; clamp anyway so a bad row cannot underflow cart math.
    pub fn available(&self) -> u32 {
        self.stock.max(0) as u32
    }
}

/// One override per (variant, role) pair; the composite primary key in
/// `role_price_overrides` enforces the uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RolePriceOverride {
    pub variant_id: Uuid,
    pub role_id: String,
    pub price_cents: i64,
}
