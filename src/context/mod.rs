//! Cart context
//!
//! One cart API regardless of authentication state. Anonymous callers get
//! the device-local adapter; authenticated callers get the persistent
//! service. Nothing outside this module branches on which one is active.
//!
//! Login reconciliation folds the local items into the customer's
//! persistent cart with their frozen prices; items the stock gate rejects
//! are reported back, never silently dropped, and the device snapshot is
//! cleared once the merge completes.

use uuid::Uuid;

use crate::domain::aggregates::cart::{total_items, total_price_cents};
use crate::domain::aggregates::{Cart, CartItem};
use crate::local::{DeviceStore, LocalCart, LocalCartItem};
use crate::service::CartService;
use crate::store::{CartLogSink, CartStore};
use crate::{CartError, Result};

/// Outcome of one login reconciliation.
#[derive(Clone, Debug, Default)]
pub struct MergeReport {
    pub merged: Vec<CartItem>,
    pub rejected: Vec<MergeRejection>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct MergeRejection {
    pub variant_id: Uuid,
    pub requested: u32,
    pub reason: CartError,
}

/// Best-effort merge of device-cart items into a persistent cart. Every
/// item is attempted; per-item failures become rejections so one stale
/// line cannot fail a login.
pub async fn merge_items<S: CartStore, L: CartLogSink>(
    service: &CartService<S, L>,
    cart_id: Uuid,
    items: Vec<LocalCartItem>,
) -> MergeReport {
    let mut report = MergeReport::default();
    for item in items {
        match service
            .add_item(cart_id, item.variant_id, item.quantity, item.unit_price_cents)
            .await
        {
            Ok(added) => report.merged.push(added),
            Err(reason) => {
                tracing::warn!(
                    cart_id = %cart_id,
                    variant_id = %item.variant_id,
                    requested = item.quantity,
                    error = %reason,
                    "cart item not merged at login"
                );
                report.rejected.push(MergeRejection {
                    variant_id: item.variant_id,
                    requested: item.quantity,
                    reason,
                });
            }
        }
    }
    report
}

enum Backend<D: DeviceStore, S, L> {
    Local(LocalCart<D>),
    Persisted { service: CartService<S, L>, cart: Cart },
}

pub struct CartContext<D: DeviceStore, S, L> {
    backend: Backend<D, S, L>,
}

impl<D: DeviceStore, S: CartStore, L: CartLogSink> CartContext<D, S, L> {
    /// Context for an anonymous visitor, backed by device storage.
    pub fn anonymous(device: D) -> Self {
        Self { backend: Backend::Local(LocalCart::load(device)) }
    }

    /// Context for an authenticated customer: resolves the persistent cart
    /// up front so every later call has its handle.
    pub async fn authenticated(service: CartService<S, L>, customer_id: Uuid) -> Result<Self> {
        let cart = service.get_or_create_cart(customer_id).await?;
        Ok(Self { backend: Backend::Persisted { service, cart } })
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.backend, Backend::Persisted { .. })
    }

    /// Anonymous → authenticated transition. Merges whatever the device
    /// cart holds into the customer's persistent cart and switches the
    /// backend; the report says which items made it.
    pub async fn authenticate(
        &mut self,
        service: CartService<S, L>,
        customer_id: Uuid,
    ) -> Result<MergeReport> {
        let cart = service.get_or_create_cart(customer_id).await?;
        let report = match &mut self.backend {
            Backend::Local(local) => merge_items(&service, cart.id, local.drain()).await,
            Backend::Persisted { .. } => MergeReport::default(),
        };
        self.backend = Backend::Persisted { service, cart };
        Ok(report)
    }

    pub async fn add_to_cart(
        &mut self,
        variant_id: Uuid,
        quantity: u32,
        unit_price_cents: i64,
    ) -> Result<()> {
        match &mut self.backend {
            Backend::Local(local) => {
                local.add_item(variant_id, quantity, unit_price_cents)?;
                Ok(())
            }
            Backend::Persisted { service, cart } => {
                service.add_item(cart.id, variant_id, quantity, unit_price_cents).await?;
                Ok(())
            }
        }
    }

    pub async fn update_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<()> {
        match &mut self.backend {
            Backend::Local(local) => {
                local.update_quantity(item_id, quantity)?;
                Ok(())
            }
            Backend::Persisted { service, .. } => {
                service.update_item_quantity(item_id, quantity).await?;
                Ok(())
            }
        }
    }

    pub async fn remove_item(&mut self, item_id: Uuid) -> Result<()> {
        match &mut self.backend {
            Backend::Local(local) => {
                local.remove_item(item_id)?;
                Ok(())
            }
            Backend::Persisted { service, .. } => service.remove_item(item_id).await,
        }
    }

    pub async fn clear(&mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Local(local) => {
                local.clear();
                Ok(())
            }
            Backend::Persisted { service, cart } => service.clear_cart(cart.id).await,
        }
    }

    /// Sum of quantities across the cart.
    pub async fn total_items(&self) -> Result<u32> {
        match &self.backend {
            Backend::Local(local) => Ok(total_items(local.items())),
            Backend::Persisted { service, cart } => {
                Ok(total_items(&service.list_items(cart.id).await?))
            }
        }
    }

    /// Σ frozen unit price × quantity.
    pub async fn total_price_cents(&self) -> Result<i64> {
        match &self.backend {
            Backend::Local(local) => Ok(total_price_cents(local.items())),
            Backend::Persisted { service, cart } => {
                Ok(total_price_cents(&service.list_items(cart.id).await?))
            }
        }
    }

    /// Quantity of one variant already in the cart ("N already in cart").
    pub async fn quantity_of(&self, variant_id: Uuid) -> Result<u32> {
        match &self.backend {
            Backend::Local(local) => Ok(local.quantity_of(variant_id)),
            Backend::Persisted { service, cart } => {
                service.quantity_in_cart(cart.id, variant_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Variant;
    use crate::local::MemoryDeviceStore;
    use crate::store::{MemoryCartLog, MemoryCartStore, MemoryVariantStore};

    type TestContext = CartContext<MemoryDeviceStore, MemoryCartStore, MemoryCartLog>;
    type TestService = CartService<MemoryCartStore, MemoryCartLog>;

    fn service_fixture() -> (TestService, MemoryVariantStore) {
        let variants = MemoryVariantStore::new();
        let service =
            CartService::new(MemoryCartStore::new(variants.clone()), MemoryCartLog::new(), "NGN");
        (service, variants)
    }

    #[tokio::test]
    async fn test_anonymous_aggregates() {
        let mut ctx: TestContext = CartContext::anonymous(MemoryDeviceStore::new());
        assert!(!ctx.is_authenticated());
        let variant_id = Uuid::new_v4();
        ctx.add_to_cart(variant_id, 2, 1000).await.unwrap();
        ctx.add_to_cart(Uuid::new_v4(), 1, 500).await.unwrap();
        assert_eq!(ctx.total_items().await.unwrap(), 3);
        assert_eq!(ctx.total_price_cents().await.unwrap(), 2 * 1000 + 500);
        assert_eq!(ctx.quantity_of(variant_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_login_merges_local_items() {
        let (service, variants) = service_fixture();
        let variant = Variant::new("HTR-01", "Towel heater", 1000, 10);
        variants.insert(variant.clone());

        let mut ctx: TestContext = CartContext::anonymous(MemoryDeviceStore::new());
        // Price was resolved at 800 when the anonymous visitor added it.
        ctx.add_to_cart(variant.id, 2, 800).await.unwrap();

        let report = ctx.authenticate(service.clone(), Uuid::new_v4()).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.merged.len(), 1);
        assert!(ctx.is_authenticated());

        // The merged item carries the local frozen price, not a re-resolved one.
        assert_eq!(report.merged[0].unit_price_cents, 800);
        assert_eq!(ctx.total_items().await.unwrap(), 2);
        assert_eq!(ctx.total_price_cents().await.unwrap(), 1600);
    }

    #[tokio::test]
    async fn test_login_reports_rejected_items() {
        let (service, variants) = service_fixture();
        let scarce = Variant::new("HTR-02", "Panel heater", 2000, 1);
        let plenty = Variant::new("HTR-03", "Fan heater", 500, 10);
        variants.insert(scarce.clone());
        variants.insert(plenty.clone());

        let mut ctx: TestContext = CartContext::anonymous(MemoryDeviceStore::new());
        ctx.add_to_cart(scarce.id, 3, 2000).await.unwrap();
        ctx.add_to_cart(plenty.id, 2, 500).await.unwrap();

        let report = ctx.authenticate(service, Uuid::new_v4()).await.unwrap();
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        let rejection = &report.rejected[0];
        assert_eq!(rejection.variant_id, scarce.id);
        assert_eq!(rejection.requested, 3);
        assert_eq!(rejection.reason, CartError::StockExceeded { available: 1 });

        // The mergeable item made it; the rejected one is gone from local state.
        assert_eq!(ctx.total_items().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_login_clears_device_snapshot() {
        let (service, variants) = service_fixture();
        let variant = Variant::new("HTR-04", "Oil heater", 900, 5);
        variants.insert(variant.clone());

        let mut ctx: TestContext = CartContext::anonymous(MemoryDeviceStore::new());
        ctx.add_to_cart(variant.id, 1, 900).await.unwrap();
        ctx.authenticate(service, Uuid::new_v4()).await.unwrap();

        // A later logout/new-visitor context on the same device starts empty.
        // The old backend consumed the device store, so model that by the
        // context now serving persistent state only.
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.total_items().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_authenticated_context_serves_persistent_cart() {
        let (service, variants) = service_fixture();
        let variant = Variant::new("HTR-05", "Infrared heater", 1200, 5);
        variants.insert(variant.clone());
        let customer = Uuid::new_v4();

        let mut ctx: TestContext =
            CartContext::authenticated(service.clone(), customer).await.unwrap();
        ctx.add_to_cart(variant.id, 2, 1200).await.unwrap();
        assert_eq!(ctx.quantity_of(variant.id).await.unwrap(), 2);

        // The same customer's cart is visible straight through the service.
        let cart = service.get_or_create_cart(customer).await.unwrap();
        assert_eq!(service.quantity_in_cart(cart.id, variant.id).await.unwrap(), 2);
    }
}
