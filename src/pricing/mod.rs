//! Price resolution
//!
//! Maps (variant, customer role) to the effective unit price. Overrides are
//! loaded once per request into a [`RoleOverrides`] snapshot keyed by a
//! stable role identifier; resolution itself is pure, so a fixed snapshot
//! always yields the same price.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::domain::aggregates::Variant;

/// Stable identifier of a commercial role (e.g. "installer", "distributor").
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Snapshot of one variant's role-specific price overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleOverrides(HashMap<RoleId, i64>);

impl RoleOverrides {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, role: RoleId, price_cents: i64) -> Self {
        self.insert(role, price_cents);
        self
    }

    pub fn insert(&mut self, role: RoleId, price_cents: i64) {
        self.0.insert(role, price_cents);
    }

    pub fn get(&self, role: &RoleId) -> Option<i64> {
        self.0.get(role).copied()
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// Effective unit price for a variant and an optional customer role.
///
/// The override wins for exactly its role; an absent role or absent override
/// falls back to the public price. A non-positive override is malformed data
/// and is ignored rather than ever being returned.
pub fn resolve(variant: &Variant, overrides: &RoleOverrides, role: Option<&RoleId>) -> i64 {
    let Some(role) = role else {
        return variant.public_price_cents;
    };
    match overrides.get(role) {
        Some(price_cents) if price_cents > 0 => price_cents,
        _ => variant.public_price_cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant() -> Variant {
        Variant::new("TAP-001", "Thermostatic tap", 1000, 10)
    }

    #[test]
    fn test_override_wins_for_its_role() {
        let v = variant();
        let overrides = RoleOverrides::new().with(RoleId::new("installer"), 800);
        assert_eq!(resolve(&v, &overrides, Some(&RoleId::new("installer"))), 800);
        assert_eq!(resolve(&v, &overrides, Some(&RoleId::new("retail"))), 1000);
        assert_eq!(resolve(&v, &overrides, None), 1000);
    }

    #[test]
    fn test_fallback_equals_public_price() {
        let v = variant();
        let overrides = RoleOverrides::new();
        let role = RoleId::new("installer");
        assert_eq!(resolve(&v, &overrides, Some(&role)), resolve(&v, &overrides, None));
        assert_eq!(resolve(&v, &overrides, None), v.public_price_cents);
    }

    #[test]
    fn test_deterministic_for_fixed_snapshot() {
        let v = variant();
        let overrides = RoleOverrides::new().with(RoleId::new("installer"), 800);
        let role = RoleId::new("installer");
        let first = resolve(&v, &overrides, Some(&role));
        let second = resolve(&v, &overrides, Some(&role));
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_override_is_ignored() {
        let v = variant();
        let overrides = RoleOverrides::new()
            .with(RoleId::new("installer"), 0)
            .with(RoleId::new("distributor"), -500);
        assert_eq!(resolve(&v, &overrides, Some(&RoleId::new("installer"))), 1000);
        assert_eq!(resolve(&v, &overrides, Some(&RoleId::new("distributor"))), 1000);
    }
}
