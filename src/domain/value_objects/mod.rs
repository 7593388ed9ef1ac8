//! Value objects for the cart engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Money value object: integer minor-currency units (cents)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    cents: i64,
    currency: String,
}

impl Money {
    pub fn new(cents: i64, currency: &str) -> Self {
        Self { cents, currency: currency.to_string() }
    }
    pub fn zero(currency: &str) -> Self { Self::new(0, currency) }
    pub fn cents(&self) -> i64 { self.cents }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.cents + other.cents, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.cents * i64::from(qty), &self.currency) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02} {}", self.cents / 100, (self.cents % 100).abs(), self.currency)
    }
}

#[derive(Debug, Clone)] pub enum MoneyError { CurrencyMismatch }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Currency mismatch") }
}

/// Quantity value object: cart quantities are positive integers
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }
    pub fn value(self) -> u32 { self.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_money_add() {
        let a = Money::new(1000, "NGN");
        let b = Money::new(250, "NGN");
        assert_eq!(a.add(&b).unwrap().cents(), 1250);
    }
    #[test]
    fn test_money_add_currency_mismatch() {
        let a = Money::new(1000, "NGN");
        let b = Money::new(1000, "USD");
        assert!(a.add(&b).is_err());
    }
    #[test]
    fn test_money_multiply() {
        assert_eq!(Money::new(499, "NGN").multiply(3).cents(), 1497);
    }
    #[test]
    fn test_quantity_rejects_zero() {
        assert!(Quantity::new(0).is_none());
        assert_eq!(Quantity::new(4).unwrap().value(), 4);
    }
}
