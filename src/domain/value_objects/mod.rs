//! Value Objects for orders and payments

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Settlement currency. Pricing is single-currency.
pub const CURRENCY: &str = "NGN";

/// Money value object, always held at two decimal places once rounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn zero() -> Self { Self(Decimal::ZERO) }
    /// Builds from an integer count of cents, e.g. `Money::cents(2499)` is 24.99.
    pub fn cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }

    pub fn add(&self, other: Money) -> Money { Money(self.0 + other.0) }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }

    /// Subtraction floored at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        if other.0 >= self.0 { Money::zero() } else { Money(self.0 - other.0) }
    }

    /// Multiplies by a rate and rounds half away from zero to cents.
    pub fn percent(&self, rate: Decimal) -> Money { Money(self.0 * rate).round() }

    pub fn round(&self) -> Money {
        Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Smallest currency unit (kobo/cents) used by the payment gateway.
    pub fn to_minor_units(&self) -> Option<i64> {
        (self.round().0 * Decimal::ONE_HUNDRED).trunc().to_i64()
    }

    pub fn from_minor_units(minor: i64) -> Money { Money(Decimal::new(minor, 2)) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Decimal::from_str(s.trim()).map(Money) }
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
}

/// Supported payment methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Paypal,
    CashOnDelivery,
    Paystack,
}

impl PaymentMethod {
    /// Gateway-backed methods take stock only once payment is confirmed, so
    /// abandoned checkouts never hold inventory.
    pub fn defers_stock_until_confirmed(&self) -> bool {
        matches!(self, Self::Paystack)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Paypal => "paypal",
            Self::CashOnDelivery => "cash_on_delivery",
            Self::Paystack => "paystack",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(Self::Card),
            "paypal" => Ok(Self::Paypal),
            "cash_on_delivery" => Ok(Self::CashOnDelivery),
            "paystack" => Ok(Self::Paystack),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// Normalized payment confirmation, whichever channel it arrived on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub reference_id: String,
    pub status: String,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub payer_email: Option<String>,
    pub amount: Option<Money>,
    pub currency: Option<String>,
    pub channel: Option<String>,
    pub gateway_response: Option<String>,
}

impl PaymentResult {
    /// Placeholder recorded when a gateway session is opened.
    pub fn pending(reference: impl Into<String>, payer_email: impl Into<String>) -> Self {
        Self {
            reference_id: reference.into(),
            status: "pending".into(),
            confirmed_at: None,
            payer_email: Some(payer_email.into()),
            amount: None,
            currency: None,
            channel: None,
            gateway_response: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "zip is required"))]
    pub zip: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_half_up() {
        let s = Money::cents(4998);
        assert_eq!(s.percent(Decimal::new(85, 3)), Money::cents(425));
        // 0.5 cents rounds away from zero
        assert_eq!(Money::new(Decimal::new(5, 3)).round(), Money::cents(1));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(Money::cents(6423).to_minor_units(), Some(6423));
        assert_eq!(Money::new(Decimal::new(150, 0)).to_minor_units(), Some(15000));
        assert_eq!(Money::from_minor_units(15000), Money::new(Decimal::new(150, 0)));
    }

    #[test]
    fn test_saturating_sub() {
        assert_eq!(Money::cents(500).saturating_sub(Money::cents(800)), Money::zero());
        assert_eq!(Money::cents(800).saturating_sub(Money::cents(500)), Money::cents(300));
    }

    #[test]
    fn test_quantity() {
        let q = Quantity::new(3);
        assert!(q.subtract(4).is_none());
        assert_eq!(q.subtract(3), Some(Quantity::new(0)));
    }

    #[test]
    fn test_deferred_capability() {
        assert!(PaymentMethod::Paystack.defers_stock_until_confirmed());
        assert!(!PaymentMethod::CashOnDelivery.defers_stock_until_confirmed());
        assert_eq!("paystack".parse::<PaymentMethod>().unwrap(), PaymentMethod::Paystack);
    }
}
