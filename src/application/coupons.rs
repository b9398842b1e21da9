//! Coupon codes resolved to a discount on the items subtotal.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Discount {
    /// Percentage of the items subtotal, e.g. `10` for 10%.
    Percent(Decimal),
    Fixed(Money),
}

impl Discount {
    pub fn amount(&self, items_price: Money) -> Money {
        match self {
            Self::Percent(pct) => items_price.percent(*pct / Decimal::ONE_HUNDRED),
            Self::Fixed(amount) => *amount,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CouponError {
    #[error("Invalid coupon code")]
    Unknown,
    #[error("malformed coupon entry '{0}'")]
    Malformed(String),
}

#[derive(Clone, Debug, Default)]
pub struct CouponBook {
    codes: HashMap<String, Discount>,
}

impl CouponBook {
    /// Parses `CODE:10%,OTHER:5` (percent or fixed amount). Codes are case-insensitive.
    pub fn parse(spec: &str) -> Result<Self, CouponError> {
        let mut codes = HashMap::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (code, value) = entry.split_once(':').ok_or_else(|| CouponError::Malformed(entry.to_string()))?;
            let value = value.trim();
            let discount = match value.strip_suffix('%') {
                Some(pct) => Decimal::from_str(pct.trim())
                    .ok()
                    .filter(|p| *p > Decimal::ZERO && *p <= Decimal::ONE_HUNDRED)
                    .map(Discount::Percent),
                None => Money::from_str(value).ok().filter(|m| !m.is_negative()).map(Discount::Fixed),
            }
            .ok_or_else(|| CouponError::Malformed(entry.to_string()))?;
            codes.insert(code.trim().to_uppercase(), discount);
        }
        Ok(Self { codes })
    }

    pub fn len(&self) -> usize { self.codes.len() }
    pub fn is_empty(&self) -> bool { self.codes.is_empty() }

    pub fn discount_for(&self, code: Option<&str>, items_price: Money) -> Result<Money, CouponError> {
        match code.map(str::trim).filter(|c| !c.is_empty()) {
            None => Ok(Money::zero()),
            Some(code) => self
                .codes
                .get(&code.to_uppercase())
                .map(|d| d.amount(items_price))
                .ok_or(CouponError::Unknown),
        }
    }
}
