//! Service configuration

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::application::coupons::CouponBook;
use crate::application::{CancelRestock, OrderSettings};
use crate::domain::aggregates::PricingPolicy;
use crate::domain::value_objects::Money;
use crate::infrastructure::paystack::PaystackConfig;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} must be set in {environment} environment")]
    MissingSecret { name: &'static str, environment: String },
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    pub port: u16,
    /// Notifications go to NATS when set, to the log otherwise
    pub nats_url: Option<String>,
    /// HS256 secret shared with the identity service
    pub jwt_secret: String,
    /// Gateway API key, also the webhook signing key
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub payment_callback_url: Option<String>,
    pub gateway_timeout: Duration,
    pub flat_shipping_fee: Money,
    pub coupons: CouponBook,
    pub cancel_restock: CancelRestock,
    /// development | staging | production
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".into());

        // Secrets must be real outside development.
        let secret = |name: &'static str| -> Result<String, ConfigError> {
            match var(name) {
                Some(v) => Ok(v),
                None if environment == "development" => Ok(format!("dev-{name}-not-for-production")),
                None => Err(ConfigError::MissingSecret { name, environment: environment.clone() }),
            }
        };

        Ok(Self {
            database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            port: parse(var("PORT"), "PORT", 8083)?,
            nats_url: var("NATS_URL"),
            jwt_secret: secret("JWT_SECRET")?,
            paystack_secret_key: secret("PAYSTACK_SECRET_KEY")?,
            paystack_base_url: var("PAYSTACK_BASE_URL").unwrap_or_else(|| "https://api.paystack.co".into()),
            payment_callback_url: var("PAYMENT_CALLBACK_URL"),
            gateway_timeout: Duration::from_secs(parse(var("GATEWAY_TIMEOUT_SECS"), "GATEWAY_TIMEOUT_SECS", 15)?),
            flat_shipping_fee: parse(var("SHIPPING_FLAT_FEE"), "SHIPPING_FLAT_FEE", Money::cents(1000))?,
            coupons: CouponBook::parse(&var("COUPONS").unwrap_or_default())
                .map_err(|e| ConfigError::Invalid { name: "COUPONS", reason: e.to_string() })?,
            cancel_restock: match var("CANCEL_RESTOCK").as_deref() {
                None | Some("always") => CancelRestock::Always,
                Some("reserved_only") => CancelRestock::ReservedOnly,
                Some(other) => {
                    return Err(ConfigError::Invalid {
                        name: "CANCEL_RESTOCK",
                        reason: format!("expected 'always' or 'reserved_only', got '{other}'"),
                    })
                }
            },
            environment,
        })
    }

    pub fn order_settings(&self) -> OrderSettings {
        OrderSettings {
            pricing: PricingPolicy { flat_shipping_fee: self.flat_shipping_fee },
            coupons: self.coupons.clone(),
            cancel_restock: self.cancel_restock,
        }
    }

    pub fn paystack(&self) -> PaystackConfig {
        PaystackConfig {
            base_url: self.paystack_base_url.clone(),
            secret_key: self.paystack_secret_key.clone(),
            callback_url: self.payment_callback_url.clone(),
            timeout: self.gateway_timeout,
        }
    }
}

fn parse<T: FromStr>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { name, reason: format!("'{v}'") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_development_defaults() {
        let c = config(&[("DATABASE_URL", "postgres://localhost/orders")]).unwrap();
        assert_eq!(c.port, 8083);
        assert_eq!(c.gateway_timeout, Duration::from_secs(15));
        assert_eq!(c.flat_shipping_fee, Money::cents(1000));
        assert_eq!(c.cancel_restock, CancelRestock::Always);
        assert!(c.jwt_secret.starts_with("dev-"));
    }

    #[test]
    fn test_production_requires_secrets() {
        let err = config(&[("DATABASE_URL", "postgres://db/orders"), ("ENVIRONMENT", "production")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingSecret { name: "JWT_SECRET", environment: "production".into() });
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let c = config(&[
            ("DATABASE_URL", "postgres://db/orders"),
            ("SHIPPING_FLAT_FEE", "7.50"),
            ("CANCEL_RESTOCK", "reserved_only"),
            ("COUPONS", "WELCOME:10%"),
        ])
        .unwrap();
        assert_eq!(c.flat_shipping_fee, Money::cents(750));
        assert_eq!(c.cancel_restock, CancelRestock::ReservedOnly);
        assert_eq!(c.coupons.len(), 1);

        assert!(config(&[("DATABASE_URL", "x"), ("PORT", "eighty")]).is_err());
        assert!(config(&[("DATABASE_URL", "x"), ("CANCEL_RESTOCK", "sometimes")]).is_err());
        assert_eq!(config(&[]).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
    }
}
