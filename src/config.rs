use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::calendar::DEFAULT_HORIZON_DAYS;
use crate::pricing::{PricingPolicy, DEFAULT_TAX_RATE_BPS};

const MAX_TAX_RATE_BPS: u32 = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub booking: BookingConfig,
    pub pricing: PricingConfig,
    pub app: AppConfig,
}

/// Knobs for the booking coordinator and the calendar view.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub horizon_days: u32,
    pub gateway_timeout: Duration,
    pub max_session_minutes: i64,
    /// Serialise bookings per practitioner in-process, on top of the store guard.
    pub practitioner_locks: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    pub hourly_rate: i64,
    pub tax_rate_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub environment: Environment,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Default for BookingConfig {
    fn default() -> Self {
        BookingConfig {
            horizon_days: DEFAULT_HORIZON_DAYS,
            gateway_timeout: Duration::from_secs(10),
            max_session_minutes: 240,
            practitioner_locks: true,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig {
            hourly_rate: 5_000,
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
        }
    }
}

impl PricingConfig {
    pub fn policy(&self) -> PricingPolicy {
        PricingPolicy::new(self.hourly_rate, self.tax_rate_bps)
    }

    /// Rates outside these bounds would price sessions below zero or above 100% tax.
    pub fn validate(&self) -> Result<()> {
        if self.hourly_rate < 0 {
            anyhow::bail!("CAREBOOK_HOURLY_RATE must not be negative");
        }
        if self.tax_rate_bps > MAX_TAX_RATE_BPS {
            anyhow::bail!("CAREBOOK_TAX_RATE_BPS must not exceed {}", MAX_TAX_RATE_BPS);
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}", name)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let booking_defaults = BookingConfig::default();
        let pricing_defaults = PricingConfig::default();

        // Booking configuration
        let horizon_days = parse_var("CAREBOOK_HORIZON_DAYS", booking_defaults.horizon_days)?;
        let gateway_timeout_ms = parse_var(
            "CAREBOOK_GATEWAY_TIMEOUT_MS",
            booking_defaults.gateway_timeout.as_millis() as u64,
        )?;
        let max_session_minutes =
            parse_var("CAREBOOK_MAX_SESSION_MINUTES", booking_defaults.max_session_minutes)?;
        let practitioner_locks =
            parse_var("CAREBOOK_PRACTITIONER_LOCKS", booking_defaults.practitioner_locks)?;

        if horizon_days == 0 {
            anyhow::bail!("CAREBOOK_HORIZON_DAYS must be positive");
        }
        if gateway_timeout_ms == 0 {
            anyhow::bail!("CAREBOOK_GATEWAY_TIMEOUT_MS must be positive");
        }

        // Pricing configuration
        let hourly_rate = parse_var("CAREBOOK_HOURLY_RATE", pricing_defaults.hourly_rate)?;
        let tax_rate_bps = parse_var("CAREBOOK_TAX_RATE_BPS", pricing_defaults.tax_rate_bps)?;
        let pricing = PricingConfig {
            hourly_rate,
            tax_rate_bps,
        };
        pricing.validate()?;

        // App configuration
        let environment = env::var("APP_ENVIRONMENT")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or_default();
        let name = env::var("APP_NAME").unwrap_or_else(|_| "carebook".to_string());

        Ok(Config {
            booking: BookingConfig {
                horizon_days,
                gateway_timeout: Duration::from_millis(gateway_timeout_ms),
                max_session_minutes,
                practitioner_locks,
            },
            pricing,
            app: AppConfig { name, environment },
        })
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "development" => Ok(Environment::Development),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

static CONFIG: OnceCell<Config> = OnceCell::new();

/// Load `.env` and the environment once; later calls return the cached value.
pub fn init() -> Result<&'static Config> {
    dotenv::dotenv().ok();
    CONFIG.get_or_try_init(Config::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let booking = BookingConfig::default();
        assert_eq!(booking.horizon_days, 28);
        assert_eq!(booking.gateway_timeout, Duration::from_secs(10));
        assert!(booking.practitioner_locks);
        assert_eq!(PricingConfig::default().policy().default_tax_rate_bps, 1_000);
    }

    #[test]
    fn pricing_bounds_are_enforced() {
        assert!(PricingConfig::default().validate().is_ok());

        let negative = PricingConfig { hourly_rate: -1, ..PricingConfig::default() };
        assert!(negative.validate().is_err());

        let full_tax = PricingConfig { tax_rate_bps: 10_000, ..PricingConfig::default() };
        assert!(full_tax.validate().is_ok());
        let over = PricingConfig { tax_rate_bps: 10_001, ..PricingConfig::default() };
        assert!(over.validate().is_err());
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!("PRODUCTION".parse::<Environment>(), Ok(Environment::Production));
        assert!("qa".parse::<Environment>().is_err());
    }
}
