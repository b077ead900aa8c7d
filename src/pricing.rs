//! Session pricing.

use crate::error::ValidationError;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

pub const DEFAULT_TAX_RATE_BPS: u32 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PractitionerRate {
    pub hourly_rate: i64,
    /// Falls back to the policy default when absent.
    pub tax_rate_bps: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
}

#[derive(Debug, Clone)]
pub struct PricingPolicy {
    pub default_hourly_rate: i64,
    pub default_tax_rate_bps: u32,
    overrides: HashMap<Uuid, PractitionerRate>,
}

/// `value * numerator / denominator`, rounded half up. Inputs are non-negative;
/// `None` on overflow.
fn scale_rounded(value: i64, numerator: i64, denominator: i64) -> Option<i64> {
    let doubled = value.checked_mul(numerator)?.checked_mul(2)?.checked_add(denominator)?;
    Some(doubled / (denominator * 2))
}

impl PricingPolicy {
    pub fn new(default_hourly_rate: i64, default_tax_rate_bps: u32) -> Self {
        PricingPolicy {
            default_hourly_rate,
            default_tax_rate_bps,
            overrides: HashMap::new(),
        }
    }

    pub fn with_rate(mut self, practitioner_id: Uuid, rate: PractitionerRate) -> Self {
        self.overrides.insert(practitioner_id, rate);
        self
    }

    pub fn rate_for(&self, practitioner_id: Uuid) -> PractitionerRate {
        self.overrides
            .get(&practitioner_id)
            .copied()
            .unwrap_or(PractitionerRate {
                hourly_rate: self.default_hourly_rate,
                tax_rate_bps: None,
            })
    }

    /// Price a session of `duration_minutes` with the practitioner's rate.
    pub fn quote(&self, practitioner_id: Uuid, duration_minutes: i64) -> Result<Quote, ValidationError> {
        let rate = self.rate_for(practitioner_id);
        let tax_bps = rate.tax_rate_bps.unwrap_or(self.default_tax_rate_bps);
        if rate.hourly_rate < 0 {
            return Err(ValidationError::new(format!(
                "Hourly rate cannot be negative: {}",
                rate.hourly_rate
            )));
        }

        let overflow = || ValidationError::new("Session price is out of range");
        let amount = scale_rounded(rate.hourly_rate, duration_minutes.max(0), 60).ok_or_else(overflow)?;
        let tax_amount = scale_rounded(amount, tax_bps as i64, 10_000).ok_or_else(overflow)?;
        let total_amount = amount.checked_add(tax_amount).ok_or_else(overflow)?;

        Ok(Quote {
            amount,
            tax_amount,
            total_amount,
        })
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        PricingPolicy::new(5_000, DEFAULT_TAX_RATE_BPS)
    }
}
