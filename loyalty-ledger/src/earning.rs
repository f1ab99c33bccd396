//! Points accrual for completed orders

use crate::{tier::Tier, Error, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Earning policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarningPolicy {
    /// Order currency units per base point
    pub currency_units_per_point: Decimal,

    /// Lifetime of earned points in days (`None` = never expire)
    pub points_ttl_days: Option<i64>,
}

impl Default for EarningPolicy {
    fn default() -> Self {
        Self {
            currency_units_per_point: Decimal::from(1_000),
            points_ttl_days: Some(365),
        }
    }
}

impl EarningPolicy {
    /// Points earned for an order total at the customer's tier, rounded down
    pub fn points_for_order(&self, order_total: Decimal, tier: Tier) -> Result<i64> {
        if order_total <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "order total must be positive, got {}",
                order_total
            )));
        }

        let points = (order_total / self.currency_units_per_point * tier.multiplier()).floor();
        points
            .to_i64()
            .ok_or_else(|| Error::InvalidAmount(format!("order total {} out of range", order_total)))
    }

    /// Expiry for points earned at `now`
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let Some(days) = self.points_ttl_days else {
            return Ok(None);
        };

        Duration::try_days(days)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .map(Some)
            .ok_or_else(|| {
                Error::Config(format!("earning.points_ttl_days of {} is out of range", days))
            })
    }
}
