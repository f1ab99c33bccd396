//! Redemption rules
//!
//! Stateless checks run before the request reaches the writer; the balance
//! check runs again inside the writer against the committed ledger.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Redemption policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedemptionPolicy {
    /// Smallest redeemable amount
    pub min_points: i64,

    /// Points per exchange unit
    pub points_per_unit: i64,

    /// Discount granted per exchange unit (currency units)
    pub discount_per_unit: Decimal,
}

impl Default for RedemptionPolicy {
    fn default() -> Self {
        Self {
            min_points: 1_000,
            points_per_unit: 1_000,
            discount_per_unit: Decimal::from(10_000),
        }
    }
}

impl RedemptionPolicy {
    /// Check the requested amount on its own
    pub fn validate_amount(&self, points: i64) -> Result<()> {
        if points < 1 {
            return Err(Error::InvalidAmount(format!(
                "redemption must be a positive number of points, got {}",
                points
            )));
        }

        if points < self.min_points {
            return Err(Error::BelowMinimum {
                requested: points,
                minimum: self.min_points,
            });
        }

        Ok(())
    }

    /// Discount granted for `points`
    pub fn discount_for(&self, points: i64) -> Decimal {
        Decimal::from(points) * self.discount_per_unit / Decimal::from(self.points_per_unit)
    }
}

/// Debits may never take a balance below zero
pub fn check_balance(requested: i64, balance: i64) -> Result<()> {
    if requested > balance {
        return Err(Error::InsufficientBalance { requested, balance });
    }
    Ok(())
}

/// Result of a successful redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    /// Discount granted (currency units)
    pub discount: Decimal,
    /// Balance after the REDEEM entry
    pub remaining_balance: i64,
    /// ID of the REDEEM entry
    pub entry_id: Uuid,
}
