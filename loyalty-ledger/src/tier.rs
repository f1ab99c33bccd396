//! Membership tiers
//!
//! Tiers are never stored. They are classified from lifetime EARN points on
//! every read, so a ledger correction reclassifies the customer immediately.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Loyalty tier, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Entry tier (Bạc)
    Bac,
    /// 1000+ lifetime points (Vàng)
    Vang,
    /// 5000+ lifetime points (Kim Cương)
    KimCuong,
}

impl Tier {
    /// All tiers in ascending order
    pub const ALL: [Tier; 3] = [Tier::Bac, Tier::Vang, Tier::KimCuong];

    /// Inclusive lower bound on lifetime earned points
    pub fn min_points(&self) -> i64 {
        match self {
            Tier::Bac => 0,
            Tier::Vang => 1_000,
            Tier::KimCuong => 5_000,
        }
    }

    /// Multiplier applied to points earned from orders
    pub fn multiplier(&self) -> Decimal {
        match self {
            Tier::Bac => Decimal::ONE,
            Tier::Vang => Decimal::new(15, 1),
            Tier::KimCuong => Decimal::TWO,
        }
    }

    /// Whether orders ship free
    pub fn free_shipping(&self) -> bool {
        matches!(self, Tier::KimCuong)
    }

    /// Tier immediately above
    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::Bac => Some(Tier::Vang),
            Tier::Vang => Some(Tier::KimCuong),
            Tier::KimCuong => None,
        }
    }

    /// Highest tier whose threshold does not exceed `total_earned`
    pub fn for_lifetime_points(total_earned: i64) -> Tier {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|tier| total_earned >= tier.min_points())
            .unwrap_or(Tier::Bac)
    }

    /// Customer-facing name
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Bac => "Bạc",
            Tier::Vang => "Vàng",
            Tier::KimCuong => "Kim Cương",
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Bac
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
