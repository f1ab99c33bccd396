//! Balance and tier projection over a user's entries

use crate::{
    tier::Tier,
    types::{EntryType, LedgerEntry},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read model returned by `GetBalance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    /// Lifetime EARN points, ignoring expiry
    pub total_earned: i64,
    /// Absolute sum of REDEEM entries
    pub total_redeemed: i64,
    /// Exact sum of all entries
    pub current_balance: i64,
    /// Tier classified from `total_earned`
    pub tier: Tier,
    /// Earn multiplier of `tier`
    pub tier_multiplier: Decimal,
    /// Free-shipping flag of `tier`
    pub tier_free_ship: bool,
    /// Tier immediately above, if any
    pub next_tier: Option<Tier>,
    /// Points missing to reach `next_tier`
    pub points_to_next_tier: Option<i64>,
}

/// Project a user's entries into a balance response
pub fn project(entries: &[LedgerEntry]) -> BalanceResponse {
    let total_earned = total_earned(entries);
    let total_redeemed: i64 = entries
        .iter()
        .filter(|e| e.entry_type == EntryType::Redeem)
        .fold(0i64, |acc, e| acc.saturating_add(e.points.saturating_abs()));
    let current_balance = balance(entries);

    let tier = Tier::for_lifetime_points(total_earned);
    let next_tier = tier.next();
    let points_to_next_tier =
        next_tier.map(|next| next.min_points().saturating_sub(total_earned).max(0));

    BalanceResponse {
        total_earned,
        total_redeemed,
        current_balance,
        tier,
        tier_multiplier: tier.multiplier(),
        tier_free_ship: tier.free_shipping(),
        next_tier,
        points_to_next_tier,
    }
}

/// Sum of all points, saturating at the `i64` bounds
///
/// The writer refuses any entry that would push a user past the bounds, so on
/// a committed ledger this is the exact sum.
pub fn balance(entries: &[LedgerEntry]) -> i64 {
    entries
        .iter()
        .fold(0i64, |acc, e| acc.saturating_add(e.points))
}

/// Exact sum of all points, `None` on overflow
pub fn checked_balance(entries: &[LedgerEntry]) -> Option<i64> {
    entries
        .iter()
        .try_fold(0i64, |acc, e| acc.checked_add(e.points))
}

/// Sum of positive EARN entries, saturating
pub fn total_earned(entries: &[LedgerEntry]) -> i64 {
    earned(entries).fold(0i64, |acc, points| acc.saturating_add(points))
}

/// Sum of positive EARN entries, `None` on overflow
pub fn checked_total_earned(entries: &[LedgerEntry]) -> Option<i64> {
    earned(entries).try_fold(0i64, |acc, points| acc.checked_add(points))
}

fn earned(entries: &[LedgerEntry]) -> impl Iterator<Item = i64> + '_ {
    entries
        .iter()
        .filter(|e| e.entry_type == EntryType::Earn && e.points > 0)
        .map(|e| e.points)
}
