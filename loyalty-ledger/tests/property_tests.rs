//! Property-based tests for ledger invariants
//!
//! - Balance is the exact sum of entry points
//! - Lifetime points never decrease as EARN entries are appended
//! - Tier thresholds are inclusive lower bounds
//! - No sequence of redemptions or expiries drives a balance negative

use chrono::{Duration, Utc};
use loyalty_ledger::{
    expiry,
    projection::{self, BalanceResponse},
    redemption::RedemptionPolicy,
    types::{ChainHead, EntryType, LedgerEntry, UserId},
    Config, Error, Ledger, Tier,
};
use proptest::prelude::*;
use tempfile::TempDir;

/// Strategy for generating signed entries of any type
fn entry_strategy() -> impl Strategy<Value = (EntryType, i64)> {
    prop_oneof![
        (1i64..5_000).prop_map(|p| (EntryType::Earn, p)),
        (1i64..5_000).prop_map(|p| (EntryType::Redeem, -p)),
        (-2_000i64..2_000)
            .prop_filter("non-zero", |p| *p != 0)
            .prop_map(|p| (EntryType::AdminAdjust, p)),
        (1i64..2_000).prop_map(|p| (EntryType::Expire, -p)),
    ]
}

/// Seal raw entries into one user's chain
fn chain(raw: &[(EntryType, i64)]) -> Vec<LedgerEntry> {
    let user = UserId::new("prop-user");
    let mut head = ChainHead::GENESIS;
    raw.iter()
        .map(|(entry_type, points)| {
            let mut entry = LedgerEntry::draft(user.clone(), *entry_type, *points, "prop");
            entry.seal(head.sequence + 1, head.hash, Utc::now());
            head = ChainHead {
                sequence: entry.sequence,
                hash: entry.hash,
            };
            entry
        })
        .collect()
}

/// Create test ledger with temp directory
async fn create_test_ledger() -> (Ledger, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.batching.enabled = false;

    (Ledger::open(config).await.unwrap(), temp_dir)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: currentBalance is the exact sum of points
    #[test]
    fn prop_balance_is_exact_sum(raw in prop::collection::vec(entry_strategy(), 0..60)) {
        let entries = chain(&raw);
        let expected: i64 = raw.iter().map(|(_, p)| p).sum();

        let view = projection::project(&entries);
        prop_assert_eq!(view.current_balance, expected);
        prop_assert_eq!(projection::balance(&entries), expected);
    }

    /// Property: appending EARN never lowers totalEarned or the tier
    #[test]
    fn prop_total_earned_monotonic(
        raw in prop::collection::vec(entry_strategy(), 0..40),
        earned in 1i64..10_000,
    ) {
        let mut entries = chain(&raw);
        let before: BalanceResponse = projection::project(&entries);

        let mut extra = raw.clone();
        extra.push((EntryType::Earn, earned));
        entries = chain(&extra);
        let after = projection::project(&entries);

        prop_assert_eq!(after.total_earned, before.total_earned + earned);
        prop_assert!(after.tier >= before.tier);
    }

    /// Property: tier is the highest threshold not above lifetime points
    #[test]
    fn prop_tier_thresholds(total in 0i64..20_000) {
        let tier = Tier::for_lifetime_points(total);
        prop_assert!(tier.min_points() <= total);
        if let Some(next) = tier.next() {
            prop_assert!(total < next.min_points());
        }
    }

    /// Property: amounts under the minimum are refused whatever the balance
    #[test]
    fn prop_below_minimum_rejected(points in 1i64..1_000) {
        let policy = RedemptionPolicy::default();
        let is_below_minimum = matches!(
            policy.validate_amount(points),
            Err(Error::BelowMinimum { .. })
        );
        prop_assert!(is_below_minimum);
    }

    /// Property: an expiry plan never lapses more than the balance
    #[test]
    fn prop_expiry_bounded_by_balance(
        earns in prop::collection::vec(1i64..3_000, 1..10),
        spend in 0i64..20_000,
    ) {
        let user = UserId::new("prop-user");
        let created = Utc::now() - Duration::days(400);
        let mut head = ChainHead::GENESIS;
        let mut entries = Vec::new();

        for points in &earns {
            let mut entry = LedgerEntry::draft(user.clone(), EntryType::Earn, *points, "old")
                .with_expiry(Some(created + Duration::days(365)));
            entry.seal(head.sequence + 1, head.hash, created);
            head = ChainHead { sequence: entry.sequence, hash: entry.hash };
            entries.push(entry);
        }

        let total: i64 = earns.iter().sum();
        let spent = spend.min(total);
        if spent > 0 {
            let mut entry = LedgerEntry::draft(user, EntryType::Redeem, -spent, "spend");
            entry.seal(head.sequence + 1, head.hash, created);
            entries.push(entry);
        }

        let plan = expiry::plan(&entries, Utc::now());
        prop_assert_eq!(plan.total_points(), total - spent);
        prop_assert_eq!(projection::balance(&entries) - plan.total_points(), 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: no interleaving of earns and redemptions overdraws
    #[test]
    fn prop_ledger_never_negative(ops in prop::collection::vec((any::<bool>(), 500i64..3_000), 1..15)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger().await;
            let user = UserId::new("prop-user");

            for (is_earn, points) in ops {
                if is_earn {
                    ledger.record_earn(&user, points, "prop", None).await.unwrap();
                } else {
                    match ledger.redeem(&user, points).await {
                        Ok(receipt) => prop_assert!(receipt.remaining_balance >= 0),
                        Err(e) => prop_assert!(e.is_user_error()),
                    }
                }

                let balance = ledger.get_balance(&user).await.unwrap();
                prop_assert!(balance.current_balance >= 0);
            }

            ledger.audit(&user).await.unwrap();
            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}
