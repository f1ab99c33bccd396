//! End-to-end redemption and expiry scenarios against a real store

use chrono::{Duration, Utc};
use loyalty_ledger::{Config, EntryType, Error, Ledger, Tier, UserId};
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;

async fn open(batching: bool) -> (Ledger, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.batching.enabled = batching;

    (Ledger::open(config).await.unwrap(), temp_dir)
}

/// EARN +500, EARN +700, REDEEM -1000
async fn seed(ledger: &Ledger, user: &UserId) {
    ledger.record_earn(user, 500, "order A", Some("A")).await.unwrap();
    ledger.record_earn(user, 700, "order B", Some("B")).await.unwrap();
    ledger.redeem(user, 1_000).await.unwrap();
}

#[tokio::test]
async fn test_balance_after_mixed_history() {
    let (ledger, _temp) = open(true).await;
    let user = UserId::new("alice");
    seed(&ledger, &user).await;

    let balance = ledger.get_balance(&user).await.unwrap();
    assert_eq!(balance.total_earned, 1_200);
    assert_eq!(balance.total_redeemed, 1_000);
    assert_eq!(balance.current_balance, 200);
    assert_eq!(balance.tier, Tier::Vang);
    assert_eq!(balance.next_tier, Some(Tier::KimCuong));
    assert_eq!(balance.points_to_next_tier, Some(3_800));

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_insufficient_balance_leaves_ledger_unchanged() {
    let (ledger, _temp) = open(true).await;
    let user = UserId::new("alice");
    seed(&ledger, &user).await;

    let err = ledger.redeem(&user, 1_000).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientBalance {
            requested: 1_000,
            balance: 200
        }
    ));
    assert!(err.is_user_error());
    assert!(!err.is_retryable());

    assert_eq!(ledger.history(&user).await.unwrap().len(), 3);

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_redeem_exact_balance() {
    let (ledger, _temp) = open(false).await;
    let user = UserId::new("bob");

    ledger.record_earn(&user, 2_500, "order", None).await.unwrap();
    let receipt = ledger.redeem(&user, 2_500).await.unwrap();

    assert_eq!(receipt.remaining_balance, 0);
    assert_eq!(receipt.discount, Decimal::from(25_000));

    let history = ledger.history(&user).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].entry_type, EntryType::Redeem);
    assert_eq!(history[1].id, receipt.entry_id);

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_below_minimum_regardless_of_balance() {
    let (ledger, _temp) = open(false).await;
    let user = UserId::new("carol");
    ledger.record_earn(&user, 50_000, "big order", None).await.unwrap();

    assert!(matches!(
        ledger.redeem(&user, 999).await,
        Err(Error::BelowMinimum {
            requested: 999,
            minimum: 1_000
        })
    ));
    assert!(matches!(
        ledger.redeem(&user, 0).await,
        Err(Error::InvalidAmount(_))
    ));
    assert_eq!(ledger.history(&user).await.unwrap().len(), 1);

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_redemptions_never_overdraw() {
    let (ledger, _temp) = open(true).await;
    let ledger = Arc::new(ledger);
    let user = UserId::new("dave");
    ledger.record_earn(&user, 5_000, "order", None).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        let user = user.clone();
        tasks.push(tokio::spawn(async move { ledger.redeem(&user, 1_000).await }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(receipt) => {
                assert!(receipt.remaining_balance >= 0);
                succeeded += 1;
            }
            Err(e) => assert!(matches!(e, Error::InsufficientBalance { .. })),
        }
    }
    assert_eq!(succeeded, 5);

    let balance = ledger.get_balance(&user).await.unwrap();
    assert_eq!(balance.current_balance, 0);
    assert_eq!(balance.total_redeemed, 5_000);
    ledger.audit(&user).await.unwrap();

    let ledger = Arc::try_unwrap(ledger).unwrap();
    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_expiry_is_idempotent_and_keeps_tier() {
    let (ledger, _temp) = open(true).await;
    let user = UserId::new("erin");

    ledger.record_earn(&user, 1_200, "order", Some("E-1")).await.unwrap();
    ledger.redeem(&user, 1_000).await.unwrap();

    let later = Utc::now() + Duration::days(366);
    let expired = ledger.expire_due(&user, later).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].entry_type, EntryType::Expire);
    assert_eq!(expired[0].points, -200);

    assert!(ledger.expire_due(&user, later).await.unwrap().is_empty());
    assert_eq!(ledger.sweep_expired(later).await.unwrap().entries_written, 0);

    let balance = ledger.get_balance(&user).await.unwrap();
    assert_eq!(balance.current_balance, 0);
    assert_eq!(balance.tier, Tier::Vang);

    ledger.audit(&user).await.unwrap();
    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_not_yet_due_points_survive_sweep() {
    let (ledger, _temp) = open(false).await;
    let user = UserId::new("frank");
    ledger.record_earn(&user, 800, "order", None).await.unwrap();

    let sweep = ledger.sweep_expired(Utc::now() + Duration::days(30)).await.unwrap();
    assert_eq!(sweep.users_scanned, 0);
    assert_eq!(ledger.get_balance(&user).await.unwrap().current_balance, 800);

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_entry_json_shape() {
    let (ledger, _temp) = open(false).await;
    let user = UserId::new("gina");
    let entry = ledger.record_earn(&user, 100, "order", Some("G-1")).await.unwrap();

    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["type"], "EARN");
    assert_eq!(json["userId"], "gina");
    assert_eq!(json["orderId"], "G-1");
    assert_eq!(json["points"], 100);

    ledger.shutdown().await.unwrap();
}
