//! Main ledger orchestration layer
//!
//! Ties the writer actor, the projection and the redemption and earning
//! policies into the API the rest of the shop calls.
//!
//! # Example
//!
//! ```no_run
//! use loyalty_ledger::{Config, Ledger, UserId};
//!
//! #[tokio::main]
//! async fn main() -> loyalty_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!     let user = UserId::new("user-42");
//!
//!     let balance = ledger.get_balance(&user).await?;
//!     if balance.current_balance >= 1_000 {
//!         let receipt = ledger.redeem(&user, 1_000).await?;
//!         println!("discount: {}", receipt.discount);
//!     }
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    crypto,
    metrics::Metrics,
    projection::{self, BalanceResponse},
    redemption::RedeemResponse,
    storage::StorageStats,
    tier::Tier,
    types::{ChainHead, EntryType, LedgerEntry, UserId},
    Config, Error, Result, Storage,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use uuid::Uuid;

/// Outcome of one expiry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpirySweep {
    /// Users with a due lot
    pub users_scanned: usize,
    /// EXPIRE entries written
    pub entries_written: usize,
    /// Points removed
    pub points_expired: i64,
    /// Users whose expiry failed and stays due
    pub failures: usize,
}

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle; every read and write goes through it
    handle: LedgerHandle,

    /// Actor task, awaited on shutdown so the store is closed
    task: JoinHandle<()>,

    metrics: Metrics,

    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new()?;

        let (handle, task) = spawn_ledger_actor(
            storage,
            config.batching.max_batch_size,
            Duration::from_millis(config.batching.batch_timeout_ms),
            config.batching.enabled,
        );

        tracing::info!(
            data_dir = %config.data_dir.display(),
            batching = config.batching.enabled,
            "Loyalty ledger opened"
        );

        Ok(Self {
            handle,
            task,
            metrics,
            config,
        })
    }

    /// Balance and tier derived from the user's entries
    ///
    /// Lots that lapsed since the last sweep are expired first, so the balance
    /// never includes points that can no longer be spent.
    pub async fn get_balance(&self, user_id: &UserId) -> Result<BalanceResponse> {
        let settled = self.handle.settle(user_id.clone(), Utc::now()).await?;
        self.record_expired(&settled.expired);
        Ok(projection::project(&settled.entries))
    }

    /// Spend `points` for a discount
    ///
    /// Amount checks run here; the balance check runs inside the writer so
    /// concurrent redemptions cannot both pass it.
    pub async fn redeem(&self, user_id: &UserId, points: i64) -> Result<RedeemResponse> {
        let start = Instant::now();
        let policy = &self.config.redemption;

        if let Err(e) = policy.validate_amount(points) {
            self.metrics.record_rejection(e.kind());
            return Err(e);
        }

        let entry = LedgerEntry::draft(
            user_id.clone(),
            EntryType::Redeem,
            -points,
            format!("Redeemed {} points", points),
        );

        let debit = match self.handle.debit(entry).await {
            Ok(debit) => debit,
            Err(e) => {
                self.metrics.record_rejection(e.kind());
                return Err(e);
            }
        };

        self.record_expired(&debit.expired);

        let discount = policy.discount_for(points);
        self.metrics
            .record_redemption(points, start.elapsed().as_secs_f64());

        tracing::info!(
            user_id = %user_id,
            points,
            discount = %discount,
            remaining = debit.balance_after,
            entry_id = %debit.entry.id,
            "Points redeemed"
        );

        Ok(RedeemResponse {
            discount,
            remaining_balance: debit.balance_after,
            entry_id: debit.entry.id,
        })
    }

    /// Credit points for a completed order at the user's current tier
    ///
    /// Returns `None` when the order is too small to earn a point.
    pub async fn earn_for_order(
        &self,
        user_id: &UserId,
        order_id: &str,
        order_total: Decimal,
    ) -> Result<Option<LedgerEntry>> {
        let entries = self.handle.get_user_entries(user_id.clone()).await?;
        let tier = Tier::for_lifetime_points(projection::total_earned(&entries));

        let points = self.config.earning.points_for_order(order_total, tier)?;
        if points == 0 {
            tracing::debug!(user_id = %user_id, order_id, %order_total, "Order earns no points");
            return Ok(None);
        }

        let entry = self
            .record_earn(
                user_id,
                points,
                format!("Order {} ({} x{})", order_id, tier, tier.multiplier()),
                Some(order_id),
            )
            .await?;

        Ok(Some(entry))
    }

    /// Credit precomputed EARN points
    pub async fn record_earn(
        &self,
        user_id: &UserId,
        points: i64,
        description: impl Into<String>,
        order_id: Option<&str>,
    ) -> Result<LedgerEntry> {
        if points < 1 {
            return Err(Error::InvalidAmount(format!(
                "earned points must be positive, got {}",
                points
            )));
        }

        let expires_at = self.config.earning.expiry_from(Utc::now())?;
        let mut draft = LedgerEntry::draft(user_id.clone(), EntryType::Earn, points, description)
            .with_expiry(expires_at);
        if let Some(order_id) = order_id {
            draft = draft.with_order(order_id);
        }

        let entry = self.handle.credit(draft).await?;
        self.metrics.record_entries(EntryType::Earn, 1);

        tracing::debug!(
            user_id = %user_id,
            points,
            sequence = entry.sequence,
            order_id = ?entry.order_id,
            "Points earned"
        );

        Ok(entry)
    }

    /// Manual correction by support staff
    pub async fn admin_adjust(
        &self,
        user_id: &UserId,
        points: i64,
        description: impl Into<String>,
    ) -> Result<LedgerEntry> {
        if points == 0 {
            return Err(Error::InvalidAmount(
                "adjustment must not be zero".to_string(),
            ));
        }
        if points == i64::MIN {
            return Err(Error::InvalidAmount(format!(
                "adjustment of {} points is out of range",
                points
            )));
        }

        let description = description.into();
        if description.trim().is_empty() {
            return Err(Error::InvalidEntry(
                "adjustment requires a description".to_string(),
            ));
        }

        let draft = LedgerEntry::draft(user_id.clone(), EntryType::AdminAdjust, points, description);
        let entry = if points > 0 {
            self.handle.credit(draft).await?
        } else {
            let debit = self.handle.debit(draft).await?;
            self.record_expired(&debit.expired);
            debit.entry
        };

        self.metrics.record_entries(EntryType::AdminAdjust, 1);
        tracing::info!(user_id = %user_id, points, entry_id = %entry.id, "Balance adjusted");

        Ok(entry)
    }

    /// Write EXPIRE entries for the user's lots due at `now`
    pub async fn expire_due(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        let expired = self.handle.expire_due(user_id.clone(), now).await?;
        self.record_expired(&expired);
        Ok(expired)
    }

    fn record_expired(&self, expired: &[LedgerEntry]) {
        let points = expired
            .iter()
            .fold(0i64, |acc, e| acc.saturating_add(e.points));
        self.metrics.record_expired(expired.len(), points);
    }

    /// Expire every user with a due lot
    ///
    /// A failure for one user is logged and counted; that user stays in the
    /// expiry index and is retried on the next sweep.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<ExpirySweep> {
        let users = self.handle.due_expiry_users(now).await?;
        let mut sweep = ExpirySweep {
            users_scanned: users.len(),
            ..ExpirySweep::default()
        };

        for user_id in users {
            match self.expire_due(&user_id, now).await {
                Ok(expired) => {
                    sweep.entries_written += expired.len();
                    sweep.points_expired += expired.iter().map(|e| e.points.abs()).sum::<i64>();
                }
                Err(e) => {
                    sweep.failures += 1;
                    tracing::error!(user_id = %user_id, error = %e, "Expiry failed");
                }
            }
        }

        if sweep.users_scanned > 0 {
            tracing::info!(
                users = sweep.users_scanned,
                entries = sweep.entries_written,
                points = sweep.points_expired,
                failures = sweep.failures,
                "Expiry sweep finished"
            );
        }

        Ok(sweep)
    }

    /// A user's entries in sequence order
    pub async fn history(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>> {
        self.handle.get_user_entries(user_id.clone()).await
    }

    /// Get entry by ID
    pub async fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        self.handle.get_entry(entry_id).await
    }

    /// Verify the user's sequence numbers and hash chain
    pub async fn audit(&self, user_id: &UserId) -> Result<ChainHead> {
        let entries = self.handle.get_user_entries(user_id.clone()).await?;
        crypto::verify_chain(&entries).map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "Ledger audit failed");
            e
        })
    }

    /// Approximate store sizes
    pub async fn stats(&self) -> Result<StorageStats> {
        self.handle.get_stats().await
    }

    /// Flush batch immediately (for testing/shutdown)
    pub async fn flush_batch(&self) -> Result<()> {
        self.handle.flush_batch().await
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flush pending credits and close the store
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        self.task
            .await
            .map_err(|e| Error::StoreUnavailable(format!("ledger writer panicked: {}", e)))?;
        tracing::info!("Loyalty ledger closed");
        Ok(())
    }
}
