//! Single-writer actor for the loyalty ledger
//!
//! Every write, and every read that must observe prior writes, passes through
//! one Tokio task. Validation of a debit and the write of its entry therefore
//! happen with no other message interleaved, which rules out two redemptions
//! spending the same balance.
//!
//! ```text
//!  LedgerHandle (Clone) ──mpsc (bounded)──▶ LedgerActor (single task)
//!                                            │
//!                credits ─▶ batch ──────────▶│ Storage::append_entries
//!                debits  ─▶ flush, re-read, ─▶│ (one WriteBatch per commit)
//!                           validate, write   │
//! ```
//!
//! Credits (EARN, positive ADMIN_ADJUST) may be batched; callers are only
//! answered once their batch is committed.

use crate::{
    expiry, projection, redemption,
    storage::StorageStats,
    types::{ChainHead, EntryType, LedgerEntry, UserId},
    Error, Result, Storage,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use uuid::Uuid;

/// Cached chain heads are dropped past this many users
const HEAD_CACHE_LIMIT: usize = 100_000;

/// Mailbox capacity
const MAILBOX_CAPACITY: usize = 1_000;

/// Committed debit with the balance it was validated against
#[derive(Debug, Clone)]
pub struct Debit {
    /// Sealed entry
    pub entry: LedgerEntry,
    /// Balance read inside the writer before the entry
    pub balance_before: i64,
    /// Balance after the entry
    pub balance_after: i64,
    /// EXPIRE entries written before the balance was checked
    pub expired: Vec<LedgerEntry>,
}

/// A user's entries read after lapsed lots were expired
#[derive(Debug, Clone, Default)]
pub struct Settled {
    /// Every entry of the user, EXPIRE entries included
    pub entries: Vec<LedgerEntry>,
    /// EXPIRE entries written by this read
    pub expired: Vec<LedgerEntry>,
}

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Append a positive entry
    Credit {
        entry: LedgerEntry,
        response: oneshot::Sender<Result<LedgerEntry>>,
    },

    /// Append a negative entry if the balance covers it
    Debit {
        entry: LedgerEntry,
        response: oneshot::Sender<Result<Debit>>,
    },

    /// Write EXPIRE entries for a user's lapsed lots
    ExpireDue {
        user_id: UserId,
        now: DateTime<Utc>,
        response: oneshot::Sender<Result<Vec<LedgerEntry>>>,
    },

    /// Expire a user's lapsed lots, then read their entries
    Settle {
        user_id: UserId,
        now: DateTime<Utc>,
        response: oneshot::Sender<Result<Settled>>,
    },

    /// Get a user's entries
    GetUserEntries {
        user_id: UserId,
        response: oneshot::Sender<Result<Vec<LedgerEntry>>>,
    },

    /// Get entry by ID
    GetEntry {
        entry_id: Uuid,
        response: oneshot::Sender<Result<LedgerEntry>>,
    },

    /// Users with EARN lots due at `now`
    DueExpiryUsers {
        now: DateTime<Utc>,
        response: oneshot::Sender<Result<Vec<UserId>>>,
    },

    /// Approximate store sizes
    GetStats {
        response: oneshot::Sender<Result<StorageStats>>,
    },

    /// Flush batch immediately
    FlushBatch {
        response: oneshot::Sender<Result<()>>,
    },

    /// Shutdown actor
    Shutdown,
}

#[derive(Debug)]
struct PendingCredit {
    entry: LedgerEntry,
    response: oneshot::Sender<Result<LedgerEntry>>,
}

/// Actor that owns the ledger write path
#[derive(Debug)]
pub struct LedgerActor {
    storage: Arc<Storage>,
    mailbox: mpsc::Receiver<LedgerMessage>,
    batch: Vec<PendingCredit>,
    heads: HashMap<UserId, ChainHead>,
    head_cache_limit: usize,
    max_batch_size: usize,
    batch_timeout: Duration,
    batching_enabled: bool,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        max_batch_size: usize,
        batch_timeout: Duration,
        batching_enabled: bool,
    ) -> Self {
        Self {
            storage,
            mailbox,
            batch: Vec::with_capacity(max_batch_size),
            heads: HashMap::new(),
            head_cache_limit: HEAD_CACHE_LIMIT,
            max_batch_size,
            batch_timeout,
            batching_enabled,
        }
    }

    /// Override how many chain heads are cached before the cache is dropped
    pub fn with_head_cache_limit(mut self, limit: usize) -> Self {
        self.head_cache_limit = limit.max(1);
        self
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut batch_timer = interval(self.batch_timeout);
        batch_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(msg) = self.mailbox.recv() => {
                    if matches!(msg, LedgerMessage::Shutdown) {
                        if let Err(e) = self.flush_batch() {
                            tracing::error!(error = %e, "Failed to flush batch on shutdown");
                        }
                        break;
                    }

                    self.handle_message(msg);

                    if self.batching_enabled && self.batch.len() >= self.max_batch_size {
                        if let Err(e) = self.flush_batch() {
                            tracing::error!(error = %e, "Error flushing full batch");
                        }
                    }
                }

                _ = batch_timer.tick(), if self.batching_enabled && !self.batch.is_empty() => {
                    if let Err(e) = self.flush_batch() {
                        tracing::error!(error = %e, "Error flushing batch on timeout");
                    }
                }

                else => {
                    if let Err(e) = self.flush_batch() {
                        tracing::error!(error = %e, "Failed to flush batch after mailbox closed");
                    }
                    break;
                }
            }
        }

        tracing::info!("Ledger actor stopped");
    }

    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Credit { entry, response } => self.credit(entry, response),

            LedgerMessage::Debit { entry, response } => {
                let _ = response.send(self.debit(entry));
            }

            LedgerMessage::ExpireDue {
                user_id,
                now,
                response,
            } => {
                let result = self.settle(&user_id, now).map(|settled| settled.expired);
                let _ = response.send(result);
            }

            LedgerMessage::Settle {
                user_id,
                now,
                response,
            } => {
                let _ = response.send(self.settle(&user_id, now));
            }

            LedgerMessage::GetUserEntries { user_id, response } => {
                let result = self
                    .flush_batch()
                    .and_then(|_| self.storage.get_user_entries(&user_id));
                let _ = response.send(result);
            }

            LedgerMessage::GetEntry { entry_id, response } => {
                let result = self
                    .flush_batch()
                    .and_then(|_| self.storage.get_entry(entry_id));
                let _ = response.send(result);
            }

            LedgerMessage::DueExpiryUsers { now, response } => {
                let result = self
                    .flush_batch()
                    .and_then(|_| self.storage.due_expiry_users(now));
                let _ = response.send(result);
            }

            LedgerMessage::GetStats { response } => {
                let result = self.flush_batch().and_then(|_| self.storage.get_stats());
                let _ = response.send(result);
            }

            LedgerMessage::FlushBatch { response } => {
                let _ = response.send(self.flush_batch());
            }

            LedgerMessage::Shutdown => {}
        }
    }

    fn credit(&mut self, mut entry: LedgerEntry, response: oneshot::Sender<Result<LedgerEntry>>) {
        if let Err(e) = self.check_credit(&entry) {
            let _ = response.send(Err(e));
            return;
        }

        let head = match self.head_for(&entry.user_id) {
            Ok(head) => head,
            Err(e) => {
                let _ = response.send(Err(e));
                return;
            }
        };

        entry.seal(head.sequence + 1, head.hash, Utc::now());
        self.advance_head(&entry);

        if self.batching_enabled {
            self.batch.push(PendingCredit { entry, response });
            return;
        }

        let result = match self.storage.append_entries(std::slice::from_ref(&entry), &[]) {
            Ok(()) => Ok(entry),
            Err(e) => {
                self.heads.remove(&entry.user_id);
                Err(e)
            }
        };
        let _ = response.send(result);
    }

    fn check_credit(&self, entry: &LedgerEntry) -> Result<()> {
        if !entry.is_credit() {
            return Err(Error::InvalidEntry(format!(
                "{} credit must be positive, got {}",
                entry.entry_type, entry.points
            )));
        }

        self.check_credit_bounds(entry)?;

        if entry.entry_type == EntryType::Earn {
            if let Some(order_id) = &entry.order_id {
                let pending = self
                    .batch
                    .iter()
                    .any(|p| p.entry.order_id.as_deref() == Some(order_id.as_str()));
                if pending || self.storage.find_order(order_id)?.is_some() {
                    return Err(Error::DuplicateOrder(order_id.clone()));
                }
            }
        }

        Ok(())
    }

    /// Reject a credit that would carry the user's balance or lifetime total
    /// past `i64::MAX`
    fn check_credit_bounds(&self, entry: &LedgerEntry) -> Result<()> {
        let mut entries = self.storage.get_user_entries(&entry.user_id)?;
        entries.extend(
            self.batch
                .iter()
                .filter(|p| p.entry.user_id == entry.user_id)
                .map(|p| p.entry.clone()),
        );

        let overflow = || {
            Error::InvalidAmount(format!(
                "credit of {} points would overflow the balance of user {}",
                entry.points, entry.user_id
            ))
        };

        let balance = projection::checked_balance(&entries).ok_or_else(overflow)?;
        balance.checked_add(entry.points).ok_or_else(overflow)?;

        if entry.entry_type == EntryType::Earn {
            let earned = projection::checked_total_earned(&entries).ok_or_else(overflow)?;
            earned.checked_add(entry.points).ok_or_else(overflow)?;
        }

        Ok(())
    }

    fn debit(&mut self, mut entry: LedgerEntry) -> Result<Debit> {
        if !entry.is_debit() {
            return Err(Error::InvalidEntry(format!(
                "{} debit must be negative, got {}",
                entry.entry_type, entry.points
            )));
        }

        let requested = entry.points.checked_neg().ok_or_else(|| {
            Error::InvalidAmount(format!("{} points cannot be debited", entry.points))
        })?;

        let now = Utc::now();
        let Settled { entries, expired } = self.settle(&entry.user_id, now)?;

        let balance_before = projection::checked_balance(&entries).ok_or_else(|| {
            Error::InvariantViolation(format!("balance of user {} overflows", entry.user_id))
        })?;

        if let Err(e) = redemption::check_balance(requested, balance_before) {
            tracing::warn!(
                user_id = %entry.user_id,
                requested,
                balance = balance_before,
                entry_type = %entry.entry_type,
                "Debit rejected"
            );
            return Err(e);
        }

        let head = Self::head_of(&entries);
        entry.seal(head.sequence + 1, head.hash, now);

        self.commit(vec![entry.clone()], &[])?;

        Ok(Debit {
            balance_after: balance_before - requested,
            balance_before,
            entry,
            expired,
        })
    }

    /// Flush, read a user's entries and expire whatever lapsed at `now`
    fn settle(&mut self, user_id: &UserId, now: DateTime<Utc>) -> Result<Settled> {
        self.flush_batch()?;

        let mut entries = self.storage.get_user_entries(user_id)?;
        let expired = self.lapse(user_id, &entries, now)?;
        entries.extend(expired.iter().cloned());

        Ok(Settled { entries, expired })
    }

    fn lapse(
        &mut self,
        user_id: &UserId,
        entries: &[LedgerEntry],
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        let plan = expiry::plan(entries, now);
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let mut head = Self::head_of(entries);
        let mut expired = Vec::with_capacity(plan.lapses.len());
        for lapse in &plan.lapses {
            let mut entry = LedgerEntry::draft(
                user_id.clone(),
                EntryType::Expire,
                -lapse.points,
                "Points expired",
            )
            .with_reference(lapse.source_id);
            entry.seal(head.sequence + 1, head.hash, now);
            head = ChainHead {
                sequence: entry.sequence,
                hash: entry.hash,
            };
            expired.push(entry);
        }

        self.commit(expired.clone(), &plan.retired)?;

        if !expired.is_empty() {
            tracing::info!(
                user_id = %user_id,
                entries = expired.len(),
                points = plan.total_points(),
                "Expired points"
            );
        }

        Ok(expired)
    }

    // Write entries that bypass the batch; keeps the head cache in step
    fn commit(&mut self, entries: Vec<LedgerEntry>, retired: &[(DateTime<Utc>, Uuid)]) -> Result<()> {
        self.storage.append_entries(&entries, retired)?;
        if let Some(last) = entries.last() {
            self.advance_head(last);
        }
        Ok(())
    }

    fn head_for(&mut self, user_id: &UserId) -> Result<ChainHead> {
        if let Some(head) = self.heads.get(user_id) {
            return Ok(*head);
        }

        let entries = self.storage.get_user_entries(user_id)?;
        let head = Self::head_of(&entries);
        self.heads.insert(user_id.clone(), head);
        Ok(head)
    }

    fn head_of(entries: &[LedgerEntry]) -> ChainHead {
        entries
            .last()
            .map(|e| ChainHead {
                sequence: e.sequence,
                hash: e.hash,
            })
            .unwrap_or(ChainHead::GENESIS)
    }

    fn advance_head(&mut self, entry: &LedgerEntry) {
        // Heads of batched entries are not yet in storage and must survive
        if self.heads.len() >= self.head_cache_limit && self.batch.is_empty() {
            self.heads.clear();
        }
        self.heads.insert(
            entry.user_id.clone(),
            ChainHead {
                sequence: entry.sequence,
                hash: entry.hash,
            },
        );
    }

    /// Commit pending credits in one write and answer their callers
    fn flush_batch(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let pending: Vec<PendingCredit> = self.batch.drain(..).collect();
        let entries: Vec<LedgerEntry> = pending.iter().map(|p| p.entry.clone()).collect();

        match self.storage.append_entries(&entries, &[]) {
            Ok(()) => {
                tracing::debug!(entries = entries.len(), "Committed credit batch");
                for p in pending {
                    let _ = p.response.send(Ok(p.entry));
                }
                if self.heads.len() > self.head_cache_limit {
                    self.heads.clear();
                }
                Ok(())
            }
            Err(e) => {
                // Cached heads may point at entries that were never written
                self.heads.clear();
                let message = e.to_string();
                for p in pending {
                    let _ = p.response.send(Err(Error::StoreUnavailable(message.clone())));
                }
                Err(e)
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::StoreUnavailable("ledger writer mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::StoreUnavailable("ledger writer dropped the request".to_string()))?
    }

    /// Append a positive entry
    pub async fn credit(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        self.call(|response| LedgerMessage::Credit { entry, response })
            .await
    }

    /// Append a negative entry if the balance covers it
    pub async fn debit(&self, entry: LedgerEntry) -> Result<Debit> {
        self.call(|response| LedgerMessage::Debit { entry, response })
            .await
    }

    /// Expire a user's lapsed lots
    pub async fn expire_due(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        self.call(|response| LedgerMessage::ExpireDue {
            user_id,
            now,
            response,
        })
        .await
    }

    /// Expire a user's lapsed lots, then read their entries
    pub async fn settle(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Settled> {
        self.call(|response| LedgerMessage::Settle {
            user_id,
            now,
            response,
        })
        .await
    }

    /// Get a user's entries
    pub async fn get_user_entries(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        self.call(|response| LedgerMessage::GetUserEntries { user_id, response })
            .await
    }

    /// Get entry by ID
    pub async fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        self.call(|response| LedgerMessage::GetEntry { entry_id, response })
            .await
    }

    /// Users with EARN lots due at `now`
    pub async fn due_expiry_users(&self, now: DateTime<Utc>) -> Result<Vec<UserId>> {
        self.call(|response| LedgerMessage::DueExpiryUsers { now, response })
            .await
    }

    /// Approximate store sizes
    pub async fn get_stats(&self) -> Result<StorageStats> {
        self.call(|response| LedgerMessage::GetStats { response })
            .await
    }

    /// Flush batch immediately
    pub async fn flush_batch(&self) -> Result<()> {
        self.call(|response| LedgerMessage::FlushBatch { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::StoreUnavailable("ledger writer mailbox closed".to_string()))
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    max_batch_size: usize,
    batch_timeout: Duration,
    batching_enabled: bool,
) -> (LedgerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let actor = LedgerActor::new(storage, rx, max_batch_size, batch_timeout, batching_enabled);

    let task = tokio::spawn(actor.run());

    (LedgerHandle::new(tx), task)
}
