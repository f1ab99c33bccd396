//! Expiry of unredeemed EARN points
//!
//! Credits form lots in sequence order. Debits consume the oldest lots
//! first; an EXPIRE entry consumes exactly the lot it references. Whatever
//! remains of a lot past its `expires_at` is due to lapse.

use crate::types::{EntryType, LedgerEntry};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Remainder of one EARN entry that must lapse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lapse {
    /// EARN entry being retired
    pub source_id: Uuid,
    /// Unredeemed points (positive)
    pub points: i64,
}

/// What an expiry run for one user must write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryPlan {
    /// EXPIRE entries to append
    pub lapses: Vec<Lapse>,
    /// Due EARN entries (`expires_at`, id) whose expiry index rows can go
    pub retired: Vec<(DateTime<Utc>, Uuid)>,
}

impl ExpiryPlan {
    /// Nothing to write
    pub fn is_empty(&self) -> bool {
        self.lapses.is_empty() && self.retired.is_empty()
    }

    /// Total points lapsing
    pub fn total_points(&self) -> i64 {
        self.lapses.iter().map(|l| l.points).sum()
    }
}

#[derive(Debug)]
struct Lot {
    id: Uuid,
    entry_type: EntryType,
    expires_at: Option<DateTime<Utc>>,
    remaining: i64,
}

/// Plan expiry for one user's entries (sequence order) at `now`
pub fn plan(entries: &[LedgerEntry], now: DateTime<Utc>) -> ExpiryPlan {
    let lots = remaining_lots(entries);

    let mut plan = ExpiryPlan::default();
    for lot in lots {
        let due = lot.entry_type == EntryType::Earn && lot.expires_at.is_some_and(|at| at <= now);
        if !due {
            continue;
        }

        if let Some(at) = lot.expires_at {
            plan.retired.push((at, lot.id));
        }
        if lot.remaining > 0 {
            plan.lapses.push(Lapse {
                source_id: lot.id,
                points: lot.remaining,
            });
        }
    }

    plan
}

fn remaining_lots(entries: &[LedgerEntry]) -> Vec<Lot> {
    let mut lots: Vec<Lot> = Vec::new();

    for entry in entries {
        if entry.is_credit() {
            lots.push(Lot {
                id: entry.id,
                entry_type: entry.entry_type,
                expires_at: entry.expires_at,
                remaining: entry.points,
            });
            continue;
        }

        let mut owed = entry.points.saturating_abs();

        if entry.entry_type == EntryType::Expire {
            if let Some(lot) = entry
                .reference_id
                .and_then(|id| lots.iter_mut().find(|lot| lot.id == id))
            {
                let taken = owed.min(lot.remaining);
                lot.remaining -= taken;
                owed -= taken;
            }
        }

        for lot in lots.iter_mut().filter(|lot| lot.remaining > 0) {
            if owed == 0 {
                break;
            }
            let taken = owed.min(lot.remaining);
            lot.remaining -= taken;
            owed -= taken;
        }
    }

    lots
}
