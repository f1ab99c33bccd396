//! Core types for the loyalty ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode in the store, camelCase JSON at the edge)
//! - Exact integer arithmetic for points

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Customer identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum EntryType {
    /// Points accrued from a paid order
    Earn = 1,
    /// Points spent by the customer
    Redeem = 2,
    /// Manual correction by an admin (either sign)
    AdminAdjust = 3,
    /// Lapsed remainder of an EARN entry
    Expire = 4,
}

impl EntryType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Earn => "EARN",
            EntryType::Redeem => "REDEEM",
            EntryType::AdminAdjust => "ADMIN_ADJUST",
            EntryType::Expire => "EXPIRE",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable ledger entry
///
/// `id`, `sequence`, `created_at`, `prev_hash` and `hash` are assigned by the
/// writer when the entry is sealed; drafts built with [`LedgerEntry::draft`]
/// carry placeholders until then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7)
    pub id: Uuid,

    /// Owning customer
    pub user_id: UserId,

    /// Per-user position, starting at 1
    pub sequence: u64,

    /// Signed point delta
    pub points: i64,

    /// Entry kind
    #[serde(rename = "type")]
    pub entry_type: EntryType,

    /// Human-readable reason
    pub description: String,

    /// Order that triggered an EARN entry
    pub order_id: Option<String>,

    /// When the unredeemed remainder of an EARN entry lapses
    pub expires_at: Option<DateTime<Utc>>,

    /// EARN entry an EXPIRE entry retires
    pub reference_id: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Hash of the user's previous entry (zeros for the first)
    pub prev_hash: [u8; 32],

    /// Hash of this entry
    pub hash: [u8; 32],
}

impl LedgerEntry {
    /// Unsealed entry
    pub fn draft(
        user_id: UserId,
        entry_type: EntryType,
        points: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            user_id,
            sequence: 0,
            points,
            entry_type,
            description: description.into(),
            order_id: None,
            expires_at: None,
            reference_id: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            prev_hash: [0u8; 32],
            hash: [0u8; 32],
        }
    }

    /// Attach the originating order
    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// Attach an expiry
    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Attach the entry this one refers to
    pub fn with_reference(mut self, reference_id: Uuid) -> Self {
        self.reference_id = Some(reference_id);
        self
    }

    /// Positive entries add to the balance
    pub fn is_credit(&self) -> bool {
        self.points > 0
    }

    /// Negative entries are validated against the balance
    pub fn is_debit(&self) -> bool {
        self.points < 0
    }

    /// Assign writer-owned fields and compute the chain hash
    pub fn seal(&mut self, sequence: u64, prev_hash: [u8; 32], created_at: DateTime<Utc>) {
        self.id = Uuid::now_v7();
        self.sequence = sequence;
        self.created_at = created_at;
        self.prev_hash = prev_hash;
        self.hash = crate::crypto::hash_entry(self);
    }

    /// Expiry is due at `now` (EARN only)
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.entry_type == EntryType::Earn && self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Last sealed entry of a user's chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    /// Sequence of the last entry (0 when empty)
    pub sequence: u64,
    /// Hash of the last entry (zeros when empty)
    pub hash: [u8; 32],
}

impl ChainHead {
    /// Head of an empty chain
    pub const GENESIS: ChainHead = ChainHead {
        sequence: 0,
        hash: [0u8; 32],
    };
}
