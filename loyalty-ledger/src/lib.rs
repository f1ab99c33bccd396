//! Enzara Loyalty Ledger
//!
//! Append-only points ledger with derived balances and tiers.
//!
//! # Architecture
//!
//! - **Ledger Entries**: Balance, lifetime points and tier are folded from entries, never stored
//! - **Single Writer**: One actor validates and commits every debit, so a balance cannot be spent twice
//! - **Hash Chain**: Each user's entries carry a gap-free sequence and a SHA-256 chain
//! - **Batching**: Credits share one RocksDB write
//!
//! # Invariants
//!
//! - No debit takes a balance below zero
//! - Entries are never modified or deleted
//! - One EARN entry per order

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod crypto;
pub mod earning;
pub mod error;
pub mod expiry;
pub mod ledger;
pub mod metrics;
pub mod projection;
pub mod redemption;
pub mod storage;
pub mod tier;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{ExpirySweep, Ledger};
pub use projection::BalanceResponse;
pub use redemption::RedeemResponse;
pub use storage::Storage;
pub use tier::Tier;
pub use types::{EntryType, LedgerEntry, UserId};
