//! Error types for the loyalty ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Requested amount is not a positive quantity
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Redemption request below the minimum redemption unit
    #[error("Redemption of {requested} points is below the minimum of {minimum}")]
    BelowMinimum {
        /// Points requested
        requested: i64,
        /// Configured minimum
        minimum: i64,
    },

    /// Debit would take the balance below zero
    #[error("Insufficient balance: requested {requested} points, available {balance}")]
    InsufficientBalance {
        /// Points requested
        requested: i64,
        /// Balance at validation time
        balance: i64,
    },

    /// Ledger store could not be read or written (transient)
    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Entry rejected before reaching the store
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// An EARN entry already exists for this order
    #[error("Order already credited: {0}")]
    DuplicateOrder(String),

    /// Entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Ledger chain or sequence broken
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }

    /// Correctable by the customer; surfaced verbatim
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount(_) | Error::BelowMinimum { .. } | Error::InsufficientBalance { .. }
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidAmount(_) => "invalid_amount",
            Error::BelowMinimum { .. } => "below_minimum",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::Serialization(_) => "serialization",
            Error::InvalidEntry(_) => "invalid_entry",
            Error::DuplicateOrder(_) => "duplicate_order",
            Error::EntryNotFound(_) => "entry_not_found",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Config(_) => "config",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}
