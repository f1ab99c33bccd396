//! Error types for flash sales

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Result type for flash-sale operations
pub type Result<T> = std::result::Result<T, Error>;

/// Flash-sale errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Unknown sale
    #[error("Flash sale not found: {0}")]
    SaleNotFound(Uuid),

    /// Sale window has not opened
    #[error("Flash sale {sale_id} starts at {starts_at}")]
    NotStarted {
        /// Sale ID
        sale_id: Uuid,
        /// Window start
        starts_at: DateTime<Utc>,
    },

    /// Sale window has closed
    #[error("Flash sale {0} has ended")]
    SaleEnded(Uuid),

    /// Not enough stock left at the sale price
    #[error("Flash sale {sale_id} sold out: requested {requested}, remaining {remaining}")]
    SoldOut {
        /// Sale ID
        sale_id: Uuid,
        /// Quantity requested
        requested: u32,
        /// Quantity still available
        remaining: u32,
    },

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Sale definition rejected on registration
    #[error("Invalid flash sale: {0}")]
    InvalidSale(String),
}

impl Error {
    /// Customer-facing outcome rather than a caller bug
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::NotStarted { .. } | Error::SaleEnded(_) | Error::SoldOut { .. }
        )
    }
}
