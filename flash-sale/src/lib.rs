//! Enzara Flash Sales
//!
//! Time-boxed product discounts with limited stock.
//!
//! # Architecture
//!
//! - **Derived State**: Status, price and countdown are computed from the clock on every call
//! - **Sale Book**: Concurrent map of sales; reservations lock only the sale they touch
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use flash_sale::{FlashSale, FlashSaleBook, SaleStatus};
//! use rust_decimal::Decimal;
//!
//! let now = Utc::now();
//! let book = FlashSaleBook::new();
//! let sale_id = book
//!     .register(FlashSale::new(
//!         "SKU-SERUM",
//!         Decimal::from(400_000),
//!         Decimal::from(299_000),
//!         now,
//!         now + Duration::hours(2),
//!         100,
//!     ))
//!     .unwrap();
//!
//! let reservation = book.reserve(sale_id, 1, now).unwrap();
//! assert_eq!(reservation.unit_price, Decimal::from(299_000));
//! assert_eq!(book.get(sale_id).unwrap().status(now), SaleStatus::Active);
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod book;
pub mod countdown;
pub mod error;
pub mod sale;

// Re-exports
pub use book::{FlashSaleBook, Reservation};
pub use countdown::Countdown;
pub use error::{Error, Result};
pub use sale::{FlashSale, SaleStatus, SaleView};
