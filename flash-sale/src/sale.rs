//! Flash sale definition and derived state
//!
//! Status and price are functions of the clock and the sold count; neither is
//! ever stored.

use crate::{countdown::Countdown, Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Time-boxed discount on one product with limited stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashSale {
    /// Sale ID
    pub sale_id: Uuid,

    /// Product on sale
    pub product_id: String,

    /// Regular price
    pub original_price: Decimal,

    /// Price while the sale is active
    pub sale_price: Decimal,

    /// Window start (inclusive)
    pub start_time: DateTime<Utc>,

    /// Window end (exclusive)
    pub end_time: DateTime<Utc>,

    /// Units offered at the sale price
    pub stock_limit: u32,

    /// Units reserved so far
    pub sold: u32,
}

/// Sale status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    /// Window not yet open
    Upcoming,
    /// Offered at the sale price
    Active,
    /// In window, no stock left
    SoldOut,
    /// Window closed
    Ended,
}

impl FlashSale {
    /// New sale with nothing sold
    pub fn new(
        product_id: impl Into<String>,
        original_price: Decimal,
        sale_price: Decimal,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        stock_limit: u32,
    ) -> Self {
        Self {
            sale_id: Uuid::now_v7(),
            product_id: product_id.into(),
            original_price,
            sale_price,
            start_time,
            end_time,
            stock_limit,
            sold: 0,
        }
    }

    /// Reject sales that could never be offered consistently
    pub fn validate(&self) -> Result<()> {
        if self.start_time >= self.end_time {
            return Err(Error::InvalidSale(format!(
                "start {} must be before end {}",
                self.start_time, self.end_time
            )));
        }

        if self.sale_price < Decimal::ZERO || self.sale_price > self.original_price {
            return Err(Error::InvalidSale(format!(
                "sale price {} must be between 0 and original price {}",
                self.sale_price, self.original_price
            )));
        }

        if self.stock_limit == 0 {
            return Err(Error::InvalidSale("stock limit must be positive".to_string()));
        }

        if self.sold > self.stock_limit {
            return Err(Error::InvalidSale(format!(
                "sold {} exceeds stock limit {}",
                self.sold, self.stock_limit
            )));
        }

        Ok(())
    }

    /// Status at `now`
    pub fn status(&self, now: DateTime<Utc>) -> SaleStatus {
        if now >= self.end_time {
            SaleStatus::Ended
        } else if now < self.start_time {
            SaleStatus::Upcoming
        } else if self.sold >= self.stock_limit {
            SaleStatus::SoldOut
        } else {
            SaleStatus::Active
        }
    }

    /// Price a customer pays at `now`
    pub fn price_at(&self, now: DateTime<Utc>) -> Decimal {
        match self.status(now) {
            SaleStatus::Active => self.sale_price,
            _ => self.original_price,
        }
    }

    /// Units still available at the sale price
    pub fn remaining(&self) -> u32 {
        self.stock_limit.saturating_sub(self.sold)
    }

    /// Time left until the sale closes
    pub fn countdown(&self, now: DateTime<Utc>) -> Countdown {
        Countdown::until(self.end_time, now)
    }

    /// Time left until the sale opens
    pub fn starts_in(&self, now: DateTime<Utc>) -> Countdown {
        Countdown::until(self.start_time, now)
    }

    /// Percentage off the original price, rounded to whole percent
    pub fn discount_percent(&self) -> Decimal {
        if self.original_price.is_zero() {
            return Decimal::ZERO;
        }
        ((self.original_price - self.sale_price) / self.original_price * Decimal::ONE_HUNDRED)
            .round()
    }

    /// Everything a storefront needs to render the sale at `now`
    pub fn view(&self, now: DateTime<Utc>) -> SaleView {
        let status = self.status(now);
        SaleView {
            sale_id: self.sale_id,
            product_id: self.product_id.clone(),
            status,
            price: self.price_at(now),
            original_price: self.original_price,
            discount_percent: self.discount_percent(),
            remaining: self.remaining(),
            countdown: match status {
                SaleStatus::Active => self.countdown(now),
                SaleStatus::Upcoming => self.starts_in(now),
                SaleStatus::SoldOut | SaleStatus::Ended => Countdown::EXPIRED,
            },
        }
    }
}

/// Derived display state of a sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleView {
    /// Sale ID
    pub sale_id: Uuid,
    /// Product on sale
    pub product_id: String,
    /// Status at render time
    pub status: SaleStatus,
    /// Price charged at render time
    pub price: Decimal,
    /// Regular price
    pub original_price: Decimal,
    /// Percentage off
    pub discount_percent: Decimal,
    /// Units left at the sale price
    pub remaining: u32,
    /// Until close when active, until open when upcoming, zero otherwise
    pub countdown: Countdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sale(now: DateTime<Utc>) -> FlashSale {
        FlashSale::new(
            "SKU-SERUM-30ML",
            Decimal::from(400_000),
            Decimal::from(299_000),
            now - Duration::hours(1),
            now + Duration::hours(2),
            10,
        )
    }

    #[test]
    fn test_status_transitions() {
        let now = Utc::now();
        let mut s = sale(now);

        assert_eq!(s.status(now - Duration::hours(2)), SaleStatus::Upcoming);
        assert_eq!(s.status(s.start_time), SaleStatus::Active);
        assert_eq!(s.status(now), SaleStatus::Active);
        assert_eq!(s.status(s.end_time), SaleStatus::Ended);

        s.sold = 10;
        assert_eq!(s.status(now), SaleStatus::SoldOut);
        assert_eq!(s.status(s.end_time), SaleStatus::Ended);
    }

    #[test]
    fn test_view_consistent_in_last_millisecond() {
        let now = Utc::now();
        let s = sale(now);
        let at = s.end_time - Duration::microseconds(500);

        let view = s.view(at);
        assert_eq!(view.status, SaleStatus::Active);
        assert_eq!(view.price, Decimal::from(299_000));
        assert!(!view.countdown.is_expired());

        let view = s.view(s.end_time);
        assert_eq!(view.status, SaleStatus::Ended);
        assert!(view.countdown.is_expired());
    }

    #[test]
    fn test_price_only_discounted_while_active() {
        let now = Utc::now();
        let s = sale(now);

        assert_eq!(s.price_at(now), Decimal::from(299_000));
        assert_eq!(s.price_at(now + Duration::hours(3)), Decimal::from(400_000));
        assert_eq!(s.price_at(now - Duration::hours(2)), Decimal::from(400_000));
    }

    #[test]
    fn test_validate() {
        let now = Utc::now();
        assert!(sale(now).validate().is_ok());

        let mut s = sale(now);
        s.end_time = s.start_time;
        assert!(matches!(s.validate(), Err(Error::InvalidSale(_))));

        let mut s = sale(now);
        s.sale_price = Decimal::from(500_000);
        assert!(s.validate().is_err());

        let mut s = sale(now);
        s.sale_price = Decimal::from(-1);
        assert!(s.validate().is_err());

        let mut s = sale(now);
        s.stock_limit = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_view() {
        let now = Utc::now();
        let s = sale(now);

        let view = s.view(now);
        assert_eq!(view.status, SaleStatus::Active);
        assert_eq!(view.discount_percent, Decimal::from(25));
        assert_eq!(view.countdown.hours, 2);
        assert_eq!(view.remaining, 10);

        let ended = s.view(now + Duration::hours(5));
        assert_eq!(ended.status, SaleStatus::Ended);
        assert_eq!(ended.price, s.original_price);
        assert!(ended.countdown.is_expired());

        let upcoming = s.view(now - Duration::hours(3));
        assert_eq!(upcoming.status, SaleStatus::Upcoming);
        assert_eq!(upcoming.countdown.hours, 2);
    }
}
