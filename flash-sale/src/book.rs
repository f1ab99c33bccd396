//! Concurrent registry of flash sales
//!
//! Reservations lock only the sale they touch; the status check and the stock
//! increment happen under the same shard lock, so two buyers cannot both take
//! the last unit.

use crate::{
    sale::{FlashSale, SaleStatus},
    Error, Result,
};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Stock taken at the sale price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Sale the stock came from
    pub sale_id: Uuid,
    /// Product reserved
    pub product_id: String,
    /// Units reserved
    pub quantity: u32,
    /// Price per unit
    pub unit_price: Decimal,
    /// `unit_price * quantity`
    pub total: Decimal,
}

/// Flash-sale book shared by request handlers
#[derive(Debug, Clone, Default)]
pub struct FlashSaleBook {
    // Map: sale_id -> sale
    sales: Arc<DashMap<Uuid, FlashSale>>,
}

impl FlashSaleBook {
    /// Create empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validated sale
    pub fn register(&self, sale: FlashSale) -> Result<Uuid> {
        sale.validate()?;

        let sale_id = sale.sale_id;
        match self.sales.entry(sale_id) {
            Entry::Occupied(_) => Err(Error::InvalidSale(format!(
                "sale {} already registered",
                sale_id
            ))),
            Entry::Vacant(slot) => {
                tracing::info!(
                    sale_id = %sale_id,
                    product_id = %sale.product_id,
                    start = %sale.start_time,
                    end = %sale.end_time,
                    stock = sale.stock_limit,
                    "Registered flash sale"
                );
                slot.insert(sale);
                Ok(sale_id)
            }
        }
    }

    /// Take `quantity` units at the sale price
    pub fn reserve(&self, sale_id: Uuid, quantity: u32, now: DateTime<Utc>) -> Result<Reservation> {
        if quantity == 0 {
            return Err(Error::InvalidQuantity(
                "reservation quantity must be positive".to_string(),
            ));
        }

        let mut entry = self
            .sales
            .get_mut(&sale_id)
            .ok_or(Error::SaleNotFound(sale_id))?;
        let sale = entry.value_mut();

        match sale.status(now) {
            SaleStatus::Upcoming => {
                return Err(Error::NotStarted {
                    sale_id,
                    starts_at: sale.start_time,
                })
            }
            SaleStatus::Ended => return Err(Error::SaleEnded(sale_id)),
            SaleStatus::SoldOut | SaleStatus::Active => {}
        }

        let remaining = sale.remaining();
        if quantity > remaining {
            tracing::debug!(sale_id = %sale_id, quantity, remaining, "Reservation exceeds stock");
            return Err(Error::SoldOut {
                sale_id,
                requested: quantity,
                remaining,
            });
        }

        sale.sold += quantity;
        let unit_price = sale.sale_price;

        tracing::debug!(
            sale_id = %sale_id,
            quantity,
            sold = sale.sold,
            stock = sale.stock_limit,
            "Reserved flash-sale stock"
        );

        Ok(Reservation {
            sale_id,
            product_id: sale.product_id.clone(),
            quantity,
            unit_price,
            total: unit_price * Decimal::from(quantity),
        })
    }

    /// Return stock from a cancelled order; returns the new sold count
    pub fn release(&self, sale_id: Uuid, quantity: u32) -> Result<u32> {
        let mut entry = self
            .sales
            .get_mut(&sale_id)
            .ok_or(Error::SaleNotFound(sale_id))?;
        let sale = entry.value_mut();

        if quantity > sale.sold {
            tracing::warn!(
                sale_id = %sale_id,
                quantity,
                sold = sale.sold,
                "Release exceeds reserved stock"
            );
        }
        sale.sold = sale.sold.saturating_sub(quantity);

        Ok(sale.sold)
    }

    /// Sales offered at the sale price at `now`, ending soonest first
    pub fn active_sales(&self, now: DateTime<Utc>) -> Vec<FlashSale> {
        let mut active: Vec<FlashSale> = self
            .sales
            .iter()
            .filter(|entry| entry.value().status(now) == SaleStatus::Active)
            .map(|entry| entry.value().clone())
            .collect();
        active.sort_by_key(|s| (s.end_time, s.sale_id));
        active
    }

    /// Snapshot of a sale
    pub fn get(&self, sale_id: Uuid) -> Option<FlashSale> {
        self.sales.get(&sale_id).map(|entry| entry.value().clone())
    }

    /// Drop a sale from the book
    pub fn remove(&self, sale_id: Uuid) -> Option<FlashSale> {
        self.sales.remove(&sale_id).map(|(_, sale)| sale)
    }

    /// Number of registered sales
    pub fn len(&self) -> usize {
        self.sales.len()
    }

    /// No sales registered
    pub fn is_empty(&self) -> bool {
        self.sales.is_empty()
    }
}
