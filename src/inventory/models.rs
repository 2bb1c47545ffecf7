use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RentalError, RentalResult};

/// A rentable catalog entry: either a leaf product with its own stock, or a
/// pack that reserves stock on its components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price_per_day: Decimal,
    /// Flat price for 2-3 day rentals
    pub price_per_weekend: Option<Decimal>,
    /// Price per started week for rentals of 7 days or more
    pub price_per_week: Option<Decimal>,
    /// Nominal stock, decremented on reservation
    pub stock: i32,
    /// Physical stock, authoritative when present
    pub real_stock: Option<i32>,
    pub custom_deposit: Option<Decimal>,
    pub is_pack: bool,
    pub components: Vec<PackComponent>,
    /// Usage counter, incremented every time the product is reserved
    pub times_rented: i32,
}

impl Product {
    /// Stock the availability checker works from
    ///
    /// `real_stock` when present. Otherwise the nominal stock before
    /// reservations: `stock` already has `checked_out` units deducted.
    pub fn effective_stock(&self, checked_out: i32) -> i32 {
        self.real_stock.unwrap_or(self.stock + checked_out).max(0)
    }

    /// A product is decomposed into components only when flagged as a pack
    /// and actually carrying components
    pub fn is_composite(&self) -> bool {
        self.is_pack && !self.components.is_empty()
    }
}

/// One `(component, quantityPerPack)` pair of a pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackComponent {
    pub component_id: Uuid,
    pub quantity: i32,
}

/// Inclusive date range of a rental
///
/// Both boundary days belong to the rental: two periods sharing a boundary
/// day conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RentalPeriod {
    /// Build a period, rejecting an end before the start
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> RentalResult<Self> {
        if end < start {
            return Err(RentalError::Validation(format!(
                "End date {} is before start date {}",
                end.format("%Y-%m-%d"),
                start.format("%Y-%m-%d")
            )));
        }
        Ok(Self { start, end })
    }

    /// `existing.start <= query.end AND existing.end >= query.start`
    pub fn overlaps(&self, other: &RentalPeriod) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// Number of billed days, inclusive of both endpoints
    pub fn days(&self) -> i64 {
        let seconds = (self.end - self.start).num_seconds().max(0);
        let whole_days = (seconds + Duration::days(1).num_seconds() - 1) / Duration::days(1).num_seconds();
        whole_days + 1
    }
}

/// Result of an availability check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub available_qty: i32,
}

/// Query string of `GET /products/:id/availability`
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub quantity: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Signed stock change for one leaf product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockAdjustment {
    pub product_id: Uuid,
    pub delta: i32,
}
