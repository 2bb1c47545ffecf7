use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::error::{RentalError, RentalResult};
use crate::installments::PaymentInstallment;
use crate::inventory::RentalPeriod;
use crate::pricing::{DeliveryOption, LoyaltyTier, OrderTotals, PriceTier};

/// Order status enum representing the lifecycle of a rental
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    InTransit,
    Delivered,
    Completed,
    Returned,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Returned,
        OrderStatus::Cancelled,
    ];

    /// Convert status to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Returned => "returned",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Orders in these states keep their equipment reserved
    pub fn holds_stock(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Returned | OrderStatus::Completed
        )
    }

    /// Orders whose items are still deducted from the nominal `stock`
    ///
    /// Stock goes back only on cancellation or return, so a completed rental
    /// still has its units checked out.
    pub fn has_stock_checked_out(&self) -> bool {
        !matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    /// Item lists of orders in these states are frozen
    pub fn is_frozen(&self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Completed | OrderStatus::Returned
        )
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Invalid order status: {}", s))
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    PartiallyPaid,
    Paid,
    Failed,
    Refunded,
}

/// Refund outcome stamped on a cancelled order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Full,
    Partial,
    #[serde(rename = "none")]
    #[sqlx(rename = "none")]
    NoRefund,
    /// The approved refund went through the gateway
    Completed,
}

/// Security deposit hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    NotRequired,
    Held,
    Released,
}

/// Domain model representing a rental order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    /// Human-readable, sequential per year (`RNT-2026-00042`)
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub loyalty_tier: LoyaltyTier,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub delivery_cost: Decimal,
    pub tax_amount: Decimal,
    pub deposit_amount: Decimal,
    pub total: Decimal,
    pub deposit_status: DepositStatus,
    pub is_modified: bool,
    pub modification_count: i32,
    pub eligible_for_installments: bool,
    pub is_calculator_event: bool,
    pub payment_intent_id: Option<String>,
    pub refund_amount: Option<Decimal>,
    pub refund_status: Option<RefundStatus>,
    pub return_notes: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn period(&self) -> RentalPeriod {
        RentalPeriod {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

/// Pricing metadata attached by the event calculator flow
///
/// Lines carrying it bundle equipment and labor and are excluded from loyalty
/// discounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CalculatorMetadata {
    #[validate(length(min = 1, message = "Event type is required"))]
    pub event_type: String,
    pub pack_name: Option<String>,
    #[validate(range(min = 0, message = "Attendees cannot be negative"))]
    pub attendees: Option<i32>,
    #[serde(default)]
    pub includes_staff: bool,
    pub labor_cost: Option<Decimal>,
}

impl CalculatorMetadata {
    /// Boundary validation, run before the metadata reaches pricing
    pub fn check(&self) -> RentalResult<()> {
        self.validate()?;
        if self.labor_cost.is_some_and(|cost| cost < Decimal::ZERO) {
            return Err(RentalError::Validation(
                "Labor cost cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Domain model representing one rented line of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_per_day: Decimal,
    pub price_per_unit: Decimal,
    pub total_price: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub calculator: Option<CalculatorMetadata>,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn period(&self) -> RentalPeriod {
        RentalPeriod {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn is_calculator_item(&self) -> bool {
        self.calculator.is_some()
    }
}

/// Request DTO for one line of a new order or an item addition
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Item-specific range, defaults to the order range
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub calculator: Option<CalculatorMetadata>,
}

/// Gateway payment captured by checkout before the order is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedPayment {
    pub payment_intent_id: String,
    pub amount: Decimal,
}

/// Request DTO for creating a new order
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub loyalty_tier: LoyaltyTier,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub delivery: DeliveryOption,
    /// Customer opted into the 3-part payment plan
    #[serde(default)]
    pub eligible_for_installments: bool,
    pub captured_payment: Option<CapturedPayment>,
}

/// Request DTO for updating order status
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Request DTO for marking an order returned
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReturnRequest {
    #[validate(length(max = 2000, message = "Condition notes are limited to 2000 characters"))]
    pub condition_notes: Option<String>,
}

/// Request DTO for pricing a prospective order without reserving anything
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuoteRequest {
    #[serde(default)]
    pub loyalty_tier: LoyaltyTier,
    #[validate(length(min = 1, message = "Quote must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub delivery: DeliveryOption,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub days: i64,
    pub tier: PriceTier,
    pub price_per_unit: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    #[serde(flatten)]
    pub totals: OrderTotals,
}

/// Order aggregate with its lines
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Outcome of `createOrder`
///
/// The installment step is best-effort; `installment_plan_created` reports
/// whether it ran successfully.
#[derive(Debug, Clone, Serialize)]
pub struct OrderCreation {
    pub order: OrderDetails,
    pub installment_plan_created: bool,
    pub installments: Vec<PaymentInstallment>,
}
