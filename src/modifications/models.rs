use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::orders::{OrderItemRequest, RefundStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    AddItems,
    RemoveItems,
    Cancel,
}

/// Money movement state of a modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ModificationPaymentStatus {
    /// Refund queued, waiting for administrative approval
    Pending,
    /// Additional charge sent to the gateway
    ChargeInitiated,
    Charged,
    ChargeFailed,
    /// Refund claimed by an approval and sent to the gateway
    RefundProcessing,
    Refunded,
    /// Nothing to collect or refund
    NotRequired,
}

/// Audit record of one post-creation change to an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderModification {
    pub id: Uuid,
    pub order_id: Uuid,
    pub modification_type: ModificationType,
    pub previous_total: Decimal,
    pub new_total: Decimal,
    /// Positive: the customer owes more. Negative: refund obligation.
    pub difference: Decimal,
    pub payment_status: ModificationPaymentStatus,
    pub payment_intent_id: Option<String>,
    /// Correlation id of the gateway refund once approved
    pub gateway_refund_id: Option<String>,
    pub failure_reason: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderModification {
    pub fn new(
        order_id: Uuid,
        modification_type: ModificationType,
        previous_total: Decimal,
        new_total: Decimal,
        payment_status: ModificationPaymentStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            modification_type,
            previous_total,
            new_total,
            difference: new_total - previous_total,
            payment_status,
            payment_intent_id: None,
            gateway_refund_id: None,
            failure_reason: None,
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A refund obligation no admin has processed yet
    pub fn is_pending_refund(&self) -> bool {
        self.difference < Decimal::ZERO && self.payment_status == ModificationPaymentStatus::Pending
    }

    /// An additional charge a gateway event may still settle
    pub fn awaits_charge(&self) -> bool {
        self.difference > Decimal::ZERO
            && matches!(
                self.payment_status,
                ModificationPaymentStatus::Pending
                    | ModificationPaymentStatus::ChargeInitiated
                    | ModificationPaymentStatus::ChargeFailed
            )
    }
}

/// Request DTO for adding items to an existing order
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemsRequest {
    #[validate(length(min = 1, message = "At least one item must be added"))]
    pub items: Vec<OrderItemRequest>,
}

/// Request DTO for removing items from an existing order
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RemoveItemsRequest {
    #[validate(length(min = 1, message = "At least one item id is required"))]
    pub item_ids: Vec<Uuid>,
}

/// Request DTO for refund approval
#[derive(Debug, Clone, Deserialize)]
pub struct ApproveRefundRequest {
    pub admin_id: Uuid,
}

/// Whether an order can currently be modified, with the reason when not
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifyEligibility {
    pub can_modify: bool,
    pub reason: Option<String>,
}

/// Outcome of `addItems`
#[derive(Debug, Clone, Serialize)]
pub struct AddItemsResult {
    pub modification: OrderModification,
    pub new_total: Decimal,
    /// False when the gateway rejected the additional charge; items stay added
    pub charge_initiated: bool,
}

/// Outcome of `removeItems`
#[derive(Debug, Clone, Serialize)]
pub struct RemoveItemsResult {
    pub modification: OrderModification,
    pub refund_amount: Decimal,
    pub new_total: Decimal,
}

/// Outcome of `cancelWithRefund`
#[derive(Debug, Clone, Serialize)]
pub struct CancellationResult {
    pub modification: OrderModification,
    pub refund_amount: Decimal,
    pub refund_status: RefundStatus,
    pub refund_percentage: Decimal,
}
