use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Completed,
    Failed,
}

/// One scheduled payment of an order's 3-part plan
///
/// Amount and due date never change after creation; only the status and
/// gateway fields move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PaymentInstallment {
    pub id: Uuid,
    pub order_id: Uuid,
    /// 1-based position in the plan
    pub installment_number: i32,
    /// Share of the plan total, in percent (25, 50 or 25)
    pub percentage: Decimal,
    pub amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub status: InstallmentStatus,
    pub paid_date: Option<DateTime<Utc>>,
    pub gateway_payment_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentInstallment {
    pub fn is_pending(&self) -> bool {
        self.status == InstallmentStatus::Pending
    }
}

/// Reminder cadence for pending installments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    SevenDays,
    ThreeDays,
    Overdue,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallmentReminder {
    pub kind: ReminderKind,
    pub installment: PaymentInstallment,
}

/// Request DTO for creating a plan manually
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInstallmentsRequest {
    pub total: Decimal,
    pub event_start_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InstallmentPaidRequest {
    #[validate(length(min = 1, message = "Gateway payment id is required"))]
    pub gateway_payment_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InstallmentFailedRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpcomingQuery {
    #[serde(default = "default_days_ahead")]
    pub days_ahead: i64,
}

fn default_days_ahead() -> i64 {
    7
}
