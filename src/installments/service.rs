use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{RentalError, RentalResult};
use crate::installments::{
    scheduler, InstallmentReminder, InstallmentStatus, PaymentInstallment,
};
use crate::notifications::{notify_best_effort, NotificationTemplate, Notifier, Recipient};
use crate::orders::{Order, PaymentStatus};
use crate::store::RentalStore;

/// Installment Scheduler
///
/// Creates the fixed 3-part plan and applies gateway outcomes to it. Sending
/// reminders belongs to an external job that polls the query methods.
#[derive(Clone)]
pub struct InstallmentService {
    store: Arc<dyn RentalStore>,
    notifier: Arc<dyn Notifier>,
}

impl InstallmentService {
    pub fn new(store: Arc<dyn RentalStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// `createInstallments(orderId, total, eventStartDate)`
    ///
    /// Fails when the order already has a plan. Marks the order eligible for
    /// installments.
    pub async fn create_installments(
        &self,
        order_id: Uuid,
        total: Decimal,
        event_start_date: DateTime<Utc>,
    ) -> RentalResult<Vec<PaymentInstallment>> {
        let mut order = self.load_order(order_id).await?;

        if !self.store.find_installments_by_order(order_id).await?.is_empty() {
            return Err(RentalError::Validation(format!(
                "Order {} already has an installment plan",
                order.order_number
            )));
        }

        let now = Utc::now();
        let plan = scheduler::build_plan(order_id, total, event_start_date, now)?;
        self.store.insert_installments(&plan).await?;

        order.eligible_for_installments = true;
        order.updated_at = now;
        self.store.update_order(&order).await?;

        tracing::info!(
            order_id = %order_id,
            total = %total,
            "Installment plan created: {}",
            plan.iter()
                .map(|installment| installment.amount.to_string())
                .collect::<Vec<_>>()
                .join(" / ")
        );

        Ok(plan)
    }

    /// Record a gateway-confirmed payment of one installment
    ///
    /// Re-delivery of the same confirmation is a no-op.
    pub async fn mark_installment_as_paid(
        &self,
        installment_id: Uuid,
        gateway_payment_id: &str,
    ) -> RentalResult<PaymentInstallment> {
        let mut installment = self.load_installment(installment_id).await?;

        if installment.status == InstallmentStatus::Completed {
            tracing::debug!(installment_id = %installment_id, "Installment already paid");
            return Ok(installment);
        }

        let now = Utc::now();
        installment.status = InstallmentStatus::Completed;
        installment.paid_date = Some(now);
        installment.gateway_payment_id = Some(gateway_payment_id.to_string());
        installment.failure_reason = None;
        installment.updated_at = now;
        self.store.update_installment(&installment).await?;

        let order = self.refresh_order_payment_status(installment.order_id).await?;

        tracing::info!(
            order_id = %installment.order_id,
            installment_id = %installment.id,
            number = installment.installment_number,
            "Installment paid"
        );

        notify_best_effort(
            self.notifier.as_ref(),
            NotificationTemplate::InstallmentPaid,
            Recipient::Customer(order.user_id),
            json!({
                "order_number": order.order_number,
                "installment_number": installment.installment_number,
                "amount": installment.amount,
            }),
        )
        .await;

        Ok(installment)
    }

    /// Record a failed or timed-out installment payment
    pub async fn mark_installment_as_failed(
        &self,
        installment_id: Uuid,
        reason: &str,
    ) -> RentalResult<PaymentInstallment> {
        let mut installment = self.load_installment(installment_id).await?;

        if installment.status == InstallmentStatus::Completed {
            return Err(RentalError::Validation(format!(
                "Installment {} is already paid",
                installment.installment_number
            )));
        }

        installment.status = InstallmentStatus::Failed;
        installment.failure_reason = Some(reason.to_string());
        installment.updated_at = Utc::now();
        self.store.update_installment(&installment).await?;

        tracing::warn!(
            order_id = %installment.order_id,
            installment_id = %installment.id,
            "Installment payment failed: {}",
            reason
        );

        let order = self.load_order(installment.order_id).await?;
        notify_best_effort(
            self.notifier.as_ref(),
            NotificationTemplate::InstallmentFailed,
            Recipient::Customer(order.user_id),
            json!({
                "order_number": order.order_number,
                "installment_number": installment.installment_number,
                "reason": reason,
            }),
        )
        .await;

        Ok(installment)
    }

    pub async fn get_installments(&self, order_id: Uuid) -> RentalResult<Vec<PaymentInstallment>> {
        self.store.find_installments_by_order(order_id).await
    }

    /// Lowest-numbered installment still pending
    pub async fn get_next_pending_installment(&self, order_id: Uuid) -> RentalResult<Option<PaymentInstallment>> {
        Ok(self
            .get_installments(order_id)
            .await?
            .into_iter()
            .find(PaymentInstallment::is_pending))
    }

    /// Pending installments falling due between `now` and `now + days_ahead`
    pub async fn get_upcoming_installments(
        &self,
        days_ahead: i64,
        now: DateTime<Utc>,
    ) -> RentalResult<Vec<PaymentInstallment>> {
        if days_ahead < 0 {
            return Err(RentalError::Validation("days_ahead cannot be negative".to_string()));
        }
        let horizon = now + Duration::days(days_ahead);
        Ok(self
            .store
            .pending_installments_due_before(horizon)
            .await?
            .into_iter()
            .filter(|installment| installment.due_date >= now)
            .collect())
    }

    /// Pending installments whose due date has passed
    pub async fn get_overdue_installments(&self, now: DateTime<Utc>) -> RentalResult<Vec<PaymentInstallment>> {
        self.store.pending_installments_due_before(now).await
    }

    /// Reminders the external job should send at `now`
    pub async fn reminders_due(&self, now: DateTime<Utc>) -> RentalResult<Vec<InstallmentReminder>> {
        let candidates = self
            .store
            .pending_installments_due_before(now + Duration::days(8))
            .await?;

        Ok(candidates
            .into_iter()
            .filter_map(|installment| {
                scheduler::reminder_kind(installment.due_date, now)
                    .map(|kind| InstallmentReminder { kind, installment })
            })
            .collect())
    }

    /// Derive the order payment status from its installments
    async fn refresh_order_payment_status(&self, order_id: Uuid) -> RentalResult<Order> {
        let mut order = self.load_order(order_id).await?;
        let installments = self.store.find_installments_by_order(order_id).await?;

        let paid = installments
            .iter()
            .filter(|installment| installment.status == InstallmentStatus::Completed)
            .count();
        let status = if paid == 0 {
            order.payment_status
        } else if paid == installments.len() {
            PaymentStatus::Paid
        } else {
            PaymentStatus::PartiallyPaid
        };

        if status != order.payment_status {
            order.payment_status = status;
            order.updated_at = Utc::now();
            self.store.update_order(&order).await?;
        }
        Ok(order)
    }

    async fn load_order(&self, order_id: Uuid) -> RentalResult<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Order", order_id))
    }

    async fn load_installment(&self, installment_id: Uuid) -> RentalResult<PaymentInstallment> {
        self.store
            .find_installment(installment_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Installment", installment_id))
    }
}
