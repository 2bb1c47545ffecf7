use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{RentalError, RentalResult};
use crate::inventory::AvailabilityChecker;
use crate::modifications::{
    AddItemsRequest, AddItemsResult, CancellationResult, ModificationPaymentStatus, ModificationType,
    ModifyEligibility, OrderModification, RefundPolicy, RemoveItemsRequest, RemoveItemsResult,
};
use crate::notifications::{notify_best_effort, NotificationTemplate, Notifier, Recipient};
use crate::orders::service::{close_order, price_requests, release_stock, reserve_stock};
use crate::orders::{Order, OrderItem, OrderStatus, PaymentStatus, RefundStatus, StatusMachine};
use crate::payments::{PaymentGateway, PaymentMetadata};
use crate::store::{RentalStore, StoreView};

/// Modification & Refund Policy Engine
///
/// Every refund obligation is queued; money only leaves through
/// [`ModificationService::approve_refund`].
#[derive(Clone)]
pub struct ModificationService {
    store: Arc<dyn RentalStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl ModificationService {
    pub fn new(store: Arc<dyn RentalStore>, gateway: Arc<dyn PaymentGateway>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            gateway,
            notifier,
        }
    }

    /// Modification window check for `order` at `now`
    pub fn eligibility(order: &Order, now: DateTime<Utc>) -> ModifyEligibility {
        let reason = if order.status.is_frozen() {
            Some(format!("order is {}", order.status))
        } else if !RefundPolicy::within_modification_window(order.start_date - now) {
            Some("less than 24 hours remain before the rental starts".to_string())
        } else {
            None
        };

        ModifyEligibility {
            can_modify: reason.is_none(),
            reason,
        }
    }

    /// `canModifyOrder(orderId)`
    pub async fn can_modify_order(&self, order_id: Uuid) -> RentalResult<ModifyEligibility> {
        let order = self.load_order(order_id).await?;
        Ok(Self::eligibility(&order, Utc::now()))
    }

    fn ensure_modifiable(order: &Order, now: DateTime<Utc>) -> RentalResult<()> {
        match Self::eligibility(order, now).reason {
            Some(reason) => Err(RentalError::CannotModify(reason)),
            None => Ok(()),
        }
    }

    /// Append items to an order and charge the difference
    ///
    /// The items stay on the order even when the gateway rejects the
    /// additional charge; the modification is then left `ChargeFailed` for
    /// [`ModificationService::retry_additional_charge`].
    pub async fn add_items(&self, order_id: Uuid, request: AddItemsRequest) -> RentalResult<AddItemsResult> {
        request.validate()?;
        let now = Utc::now();
        let mut order = self.load_order(order_id).await?;
        Self::ensure_modifiable(&order, now)?;

        let priced = price_requests(self.store.as_ref(), &request.items, order.period(), now).await?;

        let mut claims = HashMap::new();
        let mut view = StoreView(self.store.as_ref());
        for line in &priced {
            AvailabilityChecker::claim(
                &mut view,
                &line.product,
                line.request.quantity,
                line.period,
                now,
                &mut claims,
            )
            .await?;
        }

        let items: Vec<OrderItem> = priced.into_iter().map(|line| line.into_item(order.id, now)).collect();
        let added: Decimal = items.iter().map(|item| item.total_price).sum();

        self.store.insert_order_items(&items).await?;
        reserve_stock(self.store.as_ref(), &items).await?;

        let previous_total = order.total;
        order.subtotal += added;
        order.total += added;
        order.is_modified = true;
        order.modification_count += 1;
        order.updated_at = now;
        self.store.update_order(&order).await?;

        let mut modification = OrderModification::new(
            order.id,
            ModificationType::AddItems,
            previous_total,
            order.total,
            if added > Decimal::ZERO {
                ModificationPaymentStatus::Pending
            } else {
                ModificationPaymentStatus::NotRequired
            },
            now,
        );
        self.store.insert_modification(&modification).await?;

        let charge_initiated = if added > Decimal::ZERO {
            self.initiate_charge(&mut modification).await?
        } else {
            false
        };

        tracing::info!(
            order_id = %order.id,
            modification_id = %modification.id,
            added = %added,
            charge_initiated,
            "Items added to order"
        );

        Ok(AddItemsResult {
            new_total: order.total,
            modification,
            charge_initiated,
        })
    }

    /// Ask the gateway for the positive difference of `modification`
    ///
    /// Records the outcome on the modification and reports whether the
    /// charge went out. A gateway refusal is not an error here.
    async fn initiate_charge(&self, modification: &mut OrderModification) -> RentalResult<bool> {
        let metadata = PaymentMetadata {
            order_id: modification.order_id,
            installment_id: None,
            modification_id: Some(modification.id),
        };

        let initiated = match self
            .gateway
            .create_payment_intent(modification.difference, metadata)
            .await
        {
            Ok(intent) => {
                modification.payment_status = ModificationPaymentStatus::ChargeInitiated;
                modification.payment_intent_id = Some(intent.id);
                modification.failure_reason = None;
                true
            }
            Err(e) => {
                tracing::warn!(
                    modification_id = %modification.id,
                    "Additional charge failed, items kept: {}",
                    e
                );
                modification.payment_status = ModificationPaymentStatus::ChargeFailed;
                modification.failure_reason = Some(e.to_string());
                false
            }
        };

        modification.updated_at = Utc::now();
        self.store.update_modification(modification).await?;
        Ok(initiated)
    }

    /// Re-send a failed additional charge
    pub async fn retry_additional_charge(&self, modification_id: Uuid) -> RentalResult<OrderModification> {
        let mut modification = self.load_modification(modification_id).await?;
        if modification.payment_status != ModificationPaymentStatus::ChargeFailed {
            return Err(RentalError::Validation(format!(
                "Modification {} has no failed charge to retry",
                modification_id
            )));
        }

        self.initiate_charge(&mut modification).await?;
        Ok(modification)
    }

    /// Settle an additional charge reported by the gateway webhook
    ///
    /// Only positive-difference modifications with a charge still open are
    /// settled. Refund records are never touched here, so a gateway event
    /// about a refund cannot reopen it. A repeated success for an already
    /// charged modification is acknowledged without change.
    pub async fn settle_charge(
        &self,
        modification_id: Uuid,
        payment_intent_id: &str,
        succeeded: bool,
        failure_reason: Option<String>,
    ) -> RentalResult<OrderModification> {
        let mut modification = self.load_modification(modification_id).await?;
        if succeeded
            && modification.payment_status == ModificationPaymentStatus::Charged
            && modification.payment_intent_id.as_deref() == Some(payment_intent_id)
        {
            tracing::debug!(modification_id = %modification.id, "Duplicate charge confirmation ignored");
            return Ok(modification);
        }
        if !modification.awaits_charge() {
            tracing::warn!(
                modification_id = %modification.id,
                payment_status = ?modification.payment_status,
                "Gateway event for a modification with no open charge rejected"
            );
            return Err(RentalError::NoOutstandingCharge(modification_id));
        }

        modification.payment_intent_id = Some(payment_intent_id.to_string());
        if succeeded {
            modification.payment_status = ModificationPaymentStatus::Charged;
            modification.failure_reason = None;
        } else {
            modification.payment_status = ModificationPaymentStatus::ChargeFailed;
            modification.failure_reason = failure_reason;
        }
        modification.updated_at = Utc::now();
        self.store.update_modification(&modification).await?;
        Ok(modification)
    }

    /// Remove items and queue the refund
    ///
    /// Never processes the refund: it waits in [`Self::get_pending_refunds`].
    pub async fn remove_items(&self, order_id: Uuid, request: RemoveItemsRequest) -> RentalResult<RemoveItemsResult> {
        request.validate()?;
        let now = Utc::now();
        let mut order = self.load_order(order_id).await?;
        Self::ensure_modifiable(&order, now)?;

        let items = self.store.find_order_items(order_id).await?;
        let requested: HashSet<Uuid> = request.item_ids.iter().copied().collect();
        if let Some(missing) = requested.iter().find(|id| !items.iter().any(|item| item.id == **id)) {
            return Err(RentalError::not_found("Order item", missing));
        }
        if requested.len() >= items.len() {
            return Err(RentalError::CannotRemoveAll);
        }

        let removed: Vec<OrderItem> = items
            .into_iter()
            .filter(|item| requested.contains(&item.id))
            .collect();
        let refund_amount: Decimal = removed.iter().map(|item| item.total_price).sum();
        let removed_ids: Vec<Uuid> = removed.iter().map(|item| item.id).collect();

        self.store.delete_order_items(order_id, &removed_ids).await?;
        release_stock(self.store.as_ref(), &removed).await?;

        let previous_total = order.total;
        order.subtotal -= refund_amount;
        order.total -= refund_amount;
        order.is_modified = true;
        order.modification_count += 1;
        order.updated_at = now;
        self.store.update_order(&order).await?;

        let modification = OrderModification::new(
            order.id,
            ModificationType::RemoveItems,
            previous_total,
            order.total,
            if refund_amount > Decimal::ZERO {
                ModificationPaymentStatus::Pending
            } else {
                ModificationPaymentStatus::NotRequired
            },
            now,
        );
        self.store.insert_modification(&modification).await?;

        tracing::info!(
            order_id = %order.id,
            modification_id = %modification.id,
            refund = %refund_amount,
            "Items removed, refund queued for approval"
        );

        Ok(RemoveItemsResult {
            modification,
            refund_amount,
            new_total: order.total,
        })
    }

    /// Cancel an order under the tiered refund policy
    ///
    /// Not bound by the 24 hour window: late cancellations are allowed and
    /// simply earn no refund. The refund is queued, never paid here.
    pub async fn cancel_with_refund(&self, order_id: Uuid) -> RentalResult<CancellationResult> {
        let now = Utc::now();
        let mut order = self.load_order(order_id).await?;
        let previous_status = order.status;
        order.status = StatusMachine::transition(previous_status, OrderStatus::Cancelled)?;

        let decision = RefundPolicy::decide(order.start_date - now);
        let refund_amount = decision.amount(order.total);

        let previous_total = order.total;
        order.cancelled_at = Some(now);
        order.refund_amount = Some(refund_amount);
        order.refund_status = Some(decision.status);
        order.updated_at = now;
        close_order(self.store.as_ref(), &order, previous_status).await?;

        let modification = OrderModification::new(
            order.id,
            ModificationType::Cancel,
            previous_total,
            previous_total - refund_amount,
            if refund_amount > Decimal::ZERO {
                ModificationPaymentStatus::Pending
            } else {
                ModificationPaymentStatus::NotRequired
            },
            now,
        );
        self.store.insert_modification(&modification).await?;

        tracing::info!(
            order_id = %order.id,
            refund = %refund_amount,
            refund_status = ?decision.status,
            "Order cancelled with refund policy"
        );

        notify_best_effort(
            self.notifier.as_ref(),
            NotificationTemplate::OrderCancelled,
            Recipient::Customer(order.user_id),
            json!({
                "order_number": order.order_number,
                "refund_amount": refund_amount,
            }),
        )
        .await;

        Ok(CancellationResult {
            modification,
            refund_amount,
            refund_status: decision.status,
            refund_percentage: decision.percentage,
        })
    }

    /// `approveRefund(modificationId, adminId)`
    ///
    /// The only path that moves money back to the customer. The pending
    /// refund is claimed atomically before the gateway is called, so
    /// concurrent approvals pay at most once. A gateway failure propagates
    /// and puts the modification back exactly as it was.
    pub async fn approve_refund(&self, modification_id: Uuid, admin_id: Uuid) -> RentalResult<OrderModification> {
        let original = self.load_modification(modification_id).await?;
        if original.difference >= Decimal::ZERO {
            return Err(RentalError::NoRefund(modification_id));
        }
        Self::ensure_approvable(&original)?;
        let mut order = self.load_order(original.order_id).await?;

        let Some(mut modification) = self.store.claim_refund(modification_id, Utc::now()).await? else {
            let current = self.load_modification(modification_id).await?;
            Self::ensure_approvable(&current)?;
            return Err(RentalError::Conflict(format!(
                "refund {} changed while being approved",
                modification_id
            )));
        };

        let amount = -modification.difference;
        let metadata = PaymentMetadata {
            order_id: order.id,
            installment_id: None,
            modification_id: Some(modification.id),
        };

        let receipt = match self
            .gateway
            .create_refund(order.payment_intent_id.as_deref(), amount, metadata)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(
                    modification_id = %modification.id,
                    "Refund failed at gateway, returned to the approval queue: {}",
                    e
                );
                self.store.update_modification(&original).await?;
                return Err(e.into());
            }
        };

        let now = Utc::now();
        modification.payment_status = ModificationPaymentStatus::Refunded;
        modification.gateway_refund_id = Some(receipt.id.clone());
        modification.approved_by = Some(admin_id);
        modification.approved_at = Some(now);
        modification.updated_at = now;
        self.store.update_modification(&modification).await?;

        if modification.modification_type == ModificationType::Cancel {
            order.refund_status = Some(RefundStatus::Completed);
            order.payment_status = PaymentStatus::Refunded;
            order.updated_at = now;
            self.store.update_order(&order).await?;
        }

        tracing::info!(
            modification_id = %modification.id,
            admin_id = %admin_id,
            refund_id = %receipt.id,
            amount = %amount,
            "Refund approved"
        );

        notify_best_effort(
            self.notifier.as_ref(),
            NotificationTemplate::RefundApproved,
            Recipient::Customer(order.user_id),
            json!({
                "order_number": order.order_number,
                "amount": amount,
            }),
        )
        .await;

        Ok(modification)
    }

    /// Only a refund still waiting in the queue can be approved
    fn ensure_approvable(modification: &OrderModification) -> RentalResult<()> {
        match modification.payment_status {
            ModificationPaymentStatus::Pending => Ok(()),
            ModificationPaymentStatus::Refunded => Err(RentalError::AlreadyRefunded(modification.id)),
            ModificationPaymentStatus::RefundProcessing => Err(RentalError::Conflict(format!(
                "refund {} is already being processed",
                modification.id
            ))),
            _ => Err(RentalError::NoRefund(modification.id)),
        }
    }

    /// Admin worklist: refund obligations awaiting approval
    pub async fn get_pending_refunds(&self) -> RentalResult<Vec<OrderModification>> {
        self.store.pending_refunds().await
    }

    /// Modification history of an order, oldest first
    pub async fn list_modifications(&self, order_id: Uuid) -> RentalResult<Vec<OrderModification>> {
        self.load_order(order_id).await?;
        self.store.find_modifications_by_order(order_id).await
    }

    async fn load_order(&self, order_id: Uuid) -> RentalResult<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Order", order_id))
    }

    async fn load_modification(&self, modification_id: Uuid) -> RentalResult<OrderModification> {
        self.store
            .find_modification(modification_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Modification", modification_id))
    }
}
