// Payment gateway webhook dispatch
//
// The gateway reports the outcome of every intent it was asked for. Events are
// correlated back through the metadata attached when the intent was created.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RentalResult;
use crate::installments::InstallmentService;
use crate::modifications::ModificationService;
use crate::orders::OrderService;
use crate::payments::PaymentMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEventKind {
    Succeeded,
    Failed,
}

/// Body of a gateway callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub kind: GatewayEventKind,
    pub payment_intent_id: String,
    pub metadata: PaymentMetadata,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// What a webhook event ended up updating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "target", content = "id", rename_all = "snake_case")]
pub enum WebhookTarget {
    Installment(Uuid),
    Modification(Uuid),
    Order(Uuid),
}

/// Routes gateway events to the installment, modification or order they
/// belong to
#[derive(Clone)]
pub struct PaymentWebhookHandler {
    orders: OrderService,
    modifications: ModificationService,
    installments: InstallmentService,
}

impl PaymentWebhookHandler {
    pub fn new(orders: OrderService, modifications: ModificationService, installments: InstallmentService) -> Self {
        Self {
            orders,
            modifications,
            installments,
        }
    }

    /// Apply one event
    ///
    /// Installment correlation wins over modification correlation, which wins
    /// over the bare order id.
    pub async fn handle(&self, event: GatewayEvent) -> RentalResult<WebhookTarget> {
        let succeeded = event.kind == GatewayEventKind::Succeeded;
        tracing::info!(
            payment_intent_id = %event.payment_intent_id,
            order_id = %event.metadata.order_id,
            succeeded,
            "Gateway event received"
        );

        if let Some(installment_id) = event.metadata.installment_id {
            if succeeded {
                self.installments
                    .mark_installment_as_paid(installment_id, &event.payment_intent_id)
                    .await?;
            } else {
                let reason = event
                    .failure_reason
                    .unwrap_or_else(|| "payment failed".to_string());
                self.installments
                    .mark_installment_as_failed(installment_id, &reason)
                    .await?;
            }
            return Ok(WebhookTarget::Installment(installment_id));
        }

        if let Some(modification_id) = event.metadata.modification_id {
            self.modifications
                .settle_charge(modification_id, &event.payment_intent_id, succeeded, event.failure_reason)
                .await?;
            return Ok(WebhookTarget::Modification(modification_id));
        }

        self.orders
            .record_gateway_payment(event.metadata.order_id, &event.payment_intent_id, succeeded)
            .await?;
        Ok(WebhookTarget::Order(event.metadata.order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installments::InstallmentStatus;
    use crate::modifications::{AddItemsRequest, ModificationPaymentStatus};
    use crate::notifications::RecordingNotifier;
    use crate::orders::{OrderItemRequest, OrderStatus, PaymentStatus};
    use crate::payments::InMemoryPaymentGateway;
    use crate::store::{InMemoryRentalStore, RentalStore};
    use crate::testing::{self, days_from_now};
    use crate::inventory::RentalPeriod;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<InMemoryRentalStore>,
        gateway: Arc<InMemoryPaymentGateway>,
        installments: InstallmentService,
        modifications: ModificationService,
        handler: PaymentWebhookHandler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRentalStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let gateway = Arc::new(InMemoryPaymentGateway::new());
        let installments = InstallmentService::new(store.clone(), notifier.clone());
        let orders = OrderService::new(store.clone(), notifier.clone(), installments.clone());
        let modifications = ModificationService::new(store.clone(), gateway.clone(), notifier);
        let handler = PaymentWebhookHandler::new(orders, modifications.clone(), installments.clone());
        Fixture {
            store,
            gateway,
            installments,
            modifications,
            handler,
        }
    }

    async fn stored_order(f: &Fixture) -> crate::orders::Order {
        let period = RentalPeriod::new(days_from_now(60), days_from_now(61)).unwrap();
        let speaker = testing::leaf("Speaker", 4);
        f.store.insert_product(speaker.clone()).await;
        testing::reserve(&f.store, &speaker, 1, period).await
    }

    fn event(kind: GatewayEventKind, metadata: PaymentMetadata) -> GatewayEvent {
        GatewayEvent {
            kind,
            payment_intent_id: "pi_000042".to_string(),
            metadata,
            failure_reason: Some("card_declined".to_string()),
        }
    }

    #[tokio::test]
    async fn test_installment_event() {
        let f = fixture();
        let order = stored_order(&f).await;
        let plan = f
            .installments
            .create_installments(order.id, dec!(1000), order.start_date)
            .await
            .unwrap();

        let metadata = PaymentMetadata {
            order_id: order.id,
            installment_id: Some(plan[0].id),
            modification_id: None,
        };
        let target = f
            .handler
            .handle(event(GatewayEventKind::Succeeded, metadata))
            .await
            .unwrap();
        assert_eq!(target, WebhookTarget::Installment(plan[0].id));

        let installments = f.installments.get_installments(order.id).await.unwrap();
        assert_eq!(installments[0].status, InstallmentStatus::Completed);
        assert_eq!(installments[0].gateway_payment_id.as_deref(), Some("pi_000042"));
        let stored = f.store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::PartiallyPaid);
    }

    #[tokio::test]
    async fn test_failed_installment_event_records_reason() {
        let f = fixture();
        let order = stored_order(&f).await;
        let plan = f
            .installments
            .create_installments(order.id, dec!(1000), order.start_date)
            .await
            .unwrap();

        let metadata = PaymentMetadata {
            order_id: order.id,
            installment_id: Some(plan[1].id),
            modification_id: None,
        };
        f.handler
            .handle(event(GatewayEventKind::Failed, metadata))
            .await
            .unwrap();

        let installments = f.installments.get_installments(order.id).await.unwrap();
        assert_eq!(installments[1].status, InstallmentStatus::Failed);
        assert_eq!(installments[1].failure_reason.as_deref(), Some("card_declined"));
    }

    #[tokio::test]
    async fn test_modification_event() {
        let f = fixture();
        let order = stored_order(&f).await;
        let light = testing::leaf("Light", 5);
        f.store.insert_product(light.clone()).await;
        let added = f
            .modifications
            .add_items(
                order.id,
                AddItemsRequest {
                    items: vec![OrderItemRequest {
                        product_id: light.id,
                        quantity: 1,
                        start_date: None,
                        end_date: None,
                        calculator: None,
                    }],
                },
            )
            .await
            .unwrap();

        let metadata = PaymentMetadata {
            order_id: order.id,
            installment_id: None,
            modification_id: Some(added.modification.id),
        };
        let target = f
            .handler
            .handle(event(GatewayEventKind::Succeeded, metadata))
            .await
            .unwrap();
        assert_eq!(target, WebhookTarget::Modification(added.modification.id));

        let stored = f
            .store
            .find_modification(added.modification.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payment_status, ModificationPaymentStatus::Charged);
        assert_eq!(stored.payment_intent_id.as_deref(), Some("pi_000042"));
    }

    #[tokio::test]
    async fn test_refund_event_does_not_reopen_refund() {
        let f = fixture();
        let mut order = stored_order(&f).await;
        order.total = dec!(400);
        f.store.update_order(&order).await.unwrap();
        let cancellation = f.modifications.cancel_with_refund(order.id).await.unwrap();
        assert_eq!(cancellation.refund_amount, dec!(400));
        let admin_id = Uuid::new_v4();
        f.modifications
            .approve_refund(cancellation.modification.id, admin_id)
            .await
            .unwrap();

        let metadata = PaymentMetadata {
            order_id: order.id,
            installment_id: None,
            modification_id: Some(cancellation.modification.id),
        };
        let result = f.handler.handle(event(GatewayEventKind::Failed, metadata)).await;
        assert!(matches!(result, Err(crate::error::RentalError::NoOutstandingCharge(_))));

        let stored = f
            .store
            .find_modification(cancellation.modification.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payment_status, ModificationPaymentStatus::Refunded);

        let again = f
            .modifications
            .approve_refund(cancellation.modification.id, admin_id)
            .await;
        assert!(matches!(again, Err(crate::error::RentalError::AlreadyRefunded(_))));
        assert_eq!(f.gateway.refunds().len(), 1);
    }

    #[tokio::test]
    async fn test_order_event() {
        let f = fixture();
        let order = stored_order(&f).await;

        let target = f
            .handler
            .handle(event(GatewayEventKind::Succeeded, PaymentMetadata::for_order(order.id)))
            .await
            .unwrap();
        assert_eq!(target, WebhookTarget::Order(order.id));

        let stored = f.store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert_eq!(stored.payment_intent_id.as_deref(), Some("pi_000042"));
    }

    #[tokio::test]
    async fn test_unknown_installment_is_not_found() {
        let f = fixture();
        let metadata = PaymentMetadata {
            order_id: Uuid::new_v4(),
            installment_id: Some(Uuid::new_v4()),
            modification_id: None,
        };
        let result = f.handler.handle(event(GatewayEventKind::Succeeded, metadata)).await;
        assert!(matches!(result, Err(crate::error::RentalError::NotFound { .. })));
    }
}
