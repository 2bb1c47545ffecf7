use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Errors reported by the payment gateway collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Unknown payment intent: {0}")]
    UnknownPaymentIntent(String),

    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),
}

/// Correlation data attached to every intent and echoed back by webhooks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub order_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_id: Option<Uuid>,
}

impl PaymentMetadata {
    pub fn for_order(order_id: Uuid) -> Self {
        Self {
            order_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresCapture,
    Succeeded,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: Decimal,
    pub status: IntentStatus,
    pub metadata: PaymentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundReceipt {
    /// Gateway correlation id of the refund
    pub id: String,
    pub amount: Decimal,
    pub payment_intent_id: Option<String>,
}

/// External payment processor
///
/// Amounts are in the shop currency with two decimals.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        metadata: PaymentMetadata,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn capture_payment_intent(&self, payment_intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    async fn cancel_payment_intent(&self, payment_intent_id: &str) -> Result<(), GatewayError>;

    async fn create_refund(
        &self,
        payment_intent_id: Option<&str>,
        amount: Decimal,
        metadata: PaymentMetadata,
    ) -> Result<RefundReceipt, GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<String, PaymentIntent>,
    refunds: Vec<RefundReceipt>,
    next_id: u32,
    fail_on_intent: bool,
    fail_on_refund: bool,
}

/// In-memory payment gateway for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryGatewayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decline every subsequent intent creation
    pub fn set_fail_on_intent(&self, fail: bool) {
        self.state().fail_on_intent = fail;
    }

    /// Make every subsequent refund call fail as if the provider were down
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state().fail_on_refund = fail;
    }

    pub fn intent_count(&self) -> usize {
        self.state().intents.len()
    }

    pub fn refunds(&self) -> Vec<RefundReceipt> {
        self.state().refunds.clone()
    }

    pub fn intent(&self, payment_intent_id: &str) -> Option<PaymentIntent> {
        self.state().intents.get(payment_intent_id).cloned()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        metadata: PaymentMetadata,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut state = self.state();

        if state.fail_on_intent {
            return Err(GatewayError::Declined("card_declined".to_string()));
        }
        if amount <= Decimal::ZERO {
            return Err(GatewayError::Declined(format!("invalid amount {}", amount)));
        }

        state.next_id += 1;
        let intent = PaymentIntent {
            id: format!("pi_{:06}", state.next_id),
            amount,
            status: IntentStatus::RequiresCapture,
            metadata,
        };
        state.intents.insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn capture_payment_intent(&self, payment_intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let mut state = self.state();
        let intent = state
            .intents
            .get_mut(payment_intent_id)
            .ok_or_else(|| GatewayError::UnknownPaymentIntent(payment_intent_id.to_string()))?;
        if intent.status == IntentStatus::Cancelled {
            return Err(GatewayError::Declined("intent was cancelled".to_string()));
        }
        intent.status = IntentStatus::Succeeded;
        Ok(intent.clone())
    }

    async fn cancel_payment_intent(&self, payment_intent_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state();
        let intent = state
            .intents
            .get_mut(payment_intent_id)
            .ok_or_else(|| GatewayError::UnknownPaymentIntent(payment_intent_id.to_string()))?;
        intent.status = IntentStatus::Cancelled;
        Ok(())
    }

    async fn create_refund(
        &self,
        payment_intent_id: Option<&str>,
        amount: Decimal,
        _metadata: PaymentMetadata,
    ) -> Result<RefundReceipt, GatewayError> {
        let mut state = self.state();

        if state.fail_on_refund {
            return Err(GatewayError::Unavailable("connection reset by peer".to_string()));
        }
        if let Some(id) = payment_intent_id {
            if !state.intents.contains_key(id) {
                return Err(GatewayError::UnknownPaymentIntent(id.to_string()));
            }
        }

        state.next_id += 1;
        let receipt = RefundReceipt {
            id: format!("re_{:06}", state.next_id),
            amount,
            payment_intent_id: payment_intent_id.map(str::to_string),
        };
        state.refunds.push(receipt.clone());
        Ok(receipt)
    }
}

/// Gateway used when no payment provider is configured
///
/// Every call fails with [`GatewayError::Unavailable`], so charges stay
/// `ChargeFailed` and refunds stay queued until a provider is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflinePaymentGateway;

impl OfflinePaymentGateway {
    fn unavailable<T>() -> Result<T, GatewayError> {
        Err(GatewayError::Unavailable("no payment provider configured".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for OfflinePaymentGateway {
    async fn create_payment_intent(
        &self,
        _amount: Decimal,
        _metadata: PaymentMetadata,
    ) -> Result<PaymentIntent, GatewayError> {
        Self::unavailable()
    }

    async fn capture_payment_intent(&self, _payment_intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        Self::unavailable()
    }

    async fn cancel_payment_intent(&self, _payment_intent_id: &str) -> Result<(), GatewayError> {
        Self::unavailable()
    }

    async fn create_refund(
        &self,
        _payment_intent_id: Option<&str>,
        _amount: Decimal,
        _metadata: PaymentMetadata,
    ) -> Result<RefundReceipt, GatewayError> {
        Self::unavailable()
    }
}

/// Which [`PaymentGateway`] the server runs with, read from `PAYMENT_GATEWAY`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaymentGatewayKind {
    /// Refuse every payment operation
    #[default]
    Offline,
    /// Process-local simulator that confirms everything; local development only
    InMemory,
}

impl PaymentGatewayKind {
    pub fn build(self) -> Arc<dyn PaymentGateway> {
        match self {
            PaymentGatewayKind::Offline => Arc::new(OfflinePaymentGateway),
            PaymentGatewayKind::InMemory => Arc::new(InMemoryPaymentGateway::new()),
        }
    }
}

impl std::str::FromStr for PaymentGatewayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "offline" => Ok(PaymentGatewayKind::Offline),
            "in_memory" | "in-memory" => Ok(PaymentGatewayKind::InMemory),
            other => Err(format!("unknown payment gateway: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_offline_gateway_refuses_money_movement() {
        let gateway = OfflinePaymentGateway;
        let refund = gateway.create_refund(None, dec!(10), PaymentMetadata::default()).await;
        assert!(matches!(refund, Err(GatewayError::Unavailable(_))));
        let intent = gateway
            .create_payment_intent(dec!(10), PaymentMetadata::default())
            .await;
        assert!(matches!(intent, Err(GatewayError::Unavailable(_))));
    }

    #[test]
    fn test_gateway_kind_names() {
        assert_eq!("offline".parse::<PaymentGatewayKind>(), Ok(PaymentGatewayKind::Offline));
        assert_eq!("IN_MEMORY".parse::<PaymentGatewayKind>(), Ok(PaymentGatewayKind::InMemory));
        assert!("stripe".parse::<PaymentGatewayKind>().is_err());
        assert_eq!(PaymentGatewayKind::default(), PaymentGatewayKind::Offline);
    }

    #[tokio::test]
    async fn test_intent_then_capture() {
        let gateway = InMemoryPaymentGateway::new();
        let order_id = Uuid::new_v4();

        let intent = gateway
            .create_payment_intent(dec!(120.50), PaymentMetadata::for_order(order_id))
            .await
            .unwrap();
        assert_eq!(intent.status, IntentStatus::RequiresCapture);
        assert_eq!(intent.metadata.order_id, order_id);

        let captured = gateway.capture_payment_intent(&intent.id).await.unwrap();
        assert_eq!(captured.status, IntentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_sequential_ids() {
        let gateway = InMemoryPaymentGateway::new();
        let first = gateway
            .create_payment_intent(dec!(10), PaymentMetadata::default())
            .await
            .unwrap();
        let refund = gateway
            .create_refund(Some(&first.id), dec!(5), PaymentMetadata::default())
            .await
            .unwrap();
        assert_eq!(first.id, "pi_000001");
        assert_eq!(refund.id, "re_000002");
    }

    #[tokio::test]
    async fn test_fail_on_intent() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_intent(true);
        let result = gateway
            .create_payment_intent(dec!(10), PaymentMetadata::default())
            .await;
        assert!(matches!(result, Err(GatewayError::Declined(_))));
        assert_eq!(gateway.intent_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_on_refund_records_nothing() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_refund(true);
        let result = gateway.create_refund(None, dec!(10), PaymentMetadata::default()).await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
        assert!(gateway.refunds().is_empty());
    }

    #[tokio::test]
    async fn test_capture_unknown_intent() {
        let gateway = InMemoryPaymentGateway::new();
        let result = gateway.capture_payment_intent("pi_missing").await;
        assert_eq!(result, Err(GatewayError::UnknownPaymentIntent("pi_missing".to_string())));
    }

    #[tokio::test]
    async fn test_cancelled_intent_cannot_be_captured() {
        let gateway = InMemoryPaymentGateway::new();
        let intent = gateway
            .create_payment_intent(dec!(10), PaymentMetadata::default())
            .await
            .unwrap();
        gateway.cancel_payment_intent(&intent.id).await.unwrap();
        assert!(gateway.capture_payment_intent(&intent.id).await.is_err());
    }
}
