// Notification sender collaborator
//
// Email/SMS delivery lives outside this crate. The core only hands over a
// template name and a data bag; a failed send never aborts the operation that
// triggered it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Templates the core asks the sender to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    OrderConfirmation,
    OrderCancelled,
    InstallmentPaid,
    InstallmentFailed,
    RefundApproved,
    StockDeficit,
}

impl std::fmt::Display for NotificationTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NotificationTemplate::OrderConfirmation => "order_confirmation",
            NotificationTemplate::OrderCancelled => "order_cancelled",
            NotificationTemplate::InstallmentPaid => "installment_paid",
            NotificationTemplate::InstallmentFailed => "installment_failed",
            NotificationTemplate::RefundApproved => "refund_approved",
            NotificationTemplate::StockDeficit => "stock_deficit",
        };
        write!(f, "{}", name)
    }
}

/// Who a notification goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recipient {
    Customer(Uuid),
    Purchasing,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        template: NotificationTemplate,
        recipient: Recipient,
        data: JsonValue,
    ) -> Result<(), NotificationError>;
}

/// Fire a notification and swallow any failure
///
/// Returns whether the send succeeded so callers can report it.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    template: NotificationTemplate,
    recipient: Recipient,
    data: JsonValue,
) -> bool {
    match notifier.send(template, recipient, data).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to send {} notification: {}", template, e);
            false
        }
    }
}

/// Notifier that only writes to the log; the default for local runs
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        template: NotificationTemplate,
        recipient: Recipient,
        data: JsonValue,
    ) -> Result<(), NotificationError> {
        tracing::info!(?recipient, %data, "Notification {} queued", template);
        Ok(())
    }
}

/// In-memory notifier for tests: records sends, optionally fails them
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(NotificationTemplate, Recipient)>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut fail) = self.fail.lock() {
            *fail = failing;
        }
    }

    pub fn sent(&self) -> Vec<(NotificationTemplate, Recipient)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn count(&self, template: NotificationTemplate) -> usize {
        self.sent().iter().filter(|(t, _)| *t == template).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        template: NotificationTemplate,
        recipient: Recipient,
        _data: JsonValue,
    ) -> Result<(), NotificationError> {
        let failing = self.fail.lock().map(|fail| *fail).unwrap_or(false);
        if failing {
            return Err(NotificationError::Delivery("smtp relay unavailable".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((template, recipient));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_best_effort_swallows_failure() {
        let notifier = RecordingNotifier::new();
        notifier.set_failing(true);
        let delivered = notify_best_effort(
            &notifier,
            NotificationTemplate::OrderConfirmation,
            Recipient::Customer(Uuid::new_v4()),
            json!({}),
        )
        .await;
        assert!(!delivered);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_recording_notifier_records() {
        let notifier = RecordingNotifier::new();
        assert!(
            notify_best_effort(&notifier, NotificationTemplate::StockDeficit, Recipient::Purchasing, json!({}))
                .await
        );
        assert_eq!(notifier.count(NotificationTemplate::StockDeficit), 1);
    }

    #[test]
    fn test_template_display() {
        assert_eq!(NotificationTemplate::InstallmentPaid.to_string(), "installment_paid");
    }
}
