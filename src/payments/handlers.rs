// HTTP handler for the payment gateway callback

use axum::{extract::State, Json};

use crate::error::RentalError;
use crate::payments::{GatewayEvent, WebhookTarget};

/// Handler for POST /api/payments/webhook
pub async fn payment_webhook_handler(
    State(state): State<crate::AppState>,
    Json(event): Json<GatewayEvent>,
) -> Result<Json<WebhookTarget>, RentalError> {
    let target = state.webhook_handler.handle(event).await?;
    Ok(Json(target))
}
