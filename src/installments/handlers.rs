// HTTP handlers for installment endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::error::RentalError;
use crate::installments::{
    CreateInstallmentsRequest, InstallmentFailedRequest, InstallmentPaidRequest, InstallmentReminder,
    PaymentInstallment, UpcomingQuery,
};

/// Handler for POST /api/orders/:order_id/installments
pub async fn create_installments_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CreateInstallmentsRequest>,
) -> Result<(StatusCode, Json<Vec<PaymentInstallment>>), RentalError> {
    let plan = state
        .installment_service
        .create_installments(order_id, request.total, request.event_start_date)
        .await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

/// Handler for GET /api/orders/:order_id/installments
pub async fn list_installments_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentInstallment>>, RentalError> {
    let installments = state.installment_service.get_installments(order_id).await?;
    Ok(Json(installments))
}

/// Handler for GET /api/orders/:order_id/installments/next
pub async fn next_installment_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Option<PaymentInstallment>>, RentalError> {
    let next = state
        .installment_service
        .get_next_pending_installment(order_id)
        .await?;
    Ok(Json(next))
}

/// Handler for GET /api/installments/upcoming?days_ahead=N
pub async fn upcoming_installments_handler(
    State(state): State<crate::AppState>,
    Query(query): Query<UpcomingQuery>,
) -> Result<Json<Vec<PaymentInstallment>>, RentalError> {
    let installments = state
        .installment_service
        .get_upcoming_installments(query.days_ahead, Utc::now())
        .await?;
    Ok(Json(installments))
}

/// Handler for GET /api/installments/overdue
pub async fn overdue_installments_handler(
    State(state): State<crate::AppState>,
) -> Result<Json<Vec<PaymentInstallment>>, RentalError> {
    let installments = state
        .installment_service
        .get_overdue_installments(Utc::now())
        .await?;
    Ok(Json(installments))
}

/// Handler for GET /api/installments/reminders
/// Reminder worklist for the external job runner
pub async fn reminders_handler(
    State(state): State<crate::AppState>,
) -> Result<Json<Vec<InstallmentReminder>>, RentalError> {
    let reminders = state.installment_service.reminders_due(Utc::now()).await?;
    Ok(Json(reminders))
}

/// Handler for POST /api/installments/:installment_id/paid
pub async fn mark_paid_handler(
    State(state): State<crate::AppState>,
    Path(installment_id): Path<Uuid>,
    Json(request): Json<InstallmentPaidRequest>,
) -> Result<Json<PaymentInstallment>, RentalError> {
    request.validate()?;
    let installment = state
        .installment_service
        .mark_installment_as_paid(installment_id, &request.gateway_payment_id)
        .await?;
    Ok(Json(installment))
}

/// Handler for POST /api/installments/:installment_id/failed
pub async fn mark_failed_handler(
    State(state): State<crate::AppState>,
    Path(installment_id): Path<Uuid>,
    Json(request): Json<InstallmentFailedRequest>,
) -> Result<Json<PaymentInstallment>, RentalError> {
    request.validate()?;
    let installment = state
        .installment_service
        .mark_installment_as_failed(installment_id, &request.reason)
        .await?;
    Ok(Json(installment))
}
