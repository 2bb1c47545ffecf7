// HTTP handlers for modification and refund endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::RentalError;
use crate::modifications::{
    AddItemsRequest, AddItemsResult, ApproveRefundRequest, CancellationResult, ModifyEligibility,
    OrderModification, RemoveItemsRequest, RemoveItemsResult,
};

/// Handler for GET /api/orders/:order_id/can-modify
pub async fn can_modify_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ModifyEligibility>, RentalError> {
    let eligibility = state.modification_service.can_modify_order(order_id).await?;
    Ok(Json(eligibility))
}

/// Handler for POST /api/orders/:order_id/items
pub async fn add_items_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<AddItemsRequest>,
) -> Result<Json<AddItemsResult>, RentalError> {
    let result = state.modification_service.add_items(order_id, request).await?;
    Ok(Json(result))
}

/// Handler for POST /api/orders/:order_id/items/remove
pub async fn remove_items_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<RemoveItemsRequest>,
) -> Result<Json<RemoveItemsResult>, RentalError> {
    let result = state.modification_service.remove_items(order_id, request).await?;
    Ok(Json(result))
}

/// Handler for POST /api/orders/:order_id/cancel
/// Cancels under the tiered refund policy; the refund waits for approval
pub async fn cancel_order_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<CancellationResult>, RentalError> {
    let result = state.modification_service.cancel_with_refund(order_id).await?;
    Ok(Json(result))
}

/// Handler for GET /api/orders/:order_id/modifications
pub async fn list_modifications_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<OrderModification>>, RentalError> {
    let modifications = state.modification_service.list_modifications(order_id).await?;
    Ok(Json(modifications))
}

/// Handler for POST /api/modifications/:modification_id/retry-charge
pub async fn retry_charge_handler(
    State(state): State<crate::AppState>,
    Path(modification_id): Path<Uuid>,
) -> Result<Json<OrderModification>, RentalError> {
    let modification = state
        .modification_service
        .retry_additional_charge(modification_id)
        .await?;
    Ok(Json(modification))
}

/// Handler for GET /api/admin/refunds/pending
pub async fn pending_refunds_handler(
    State(state): State<crate::AppState>,
) -> Result<Json<Vec<OrderModification>>, RentalError> {
    let refunds = state.modification_service.get_pending_refunds().await?;
    Ok(Json(refunds))
}

/// Handler for POST /api/admin/refunds/:modification_id/approve
pub async fn approve_refund_handler(
    State(state): State<crate::AppState>,
    Path(modification_id): Path<Uuid>,
    Json(request): Json<ApproveRefundRequest>,
) -> Result<Json<OrderModification>, RentalError> {
    let modification = state
        .modification_service
        .approve_refund(modification_id, request.admin_id)
        .await?;
    Ok(Json(modification))
}
