// HTTP handlers for inventory endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::RentalError;
use crate::inventory::{Availability, AvailabilityQuery, StockAuditReport};

/// Handler for GET /api/products/:product_id/availability
pub async fn check_availability_handler(
    State(state): State<crate::AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Availability>, RentalError> {
    tracing::debug!(product_id = %product_id, quantity = query.quantity, "Checking availability");

    let availability = state
        .order_service
        .check_availability(product_id, query.quantity, query.start_date, query.end_date)
        .await?;

    Ok(Json(availability))
}

/// Handler for POST /api/inventory/audit
/// Runs one stock alert pass and returns the deficits found
pub async fn run_stock_audit_handler(
    State(state): State<crate::AppState>,
) -> Result<Json<StockAuditReport>, RentalError> {
    let report = state.stock_auditor.run(Utc::now()).await?;
    Ok(Json(report))
}
