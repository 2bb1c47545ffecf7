// HTTP handlers for order endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::RentalError;
use crate::orders::{
    CreateOrderRequest, Order, OrderCreation, OrderDetails, Quote, QuoteRequest, ReturnRequest,
    UpdateStatusRequest,
};

/// Handler for POST /api/orders/quote
/// Prices a prospective order without reserving stock
pub async fn quote_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<Quote>, RentalError> {
    let quote = state.order_service.quote(request).await?;
    Ok(Json(quote))
}

/// Handler for POST /api/orders
pub async fn create_order_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreation>), RentalError> {
    request.validate()?;
    let creation = state.order_service.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(creation)))
}

/// Handler for GET /api/orders/:order_id
pub async fn get_order_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetails>, RentalError> {
    let details = state.order_service.get_order(order_id).await?;
    Ok(Json(details))
}

/// Handler for GET /api/users/:user_id/orders
/// Order history of a customer, newest first
pub async fn list_user_orders_handler(
    State(state): State<crate::AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, RentalError> {
    let orders = state.order_service.list_orders_for_user(user_id).await?;
    Ok(Json(orders))
}

/// Handler for PATCH /api/orders/:order_id/status
pub async fn update_order_status_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, RentalError> {
    let order = state
        .order_service
        .update_order_status(order_id, request.status)
        .await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/:order_id/return
pub async fn mark_returned_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<ReturnRequest>,
) -> Result<Json<Order>, RentalError> {
    request.validate()?;
    let order = state
        .order_service
        .mark_as_returned(order_id, request.condition_notes)
        .await?;
    Ok(Json(order))
}
