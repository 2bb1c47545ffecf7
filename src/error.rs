// Error handling module for the rental core
// Provides the domain error taxonomy and its HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::orders::OrderStatus;
use crate::payments::GatewayError;

/// Main error type for the rental core
///
/// Every service operation returns `Result<T, RentalError>`. Each variant maps
/// to one stable machine-readable code (see [`RentalError::code`]) which the
/// routing layer renders directly.
#[derive(Debug, thiserror::Error)]
pub enum RentalError {
    /// Bad input shape (empty item list, inverted dates, bad quantity)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing product, order, item, modification or installment
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    /// Availability check failed for a product
    #[error("Insufficient stock for {product_name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        product_name: String,
        requested: i32,
        available: i32,
    },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Order is terminal or too close to its start date
    #[error("Order cannot be modified: {0}")]
    CannotModify(String),

    #[error("Cannot remove all items from an order, cancel the order instead")]
    CannotRemoveAll,

    #[error("Modification {0} does not carry a refund")]
    NoRefund(Uuid),

    #[error("Modification {0} has already been refunded")]
    AlreadyRefunded(Uuid),

    /// Gateway event for a modification with no charge waiting on it
    #[error("Modification {0} has no outstanding charge")]
    NoOutstandingCharge(Uuid),

    /// Another request changed the record first
    #[error("Conflicting update: {0}")]
    Conflict(String),

    /// Payment gateway call failed; no money moved
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Persistent store failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result alias used across the crate
pub type RentalResult<T> = Result<T, RentalError>;

impl RentalError {
    /// Shorthand for a `NotFound` error
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        RentalError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            RentalError::Validation(_) => "VALIDATION",
            RentalError::NotFound { .. } => "NOT_FOUND",
            RentalError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            RentalError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            RentalError::CannotModify(_) => "CANNOT_MODIFY",
            RentalError::CannotRemoveAll => "CANNOT_REMOVE_ALL",
            RentalError::NoRefund(_) => "NO_REFUND",
            RentalError::AlreadyRefunded(_) => "ALREADY_REFUNDED",
            RentalError::NoOutstandingCharge(_) => "NO_OUTSTANDING_CHARGE",
            RentalError::Conflict(_) => "CONFLICT",
            RentalError::Gateway(_) => "GATEWAY_ERROR",
            RentalError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RentalError::Validation(_) => StatusCode::BAD_REQUEST,
            RentalError::NotFound { .. } => StatusCode::NOT_FOUND,
            RentalError::InsufficientStock { .. } => StatusCode::CONFLICT,
            RentalError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            RentalError::CannotModify(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RentalError::CannotRemoveAll => StatusCode::UNPROCESSABLE_ENTITY,
            RentalError::NoRefund(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RentalError::AlreadyRefunded(_) => StatusCode::CONFLICT,
            RentalError::NoOutstandingCharge(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RentalError::Conflict(_) => StatusCode::CONFLICT,
            RentalError::Gateway(_) => StatusCode::BAD_GATEWAY,
            RentalError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to HTTP status and the client-facing body
    ///
    /// Gateway and database internals are logged here and never forwarded to
    /// the client.
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        let message = match self {
            RentalError::Gateway(gateway_error) => {
                warn!("Payment gateway error: {:?}", gateway_error);
                "The payment provider could not process the request, please retry later".to_string()
            }
            RentalError::Database(db_error) => {
                error!("Database error: {:?}", db_error);
                "A database error occurred".to_string()
            }
            other => {
                debug!("Request rejected: {}", other);
                other.to_string()
            }
        };

        let details = match self {
            RentalError::InsufficientStock {
                product_id,
                requested,
                available,
                ..
            } => Some(serde_json::json!({
                "product_id": product_id,
                "requested": requested,
                "available": available,
            })),
            _ => None,
        };

        (
            self.status_code(),
            ErrorResponse {
                error_code: self.code().to_string(),
                message,
                details,
                timestamp: Utc::now().to_rfc3339(),
            },
        )
    }
}

/// Consistent error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "INSUFFICIENT_STOCK")
    pub error_code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional structured details, omitted from JSON when None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// ISO 8601 timestamp of when the error occurred
    pub timestamp: String,
}

impl IntoResponse for RentalError {
    fn into_response(self) -> Response {
        let (status, error_response) = self.to_error_response();
        (status, Json(error_response)).into_response()
    }
}

impl From<validator::ValidationErrors> for RentalError {
    fn from(errors: validator::ValidationErrors) -> Self {
        RentalError::Validation(errors.to_string())
    }
}
