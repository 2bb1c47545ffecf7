// Rental core: availability, pricing, order lifecycle, modifications and
// installment payments for an event-equipment rental shop.

pub mod config;
pub mod db;
pub mod error;
pub mod installments;
pub mod inventory;
pub mod modifications;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod store;

#[cfg(test)]
pub mod testing;


use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use installments::InstallmentService;
use inventory::StockAlertAuditor;
use modifications::ModificationService;
use notifications::Notifier;
use orders::OrderService;
use payments::{PaymentGateway, PaymentWebhookHandler};
use store::RentalStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub order_service: OrderService,
    pub modification_service: ModificationService,
    pub installment_service: InstallmentService,
    pub webhook_handler: PaymentWebhookHandler,
    pub stock_auditor: StockAlertAuditor,
}

impl AppState {
    /// Wire every service against the given collaborators
    pub fn new(store: Arc<dyn RentalStore>, gateway: Arc<dyn PaymentGateway>, notifier: Arc<dyn Notifier>) -> Self {
        let installment_service = InstallmentService::new(store.clone(), notifier.clone());
        let order_service = OrderService::new(store.clone(), notifier.clone(), installment_service.clone());
        let modification_service = ModificationService::new(store.clone(), gateway, notifier.clone());
        let webhook_handler = PaymentWebhookHandler::new(
            order_service.clone(),
            modification_service.clone(),
            installment_service.clone(),
        );
        let stock_auditor = StockAlertAuditor::new(store, notifier);

        Self {
            order_service,
            modification_service,
            installment_service,
            webhook_handler,
            stock_auditor,
        }
    }
}

/// Creates the application router with all routes configured
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Inventory
        .route("/api/products/:product_id/availability", get(inventory::check_availability_handler))
        .route("/api/inventory/audit", post(inventory::run_stock_audit_handler))
        // Orders
        .route("/api/orders/quote", post(orders::quote_handler))
        .route("/api/orders", post(orders::create_order_handler))
        .route("/api/orders/:order_id", get(orders::get_order_handler))
        .route("/api/orders/:order_id/status", patch(orders::update_order_status_handler))
        .route("/api/orders/:order_id/return", post(orders::mark_returned_handler))
        .route("/api/users/:user_id/orders", get(orders::list_user_orders_handler))
        // Modifications
        .route("/api/orders/:order_id/can-modify", get(modifications::can_modify_handler))
        .route("/api/orders/:order_id/items", post(modifications::add_items_handler))
        .route("/api/orders/:order_id/items/remove", post(modifications::remove_items_handler))
        .route("/api/orders/:order_id/cancel", post(modifications::cancel_order_handler))
        .route("/api/orders/:order_id/modifications", get(modifications::list_modifications_handler))
        .route(
            "/api/modifications/:modification_id/retry-charge",
            post(modifications::retry_charge_handler),
        )
        .route("/api/admin/refunds/pending", get(modifications::pending_refunds_handler))
        .route(
            "/api/admin/refunds/:modification_id/approve",
            post(modifications::approve_refund_handler),
        )
        // Installments
        .route(
            "/api/orders/:order_id/installments",
            post(installments::create_installments_handler).get(installments::list_installments_handler),
        )
        .route(
            "/api/orders/:order_id/installments/next",
            get(installments::next_installment_handler),
        )
        .route("/api/installments/upcoming", get(installments::upcoming_installments_handler))
        .route("/api/installments/overdue", get(installments::overdue_installments_handler))
        .route("/api/installments/reminders", get(installments::reminders_handler))
        .route("/api/installments/:installment_id/paid", post(installments::mark_paid_handler))
        .route("/api/installments/:installment_id/failed", post(installments::mark_failed_handler))
        // Payments
        .route("/api/payments/webhook", post(payments::payment_webhook_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
