// Persistent store abstraction
//
// The services never talk to a database directly. They receive an
// `Arc<dyn RentalStore>` from the entry point and open a `RentalTx` whenever
// several reads and writes must commit together.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRentalStore;
pub use postgres::PgRentalStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RentalResult;
use crate::installments::PaymentInstallment;
use crate::inventory::{Product, RentalPeriod, StockAdjustment};
use crate::modifications::OrderModification;
use crate::orders::{Order, OrderItem, OrderStatus};

/// One line of holding-order demand, used by the stock alert audit
#[derive(Debug, Clone)]
pub struct ReservationLine {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub period: RentalPeriod,
}

/// Read access the availability checker needs
///
/// Implemented by transactions (locked, authoritative reads) and by
/// [`StoreView`] (advisory reads outside a transaction).
#[async_trait]
pub trait InventoryView: Send {
    async fn product(&mut self, product_id: Uuid) -> RentalResult<Option<Product>>;

    /// Quantity of `product_id` held by stock-holding orders overlapping
    /// `period`, including pack lines that contain the product
    async fn reserved_quantity(&mut self, product_id: Uuid, period: RentalPeriod) -> RentalResult<i32>;

    /// Units of `product_id` currently deducted from its nominal `stock` by
    /// orders that have not given them back, whatever their dates
    async fn checked_out_quantity(&mut self, product_id: Uuid) -> RentalResult<i32>;
}

/// A unit of work against the store
///
/// Dropping a transaction without calling [`RentalTx::commit`] discards all
/// of its writes.
#[async_trait]
pub trait RentalTx: InventoryView {
    /// Take row locks on the given products until commit/rollback
    async fn lock_products(&mut self, product_ids: &[Uuid]) -> RentalResult<()>;

    /// Allocate the next human-readable order number for `year`
    async fn next_order_number(&mut self, year: i32) -> RentalResult<String>;

    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> RentalResult<()>;

    /// `stock = stock + delta`, never an overwrite
    async fn apply_stock_adjustment(&mut self, adjustment: StockAdjustment) -> RentalResult<()>;

    async fn increment_times_rented(&mut self, product_id: Uuid) -> RentalResult<()>;

    /// Write `order` only if its stored status is still `expected`
    ///
    /// Fails with `Conflict` when another writer moved the order first.
    async fn update_order(&mut self, order: &Order, expected: OrderStatus) -> RentalResult<()>;

    async fn commit(self: Box<Self>) -> RentalResult<()>;
}

/// Transactional CRUD over products, orders, modifications and installments
#[async_trait]
pub trait RentalStore: Send + Sync {
    async fn begin(&self) -> RentalResult<Box<dyn RentalTx>>;

    // Catalog
    async fn find_product(&self, product_id: Uuid) -> RentalResult<Option<Product>>;
    async fn list_products(&self) -> RentalResult<Vec<Product>>;
    async fn reserved_quantity(&self, product_id: Uuid, period: RentalPeriod) -> RentalResult<i32>;
    async fn checked_out_quantity(&self, product_id: Uuid) -> RentalResult<i32>;

    /// Apply several stock changes atomically
    async fn apply_stock_adjustments(&self, adjustments: &[StockAdjustment]) -> RentalResult<()>;

    /// Holding-order lines whose rental has not ended at `now`
    async fn active_reservations(&self, now: DateTime<Utc>) -> RentalResult<Vec<ReservationLine>>;

    // Orders
    async fn find_order(&self, order_id: Uuid) -> RentalResult<Option<Order>>;
    async fn find_orders_by_user(&self, user_id: Uuid) -> RentalResult<Vec<Order>>;
    async fn find_order_items(&self, order_id: Uuid) -> RentalResult<Vec<OrderItem>>;
    async fn update_order(&self, order: &Order) -> RentalResult<()>;
    async fn insert_order_items(&self, items: &[OrderItem]) -> RentalResult<()>;
    async fn delete_order_items(&self, order_id: Uuid, item_ids: &[Uuid]) -> RentalResult<()>;

    // Modifications
    async fn insert_modification(&self, modification: &OrderModification) -> RentalResult<()>;
    async fn update_modification(&self, modification: &OrderModification) -> RentalResult<()>;
    async fn find_modification(&self, modification_id: Uuid) -> RentalResult<Option<OrderModification>>;
    async fn find_modifications_by_order(&self, order_id: Uuid) -> RentalResult<Vec<OrderModification>>;
    /// Negative-difference modifications whose refund has not been processed
    async fn pending_refunds(&self) -> RentalResult<Vec<OrderModification>>;
    /// Atomically move a pending refund to `RefundProcessing`
    ///
    /// Returns the claimed modification, or `None` when it is not a pending
    /// refund any more. At most one caller wins the claim.
    async fn claim_refund(
        &self,
        modification_id: Uuid,
        now: DateTime<Utc>,
    ) -> RentalResult<Option<OrderModification>>;

    // Installments
    async fn insert_installments(&self, installments: &[PaymentInstallment]) -> RentalResult<()>;
    async fn update_installment(&self, installment: &PaymentInstallment) -> RentalResult<()>;
    async fn find_installment(&self, installment_id: Uuid) -> RentalResult<Option<PaymentInstallment>>;
    async fn find_installments_by_order(&self, order_id: Uuid) -> RentalResult<Vec<PaymentInstallment>>;
    /// Pending installments due strictly before `before`
    async fn pending_installments_due_before(&self, before: DateTime<Utc>) -> RentalResult<Vec<PaymentInstallment>>;
}

/// Advisory, non-transactional [`InventoryView`] over a store
pub struct StoreView<'a>(pub &'a dyn RentalStore);

#[async_trait]
impl InventoryView for StoreView<'_> {
    async fn product(&mut self, product_id: Uuid) -> RentalResult<Option<Product>> {
        self.0.find_product(product_id).await
    }

    async fn reserved_quantity(&mut self, product_id: Uuid, period: RentalPeriod) -> RentalResult<i32> {
        self.0.reserved_quantity(product_id, period).await
    }

    async fn checked_out_quantity(&mut self, product_id: Uuid) -> RentalResult<i32> {
        self.0.checked_out_quantity(product_id).await
    }
}
