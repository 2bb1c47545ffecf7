// In-memory rental store
//
// Backs tests and local runs. A transaction takes the store lock for its
// whole lifetime and works on a copy of the state, so transactions are
// serialized and a dropped transaction leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{RentalError, RentalResult};
use crate::installments::{InstallmentStatus, PaymentInstallment};
use crate::inventory::{Product, RentalPeriod, StockAdjustment};
use crate::modifications::{ModificationPaymentStatus, OrderModification};
use crate::orders::{Order, OrderItem, OrderStatus};
use crate::store::{InventoryView, RentalStore, RentalTx, ReservationLine};

/// Nesting bound when counting a leaf inside packs
const MAX_COUNT_DEPTH: usize = 4;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
    items: Vec<OrderItem>,
    modifications: HashMap<Uuid, OrderModification>,
    installments: HashMap<Uuid, PaymentInstallment>,
    order_sequences: HashMap<i32, i32>,
}

impl MemoryState {
    /// Units of `leaf_id` contained in one unit of `product_id`
    fn units_of(&self, product_id: Uuid, leaf_id: Uuid, depth: usize) -> i32 {
        if product_id == leaf_id {
            return 1;
        }
        let Some(product) = self.products.get(&product_id) else {
            return 0;
        };
        if !product.is_composite() || depth >= MAX_COUNT_DEPTH {
            return 0;
        }
        product
            .components
            .iter()
            .map(|component| component.quantity * self.units_of(component.component_id, leaf_id, depth + 1))
            .sum()
    }

    fn holding_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(|item| {
            self.orders
                .get(&item.order_id)
                .is_some_and(|order| order.status.holds_stock())
        })
    }

    fn reserved_quantity(&self, product_id: Uuid, period: RentalPeriod) -> i32 {
        self.holding_items()
            .filter(|item| item.period().overlaps(&period))
            .map(|item| item.quantity * self.units_of(item.product_id, product_id, 0))
            .sum()
    }

    fn checked_out_quantity(&self, product_id: Uuid) -> i32 {
        self.items
            .iter()
            .filter(|item| {
                self.orders
                    .get(&item.order_id)
                    .is_some_and(|order| order.status.has_stock_checked_out())
            })
            .map(|item| item.quantity * self.units_of(item.product_id, product_id, 0))
            .sum()
    }

    fn apply_stock_adjustment(&mut self, adjustment: StockAdjustment) -> RentalResult<()> {
        let product = self
            .products
            .get_mut(&adjustment.product_id)
            .ok_or_else(|| RentalError::not_found("Product", adjustment.product_id))?;
        product.stock += adjustment.delta;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRentalStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRentalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a catalog product
    pub async fn insert_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl InventoryView for MemoryTx {
    async fn product(&mut self, product_id: Uuid) -> RentalResult<Option<Product>> {
        Ok(self.working.products.get(&product_id).cloned())
    }

    async fn reserved_quantity(&mut self, product_id: Uuid, period: RentalPeriod) -> RentalResult<i32> {
        Ok(self.working.reserved_quantity(product_id, period))
    }

    async fn checked_out_quantity(&mut self, product_id: Uuid) -> RentalResult<i32> {
        Ok(self.working.checked_out_quantity(product_id))
    }
}

#[async_trait]
impl RentalTx for MemoryTx {
    async fn lock_products(&mut self, _product_ids: &[Uuid]) -> RentalResult<()> {
        // The whole store is already held by this transaction
        Ok(())
    }

    async fn next_order_number(&mut self, year: i32) -> RentalResult<String> {
        let sequence = self.working.order_sequences.entry(year).or_insert(0);
        *sequence += 1;
        Ok(format!("RNT-{}-{:05}", year, sequence))
    }

    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> RentalResult<()> {
        self.working.orders.insert(order.id, order.clone());
        self.working.items.extend_from_slice(items);
        Ok(())
    }

    async fn apply_stock_adjustment(&mut self, adjustment: StockAdjustment) -> RentalResult<()> {
        self.working.apply_stock_adjustment(adjustment)
    }

    async fn increment_times_rented(&mut self, product_id: Uuid) -> RentalResult<()> {
        let product = self
            .working
            .products
            .get_mut(&product_id)
            .ok_or_else(|| RentalError::not_found("Product", product_id))?;
        product.times_rented += 1;
        Ok(())
    }

    async fn update_order(&mut self, order: &Order, expected: OrderStatus) -> RentalResult<()> {
        let existing = self
            .working
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| RentalError::not_found("Order", order.id))?;
        if existing.status != expected {
            return Err(RentalError::Conflict(format!(
                "order {} is {}, expected {}",
                order.id, existing.status, expected
            )));
        }
        *existing = order.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RentalResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl RentalStore for InMemoryRentalStore {
    async fn begin(&self) -> RentalResult<Box<dyn RentalTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn find_product(&self, product_id: Uuid) -> RentalResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&product_id).cloned())
    }

    async fn list_products(&self) -> RentalResult<Vec<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn reserved_quantity(&self, product_id: Uuid, period: RentalPeriod) -> RentalResult<i32> {
        Ok(self.state.lock().await.reserved_quantity(product_id, period))
    }

    async fn checked_out_quantity(&self, product_id: Uuid) -> RentalResult<i32> {
        Ok(self.state.lock().await.checked_out_quantity(product_id))
    }

    async fn apply_stock_adjustments(&self, adjustments: &[StockAdjustment]) -> RentalResult<()> {
        let mut state = self.state.lock().await;
        let mut working = state.clone();
        for adjustment in adjustments {
            working.apply_stock_adjustment(*adjustment)?;
        }
        *state = working;
        Ok(())
    }

    async fn active_reservations(&self, now: DateTime<Utc>) -> RentalResult<Vec<ReservationLine>> {
        let state = self.state.lock().await;
        Ok(state
            .holding_items()
            .filter(|item| item.end_date >= now)
            .map(|item| ReservationLine {
                order_id: item.order_id,
                product_id: item.product_id,
                quantity: item.quantity,
                period: item.period(),
            })
            .collect())
    }

    async fn find_order(&self, order_id: Uuid) -> RentalResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn find_orders_by_user(&self, user_id: Uuid) -> RentalResult<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn find_order_items(&self, order_id: Uuid) -> RentalResult<Vec<OrderItem>> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update_order(&self, order: &Order) -> RentalResult<()> {
        let mut state = self.state.lock().await;
        let existing = state
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| RentalError::not_found("Order", order.id))?;
        *existing = order.clone();
        Ok(())
    }

    async fn insert_order_items(&self, items: &[OrderItem]) -> RentalResult<()> {
        self.state.lock().await.items.extend_from_slice(items);
        Ok(())
    }

    async fn delete_order_items(&self, order_id: Uuid, item_ids: &[Uuid]) -> RentalResult<()> {
        self.state
            .lock()
            .await
            .items
            .retain(|item| item.order_id != order_id || !item_ids.contains(&item.id));
        Ok(())
    }

    async fn insert_modification(&self, modification: &OrderModification) -> RentalResult<()> {
        self.state
            .lock()
            .await
            .modifications
            .insert(modification.id, modification.clone());
        Ok(())
    }

    async fn update_modification(&self, modification: &OrderModification) -> RentalResult<()> {
        let mut state = self.state.lock().await;
        let existing = state
            .modifications
            .get_mut(&modification.id)
            .ok_or_else(|| RentalError::not_found("Modification", modification.id))?;
        *existing = modification.clone();
        Ok(())
    }

    async fn find_modification(&self, modification_id: Uuid) -> RentalResult<Option<OrderModification>> {
        Ok(self.state.lock().await.modifications.get(&modification_id).cloned())
    }

    async fn find_modifications_by_order(&self, order_id: Uuid) -> RentalResult<Vec<OrderModification>> {
        let state = self.state.lock().await;
        let mut modifications: Vec<OrderModification> = state
            .modifications
            .values()
            .filter(|modification| modification.order_id == order_id)
            .cloned()
            .collect();
        modifications.sort_by_key(|modification| modification.created_at);
        Ok(modifications)
    }

    async fn pending_refunds(&self) -> RentalResult<Vec<OrderModification>> {
        let state = self.state.lock().await;
        let mut pending: Vec<OrderModification> = state
            .modifications
            .values()
            .filter(|modification| modification.is_pending_refund())
            .cloned()
            .collect();
        pending.sort_by_key(|modification| modification.created_at);
        Ok(pending)
    }

    async fn claim_refund(
        &self,
        modification_id: Uuid,
        now: DateTime<Utc>,
    ) -> RentalResult<Option<OrderModification>> {
        let mut state = self.state.lock().await;
        match state.modifications.get_mut(&modification_id) {
            Some(modification) if modification.is_pending_refund() => {
                modification.payment_status = ModificationPaymentStatus::RefundProcessing;
                modification.updated_at = now;
                Ok(Some(modification.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_installments(&self, installments: &[PaymentInstallment]) -> RentalResult<()> {
        let mut state = self.state.lock().await;
        for installment in installments {
            state.installments.insert(installment.id, installment.clone());
        }
        Ok(())
    }

    async fn update_installment(&self, installment: &PaymentInstallment) -> RentalResult<()> {
        let mut state = self.state.lock().await;
        let existing = state
            .installments
            .get_mut(&installment.id)
            .ok_or_else(|| RentalError::not_found("Installment", installment.id))?;
        *existing = installment.clone();
        Ok(())
    }

    async fn find_installment(&self, installment_id: Uuid) -> RentalResult<Option<PaymentInstallment>> {
        Ok(self.state.lock().await.installments.get(&installment_id).cloned())
    }

    async fn find_installments_by_order(&self, order_id: Uuid) -> RentalResult<Vec<PaymentInstallment>> {
        let state = self.state.lock().await;
        let mut installments: Vec<PaymentInstallment> = state
            .installments
            .values()
            .filter(|installment| installment.order_id == order_id)
            .cloned()
            .collect();
        installments.sort_by_key(|installment| installment.installment_number);
        Ok(installments)
    }

    async fn pending_installments_due_before(&self, before: DateTime<Utc>) -> RentalResult<Vec<PaymentInstallment>> {
        let state = self.state.lock().await;
        let mut due: Vec<PaymentInstallment> = state
            .installments
            .values()
            .filter(|installment| installment.status == InstallmentStatus::Pending && installment.due_date < before)
            .cloned()
            .collect();
        due.sort_by_key(|installment| installment.due_date);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, days_from_now};

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = InMemoryRentalStore::new();
        let product = testing::leaf("Fog Machine", 4);
        store.insert_product(product.clone()).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.apply_stock_adjustment(StockAdjustment {
                product_id: product.id,
                delta: -3,
            })
            .await
            .unwrap();
        }

        assert_eq!(store.find_product(product.id).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_committed_transaction_applies_writes() {
        let store = InMemoryRentalStore::new();
        let product = testing::leaf("Fog Machine", 4);
        store.insert_product(product.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.apply_stock_adjustment(StockAdjustment {
            product_id: product.id,
            delta: -3,
        })
        .await
        .unwrap();
        tx.increment_times_rented(product.id).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.find_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 1);
        assert_eq!(stored.times_rented, 1);
    }

    #[tokio::test]
    async fn test_order_numbers_are_sequential_per_year() {
        let store = InMemoryRentalStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.next_order_number(2026).await.unwrap(), "RNT-2026-00001");
        assert_eq!(tx.next_order_number(2026).await.unwrap(), "RNT-2026-00002");
        assert_eq!(tx.next_order_number(2027).await.unwrap(), "RNT-2027-00001");
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.next_order_number(2026).await.unwrap(), "RNT-2026-00003");
    }

    #[tokio::test]
    async fn test_failed_batch_adjustment_applies_nothing() {
        let store = InMemoryRentalStore::new();
        let product = testing::leaf("Stage Deck", 8);
        store.insert_product(product.clone()).await;

        let result = store
            .apply_stock_adjustments(&[
                StockAdjustment {
                    product_id: product.id,
                    delta: 2,
                },
                StockAdjustment {
                    product_id: Uuid::new_v4(),
                    delta: 1,
                },
            ])
            .await;

        assert!(matches!(result, Err(RentalError::NotFound { .. })));
        assert_eq!(store.find_product(product.id).await.unwrap().unwrap().stock, 8);
    }

    #[tokio::test]
    async fn test_checked_out_quantity_ignores_dates_and_released_orders() {
        let store = InMemoryRentalStore::new();
        let product = testing::leaf("Par Can", 10);
        store.insert_product(product.clone()).await;
        testing::reserve(
            &store,
            &product,
            2,
            RentalPeriod::new(days_from_now(-5), days_from_now(-3)).unwrap(),
        )
        .await;
        let later = testing::reserve(
            &store,
            &product,
            3,
            RentalPeriod::new(days_from_now(20), days_from_now(21)).unwrap(),
        )
        .await;
        assert_eq!(store.checked_out_quantity(product.id).await.unwrap(), 5);

        let mut cancelled = later.clone();
        cancelled.status = OrderStatus::Cancelled;
        store.update_order(&cancelled).await.unwrap();
        assert_eq!(store.checked_out_quantity(product.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_guarded_order_update_rejects_stale_status() {
        let store = InMemoryRentalStore::new();
        let product = testing::leaf("Par Can", 10);
        store.insert_product(product.clone()).await;
        let order = testing::reserve(
            &store,
            &product,
            1,
            RentalPeriod::new(days_from_now(4), days_from_now(5)).unwrap(),
        )
        .await;

        let mut cancelled = order.clone();
        cancelled.status = OrderStatus::Cancelled;
        let mut tx = store.begin().await.unwrap();
        let result = tx.update_order(&cancelled, OrderStatus::Confirmed).await;
        assert!(matches!(result, Err(RentalError::Conflict(_))));
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        tx.update_order(&cancelled, order.status).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(
            store.find_order(order.id).await.unwrap().unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_refund_claim_is_won_once() {
        let store = InMemoryRentalStore::new();
        let modification = OrderModification::new(
            Uuid::new_v4(),
            crate::modifications::ModificationType::RemoveItems,
            rust_decimal::Decimal::from(100),
            rust_decimal::Decimal::from(60),
            ModificationPaymentStatus::Pending,
            Utc::now(),
        );
        store.insert_modification(&modification).await.unwrap();

        let first = store.claim_refund(modification.id, Utc::now()).await.unwrap();
        assert_eq!(
            first.map(|claimed| claimed.payment_status),
            Some(ModificationPaymentStatus::RefundProcessing)
        );
        assert!(store.claim_refund(modification.id, Utc::now()).await.unwrap().is_none());
        assert!(store.pending_refunds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_reservations_skip_finished_rentals() {
        let store = InMemoryRentalStore::new();
        let product = testing::leaf("Uplight", 20);
        store.insert_product(product.clone()).await;
        testing::reserve(
            &store,
            &product,
            2,
            RentalPeriod::new(days_from_now(-5), days_from_now(-3)).unwrap(),
        )
        .await;
        testing::reserve(
            &store,
            &product,
            4,
            RentalPeriod::new(days_from_now(2), days_from_now(3)).unwrap(),
        )
        .await;

        let active = store.active_reservations(Utc::now()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].quantity, 4);
    }
}
