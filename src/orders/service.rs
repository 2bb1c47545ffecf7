use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{RentalError, RentalResult};
use crate::installments::{scheduler, InstallmentService, PaymentInstallment};
use crate::inventory::{Availability, AvailabilityChecker, Product, RentalPeriod, StockAdjustment};
use crate::notifications::{notify_best_effort, NotificationTemplate, Notifier, Recipient};
use crate::orders::{
    CapturedPayment, CreateOrderRequest, DepositStatus, Order, OrderCreation, OrderDetails, OrderItem,
    OrderItemRequest, OrderStatus, PaymentStatus, Quote, QuoteLine, QuoteRequest, StatusMachine,
};
use crate::pricing::{ItemPrice, PriceCalculator, PricedLine, TotalsCalculator};
use crate::store::{RentalStore, StoreView};

/// A requested line resolved against the catalog and priced
#[derive(Debug, Clone)]
pub(crate) struct PricedRequest {
    pub product: Product,
    pub request: OrderItemRequest,
    pub period: RentalPeriod,
    pub price: ItemPrice,
}

impl PricedRequest {
    pub fn priced_line(&self) -> PricedLine {
        PricedLine {
            quantity: self.request.quantity,
            total_price: self.price.total_price,
            custom_deposit: self.product.custom_deposit,
            is_calculator_item: self.request.calculator.is_some(),
        }
    }

    pub fn into_item(self, order_id: Uuid, now: DateTime<Utc>) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id,
            product_id: self.product.id,
            quantity: self.request.quantity,
            price_per_day: self.product.price_per_day,
            price_per_unit: self.price.price_per_unit,
            total_price: self.price.total_price,
            start_date: self.period.start,
            end_date: self.period.end,
            calculator: self.request.calculator,
            created_at: now,
        }
    }
}

/// Validate and price requested lines
///
/// Each line's period defaults to `default_period`. Starts before today are
/// rejected.
pub(crate) async fn price_requests(
    store: &dyn RentalStore,
    items: &[OrderItemRequest],
    default_period: RentalPeriod,
    now: DateTime<Utc>,
) -> RentalResult<Vec<PricedRequest>> {
    let mut priced = Vec::with_capacity(items.len());

    for request in items {
        request.validate()?;
        if let Some(calculator) = &request.calculator {
            calculator.check()?;
        }

        let period = RentalPeriod::new(
            request.start_date.unwrap_or(default_period.start),
            request.end_date.unwrap_or(default_period.end),
        )?;
        if period.start.date_naive() < now.date_naive() {
            return Err(RentalError::Validation(format!(
                "Start date {} is in the past",
                period.start.format("%Y-%m-%d")
            )));
        }

        let product = store
            .find_product(request.product_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Product", request.product_id))?;
        let price = PriceCalculator::price_item(&product, request.quantity, &period);

        priced.push(PricedRequest {
            product,
            request: request.clone(),
            period,
            price,
        });
    }

    Ok(priced)
}

/// Put the stock of `items` back on the shelf
pub(crate) async fn release_stock(store: &dyn RentalStore, items: &[OrderItem]) -> RentalResult<()> {
    let lines: Vec<(Uuid, i32)> = items.iter().map(|item| (item.product_id, item.quantity)).collect();
    let adjustments = AvailabilityChecker::stock_adjustments(&mut StoreView(store), &lines, 1).await?;
    store.apply_stock_adjustments(&adjustments).await
}

/// Take the stock of `items` off the shelf
pub(crate) async fn reserve_stock(store: &dyn RentalStore, items: &[OrderItem]) -> RentalResult<()> {
    let lines: Vec<(Uuid, i32)> = items.iter().map(|item| (item.product_id, item.quantity)).collect();
    let adjustments = AvailabilityChecker::stock_adjustments(&mut StoreView(store), &lines, -1).await?;
    store.apply_stock_adjustments(&adjustments).await
}

/// Write a cancelled or returned order and put its stock back, atomically
///
/// `expected` is the status the order was read in. If another request moved
/// the order meanwhile nothing is written and `Conflict` is returned, so stock
/// is released at most once.
pub(crate) async fn close_order(store: &dyn RentalStore, order: &Order, expected: OrderStatus) -> RentalResult<()> {
    let items = store.find_order_items(order.id).await?;
    let lines: Vec<(Uuid, i32)> = items.iter().map(|item| (item.product_id, item.quantity)).collect();

    let mut tx = store.begin().await?;
    let adjustments = AvailabilityChecker::stock_adjustments(&mut *tx, &lines, 1).await?;
    tx.update_order(order, expected).await?;
    for adjustment in adjustments {
        tx.apply_stock_adjustment(adjustment).await?;
    }
    tx.commit().await
}

/// Service for the rental order lifecycle
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn RentalStore>,
    notifier: Arc<dyn Notifier>,
    installments: InstallmentService,
}

impl OrderService {
    pub fn new(store: Arc<dyn RentalStore>, notifier: Arc<dyn Notifier>, installments: InstallmentService) -> Self {
        Self {
            store,
            notifier,
            installments,
        }
    }

    /// Advisory availability check outside any transaction
    pub async fn check_availability(
        &self,
        product_id: Uuid,
        quantity: i32,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> RentalResult<Availability> {
        let period = RentalPeriod::new(start_date, end_date)?;
        AvailabilityChecker::check(&mut StoreView(self.store.as_ref()), product_id, quantity, period, Utc::now()).await
    }

    /// Price a prospective order; nothing is reserved or stored
    pub async fn quote(&self, request: QuoteRequest) -> RentalResult<Quote> {
        request.validate()?;
        let period = RentalPeriod::new(request.start_date, request.end_date)?;
        let priced = price_requests(self.store.as_ref(), &request.items, period, Utc::now()).await?;

        let lines: Vec<PricedLine> = priced.iter().map(PricedRequest::priced_line).collect();
        let totals = TotalsCalculator::quote(request.loyalty_tier, &lines, &request.delivery);

        Ok(Quote {
            lines: priced
                .iter()
                .map(|line| QuoteLine {
                    product_id: line.product.id,
                    quantity: line.request.quantity,
                    days: line.price.days,
                    tier: line.price.tier,
                    price_per_unit: line.price.price_per_unit,
                    total_price: line.price.total_price,
                })
                .collect(),
            totals,
        })
    }

    /// Create a new order
    ///
    /// # Validation
    /// - At least one item, every quantity positive
    /// - End date not before start date, start date not before today
    /// - Every item available over its period, re-checked under row locks
    ///
    /// Persisting the order, its items and the stock decrements is one
    /// transaction: any failure leaves nothing behind. The installment plan
    /// and the confirmation notification run afterwards and never fail the
    /// call.
    pub async fn create_order(&self, request: CreateOrderRequest) -> RentalResult<OrderCreation> {
        request.validate()?;
        let now = Utc::now();
        let period = RentalPeriod::new(request.start_date, request.end_date)?;

        let priced = price_requests(self.store.as_ref(), &request.items, period, now).await?;
        let lines: Vec<PricedLine> = priced.iter().map(PricedRequest::priced_line).collect();
        let totals = TotalsCalculator::quote(request.loyalty_tier, &lines, &request.delivery);
        let is_calculator_event = priced.iter().any(|line| line.request.calculator.is_some());

        let mut tx = self.store.begin().await?;

        // Lock every product the order touches, packs through their leaves
        let mut lock_ids = Vec::new();
        for line in &priced {
            lock_ids.push(line.product.id);
            for leaf in AvailabilityChecker::decompose(&mut *tx, &line.product, 1).await? {
                lock_ids.push(leaf.product.id);
            }
        }
        tx.lock_products(&lock_ids).await?;

        let mut claims: HashMap<Uuid, i32> = HashMap::new();
        let mut leaf_totals: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in &priced {
            let product = tx
                .product(line.product.id)
                .await?
                .ok_or_else(|| RentalError::not_found("Product", line.product.id))?;
            let demand = AvailabilityChecker::claim(
                &mut *tx,
                &product,
                line.request.quantity,
                line.period,
                now,
                &mut claims,
            )
            .await?;
            for leaf in demand {
                *leaf_totals.entry(leaf.product.id).or_insert(0) += leaf.quantity;
            }
        }

        let order_number = tx.next_order_number(now.year()).await?;
        let order = Order {
            id: Uuid::new_v4(),
            order_number,
            user_id: request.user_id,
            status: OrderStatus::Pending,
            payment_status: Self::initial_payment_status(request.captured_payment.as_ref(), totals.total),
            loyalty_tier: request.loyalty_tier,
            start_date: period.start,
            end_date: period.end,
            subtotal: totals.subtotal,
            discount_amount: totals.discount_amount,
            delivery_cost: totals.delivery_cost,
            tax_amount: totals.tax_amount,
            deposit_amount: totals.deposit_amount,
            total: totals.total,
            deposit_status: if totals.deposit_amount > Decimal::ZERO {
                DepositStatus::Held
            } else {
                DepositStatus::NotRequired
            },
            is_modified: false,
            modification_count: 0,
            eligible_for_installments: false,
            is_calculator_event,
            payment_intent_id: request
                .captured_payment
                .as_ref()
                .map(|payment| payment.payment_intent_id.clone()),
            refund_amount: None,
            refund_status: None,
            return_notes: None,
            cancelled_at: None,
            delivered_at: None,
            completed_at: None,
            returned_at: None,
            created_at: now,
            updated_at: now,
        };
        let items: Vec<OrderItem> = priced.into_iter().map(|line| line.into_item(order.id, now)).collect();

        tx.insert_order(&order, &items).await?;
        for (product_id, quantity) in &leaf_totals {
            tx.apply_stock_adjustment(StockAdjustment {
                product_id: *product_id,
                delta: -quantity,
            })
            .await?;
            tx.increment_times_rented(*product_id).await?;
        }
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "Order created with {} items",
            items.len()
        );

        let (installment_plan_created, installments) = if request.eligible_for_installments
            && scheduler::qualifies(order.total, order.is_calculator_event)
        {
            self.schedule_installments(&order, request.captured_payment.as_ref()).await
        } else {
            (false, Vec::new())
        };

        notify_best_effort(
            self.notifier.as_ref(),
            NotificationTemplate::OrderConfirmation,
            Recipient::Customer(order.user_id),
            json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "total": order.total,
                "start_date": order.start_date,
            }),
        )
        .await;

        // Pick up flags the plan step may have written
        let order = match self.store.find_order(order.id).await {
            Ok(Some(stored)) => stored,
            _ => order,
        };

        Ok(OrderCreation {
            order: OrderDetails { order, items },
            installment_plan_created,
            installments,
        })
    }

    fn initial_payment_status(captured: Option<&CapturedPayment>, total: Decimal) -> PaymentStatus {
        match captured {
            Some(payment) if payment.amount >= total => PaymentStatus::Paid,
            Some(payment) if payment.amount > Decimal::ZERO => PaymentStatus::PartiallyPaid,
            _ => PaymentStatus::Unpaid,
        }
    }

    /// Best-effort plan creation after the order committed
    async fn schedule_installments(
        &self,
        order: &Order,
        captured: Option<&CapturedPayment>,
    ) -> (bool, Vec<PaymentInstallment>) {
        let mut plan = match self
            .installments
            .create_installments(order.id, order.total, order.start_date)
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(
                    order_id = %order.id,
                    "Installment plan creation failed, order kept without plan: {}",
                    e
                );
                return (false, Vec::new());
            }
        };

        if let (Some(payment), Some(first)) = (captured, plan.first().cloned()) {
            match self
                .installments
                .mark_installment_as_paid(first.id, &payment.payment_intent_id)
                .await
            {
                Ok(paid) => plan[0] = paid,
                Err(e) => tracing::warn!(
                    order_id = %order.id,
                    installment_id = %first.id,
                    "Could not mark first installment paid: {}",
                    e
                ),
            }
        }

        (true, plan)
    }

    /// Get an order with its items
    pub async fn get_order(&self, order_id: Uuid) -> RentalResult<OrderDetails> {
        let order = self.load_order(order_id).await?;
        let items = self.store.find_order_items(order_id).await?;
        Ok(OrderDetails { order, items })
    }

    /// Orders of a customer, newest first
    pub async fn list_orders_for_user(&self, user_id: Uuid) -> RentalResult<Vec<Order>> {
        self.store.find_orders_by_user(user_id).await
    }

    /// Update order status
    ///
    /// Moving to `Cancelled` or `Returned` puts the items' stock back.
    /// A rejected transition changes nothing.
    pub async fn update_order_status(&self, order_id: Uuid, new_status: OrderStatus) -> RentalResult<Order> {
        let order = self.load_order(order_id).await?;
        self.apply_status(order, new_status).await
    }

    /// Close a rental once the equipment is back
    ///
    /// Releases the deposit hold and records the condition notes.
    pub async fn mark_as_returned(&self, order_id: Uuid, condition_notes: Option<String>) -> RentalResult<Order> {
        let mut order = self.load_order(order_id).await?;
        StatusMachine::transition(order.status, OrderStatus::Returned)?;

        if order.deposit_status == DepositStatus::Held {
            order.deposit_status = DepositStatus::Released;
        }
        order.return_notes = condition_notes;
        self.apply_status(order, OrderStatus::Returned).await
    }

    /// Settle an order-level gateway payment reported by webhook
    pub async fn record_gateway_payment(
        &self,
        order_id: Uuid,
        payment_intent_id: &str,
        succeeded: bool,
    ) -> RentalResult<Order> {
        let mut order = self.load_order(order_id).await?;
        order.payment_intent_id = Some(payment_intent_id.to_string());
        order.payment_status = if succeeded {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Failed
        };
        order.updated_at = Utc::now();
        self.store.update_order(&order).await?;

        tracing::info!(order_id = %order.id, succeeded, "Order payment settled by gateway");
        Ok(order)
    }

    async fn load_order(&self, order_id: Uuid) -> RentalResult<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Order", order_id))
    }

    async fn apply_status(&self, mut order: Order, new_status: OrderStatus) -> RentalResult<Order> {
        let previous = order.status;
        order.status = StatusMachine::transition(previous, new_status)?;

        let now = Utc::now();
        match new_status {
            OrderStatus::Cancelled => order.cancelled_at = Some(now),
            OrderStatus::Delivered => order.delivered_at = Some(now),
            OrderStatus::Completed => order.completed_at = Some(now),
            OrderStatus::Returned => order.returned_at = Some(now),
            _ => {}
        }
        order.updated_at = now;
        if matches!(new_status, OrderStatus::Cancelled | OrderStatus::Returned) {
            close_order(self.store.as_ref(), &order, previous).await?;
        } else {
            self.store.update_order(&order).await?;
        }

        tracing::info!(
            order_id = %order.id,
            from = %previous,
            to = %new_status,
            "Order status updated"
        );

        if new_status == OrderStatus::Cancelled {
            notify_best_effort(
                self.notifier.as_ref(),
                NotificationTemplate::OrderCancelled,
                Recipient::Customer(order.user_id),
                json!({ "order_id": order.id, "order_number": order.order_number }),
            )
            .await;
        }

        Ok(order)
    }
}
