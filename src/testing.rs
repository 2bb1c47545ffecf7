// Fixtures shared by the unit and router tests

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::inventory::{AvailabilityChecker, PackComponent, Product, RentalPeriod};
use crate::orders::{DepositStatus, Order, OrderItem, OrderStatus, PaymentStatus};
use crate::pricing::{LoyaltyTier, PriceCalculator};
use crate::store::{InMemoryRentalStore, RentalStore};

/// Noon UTC, `days` calendar days from today
///
/// Pinned to noon so two calls for the same day return the same instant.
pub fn days_from_now(days: i64) -> DateTime<Utc> {
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&(Utc::now().date_naive() + Duration::days(days)).and_time(noon))
}

/// A leaf product priced at 10 per day
pub fn leaf(name: &str, stock: i32) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        price_per_day: Decimal::from(10),
        price_per_weekend: None,
        price_per_week: None,
        stock,
        real_stock: None,
        custom_deposit: None,
        is_pack: false,
        components: Vec::new(),
        times_rented: 0,
    }
}

/// A pack built from `(component, quantity per pack)` pairs
pub fn pack(name: &str, components: &[(&Product, i32)]) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        price_per_day: Decimal::from(50),
        price_per_weekend: None,
        price_per_week: None,
        stock: 0,
        real_stock: None,
        custom_deposit: None,
        is_pack: true,
        components: components
            .iter()
            .map(|(product, quantity)| PackComponent {
                component_id: product.id,
                quantity: *quantity,
            })
            .collect(),
        times_rented: 0,
    }
}

/// A bare order over `period`, all money fields zero
pub fn order(status: OrderStatus, period: RentalPeriod) -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        order_number: format!("RNT-TEST-{}", Uuid::new_v4().simple()),
        user_id: Uuid::new_v4(),
        status,
        payment_status: PaymentStatus::Unpaid,
        loyalty_tier: LoyaltyTier::Standard,
        start_date: period.start,
        end_date: period.end,
        subtotal: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        delivery_cost: Decimal::ZERO,
        tax_amount: Decimal::ZERO,
        deposit_amount: Decimal::ZERO,
        total: Decimal::ZERO,
        deposit_status: DepositStatus::Held,
        is_modified: false,
        modification_count: 0,
        eligible_for_installments: false,
        is_calculator_event: false,
        payment_intent_id: None,
        refund_amount: None,
        refund_status: None,
        return_notes: None,
        cancelled_at: None,
        delivered_at: None,
        completed_at: None,
        returned_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// One priced line of `order`
pub fn item(order: &Order, product: &Product, quantity: i32) -> OrderItem {
    let period = order.period();
    let price = PriceCalculator::price_item(product, quantity, &period);
    OrderItem {
        id: Uuid::new_v4(),
        order_id: order.id,
        product_id: product.id,
        quantity,
        price_per_day: product.price_per_day,
        price_per_unit: price.price_per_unit,
        total_price: price.total_price,
        start_date: period.start,
        end_date: period.end,
        calculator: None,
        created_at: order.created_at,
    }
}

/// Store a confirmed order holding `quantity` of `product` over `period`
///
/// Written straight to the store without an availability check. Stock is
/// deducted the same way order creation does it.
pub async fn reserve(store: &InMemoryRentalStore, product: &Product, quantity: i32, period: RentalPeriod) -> Order {
    let order = order(OrderStatus::Confirmed, period);
    let line = item(&order, product, quantity);
    let mut tx = store.begin().await.expect("begin transaction");
    let adjustments = AvailabilityChecker::stock_adjustments(&mut *tx, &[(product.id, quantity)], -1)
        .await
        .expect("stock adjustments");
    tx.insert_order(&order, &[line]).await.expect("insert order");
    for adjustment in adjustments {
        tx.apply_stock_adjustment(adjustment).await.expect("adjust stock");
    }
    tx.commit().await.expect("commit");
    order
}
