// Postgres rental store
//
// Runtime-checked sqlx queries against the schema in `migrations/`. Product
// rows are locked with `SELECT ... FOR UPDATE` inside order creation and
// stock is only ever changed by relative updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{RentalError, RentalResult};
use crate::installments::PaymentInstallment;
use crate::inventory::{PackComponent, Product, RentalPeriod, StockAdjustment};
use crate::modifications::OrderModification;
use crate::orders::{CalculatorMetadata, Order, OrderItem, OrderStatus};
use crate::store::{InventoryView, RentalStore, RentalTx, ReservationLine};

const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.name, p.price_per_day, p.price_per_weekend, p.price_per_week,
           p.stock, p.real_stock, p.custom_deposit, p.is_pack, p.times_rented,
           COALESCE(
               (SELECT json_agg(json_build_object('component_id', pc.component_id, 'quantity', pc.quantity))
                FROM pack_components pc WHERE pc.pack_id = p.id),
               '[]'::json
           ) AS components
    FROM products p
"#;

/// Reserved units of a leaf, counting pack lines through their components
const RESERVED_QUANTITY_SQL: &str = r#"
    WITH RECURSIVE containment (product_id, units, depth) AS (
        SELECT $1::uuid, 1, 0
        UNION ALL
        SELECT pc.pack_id, c.units * pc.quantity, c.depth + 1
        FROM pack_components pc
        JOIN containment c ON pc.component_id = c.product_id
        JOIN products p ON p.id = pc.pack_id AND p.is_pack
        WHERE c.depth < 4
    )
    SELECT COALESCE(SUM(oi.quantity * c.units), 0)::int4
    FROM order_items oi
    JOIN orders o ON o.id = oi.order_id
    JOIN containment c ON c.product_id = oi.product_id
    WHERE o.status IN ('pending', 'confirmed', 'preparing', 'ready', 'in_transit', 'delivered')
      AND oi.start_date <= $3
      AND oi.end_date >= $2
"#;

/// Units of a leaf still deducted from `products.stock`, any dates
const CHECKED_OUT_QUANTITY_SQL: &str = r#"
    WITH RECURSIVE containment (product_id, units, depth) AS (
        SELECT $1::uuid, 1, 0
        UNION ALL
        SELECT pc.pack_id, c.units * pc.quantity, c.depth + 1
        FROM pack_components pc
        JOIN containment c ON pc.component_id = c.product_id
        JOIN products p ON p.id = pc.pack_id AND p.is_pack
        WHERE c.depth < 4
    )
    SELECT COALESCE(SUM(oi.quantity * c.units), 0)::int4
    FROM order_items oi
    JOIN orders o ON o.id = oi.order_id
    JOIN containment c ON c.product_id = oi.product_id
    WHERE o.status NOT IN ('cancelled', 'returned')
"#;

const ORDER_UPDATE_SQL: &str = r#"
    UPDATE orders
    SET status = $2, payment_status = $3, subtotal = $4, discount_amount = $5,
        delivery_cost = $6, tax_amount = $7, deposit_amount = $8, total = $9,
        deposit_status = $10, is_modified = $11, modification_count = $12,
        eligible_for_installments = $13, payment_intent_id = $14, refund_amount = $15,
        refund_status = $16, return_notes = $17, cancelled_at = $18, delivered_at = $19,
        completed_at = $20, returned_at = $21, updated_at = $22
    WHERE id = $1
"#;

const ORDER_COLUMNS: &str = r#"
    id, order_number, user_id, status, payment_status, loyalty_tier, start_date, end_date,
    subtotal, discount_amount, delivery_cost, tax_amount, deposit_amount, total, deposit_status,
    is_modified, modification_count, eligible_for_installments, is_calculator_event,
    payment_intent_id, refund_amount, refund_status, return_notes,
    cancelled_at, delivered_at, completed_at, returned_at, created_at, updated_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, order_id, product_id, quantity, price_per_day, price_per_unit, total_price,
    start_date, end_date, calculator, created_at
"#;

const MODIFICATION_COLUMNS: &str = r#"
    id, order_id, modification_type, previous_total, new_total, difference, payment_status,
    payment_intent_id, gateway_refund_id, failure_reason, approved_by, approved_at,
    created_at, updated_at
"#;

const INSTALLMENT_COLUMNS: &str = r#"
    id, order_id, installment_number, percentage, amount, due_date, status, paid_date,
    gateway_payment_id, failure_reason, created_at, updated_at
"#;

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    price_per_day: Decimal,
    price_per_weekend: Option<Decimal>,
    price_per_week: Option<Decimal>,
    stock: i32,
    real_stock: Option<i32>,
    custom_deposit: Option<Decimal>,
    is_pack: bool,
    times_rented: i32,
    components: Json<Vec<PackComponent>>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            price_per_day: row.price_per_day,
            price_per_weekend: row.price_per_weekend,
            price_per_week: row.price_per_week,
            stock: row.stock,
            real_stock: row.real_stock,
            custom_deposit: row.custom_deposit,
            is_pack: row.is_pack,
            components: row.components.0,
            times_rented: row.times_rented,
        }
    }
}

#[derive(FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    price_per_day: Decimal,
    price_per_unit: Decimal,
    total_price: Decimal,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    calculator: Option<Json<CalculatorMetadata>>,
    created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity,
            price_per_day: row.price_per_day,
            price_per_unit: row.price_per_unit,
            total_price: row.total_price,
            start_date: row.start_date,
            end_date: row.end_date,
            calculator: row.calculator.map(|metadata| metadata.0),
            created_at: row.created_at,
        }
    }
}

async fn fetch_product<'e, E: PgExecutor<'e>>(executor: E, product_id: Uuid) -> RentalResult<Option<Product>> {
    let row = sqlx::query_as::<_, ProductRow>(&format!("{} WHERE p.id = $1", PRODUCT_SELECT))
        .bind(product_id)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(Product::from))
}

async fn fetch_reserved_quantity<'e, E: PgExecutor<'e>>(
    executor: E,
    product_id: Uuid,
    period: RentalPeriod,
) -> RentalResult<i32> {
    let reserved = sqlx::query_scalar::<_, i32>(RESERVED_QUANTITY_SQL)
        .bind(product_id)
        .bind(period.start)
        .bind(period.end)
        .fetch_one(executor)
        .await?;

    Ok(reserved)
}

async fn fetch_checked_out_quantity<'e, E: PgExecutor<'e>>(executor: E, product_id: Uuid) -> RentalResult<i32> {
    let checked_out = sqlx::query_scalar::<_, i32>(CHECKED_OUT_QUANTITY_SQL)
        .bind(product_id)
        .fetch_one(executor)
        .await?;

    Ok(checked_out)
}

/// Bind `$1..$22` of [`ORDER_UPDATE_SQL`]
fn bind_order_update<'q>(query: Query<'q, Postgres, PgArguments>, order: &'q Order) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(order.id)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.subtotal)
        .bind(order.discount_amount)
        .bind(order.delivery_cost)
        .bind(order.tax_amount)
        .bind(order.deposit_amount)
        .bind(order.total)
        .bind(order.deposit_status)
        .bind(order.is_modified)
        .bind(order.modification_count)
        .bind(order.eligible_for_installments)
        .bind(&order.payment_intent_id)
        .bind(order.refund_amount)
        .bind(order.refund_status)
        .bind(&order.return_notes)
        .bind(order.cancelled_at)
        .bind(order.delivered_at)
        .bind(order.completed_at)
        .bind(order.returned_at)
        .bind(order.updated_at)
}

async fn adjust_stock<'e, E: PgExecutor<'e>>(executor: E, adjustment: StockAdjustment) -> RentalResult<()> {
    let result = sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
        .bind(adjustment.product_id)
        .bind(adjustment.delta)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RentalError::not_found("Product", adjustment.product_id));
    }
    Ok(())
}

async fn insert_item<'e, E: PgExecutor<'e>>(executor: E, item: &OrderItem) -> RentalResult<()> {
    sqlx::query(&format!(
        "INSERT INTO order_items ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        ITEM_COLUMNS
    ))
    .bind(item.id)
    .bind(item.order_id)
    .bind(item.product_id)
    .bind(item.quantity)
    .bind(item.price_per_day)
    .bind(item.price_per_unit)
    .bind(item.total_price)
    .bind(item.start_date)
    .bind(item.end_date)
    .bind(item.calculator.clone().map(Json))
    .bind(item.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Postgres-backed [`RentalStore`]
#[derive(Clone)]
pub struct PgRentalStore {
    pool: PgPool,
}

impl PgRentalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InventoryView for PgTx {
    async fn product(&mut self, product_id: Uuid) -> RentalResult<Option<Product>> {
        fetch_product(&mut *self.tx, product_id).await
    }

    async fn reserved_quantity(&mut self, product_id: Uuid, period: RentalPeriod) -> RentalResult<i32> {
        fetch_reserved_quantity(&mut *self.tx, product_id, period).await
    }

    async fn checked_out_quantity(&mut self, product_id: Uuid) -> RentalResult<i32> {
        fetch_checked_out_quantity(&mut *self.tx, product_id).await
    }
}

#[async_trait]
impl RentalTx for PgTx {
    async fn lock_products(&mut self, product_ids: &[Uuid]) -> RentalResult<()> {
        // Sorted ids give every transaction the same lock order
        let mut ids = product_ids.to_vec();
        ids.sort();
        ids.dedup();

        sqlx::query("SELECT id FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn next_order_number(&mut self, year: i32) -> RentalResult<String> {
        let sequence = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO order_number_sequences (year, last_value)
            VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE SET last_value = order_number_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(year)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(format!("RNT-{}-{:05}", year, sequence))
    }

    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> RentalResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO orders ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)
            "#,
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.loyalty_tier)
        .bind(order.start_date)
        .bind(order.end_date)
        .bind(order.subtotal)
        .bind(order.discount_amount)
        .bind(order.delivery_cost)
        .bind(order.tax_amount)
        .bind(order.deposit_amount)
        .bind(order.total)
        .bind(order.deposit_status)
        .bind(order.is_modified)
        .bind(order.modification_count)
        .bind(order.eligible_for_installments)
        .bind(order.is_calculator_event)
        .bind(&order.payment_intent_id)
        .bind(order.refund_amount)
        .bind(order.refund_status)
        .bind(&order.return_notes)
        .bind(order.cancelled_at)
        .bind(order.delivered_at)
        .bind(order.completed_at)
        .bind(order.returned_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for item in items {
            insert_item(&mut *self.tx, item).await?;
        }

        Ok(())
    }

    async fn apply_stock_adjustment(&mut self, adjustment: StockAdjustment) -> RentalResult<()> {
        adjust_stock(&mut *self.tx, adjustment).await
    }

    async fn increment_times_rented(&mut self, product_id: Uuid) -> RentalResult<()> {
        sqlx::query("UPDATE products SET times_rented = times_rented + 1 WHERE id = $1")
            .bind(product_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn update_order(&mut self, order: &Order, expected: OrderStatus) -> RentalResult<()> {
        let sql = format!("{} AND status = $23", ORDER_UPDATE_SQL);
        let result = bind_order_update(sqlx::query(&sql), order)
            .bind(expected)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            let current = sqlx::query_scalar::<_, OrderStatus>("SELECT status FROM orders WHERE id = $1")
                .bind(order.id)
                .fetch_optional(&mut *self.tx)
                .await?;
            return Err(match current {
                None => RentalError::not_found("Order", order.id),
                Some(status) => RentalError::Conflict(format!(
                    "order {} is {}, expected {}",
                    order.id, status, expected
                )),
            });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RentalResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RentalStore for PgRentalStore {
    async fn begin(&self) -> RentalResult<Box<dyn RentalTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn find_product(&self, product_id: Uuid) -> RentalResult<Option<Product>> {
        fetch_product(&self.pool, product_id).await
    }

    async fn list_products(&self) -> RentalResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("{} ORDER BY p.name", PRODUCT_SELECT))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn reserved_quantity(&self, product_id: Uuid, period: RentalPeriod) -> RentalResult<i32> {
        fetch_reserved_quantity(&self.pool, product_id, period).await
    }

    async fn checked_out_quantity(&self, product_id: Uuid) -> RentalResult<i32> {
        fetch_checked_out_quantity(&self.pool, product_id).await
    }

    async fn apply_stock_adjustments(&self, adjustments: &[StockAdjustment]) -> RentalResult<()> {
        let mut tx = self.pool.begin().await?;
        for adjustment in adjustments {
            adjust_stock(&mut *tx, *adjustment).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn active_reservations(&self, now: DateTime<Utc>) -> RentalResult<Vec<ReservationLine>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, i32, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            SELECT oi.order_id, oi.product_id, oi.quantity, oi.start_date, oi.end_date
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.status IN ('pending', 'confirmed', 'preparing', 'ready', 'in_transit', 'delivered')
              AND oi.end_date >= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(order_id, product_id, quantity, start, end)| ReservationLine {
                order_id,
                product_id,
                quantity,
                period: RentalPeriod { start, end },
            })
            .collect())
    }

    async fn find_order(&self, order_id: Uuid) -> RentalResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    async fn find_orders_by_user(&self, user_id: Uuid) -> RentalResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn find_order_items(&self, order_id: Uuid) -> RentalResult<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY created_at, id",
            ITEM_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn update_order(&self, order: &Order) -> RentalResult<()> {
        let result = bind_order_update(sqlx::query(ORDER_UPDATE_SQL), order)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RentalError::not_found("Order", order.id));
        }
        Ok(())
    }

    async fn insert_order_items(&self, items: &[OrderItem]) -> RentalResult<()> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            insert_item(&mut *tx, item).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_order_items(&self, order_id: Uuid, item_ids: &[Uuid]) -> RentalResult<()> {
        sqlx::query("DELETE FROM order_items WHERE order_id = $1 AND id = ANY($2)")
            .bind(order_id)
            .bind(item_ids)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_modification(&self, modification: &OrderModification) -> RentalResult<()> {
        sqlx::query(&format!(
            "INSERT INTO order_modifications ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            MODIFICATION_COLUMNS
        ))
        .bind(modification.id)
        .bind(modification.order_id)
        .bind(modification.modification_type)
        .bind(modification.previous_total)
        .bind(modification.new_total)
        .bind(modification.difference)
        .bind(modification.payment_status)
        .bind(&modification.payment_intent_id)
        .bind(&modification.gateway_refund_id)
        .bind(&modification.failure_reason)
        .bind(modification.approved_by)
        .bind(modification.approved_at)
        .bind(modification.created_at)
        .bind(modification.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_modification(&self, modification: &OrderModification) -> RentalResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE order_modifications
            SET payment_status = $2, payment_intent_id = $3, gateway_refund_id = $4,
                failure_reason = $5, approved_by = $6, approved_at = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(modification.id)
        .bind(modification.payment_status)
        .bind(&modification.payment_intent_id)
        .bind(&modification.gateway_refund_id)
        .bind(&modification.failure_reason)
        .bind(modification.approved_by)
        .bind(modification.approved_at)
        .bind(modification.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RentalError::not_found("Modification", modification.id));
        }
        Ok(())
    }

    async fn find_modification(&self, modification_id: Uuid) -> RentalResult<Option<OrderModification>> {
        let modification = sqlx::query_as::<_, OrderModification>(&format!(
            "SELECT {} FROM order_modifications WHERE id = $1",
            MODIFICATION_COLUMNS
        ))
        .bind(modification_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(modification)
    }

    async fn find_modifications_by_order(&self, order_id: Uuid) -> RentalResult<Vec<OrderModification>> {
        let modifications = sqlx::query_as::<_, OrderModification>(&format!(
            "SELECT {} FROM order_modifications WHERE order_id = $1 ORDER BY created_at",
            MODIFICATION_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(modifications)
    }

    async fn pending_refunds(&self) -> RentalResult<Vec<OrderModification>> {
        let modifications = sqlx::query_as::<_, OrderModification>(&format!(
            "SELECT {} FROM order_modifications WHERE difference < 0 AND payment_status = 'pending' ORDER BY created_at",
            MODIFICATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(modifications)
    }

    async fn claim_refund(
        &self,
        modification_id: Uuid,
        now: DateTime<Utc>,
    ) -> RentalResult<Option<OrderModification>> {
        // Row-level compare-and-set: concurrent approvals serialize on the row
        // and only the first still sees 'pending'
        let claimed = sqlx::query_as::<_, OrderModification>(&format!(
            r#"
            UPDATE order_modifications
            SET payment_status = 'refund_processing', updated_at = $2
            WHERE id = $1 AND difference < 0 AND payment_status = 'pending'
            RETURNING {}
            "#,
            MODIFICATION_COLUMNS
        ))
        .bind(modification_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed)
    }

    async fn insert_installments(&self, installments: &[PaymentInstallment]) -> RentalResult<()> {
        let mut tx = self.pool.begin().await?;
        for installment in installments {
            sqlx::query(&format!(
                "INSERT INTO payment_installments ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
                INSTALLMENT_COLUMNS
            ))
            .bind(installment.id)
            .bind(installment.order_id)
            .bind(installment.installment_number)
            .bind(installment.percentage)
            .bind(installment.amount)
            .bind(installment.due_date)
            .bind(installment.status)
            .bind(installment.paid_date)
            .bind(&installment.gateway_payment_id)
            .bind(&installment.failure_reason)
            .bind(installment.created_at)
            .bind(installment.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_installment(&self, installment: &PaymentInstallment) -> RentalResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_installments
            SET status = $2, paid_date = $3, gateway_payment_id = $4, failure_reason = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(installment.id)
        .bind(installment.status)
        .bind(installment.paid_date)
        .bind(&installment.gateway_payment_id)
        .bind(&installment.failure_reason)
        .bind(installment.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RentalError::not_found("Installment", installment.id));
        }
        Ok(())
    }

    async fn find_installment(&self, installment_id: Uuid) -> RentalResult<Option<PaymentInstallment>> {
        let installment = sqlx::query_as::<_, PaymentInstallment>(&format!(
            "SELECT {} FROM payment_installments WHERE id = $1",
            INSTALLMENT_COLUMNS
        ))
        .bind(installment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(installment)
    }

    async fn find_installments_by_order(&self, order_id: Uuid) -> RentalResult<Vec<PaymentInstallment>> {
        let installments = sqlx::query_as::<_, PaymentInstallment>(&format!(
            "SELECT {} FROM payment_installments WHERE order_id = $1 ORDER BY installment_number",
            INSTALLMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(installments)
    }

    async fn pending_installments_due_before(&self, before: DateTime<Utc>) -> RentalResult<Vec<PaymentInstallment>> {
        let installments = sqlx::query_as::<_, PaymentInstallment>(&format!(
            "SELECT {} FROM payment_installments WHERE status = 'pending' AND due_date < $1 ORDER BY due_date",
            INSTALLMENT_COLUMNS
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        Ok(installments)
    }
}
