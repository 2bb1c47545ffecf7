// Availability Checker
//
// Decides whether a quantity of a product can be rented over a period against
// finite stock, decomposing packs into their component leaf products.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{RentalError, RentalResult};
use crate::inventory::{Availability, Product, RentalPeriod, StockAdjustment};
use crate::store::InventoryView;

/// Rentals starting further out than this are always granted
pub const LEAD_TIME_DAYS: i64 = 30;

/// Deepest pack-inside-pack nesting that is decomposed
const MAX_PACK_DEPTH: usize = 4;

/// Quantity of one leaf product needed by an order line
#[derive(Debug, Clone)]
pub struct LeafDemand {
    pub product: Product,
    pub quantity: i32,
}

/// Availability Checker
///
/// Stateless: every read goes through the [`InventoryView`] it is handed, so
/// the same logic serves advisory checks and the locked re-check inside the
/// order creation transaction.
pub struct AvailabilityChecker;

impl AvailabilityChecker {
    /// Far-future rentals bypass the overlap computation entirely
    pub fn lead_time_exempt(period: &RentalPeriod, now: DateTime<Utc>) -> bool {
        period.start - now > Duration::days(LEAD_TIME_DAYS)
    }

    /// `checkAvailability(productId, quantity, startDate, endDate)`
    pub async fn check<V: InventoryView + ?Sized>(
        view: &mut V,
        product_id: Uuid,
        quantity: i32,
        period: RentalPeriod,
        now: DateTime<Utc>,
    ) -> RentalResult<Availability> {
        if quantity <= 0 {
            return Err(RentalError::Validation(format!(
                "Quantity must be positive, got {}",
                quantity
            )));
        }

        let product = view
            .product(product_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Product", product_id))?;

        if Self::lead_time_exempt(&period, now) {
            tracing::debug!(
                product_id = %product_id,
                "Rental starts more than {} days out, granting availability",
                LEAD_TIME_DAYS
            );
            return Ok(Availability {
                available: true,
                available_qty: quantity,
            });
        }

        let available_qty = Self::available_units(view, &product, period, &HashMap::new()).await?;

        Ok(Availability {
            available: available_qty >= quantity,
            available_qty,
        })
    }

    /// Re-check one order line and claim its demand
    ///
    /// `claims` carries leaf quantities already taken by earlier lines of the
    /// same order, so that two lines cannot jointly oversell a product. On
    /// success the line's leaf demand is added to `claims` and returned.
    pub async fn claim<V: InventoryView + ?Sized>(
        view: &mut V,
        product: &Product,
        quantity: i32,
        period: RentalPeriod,
        now: DateTime<Utc>,
        claims: &mut HashMap<Uuid, i32>,
    ) -> RentalResult<Vec<LeafDemand>> {
        let demand = Self::decompose(view, product, quantity).await?;

        if !Self::lead_time_exempt(&period, now) {
            let available = Self::available_units(view, product, period, claims).await?;
            if available < quantity {
                tracing::debug!(
                    product_id = %product.id,
                    requested = quantity,
                    available,
                    "Availability re-check failed"
                );
                return Err(RentalError::InsufficientStock {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    requested: quantity,
                    available,
                });
            }
        }

        for leaf in &demand {
            *claims.entry(leaf.product.id).or_insert(0) += leaf.quantity;
        }

        Ok(demand)
    }

    /// Decompose `quantity` units of a product into leaf demand
    ///
    /// Leaf products decompose to themselves. The same leaf reached through
    /// several components is merged into one entry.
    pub async fn decompose<V: InventoryView + ?Sized>(
        view: &mut V,
        product: &Product,
        quantity: i32,
    ) -> RentalResult<Vec<LeafDemand>> {
        let mut leaves: Vec<LeafDemand> = Vec::new();
        let mut pending = vec![(product.clone(), quantity, 0usize)];

        while let Some((current, needed, depth)) = pending.pop() {
            if !current.is_composite() {
                match leaves.iter_mut().find(|leaf| leaf.product.id == current.id) {
                    Some(existing) => existing.quantity += needed,
                    None => leaves.push(LeafDemand {
                        product: current,
                        quantity: needed,
                    }),
                }
                continue;
            }

            if depth >= MAX_PACK_DEPTH {
                return Err(RentalError::Validation(format!(
                    "Pack {} nests deeper than {} levels",
                    product.name, MAX_PACK_DEPTH
                )));
            }

            for component in &current.components {
                let child = view
                    .product(component.component_id)
                    .await?
                    .ok_or_else(|| RentalError::not_found("Product", component.component_id))?;
                pending.push((child, needed * component.quantity, depth + 1));
            }
        }

        Ok(leaves)
    }

    /// Free units of one leaf over `period`, net of `claims`
    ///
    /// Overlapping reservations are subtracted from the stock before any
    /// reservation, so an order's own stock deduction is not counted twice.
    async fn leaf_free<V: InventoryView + ?Sized>(
        view: &mut V,
        leaf: &Product,
        period: RentalPeriod,
        claims: &HashMap<Uuid, i32>,
    ) -> RentalResult<i32> {
        let checked_out = match leaf.real_stock {
            Some(_) => 0,
            None => view.checked_out_quantity(leaf.id).await?,
        };
        let reserved = view.reserved_quantity(leaf.id, period).await?;
        let claimed = claims.get(&leaf.id).copied().unwrap_or(0);
        Ok((leaf.effective_stock(checked_out) - reserved - claimed).max(0))
    }

    /// Whole units of `product` that can still be rented over `period`
    ///
    /// For a pack this is the minimum over components of
    /// `floor(free / perPackQty)`.
    async fn available_units<V: InventoryView + ?Sized>(
        view: &mut V,
        product: &Product,
        period: RentalPeriod,
        claims: &HashMap<Uuid, i32>,
    ) -> RentalResult<i32> {
        let per_unit = Self::decompose(view, product, 1).await?;

        let mut units = i32::MAX;
        for leaf in &per_unit {
            if leaf.quantity <= 0 {
                continue;
            }
            let free = Self::leaf_free(view, &leaf.product, period, claims).await?;
            units = units.min(free / leaf.quantity);
        }

        Ok(if units == i32::MAX { 0 } else { units })
    }

    /// Stock changes for a set of `(product, quantity)` lines
    ///
    /// `sign` is -1 to reserve and +1 to release. Packs are decomposed so only
    /// leaf products are ever adjusted.
    pub async fn stock_adjustments<V: InventoryView + ?Sized>(
        view: &mut V,
        lines: &[(Uuid, i32)],
        sign: i32,
    ) -> RentalResult<Vec<StockAdjustment>> {
        let mut totals: HashMap<Uuid, i32> = HashMap::new();
        for (product_id, quantity) in lines {
            let product = view
                .product(*product_id)
                .await?
                .ok_or_else(|| RentalError::not_found("Product", product_id))?;
            for leaf in Self::decompose(view, &product, *quantity).await? {
                *totals.entry(leaf.product.id).or_insert(0) += leaf.quantity;
            }
        }

        let mut adjustments: Vec<StockAdjustment> = totals
            .into_iter()
            .map(|(product_id, quantity)| StockAdjustment {
                product_id,
                delta: sign * quantity,
            })
            .collect();
        adjustments.sort_by_key(|adjustment| adjustment.product_id);
        Ok(adjustments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryRentalStore, RentalStore, StoreView};
    use crate::testing::{self, days_from_now};

    fn period(start_days: i64, end_days: i64) -> RentalPeriod {
        RentalPeriod::new(days_from_now(start_days), days_from_now(end_days)).unwrap()
    }

    #[tokio::test]
    async fn test_real_stock_two_grants_two_rejects_three() {
        let store = InMemoryRentalStore::new();
        let mut product = testing::leaf("Moving Head", 10);
        product.real_stock = Some(2);
        store.insert_product(product.clone()).await;

        let mut view = StoreView(&store);
        let two = AvailabilityChecker::check(&mut view, product.id, 2, period(5, 7), Utc::now())
            .await
            .unwrap();
        assert!(two.available);
        assert_eq!(two.available_qty, 2);

        let three = AvailabilityChecker::check(&mut view, product.id, 3, period(5, 7), Utc::now())
            .await
            .unwrap();
        assert!(!three.available);
        assert_eq!(three.available_qty, 2);
    }

    #[tokio::test]
    async fn test_overlapping_reservation_reduces_availability() {
        let store = InMemoryRentalStore::new();
        let product = testing::leaf("Subwoofer", 4);
        store.insert_product(product.clone()).await;
        testing::reserve(&store, &product, 3, period(5, 8)).await;

        let mut view = StoreView(&store);
        // Shares the boundary day 8
        let touching = AvailabilityChecker::check(&mut view, product.id, 2, period(8, 10), Utc::now())
            .await
            .unwrap();
        assert!(!touching.available);
        assert_eq!(touching.available_qty, 1);

        let disjoint = AvailabilityChecker::check(&mut view, product.id, 4, period(9, 10), Utc::now())
            .await
            .unwrap();
        assert!(disjoint.available);
    }

    #[tokio::test]
    async fn test_nominal_stock_counts_each_reservation_once() {
        let store = InMemoryRentalStore::new();
        let product = testing::leaf("Speaker", 4);
        store.insert_product(product.clone()).await;
        testing::reserve(&store, &product, 2, period(5, 6)).await;
        assert_eq!(store.find_product(product.id).await.unwrap().unwrap().stock, 2);

        let mut view = StoreView(&store);
        let overlapping = AvailabilityChecker::check(&mut view, product.id, 2, period(5, 6), Utc::now())
            .await
            .unwrap();
        assert!(overlapping.available);
        assert_eq!(overlapping.available_qty, 2);

        let later = AvailabilityChecker::check(&mut view, product.id, 4, period(10, 11), Utc::now())
            .await
            .unwrap();
        assert!(later.available);
        assert_eq!(later.available_qty, 4);
    }

    #[tokio::test]
    async fn test_lead_time_exemption_bypasses_overlap() {
        let store = InMemoryRentalStore::new();
        let product = testing::leaf("Truss", 1);
        store.insert_product(product.clone()).await;
        testing::reserve(&store, &product, 1, period(40, 42)).await;

        let mut view = StoreView(&store);
        let result = AvailabilityChecker::check(&mut view, product.id, 5, period(40, 42), Utc::now())
            .await
            .unwrap();
        assert!(result.available);
        assert_eq!(result.available_qty, 5);
    }

    #[tokio::test]
    async fn test_pack_limited_by_scarcest_component() {
        let store = InMemoryRentalStore::new();
        let speaker = testing::leaf("Speaker", 6);
        let stand = testing::leaf("Stand", 3);
        let pack = testing::pack("PA Pack", &[(&speaker, 2), (&stand, 2)]);
        for product in [&speaker, &stand, &pack] {
            store.insert_product(product.clone()).await;
        }

        let mut view = StoreView(&store);
        let result = AvailabilityChecker::check(&mut view, pack.id, 2, period(3, 4), Utc::now())
            .await
            .unwrap();
        // 3 stands / 2 per pack = 1 pack
        assert!(!result.available);
        assert_eq!(result.available_qty, 1);
    }

    #[tokio::test]
    async fn test_pack_reservation_counts_against_components() {
        let store = InMemoryRentalStore::new();
        let speaker = testing::leaf("Speaker", 4);
        let pack = testing::pack("Duo", &[(&speaker, 2)]);
        store.insert_product(speaker.clone()).await;
        store.insert_product(pack.clone()).await;
        testing::reserve(&store, &pack, 1, period(3, 4)).await;

        let mut view = StoreView(&store);
        let result = AvailabilityChecker::check(&mut view, speaker.id, 3, period(3, 4), Utc::now())
            .await
            .unwrap();
        assert!(!result.available);
        assert_eq!(result.available_qty, 2);
    }

    #[tokio::test]
    async fn test_claims_prevent_duplicate_lines_overselling() {
        let store = InMemoryRentalStore::new();
        let product = testing::leaf("Hazer", 3);
        store.insert_product(product.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let mut claims = HashMap::new();
        let window = period(2, 3);
        AvailabilityChecker::claim(&mut *tx, &product, 2, window, Utc::now(), &mut claims)
            .await
            .unwrap();
        let second = AvailabilityChecker::claim(&mut *tx, &product, 2, window, Utc::now(), &mut claims).await;
        assert!(matches!(
            second,
            Err(RentalError::InsufficientStock { available: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let store = InMemoryRentalStore::new();
        let mut view = StoreView(&store);
        let result = AvailabilityChecker::check(&mut view, Uuid::new_v4(), 1, period(1, 2), Utc::now()).await;
        assert!(matches!(result, Err(RentalError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_stock_adjustments_merge_pack_and_leaf() {
        let store = InMemoryRentalStore::new();
        let speaker = testing::leaf("Speaker", 10);
        let pack = testing::pack("Duo", &[(&speaker, 2)]);
        store.insert_product(speaker.clone()).await;
        store.insert_product(pack.clone()).await;

        let mut view = StoreView(&store);
        let adjustments = AvailabilityChecker::stock_adjustments(&mut view, &[(pack.id, 2), (speaker.id, 1)], -1)
            .await
            .unwrap();
        assert_eq!(
            adjustments,
            vec![StockAdjustment {
                product_id: speaker.id,
                delta: -5
            }]
        );
    }
}
