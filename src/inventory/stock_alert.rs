// Stock Alert Auditor
//
// Batch job: recomputes demand from every active order against physical stock
// and reports products that will run short, so purchasing can act. Far-future
// rentals granted by the lead-time exemption are caught here.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RentalResult;
use crate::inventory::{AvailabilityChecker, RentalPeriod};
use crate::notifications::{notify_best_effort, NotificationTemplate, Notifier, Recipient};
use crate::store::{RentalStore, StoreView};

/// One product whose peak demand exceeds its stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAlert {
    pub product_id: Uuid,
    pub product_name: String,
    pub effective_stock: i32,
    pub peak_demand: i32,
    pub deficit: i32,
    pub peak_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockAuditReport {
    pub generated_at: DateTime<Utc>,
    pub products_checked: usize,
    pub alerts: Vec<StockAlert>,
}

#[derive(Clone)]
pub struct StockAlertAuditor {
    store: Arc<dyn RentalStore>,
    notifier: Arc<dyn Notifier>,
}

impl StockAlertAuditor {
    pub fn new(store: Arc<dyn RentalStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Run one audit pass
    pub async fn run(&self, now: DateTime<Utc>) -> RentalResult<StockAuditReport> {
        let reservations = self.store.active_reservations(now).await?;
        tracing::debug!("Auditing {} active reservation lines", reservations.len());

        let mut view = StoreView(self.store.as_ref());
        let mut per_leaf: HashMap<Uuid, Vec<(RentalPeriod, i32)>> = HashMap::new();
        let mut leaves = HashMap::new();

        for line in &reservations {
            let Some(product) = self.store.find_product(line.product_id).await? else {
                tracing::warn!(product_id = %line.product_id, "Reserved product no longer exists, skipping");
                continue;
            };
            for leaf in AvailabilityChecker::decompose(&mut view, &product, line.quantity).await? {
                per_leaf
                    .entry(leaf.product.id)
                    .or_default()
                    .push((line.period, leaf.quantity));
                leaves.insert(leaf.product.id, leaf.product);
            }
        }

        let mut alerts = Vec::new();
        for (product_id, lines) in &per_leaf {
            let Some(product) = leaves.get(product_id) else {
                continue;
            };
            let Some((peak_date, peak_demand)) = peak_demand(lines) else {
                continue;
            };
            let checked_out = match product.real_stock {
                Some(_) => 0,
                None => self.store.checked_out_quantity(*product_id).await?,
            };
            let effective_stock = product.effective_stock(checked_out);
            if peak_demand > effective_stock {
                alerts.push(StockAlert {
                    product_id: *product_id,
                    product_name: product.name.clone(),
                    effective_stock,
                    peak_demand,
                    deficit: peak_demand - effective_stock,
                    peak_date,
                });
            }
        }
        alerts.sort_by(|a, b| b.deficit.cmp(&a.deficit).then_with(|| a.product_name.cmp(&b.product_name)));

        for alert in &alerts {
            tracing::warn!(
                product_id = %alert.product_id,
                deficit = alert.deficit,
                peak_date = %alert.peak_date,
                "Stock deficit for {}",
                alert.product_name
            );
            notify_best_effort(
                self.notifier.as_ref(),
                NotificationTemplate::StockDeficit,
                Recipient::Purchasing,
                json!(alert),
            )
            .await;
        }

        tracing::info!(
            "Stock audit finished: {} products checked, {} deficits",
            per_leaf.len(),
            alerts.len()
        );

        Ok(StockAuditReport {
            generated_at: now,
            products_checked: per_leaf.len(),
            alerts,
        })
    }
}

/// Highest concurrent quantity over calendar days, with the first day it occurs
///
/// Day sweep: `+q` on the first rental day, `-q` the day after the last.
pub fn peak_demand(lines: &[(RentalPeriod, i32)]) -> Option<(NaiveDate, i32)> {
    let mut deltas: BTreeMap<NaiveDate, i32> = BTreeMap::new();
    for (period, quantity) in lines {
        *deltas.entry(period.start.date_naive()).or_insert(0) += quantity;
        *deltas
            .entry(period.end.date_naive() + Duration::days(1))
            .or_insert(0) -= quantity;
    }

    let mut running = 0;
    let mut peak: Option<(NaiveDate, i32)> = None;
    for (day, delta) in deltas {
        running += delta;
        if peak.map_or(true, |(_, best)| running > best) {
            peak = Some((day, running));
        }
    }
    peak
}
