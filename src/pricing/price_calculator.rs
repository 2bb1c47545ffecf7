use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::inventory::{Product, RentalPeriod};

/// Which duration tier priced a rental
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    Day,
    Weekend,
    Weekly,
    Daily,
}

/// Price of one order line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPrice {
    pub days: i64,
    pub tier: PriceTier,
    /// Price of one unit over the whole period
    pub price_per_unit: Decimal,
    pub total_price: Decimal,
}

/// Service for calculating rental line prices
pub struct PriceCalculator;

impl PriceCalculator {
    /// Select the single tier that applies to a span of `days`
    ///
    /// Evaluated in order: 1 day, 2-3 days, 7+ days, otherwise per day.
    pub fn tier_for(days: i64) -> PriceTier {
        match days {
            1 => PriceTier::Day,
            2 | 3 => PriceTier::Weekend,
            d if d >= 7 => PriceTier::Weekly,
            _ => PriceTier::Daily,
        }
    }

    /// Price of one unit of `product` for `days`
    ///
    /// Missing weekend or weekly prices fall back to `days * price_per_day`.
    pub fn unit_price(product: &Product, days: i64) -> (PriceTier, Decimal) {
        let per_day_total = product.price_per_day * Decimal::from(days);
        let tier = Self::tier_for(days);
        let price = match tier {
            PriceTier::Day => product.price_per_day,
            PriceTier::Weekend => product.price_per_weekend.unwrap_or(per_day_total),
            PriceTier::Weekly => match product.price_per_week {
                Some(weekly) => Decimal::from((days + 6) / 7) * weekly,
                None => per_day_total,
            },
            PriceTier::Daily => per_day_total,
        };
        (tier, price)
    }

    /// `priceItem(product, quantity, startDate, endDate)`
    pub fn price_item(product: &Product, quantity: i32, period: &RentalPeriod) -> ItemPrice {
        let days = period.days();
        let (tier, price_per_unit) = Self::unit_price(product, days);
        ItemPrice {
            days,
            tier,
            price_per_unit,
            total_price: Self::calculate_subtotal(quantity, price_per_unit),
        }
    }

    /// `quantity * price_per_unit`
    pub fn calculate_subtotal(quantity: i32, price_per_unit: Decimal) -> Decimal {
        Decimal::from(quantity) * price_per_unit
    }

    /// Sum of line totals
    pub fn calculate_total(subtotals: &[Decimal]) -> Decimal {
        subtotals.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn priced_product() -> Product {
        let mut product = testing::leaf("Moving Head", 10);
        product.price_per_day = dec!(10);
        product.price_per_weekend = Some(dec!(25));
        product.price_per_week = Some(dec!(50));
        product
    }

    fn period_of(days: i64) -> RentalPeriod {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        RentalPeriod::new(start, start + Duration::days(days - 1)).unwrap()
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(PriceCalculator::tier_for(1), PriceTier::Day);
        assert_eq!(PriceCalculator::tier_for(2), PriceTier::Weekend);
        assert_eq!(PriceCalculator::tier_for(3), PriceTier::Weekend);
        assert_eq!(PriceCalculator::tier_for(4), PriceTier::Daily);
        assert_eq!(PriceCalculator::tier_for(6), PriceTier::Daily);
        assert_eq!(PriceCalculator::tier_for(7), PriceTier::Weekly);
        assert_eq!(PriceCalculator::tier_for(8), PriceTier::Weekly);
        assert_eq!(PriceCalculator::tier_for(14), PriceTier::Weekly);
    }

    #[test]
    fn test_unit_price_at_boundaries() {
        let product = priced_product();
        let expected = [
            (1, dec!(10)),
            (2, dec!(25)),
            (3, dec!(25)),
            (6, dec!(60)),
            (7, dec!(50)),
            (8, dec!(100)),
            (14, dec!(100)),
            (15, dec!(150)),
        ];
        for (days, price) in expected {
            let item = PriceCalculator::price_item(&product, 1, &period_of(days));
            assert_eq!(item.days, days);
            assert_eq!(item.price_per_unit, price, "unit price for {} days", days);
        }
    }

    #[test]
    fn test_total_price_scales_with_quantity() {
        let product = priced_product();
        let item = PriceCalculator::price_item(&product, 3, &period_of(2));
        assert_eq!(item.total_price, dec!(75));
    }

    #[test]
    fn test_missing_tiers_fall_back_to_daily() {
        let mut product = priced_product();
        product.price_per_weekend = None;
        product.price_per_week = None;
        assert_eq!(PriceCalculator::unit_price(&product, 3).1, dec!(30));
        assert_eq!(PriceCalculator::unit_price(&product, 9).1, dec!(90));
    }

    #[test]
    fn test_calculate_total_empty() {
        let subtotals: Vec<Decimal> = vec![];
        assert_eq!(PriceCalculator::calculate_total(&subtotals), dec!(0));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::testing;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    /// Billed days are always the calendar span plus one
    #[test]
    fn prop_days_inclusive_of_both_ends() {
        proptest!(|(span in 0i64..400)| {
            let start = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
            let period = RentalPeriod::new(start, start + Duration::days(span)).unwrap();
            prop_assert_eq!(period.days(), span + 1);
        });
    }

    /// Tier selection is a pure function of days
    #[test]
    fn prop_tier_is_deterministic() {
        proptest!(|(days in 1i64..400)| {
            let first = PriceCalculator::tier_for(days);
            let second = PriceCalculator::tier_for(days);
            prop_assert_eq!(first, second);
            let expected = if days == 1 {
                PriceTier::Day
            } else if days <= 3 {
                PriceTier::Weekend
            } else if days >= 7 {
                PriceTier::Weekly
            } else {
                PriceTier::Daily
            };
            prop_assert_eq!(first, expected);
        });
    }

    /// Line totals are non-negative and equal quantity * unit price
    #[test]
    fn prop_total_equals_quantity_times_unit() {
        proptest!(|(quantity in 1i32..=50, cents in 1u32..=100_000u32, days in 1i64..60)| {
            let mut product = testing::leaf("Fixture", 100);
            product.price_per_day = Decimal::from(cents) / Decimal::from(100);
            let start = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
            let period = RentalPeriod::new(start, start + Duration::days(days - 1)).unwrap();
            let item = PriceCalculator::price_item(&product, quantity, &period);
            prop_assert!(item.total_price >= Decimal::ZERO);
            prop_assert_eq!(item.total_price, Decimal::from(quantity) * item.price_per_unit);
        });
    }
}
