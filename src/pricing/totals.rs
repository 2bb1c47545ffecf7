// Order totals
//
// Whole-order financial terms: loyalty discount, delivery, tax and security
// deposit on top of the per-line tier prices.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// VIP discount rate (25 %)
const VIP_RATE: Decimal = Decimal::from_parts(25, 0, 0, false, 2);
/// VIP_PLUS discount rate (70 %)
const VIP_PLUS_RATE: Decimal = Decimal::from_parts(70, 0, 0, false, 2);
/// Tax applied on discounted subtotal plus delivery (21 %)
pub const TAX_RATE: Decimal = Decimal::from_parts(21, 0, 0, false, 2);
/// Deposit fallback as share of the line total (20 %)
const DEPOSIT_FALLBACK_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 2);
/// Delivery charge per kilometre
pub const DELIVERY_RATE_PER_KM: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

/// Customer loyalty classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTier {
    #[default]
    Standard,
    Vip,
    VipPlus,
}

impl LoyaltyTier {
    /// Discount rate on non-calculator items
    pub fn discount_rate(&self) -> Decimal {
        match self {
            LoyaltyTier::Standard => Decimal::ZERO,
            LoyaltyTier::Vip => VIP_RATE,
            LoyaltyTier::VipPlus => VIP_PLUS_RATE,
        }
    }

    /// VIP tiers never pay a security deposit
    pub fn waives_deposit(&self) -> bool {
        matches!(self, LoyaltyTier::Vip | LoyaltyTier::VipPlus)
    }
}

impl std::fmt::Display for LoyaltyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoyaltyTier::Standard => write!(f, "standard"),
            LoyaltyTier::Vip => write!(f, "vip"),
            LoyaltyTier::VipPlus => write!(f, "vip_plus"),
        }
    }
}

/// How the equipment reaches the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryOption {
    #[default]
    Pickup,
    Shipping {
        distance_km: Decimal,
        /// Pre-computed shipping cost, takes precedence over distance
        shipping_cost: Option<Decimal>,
    },
}

impl DeliveryOption {
    pub fn cost(&self) -> Decimal {
        match self {
            DeliveryOption::Pickup => Decimal::ZERO,
            DeliveryOption::Shipping {
                distance_km,
                shipping_cost,
            } => shipping_cost
                .unwrap_or(*distance_km * DELIVERY_RATE_PER_KM)
                .round_dp(2),
        }
    }
}

/// Line input to the totals calculation
#[derive(Debug, Clone, Copy)]
pub struct PricedLine {
    pub quantity: i32,
    pub total_price: Decimal,
    pub custom_deposit: Option<Decimal>,
    /// Produced by the event calculator flow (bundled equipment + labor)
    pub is_calculator_item: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub delivery_cost: Decimal,
    pub tax_amount: Decimal,
    pub deposit_amount: Decimal,
    pub total: Decimal,
}

pub struct TotalsCalculator;

impl TotalsCalculator {
    /// Loyalty discount over the whole order
    ///
    /// Calculator-origin lines never enter the discount base, whatever the
    /// tier: their price already bundles labor and negotiated pack pricing.
    pub fn loyalty_discount(tier: LoyaltyTier, lines: &[PricedLine]) -> Decimal {
        let discount_base: Decimal = lines
            .iter()
            .filter(|line| !line.is_calculator_item)
            .map(|line| line.total_price)
            .sum();
        (discount_base * tier.discount_rate()).round_dp(2)
    }

    /// Security deposit: zero for VIP tiers, otherwise per line the custom
    /// deposit times quantity, or 20 % of the line total
    pub fn deposit(tier: LoyaltyTier, lines: &[PricedLine]) -> Decimal {
        if tier.waives_deposit() {
            return Decimal::ZERO;
        }
        lines
            .iter()
            .map(|line| match line.custom_deposit {
                Some(deposit) if deposit > Decimal::ZERO => deposit * Decimal::from(line.quantity),
                _ => line.total_price * DEPOSIT_FALLBACK_RATE,
            })
            .sum::<Decimal>()
            .round_dp(2)
    }

    /// `(subtotalAfterDiscount + deliveryCost) * 0.21`
    pub fn tax(subtotal_after_discount: Decimal, delivery_cost: Decimal) -> Decimal {
        ((subtotal_after_discount + delivery_cost) * TAX_RATE).round_dp(2)
    }

    /// Compute every money field of an order
    pub fn quote(tier: LoyaltyTier, lines: &[PricedLine], delivery: &DeliveryOption) -> OrderTotals {
        let subtotal: Decimal = lines.iter().map(|line| line.total_price).sum();
        let discount_amount = Self::loyalty_discount(tier, lines);
        let delivery_cost = delivery.cost();
        let tax_amount = Self::tax(subtotal - discount_amount, delivery_cost);
        let deposit_amount = Self::deposit(tier, lines);

        OrderTotals {
            subtotal,
            discount_amount,
            delivery_cost,
            tax_amount,
            deposit_amount,
            total: subtotal - discount_amount + delivery_cost + tax_amount + deposit_amount,
        }
    }
}
