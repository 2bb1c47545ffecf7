use chrono::Duration;
use rust_decimal::Decimal;

use crate::orders::RefundStatus;

/// Minimum notice before the rental start for any modification
pub const MODIFICATION_WINDOW_HOURS: i64 = 24;

const FULL_REFUND_DAYS: i64 = 7;
const PARTIAL_REFUND_DAYS: i64 = 1;

/// Refund eligibility of a cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundDecision {
    pub status: RefundStatus,
    /// Share of the order total to refund, between 0 and 1
    pub percentage: Decimal,
}

impl RefundDecision {
    pub fn amount(&self, total: Decimal) -> Decimal {
        (total * self.percentage).round_dp(2)
    }
}

/// Tiered cancellation policy
pub struct RefundPolicy;

impl RefundPolicy {
    /// Eligibility for a cancellation made `notice` before the rental start
    ///
    /// 7 days or more: full refund. 1 day up to 7 days: half. Under 1 day,
    /// or after the start: nothing.
    pub fn decide(notice: Duration) -> RefundDecision {
        if notice >= Duration::days(FULL_REFUND_DAYS) {
            RefundDecision {
                status: RefundStatus::Full,
                percentage: Decimal::ONE,
            }
        } else if notice >= Duration::days(PARTIAL_REFUND_DAYS) {
            RefundDecision {
                status: RefundStatus::Partial,
                percentage: Decimal::new(5, 1),
            }
        } else {
            RefundDecision {
                status: RefundStatus::NoRefund,
                percentage: Decimal::ZERO,
            }
        }
    }

    /// Whether `notice` leaves enough time to modify the order
    pub fn within_modification_window(notice: Duration) -> bool {
        notice >= Duration::hours(MODIFICATION_WINDOW_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fractional_days(days: f64) -> Duration {
        Duration::milliseconds((days * 86_400_000.0).round() as i64)
    }

    #[test]
    fn test_exactly_seven_days_is_full() {
        let decision = RefundPolicy::decide(fractional_days(7.0));
        assert_eq!(decision.status, RefundStatus::Full);
        assert_eq!(decision.amount(dec!(400)), dec!(400));
    }

    #[test]
    fn test_just_under_seven_days_is_partial() {
        let decision = RefundPolicy::decide(fractional_days(6.99));
        assert_eq!(decision.status, RefundStatus::Partial);
        assert_eq!(decision.amount(dec!(400)), dec!(200));
    }

    #[test]
    fn test_just_under_one_day_is_none() {
        let decision = RefundPolicy::decide(fractional_days(0.99));
        assert_eq!(decision.status, RefundStatus::NoRefund);
        assert_eq!(decision.amount(dec!(400)), dec!(0));
    }

    #[test]
    fn test_exactly_one_day_is_partial() {
        assert_eq!(
            RefundPolicy::decide(Duration::days(1)).status,
            RefundStatus::Partial
        );
    }

    #[test]
    fn test_after_start_is_none() {
        assert_eq!(
            RefundPolicy::decide(Duration::hours(-5)).status,
            RefundStatus::NoRefund
        );
    }

    #[test]
    fn test_partial_amount_rounds_to_cents() {
        let decision = RefundPolicy::decide(Duration::days(3));
        assert_eq!(decision.amount(dec!(100.05)), dec!(50.02));
    }

    #[test]
    fn test_modification_window() {
        assert!(RefundPolicy::within_modification_window(Duration::hours(24)));
        assert!(!RefundPolicy::within_modification_window(Duration::hours(23)));
    }
}
