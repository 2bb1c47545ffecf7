// Installment plan arithmetic
//
// Pure functions: building the fixed 3-part plan and classifying pending
// installments for the reminder job. Persistence lives in the service.

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{RentalError, RentalResult};
use crate::installments::{InstallmentStatus, PaymentInstallment, ReminderKind};

/// Orders above this total qualify for a payment plan
pub const INSTALLMENT_THRESHOLD: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

const FIRST_SHARE: Decimal = Decimal::from_parts(25, 0, 0, false, 2);
const SECOND_SHARE: Decimal = Decimal::from_parts(50, 0, 0, false, 2);

/// Plan eligibility: calculator-origin orders above the threshold
pub fn qualifies(total: Decimal, is_calculator_event: bool) -> bool {
    is_calculator_event && total > INSTALLMENT_THRESHOLD
}

/// Build the three installments of a plan
///
/// `#1` 25 % due now, `#2` 50 % due one month before the event, `#3` the
/// remainder due the day before. The last share absorbs rounding so the plan
/// always sums to `total`.
pub fn build_plan(
    order_id: Uuid,
    total: Decimal,
    event_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> RentalResult<Vec<PaymentInstallment>> {
    if total <= Decimal::ZERO {
        return Err(RentalError::Validation(format!(
            "Installment total must be positive, got {}",
            total
        )));
    }

    let second_due = event_start.checked_sub_months(Months::new(1)).ok_or_else(|| {
        RentalError::Validation(format!("Event date {} is out of range", event_start))
    })?;

    let first = (total * FIRST_SHARE).round_dp(2);
    let second = (total * SECOND_SHARE).round_dp(2);
    let third = total - first - second;

    let schedule = [
        (Decimal::from(25), first, now),
        (Decimal::from(50), second, second_due),
        (Decimal::from(25), third, event_start - Duration::days(1)),
    ];

    Ok(schedule
        .into_iter()
        .enumerate()
        .map(|(index, (percentage, amount, due_date))| PaymentInstallment {
            id: Uuid::new_v4(),
            order_id,
            installment_number: index as i32 + 1,
            percentage,
            amount,
            due_date,
            status: InstallmentStatus::Pending,
            paid_date: None,
            gateway_payment_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
        .collect())
}

/// Reminder due for a pending installment at `now`, by calendar days
pub fn reminder_kind(due_date: DateTime<Utc>, now: DateTime<Utc>) -> Option<ReminderKind> {
    if due_date < now {
        return Some(ReminderKind::Overdue);
    }
    match (due_date.date_naive() - now.date_naive()).num_days() {
        7 => Some(ReminderKind::SevenDays),
        3 => Some(ReminderKind::ThreeDays),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_plan_for_one_thousand() {
        let now = at(1, 10);
        let event = at(6, 20);
        let plan = build_plan(Uuid::new_v4(), dec!(1000), event, now).unwrap();

        let amounts: Vec<Decimal> = plan.iter().map(|i| i.amount).collect();
        assert_eq!(amounts, vec![dec!(250), dec!(500), dec!(250)]);
        let shares: Vec<Decimal> = plan.iter().map(|i| i.percentage).collect();
        assert_eq!(shares, vec![dec!(25), dec!(50), dec!(25)]);
        assert_eq!(plan[0].due_date, now);
        assert_eq!(plan[1].due_date, at(5, 20));
        assert_eq!(plan[2].due_date, at(6, 19));
        assert!(plan.iter().all(PaymentInstallment::is_pending));
        assert_eq!(
            plan.iter().map(|i| i.installment_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_plan_sums_to_total_with_odd_cents() {
        let plan = build_plan(Uuid::new_v4(), dec!(1000.03), at(9, 1), at(1, 1)).unwrap();
        let sum: Decimal = plan.iter().map(|i| i.amount).sum();
        assert_eq!(sum, dec!(1000.03));
    }

    #[test]
    fn test_month_end_event_clamps() {
        let plan = build_plan(Uuid::new_v4(), dec!(800), at(3, 31), at(1, 1)).unwrap();
        assert_eq!(plan[1].due_date, at(2, 28));
    }

    #[test]
    fn test_rejects_non_positive_total() {
        assert!(build_plan(Uuid::new_v4(), dec!(0), at(6, 1), at(1, 1)).is_err());
    }

    #[test]
    fn test_qualification_threshold() {
        assert!(qualifies(dec!(500.01), true));
        assert!(!qualifies(dec!(500), true));
        assert!(!qualifies(dec!(5000), false));
    }

    #[test]
    fn test_reminder_cadence() {
        let now = at(4, 1);
        assert_eq!(reminder_kind(at(4, 8), now), Some(ReminderKind::SevenDays));
        assert_eq!(reminder_kind(at(4, 4), now), Some(ReminderKind::ThreeDays));
        assert_eq!(reminder_kind(at(4, 5), now), None);
        assert_eq!(reminder_kind(at(3, 31), now), Some(ReminderKind::Overdue));
    }
}
