use crate::error::{RentalError, RentalResult};
use crate::orders::OrderStatus;

/// Service for managing order status transitions
pub struct StatusMachine;

impl StatusMachine {
    /// Statuses reachable from `from` in one step
    ///
    /// # Valid Transitions
    /// - Pending → Confirmed, Cancelled
    /// - Confirmed → Preparing, Cancelled
    /// - Preparing → Ready, Cancelled
    /// - Ready → InTransit, Delivered, Cancelled
    /// - InTransit → Delivered, Cancelled
    /// - Delivered → Completed, Returned
    /// - Completed → Returned
    /// - Cancelled, Returned → (terminal)
    pub fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
        use OrderStatus::*;

        match from {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[InTransit, Delivered, Cancelled],
            InTransit => &[Delivered, Cancelled],
            Delivered => &[Completed, Returned],
            Completed => &[Returned],
            Cancelled | Returned => &[],
        }
    }

    /// Check if a status transition is valid
    ///
    /// Re-applying the current status is not a transition and is rejected.
    pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        Self::allowed_targets(from).contains(&to)
    }

    /// Attempt to transition from one status to another
    pub fn transition(from: OrderStatus, to: OrderStatus) -> RentalResult<OrderStatus> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(RentalError::InvalidStatusTransition { from, to })
        }
    }

    pub fn is_terminal(status: OrderStatus) -> bool {
        Self::allowed_targets(status).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_happy_path_chain() {
        let chain = [Pending, Confirmed, Preparing, Ready, InTransit, Delivered, Completed, Returned];
        for pair in chain.windows(2) {
            assert!(
                StatusMachine::is_valid_transition(pair[0], pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_ready_can_skip_transit() {
        assert!(StatusMachine::is_valid_transition(Ready, Delivered));
    }

    #[test]
    fn test_delivered_can_be_returned_directly() {
        assert!(StatusMachine::is_valid_transition(Delivered, Returned));
    }

    #[test]
    fn test_cancellation_sources() {
        for status in [Pending, Confirmed, Preparing, Ready, InTransit] {
            assert!(StatusMachine::is_valid_transition(status, Cancelled));
        }
        for status in [Delivered, Completed, Returned, Cancelled] {
            assert!(!StatusMachine::is_valid_transition(status, Cancelled));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(StatusMachine::is_terminal(Cancelled));
        assert!(StatusMachine::is_terminal(Returned));
        assert!(!StatusMachine::is_terminal(Completed));
        for target in OrderStatus::ALL {
            assert!(!StatusMachine::is_valid_transition(Cancelled, target));
            assert!(!StatusMachine::is_valid_transition(Returned, target));
        }
    }

    #[test]
    fn test_same_status_is_rejected() {
        for status in OrderStatus::ALL {
            assert!(!StatusMachine::is_valid_transition(status, status));
        }
    }

    #[test]
    fn test_no_backwards_transitions() {
        assert!(!StatusMachine::is_valid_transition(Confirmed, Pending));
        assert!(!StatusMachine::is_valid_transition(Delivered, InTransit));
        assert!(!StatusMachine::is_valid_transition(Completed, Delivered));
    }

    #[test]
    fn test_transition_error_carries_both_states() {
        match StatusMachine::transition(Pending, Delivered) {
            Err(RentalError::InvalidStatusTransition { from, to }) => {
                assert_eq!(from, Pending);
                assert_eq!(to, Delivered);
            }
            other => panic!("expected InvalidStatusTransition, got {:?}", other),
        }
        assert_eq!(StatusMachine::transition(Pending, Confirmed).unwrap(), Confirmed);
    }

    #[test]
    fn test_table_size() {
        let allowed: usize = OrderStatus::ALL
            .iter()
            .map(|status| StatusMachine::allowed_targets(*status).len())
            .sum();
        assert_eq!(allowed, 14);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = OrderStatus> {
            proptest::sample::select(OrderStatus::ALL.to_vec())
        }

        proptest! {
            #[test]
            fn transition_agrees_with_table(from in any_status(), to in any_status()) {
                match StatusMachine::transition(from, to) {
                    Ok(next) => {
                        prop_assert!(StatusMachine::is_valid_transition(from, to));
                        prop_assert_eq!(next, to);
                    }
                    Err(_) => prop_assert!(!StatusMachine::is_valid_transition(from, to)),
                }
            }

            #[test]
            fn terminal_states_have_no_exit(status in any_status(), to in any_status()) {
                if StatusMachine::is_terminal(status) {
                    prop_assert!(StatusMachine::transition(status, to).is_err());
                }
            }
        }
    }
}
