//! Tender collection for one checkout attempt.
//!
//! A [`PaymentSession`] tracks the declared payments against the draft's
//! canonical total and decides when the order may be committed. No money is
//! moved here; amounts are only recorded.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::models::{Payment, PaymentMethod};
use crate::money::{exceeds, gte_with_tolerance, money, saturating_sum};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Collecting,
    Satisfied,
    Committed,
}

#[derive(Debug, Clone)]
pub struct PaymentSession {
    order_total: Decimal,
    payments: Vec<Payment>,
    state: PaymentState,
}

impl PaymentSession {
    pub fn new(order_total: Decimal) -> Self {
        let mut session = Self {
            order_total: order_total.max(Decimal::ZERO),
            payments: Vec::new(),
            state: PaymentState::Collecting,
        };
        session.refresh_state();
        session
    }

    pub fn order_total(&self) -> Decimal {
        self.order_total
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn total_paid(&self) -> Decimal {
        saturating_sum(self.payments.iter().map(|p| p.amount))
    }

    /// Amount still owed, floored at zero.
    pub fn remaining(&self) -> Decimal {
        let remaining = (self.order_total - self.total_paid()).max(Decimal::ZERO);
        if gte_with_tolerance(self.total_paid(), self.order_total) {
            Decimal::ZERO
        } else {
            remaining
        }
    }

    /// Cash handed back, floored at zero.
    pub fn change(&self) -> Decimal {
        (self.total_paid() - self.order_total).max(Decimal::ZERO)
    }

    pub fn can_commit(&self) -> bool {
        self.state != PaymentState::Committed
            && gte_with_tolerance(self.total_paid(), self.order_total)
    }

    /// Record a tender. Returns `false` (and changes nothing) for a
    /// non-positive amount, or a non-cash tender larger than what is owed.
    pub fn add_payment(&mut self, method: PaymentMethod, amount: Decimal) -> bool {
        if self.state == PaymentState::Committed {
            return false;
        }
        if amount <= Decimal::ZERO {
            debug!(method = method.as_str(), amount = %amount, "Rejected non-positive tender");
            return false;
        }
        if !method.is_cash() && exceeds(amount, self.remaining()) {
            debug!(
                method = method.as_str(),
                amount = %amount,
                remaining = %self.remaining(),
                "Rejected non-cash overpayment"
            );
            return false;
        }
        self.payments.push(Payment { method, amount });
        self.refresh_state();
        true
    }

    /// Replace every tender with one payment of exactly the order total.
    pub fn pay_full(&mut self, method: PaymentMethod) {
        if self.state == PaymentState::Committed {
            return;
        }
        self.payments.clear();
        if self.order_total > Decimal::ZERO {
            self.payments.push(Payment {
                method,
                amount: self.order_total,
            });
        }
        self.refresh_state();
    }

    pub fn remove_payment(&mut self, index: usize) -> bool {
        if self.state == PaymentState::Committed || index >= self.payments.len() {
            return false;
        }
        self.payments.remove(index);
        self.refresh_state();
        true
    }

    /// Cart edits while the dialog is open move the target.
    pub fn set_order_total(&mut self, order_total: Decimal) {
        if self.state == PaymentState::Committed {
            return;
        }
        self.order_total = order_total.max(Decimal::ZERO);
        self.refresh_state();
    }

    /// Discard collected tenders (payment dialog closed before commit).
    pub fn reset(&mut self) {
        self.payments.clear();
        self.state = PaymentState::Collecting;
        self.refresh_state();
    }

    /// Terminal transition once the order has been persisted or queued.
    pub fn mark_committed(&mut self) -> bool {
        if self.state != PaymentState::Satisfied {
            return false;
        }
        self.state = PaymentState::Committed;
        info!(
            total = %money(self.order_total),
            paid = %money(self.total_paid()),
            change = %money(self.change()),
            "Payment session committed"
        );
        true
    }

    fn refresh_state(&mut self) {
        if self.state == PaymentState::Committed {
            return;
        }
        self.state = if gte_with_tolerance(self.total_paid(), self.order_total) {
            PaymentState::Satisfied
        } else {
            PaymentState::Collecting
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn starts_collecting() {
        let session = PaymentSession::new(d("27.00"));
        assert_eq!(session.state(), PaymentState::Collecting);
        assert_eq!(session.remaining(), d("27.00"));
        assert!(!session.can_commit());
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let mut session = PaymentSession::new(d("10"));
        assert!(!session.add_payment(PaymentMethod::Cash, Decimal::ZERO));
        assert!(!session.add_payment(PaymentMethod::Zaad, d("-5")));
        assert!(session.payments().is_empty());
    }

    #[test]
    fn non_cash_cannot_overpay() {
        let mut session = PaymentSession::new(d("20"));
        assert!(session.add_payment(PaymentMethod::EvcPlus, d("15")));
        assert!(!session.add_payment(PaymentMethod::Zaad, d("5.01")));
        assert_eq!(session.payments().len(), 1);
        assert!(session.add_payment(PaymentMethod::Zaad, d("5")));
        assert!(session.can_commit());
        assert_eq!(session.change(), Decimal::ZERO);
    }

    #[test]
    fn cash_overpay_produces_change() {
        let mut session = PaymentSession::new(d("27.00"));
        assert!(session.add_payment(PaymentMethod::Cash, d("30.00")));
        assert_eq!(session.remaining(), Decimal::ZERO);
        assert_eq!(session.change(), d("3.00"));
        assert!(session.can_commit());
        assert_eq!(session.state(), PaymentState::Satisfied);
    }

    #[test]
    fn split_tender_reaches_satisfied() {
        let mut session = PaymentSession::new(d("50"));
        assert!(session.add_payment(PaymentMethod::Waffi, d("20")));
        assert_eq!(session.remaining(), d("30"));
        assert!(!session.can_commit());
        assert!(session.add_payment(PaymentMethod::Cash, d("40")));
        assert!(session.can_commit());
        assert_eq!(session.change(), d("10"));
    }

    #[test]
    fn commit_gate_tolerates_sub_epsilon_shortfall() {
        let mut session = PaymentSession::new(d("0.3"));
        assert!(session.add_payment(PaymentMethod::Cash, d("0.2999999")));
        assert!(session.can_commit());
        assert_eq!(session.remaining(), Decimal::ZERO);

        let mut short = PaymentSession::new(d("0.3"));
        assert!(short.add_payment(PaymentMethod::Cash, d("0.29")));
        assert!(!short.can_commit());
    }

    #[test]
    fn removing_payment_returns_to_collecting() {
        let mut session = PaymentSession::new(d("12"));
        session.add_payment(PaymentMethod::Cash, d("12"));
        assert_eq!(session.state(), PaymentState::Satisfied);
        assert!(session.remove_payment(0));
        assert_eq!(session.state(), PaymentState::Collecting);
        assert!(!session.remove_payment(3));
    }

    #[test]
    fn pay_full_replaces_existing_tenders() {
        let mut session = PaymentSession::new(d("18.40"));
        session.add_payment(PaymentMethod::Cash, d("5"));
        session.add_payment(PaymentMethod::Zaad, d("2"));
        session.pay_full(PaymentMethod::Edahab);
        assert_eq!(
            session.payments(),
            &[Payment {
                method: PaymentMethod::Edahab,
                amount: d("18.40")
            }]
        );
        assert!(session.can_commit());
    }

    #[test]
    fn committed_is_terminal() {
        let mut session = PaymentSession::new(d("5"));
        assert!(!session.mark_committed());
        session.pay_full(PaymentMethod::Cash);
        assert!(session.mark_committed());
        assert_eq!(session.state(), PaymentState::Committed);
        assert!(!session.can_commit());
        assert!(!session.add_payment(PaymentMethod::Cash, d("1")));
        assert!(!session.remove_payment(0));
    }

    #[test]
    fn reset_discards_tenders() {
        let mut session = PaymentSession::new(d("9"));
        session.add_payment(PaymentMethod::Cash, d("9"));
        session.reset();
        assert!(session.payments().is_empty());
        assert_eq!(session.state(), PaymentState::Collecting);
    }

    #[test]
    fn total_change_reevaluates_state() {
        let mut session = PaymentSession::new(d("10"));
        session.add_payment(PaymentMethod::Cash, d("10"));
        session.set_order_total(d("12"));
        assert_eq!(session.state(), PaymentState::Collecting);
        assert_eq!(session.remaining(), d("2"));
    }
}
