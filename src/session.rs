//! One cashier's register session: the open drafts, the numeric pad, the
//! payment dialogs and the checkout bookkeeping that keeps two commits of
//! the same draft from overlapping.
//!
//! Checkout is split in three so the async commit does not hold the session:
//! [`PosSession::begin_checkout`] freezes the draft into a ticket,
//! [`CheckoutPipeline::commit`] persists it, and
//! [`PosSession::finish_checkout`] clears the draft. Other drafts stay
//! editable in between.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::cart::{compute_order_total, Register};
use crate::checkout::{next_order_number, CheckoutPipeline, CheckoutTicket, CommitOutcome};
use crate::error::{PosError, PosResult};
use crate::models::{CommittedOrder, Customer, DiscountKind, LineSnapshot, OrderStatus, Product};
use crate::numpad::NumericPad;
use crate::payments::PaymentSession;
use crate::remote::AnalyticsSink;

/// Who is ringing up orders, passed in by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub seller_id: String,
    pub cashier_name: String,
    pub user_id: Option<String>,
}

pub struct PosSession {
    user: UserContext,
    register: Register,
    pad: NumericPad,
    payments: HashMap<String, PaymentSession>,
    in_flight: HashSet<String>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
}

impl PosSession {
    pub fn new(user: UserContext, analytics: Option<Arc<dyn AnalyticsSink>>) -> Self {
        Self {
            user,
            register: Register::new(),
            pad: NumericPad::new(),
            payments: HashMap::new(),
            in_flight: HashSet::new(),
            analytics,
        }
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    pub fn register(&self) -> &Register {
        &self.register
    }

    pub fn pad(&self) -> &NumericPad {
        &self.pad
    }

    pub fn pad_mut(&mut self) -> &mut NumericPad {
        &mut self.pad
    }

    pub fn is_in_flight(&self, draft_id: &str) -> bool {
        self.in_flight.contains(draft_id)
    }

    fn ensure_editable(&self) -> PosResult<()> {
        let draft_id = self.register.active_id();
        if self.in_flight.contains(draft_id) {
            return Err(PosError::CheckoutInProgress {
                draft_id: draft_id.to_string(),
            });
        }
        Ok(())
    }

    /// Add one unit of `product` to the active draft and report the add to
    /// analytics without waiting for it.
    pub fn add_product(&mut self, product: Product) -> PosResult<()> {
        self.ensure_editable()?;
        let product_id = product.id.clone();
        self.register.add_product(product);
        self.refresh_payment_total();
        self.dispatch_cart_add(product_id);
        Ok(())
    }

    /// Apply the numeric pad buffer to the selected line.
    pub fn apply_pad(&mut self) -> PosResult<bool> {
        self.ensure_editable()?;
        let applied = self.pad.apply(&mut self.register);
        if applied {
            self.refresh_payment_total();
        }
        Ok(applied)
    }

    pub fn update_quantity(&mut self, index: usize, quantity: i64) -> PosResult<()> {
        self.ensure_editable()?;
        self.register.update_quantity(index, quantity);
        self.refresh_payment_total();
        Ok(())
    }

    pub fn remove_line(&mut self, index: usize) -> PosResult<()> {
        self.ensure_editable()?;
        self.register.remove_line(index);
        self.refresh_payment_total();
        Ok(())
    }

    pub fn update_discount(&mut self, index: usize, value: Decimal, kind: DiscountKind) -> PosResult<()> {
        self.ensure_editable()?;
        self.register.update_discount(index, value, kind);
        self.refresh_payment_total();
        Ok(())
    }

    pub fn select_line(&mut self, index: usize) -> PosResult<bool> {
        self.ensure_editable()?;
        Ok(self.register.select_line(index))
    }

    pub fn clear_selection(&mut self) -> PosResult<()> {
        self.ensure_editable()?;
        self.register.clear_selection();
        Ok(())
    }

    pub fn attach_customer(&mut self, customer: Customer) -> PosResult<()> {
        self.ensure_editable()?;
        self.register.attach_customer(customer);
        Ok(())
    }

    pub fn detach_customer(&mut self) -> PosResult<()> {
        self.ensure_editable()?;
        self.register.detach_customer();
        Ok(())
    }

    fn dispatch_cart_add(&self, product_id: String) {
        let Some(sink) = self.analytics.clone() else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            debug!(product_id = %product_id, "No async runtime; cart-add event dropped");
            return;
        };
        let user_id = self.user.user_id.clone();
        handle.spawn(async move {
            if let Err(e) = sink.record_cart_add(&product_id, user_id.as_deref()).await {
                debug!(product_id = %product_id, error = %e, "Cart-add analytics failed");
            }
        });
    }

    // -----------------------------------------------------------------------
    // Tabs
    // -----------------------------------------------------------------------

    pub fn new_tab(&mut self, name: Option<&str>) -> String {
        self.register.new_tab(name)
    }

    pub fn switch_tab(&mut self, id: &str) -> bool {
        self.register.switch_tab(id)
    }

    /// Close a tab unless it is the last one or its checkout is in flight.
    pub fn close_tab(&mut self, id: &str) -> bool {
        if self.in_flight.contains(id) {
            warn!(draft_id = %id, "Refusing to close a tab with a checkout in flight");
            return false;
        }
        let closed = self.register.close_tab(id);
        if closed {
            self.payments.remove(id);
        }
        closed
    }

    // -----------------------------------------------------------------------
    // Payments
    // -----------------------------------------------------------------------

    /// Open (or return) the payment session for the active draft.
    pub fn open_payment(&mut self) -> PosResult<&mut PaymentSession> {
        self.ensure_editable()?;
        let draft = self.register.active();
        if draft.is_empty() {
            return Err(PosError::EmptyCart);
        }
        let total = compute_order_total(draft);
        let session = self
            .payments
            .entry(draft.id.clone())
            .or_insert_with(|| PaymentSession::new(total));
        session.set_order_total(total);
        Ok(session)
    }

    pub fn payment(&self) -> Option<&PaymentSession> {
        self.payments.get(self.register.active_id())
    }

    pub fn payment_mut(&mut self) -> Option<&mut PaymentSession> {
        let id = self.register.active_id().to_string();
        self.payments.get_mut(&id)
    }

    /// Payment dialog closed without paying: tenders are discarded, the cart
    /// is kept.
    pub fn cancel_payment(&mut self) {
        let id = self.register.active_id().to_string();
        if self.in_flight.contains(&id) {
            return;
        }
        if let Some(mut session) = self.payments.remove(&id) {
            session.reset();
        }
    }

    fn refresh_payment_total(&mut self) {
        let id = self.register.active_id().to_string();
        let total = self.register.active_total();
        if let Some(session) = self.payments.get_mut(&id) {
            session.set_order_total(total);
        }
    }

    // -----------------------------------------------------------------------
    // Checkout
    // -----------------------------------------------------------------------

    /// Freeze the active draft into a commit ticket and mark it in flight.
    pub fn begin_checkout(&mut self) -> PosResult<CheckoutTicket> {
        self.ensure_editable()?;
        let draft = self.register.active();
        if draft.is_empty() {
            return Err(PosError::EmptyCart);
        }
        let total = compute_order_total(draft);
        let Some(payment) = self.payments.get_mut(&draft.id) else {
            return Err(PosError::PaymentIncomplete { remaining: total });
        };
        payment.set_order_total(total);
        if !payment.can_commit() {
            return Err(PosError::PaymentIncomplete {
                remaining: payment.remaining(),
            });
        }

        let lines: Vec<LineSnapshot> = draft.lines.iter().map(LineSnapshot::from).collect();
        let order = CommittedOrder {
            order_number: next_order_number(),
            seller_id: self.user.seller_id.clone(),
            cashier: self.user.cashier_name.clone(),
            customer_name: draft.customer.as_ref().map(|c| c.name.clone()),
            lines,
            payments: payment.payments().to_vec(),
            subtotal: total,
            total,
            status: OrderStatus::Completed,
            created_at: Utc::now(),
        };
        let draft_id = draft.id.clone();
        self.in_flight.insert(draft_id.clone());
        info!(
            draft_id = %draft_id,
            order_number = %order.order_number,
            total = %order.total,
            "Checkout started"
        );
        Ok(CheckoutTicket { draft_id, order })
    }

    /// Release the draft after a commit attempt. When the order was stored
    /// (online, queued or partially) the draft is emptied and its payment
    /// session closed; otherwise the cart and tenders are kept for a retry.
    pub fn finish_checkout(&mut self, ticket: &CheckoutTicket, stored: bool) {
        self.in_flight.remove(&ticket.draft_id);
        if !stored {
            warn!(draft_id = %ticket.draft_id, "Checkout not stored; draft kept");
            return;
        }
        if let Some(mut session) = self.payments.remove(&ticket.draft_id) {
            session.mark_committed();
        }
        self.register.clear_draft(&ticket.draft_id);
        if self.register.active_id() == ticket.draft_id {
            self.pad.clear();
        }
    }

    /// Begin, commit and finish in one call.
    pub async fn checkout(&mut self, pipeline: &CheckoutPipeline) -> PosResult<CommitOutcome> {
        let ticket = self.begin_checkout()?;
        let result = pipeline.commit(&ticket).await;
        self.finish_checkout(&ticket, result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{Connectivity, ConnectivityMonitor};
    use crate::db::OfflineStore;
    use crate::models::{Customer, PaymentMethod};
    use crate::numpad::NumpadMode;
    use crate::remote::memory::{MemoryRemote, Op};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::time::Duration;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn user() -> UserContext {
        UserContext {
            seller_id: "seller-1".to_string(),
            cashier_name: "amina@shop.so".to_string(),
            user_id: Some("user-1".to_string()),
        }
    }

    fn widget() -> Product {
        Product::new("p-widget", "Widget", d("10.00"))
    }

    fn pipeline(remote: Arc<MemoryRemote>, state: Connectivity) -> (Arc<OfflineStore>, CheckoutPipeline) {
        let store = Arc::new(OfflineStore::open_in_memory().unwrap());
        let pipeline = CheckoutPipeline::new(
            store.clone(),
            remote,
            Arc::new(ConnectivityMonitor::new(state)),
            Duration::from_secs(5),
        );
        (store, pipeline)
    }

    /// Widget ×3 with a 10 % discount: 27.00.
    fn ring_up_widgets(session: &mut PosSession) {
        for _ in 0..3 {
            session.add_product(widget()).unwrap();
        }
        assert!(session.select_line(0).unwrap());
        session.pad_mut().set_mode(NumpadMode::DiscountPercent);
        session.pad_mut().press('1');
        session.pad_mut().press('0');
        assert!(session.apply_pad().unwrap());
    }

    #[tokio::test]
    async fn widget_example_end_to_end() {
        let remote = Arc::new(MemoryRemote::new());
        let (_store, pipeline) = pipeline(remote.clone(), Connectivity::Online);
        let mut session = PosSession::new(user(), None);

        ring_up_widgets(&mut session);
        assert_eq!(session.register().active_total(), d("27.00"));

        let payment = session.open_payment().unwrap();
        assert!(payment.add_payment(PaymentMethod::Cash, d("30.00")));
        assert_eq!(payment.change(), d("3.00"));

        let outcome = session.checkout(&pipeline).await.unwrap();
        let order = outcome.order();
        assert_eq!(order.total, d("27.00"));
        assert_eq!(order.subtotal, d("27.00"));
        assert_eq!(order.lines.iter().map(|l| l.total).sum::<Decimal>(), order.total);
        assert_eq!(order.payments.len(), 1);
        assert_eq!(order.payments[0].amount, d("30.00"));
        assert_eq!(order.change(), d("3.00"));
        assert_eq!(order.cashier, "amina@shop.so");

        // Draft emptied but kept open.
        assert!(session.register().active().is_empty());
        assert_eq!(session.register().drafts().len(), 1);
        assert!(session.payment().is_none());
        assert!(!session.is_in_flight(session.register().active_id()));
    }

    #[test]
    fn checkout_requires_items_and_full_payment() {
        let mut session = PosSession::new(user(), None);
        assert!(matches!(session.begin_checkout(), Err(PosError::EmptyCart)));
        assert!(matches!(session.open_payment(), Err(PosError::EmptyCart)));

        session.add_product(widget()).unwrap();
        match session.begin_checkout() {
            Err(PosError::PaymentIncomplete { remaining }) => assert_eq!(remaining, d("10.00")),
            other => panic!("unexpected {other:?}"),
        }

        session
            .open_payment()
            .unwrap()
            .add_payment(PaymentMethod::Zaad, d("4"));
        match session.begin_checkout() {
            Err(PosError::PaymentIncomplete { remaining }) => assert_eq!(remaining, d("6.00")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn second_checkout_of_same_draft_is_rejected_while_in_flight() {
        let mut session = PosSession::new(user(), None);
        session.add_product(widget()).unwrap();
        session.open_payment().unwrap().pay_full(PaymentMethod::EvcPlus);

        let ticket = session.begin_checkout().unwrap();
        assert!(matches!(
            session.begin_checkout(),
            Err(PosError::CheckoutInProgress { .. })
        ));
        assert!(matches!(session.add_product(widget()), Err(PosError::CheckoutInProgress { .. })));
        assert!(!session.close_tab(&ticket.draft_id));

        // Another tab stays fully usable.
        let other = session.new_tab(None);
        session.add_product(widget()).unwrap();
        assert_eq!(session.register().draft(&other).unwrap().lines.len(), 1);

        session.finish_checkout(&ticket, true);
        assert!(session.register().draft(&ticket.draft_id).unwrap().is_empty());
        assert!(!session.is_in_flight(&ticket.draft_id));
    }

    #[test]
    fn in_flight_draft_cannot_be_edited_after_switching_back() {
        let mut session = PosSession::new(user(), None);
        session.add_product(widget()).unwrap();
        session.open_payment().unwrap().pay_full(PaymentMethod::Cash);
        let ticket = session.begin_checkout().unwrap();

        session.new_tab(None);
        assert!(session.switch_tab(&ticket.draft_id));
        assert!(matches!(session.add_product(widget()), Err(PosError::CheckoutInProgress { .. })));
        assert!(session.update_quantity(0, 5).is_err());
        assert!(session.update_discount(0, d("50"), DiscountKind::Percentage).is_err());
        assert!(session.remove_line(0).is_err());
        assert!(session.select_line(0).is_err());
        assert!(session.attach_customer(Customer {
            id: None,
            name: "Late".to_string(),
            phone: None,
        })
        .is_err());
        assert!(session.apply_pad().is_err());
        assert!(!session.close_tab(&ticket.draft_id));

        let frozen = session.register().draft(&ticket.draft_id).unwrap();
        assert_eq!(frozen.lines.len(), 1);
        assert_eq!(frozen.lines[0].quantity, 1);
        assert!(frozen.customer.is_none());
    }

    #[test]
    fn line_edits_move_the_payment_target() {
        let mut session = PosSession::new(user(), None);
        session.add_product(widget()).unwrap();
        session.open_payment().unwrap().pay_full(PaymentMethod::Cash);

        session.update_quantity(0, 3).unwrap();
        assert_eq!(session.payment().unwrap().order_total(), d("30.00"));
        session.update_discount(0, d("10"), DiscountKind::Percentage).unwrap();
        assert_eq!(session.payment().unwrap().order_total(), d("27.00"));
        session.remove_line(0).unwrap();
        assert_eq!(session.payment().unwrap().order_total(), Decimal::ZERO);
    }

    #[test]
    fn failed_commit_keeps_cart_and_tenders() {
        let mut session = PosSession::new(user(), None);
        session.add_product(widget()).unwrap();
        session.open_payment().unwrap().pay_full(PaymentMethod::Cash);
        let ticket = session.begin_checkout().unwrap();

        session.finish_checkout(&ticket, false);
        assert_eq!(session.register().active().lines.len(), 1);
        assert!(session.payment().unwrap().can_commit());
        assert!(session.begin_checkout().is_ok());
    }

    #[test]
    fn cart_edits_move_the_payment_target() {
        let mut session = PosSession::new(user(), None);
        session.add_product(widget()).unwrap();
        session.open_payment().unwrap().pay_full(PaymentMethod::Cash);
        session.add_product(widget()).unwrap();
        let payment = session.payment().unwrap();
        assert_eq!(payment.order_total(), d("20.00"));
        assert!(!payment.can_commit());

        session.cancel_payment();
        assert!(session.payment().is_none());
        assert_eq!(session.register().active().lines[0].quantity, 2);
    }

    #[test]
    fn snapshot_carries_customer_name() {
        let mut session = PosSession::new(user(), None);
        session.add_product(widget()).unwrap();
        session.attach_customer(Customer {
            id: None,
            name: "Walk-in Customer".to_string(),
            phone: Some("+252 61 234 5678".to_string()),
        })
        .unwrap();
        session.open_payment().unwrap().pay_full(PaymentMethod::Cash);
        let ticket = session.begin_checkout().unwrap();
        assert_eq!(ticket.order.customer_name.as_deref(), Some("Walk-in Customer"));
        assert!(ticket.order.order_number.starts_with("ORD-"));
        assert_eq!(ticket.order.seller_id, "seller-1");
    }

    #[tokio::test]
    async fn offline_checkout_queues_and_clears_draft() {
        let remote = Arc::new(MemoryRemote::new());
        let (store, pipeline) = pipeline(remote.clone(), Connectivity::Offline);
        let mut session = PosSession::new(user(), None);
        session.add_product(widget()).unwrap();
        session.open_payment().unwrap().pay_full(PaymentMethod::Waffi);

        let outcome = session.checkout(&pipeline).await.unwrap();
        assert!(outcome.is_queued());
        assert_eq!(store.pending_count().unwrap(), 1);
        assert!(session.register().active().is_empty());
    }

    #[tokio::test]
    async fn analytics_is_fire_and_forget() {
        let remote = Arc::new(MemoryRemote::new());
        let mut session = PosSession::new(user(), Some(remote.clone()));
        session.add_product(widget()).unwrap();

        let mut recorded = false;
        for _ in 0..100 {
            if !remote.cart_adds.lock().unwrap().is_empty() {
                recorded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(recorded);
        assert_eq!(
            remote.cart_adds.lock().unwrap()[0],
            ("p-widget".to_string(), Some("user-1".to_string()))
        );

        // A failing sink never affects the cart.
        remote.fail(Op::CartAdd);
        session.add_product(widget()).unwrap();
        assert_eq!(session.register().active().lines[0].quantity, 2);
    }

    #[test]
    fn analytics_without_runtime_is_dropped() {
        let remote = Arc::new(MemoryRemote::new());
        let mut session = PosSession::new(user(), Some(remote.clone()));
        session.add_product(widget()).unwrap();
        assert!(remote.cart_adds.lock().unwrap().is_empty());
        assert_eq!(session.register().active().item_count(), 1);
    }
}
