//! In-memory cart engine: one or more concurrent draft orders ("tabs") and
//! the line items of each.
//!
//! All mutations are synchronous and infallible. Out-of-range line indices
//! are logged and ignored rather than panicking, and totals are computed
//! defensively so an odd discount can never produce a negative amount.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{CartLine, Customer, DiscountKind, Product};
use crate::money::{parse_amount, saturating_sum, HUNDRED, MAX_UNIT_PRICE};
use crate::numpad::NumpadMode;

/// One in-progress, uncommitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub id: String,
    pub name: String,
    pub lines: Vec<CartLine>,
    pub customer: Option<Customer>,
    pub selected_line: Option<usize>,
}

impl OrderDraft {
    fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            lines: Vec::new(),
            customer: None,
            selected_line: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Drop lines, selection and customer; the tab itself stays open.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.selected_line = None;
        self.customer = None;
    }
}

/// Canonical order total: the sum of every line total.
///
/// Payment reconciliation, the committed snapshot and the receipt all read
/// this value; nothing else sums lines.
pub fn compute_order_total(draft: &OrderDraft) -> Decimal {
    saturating_sum(draft.lines.iter().map(CartLine::total))
}

/// The set of open drafts plus the active one.
#[derive(Debug, Clone)]
pub struct Register {
    drafts: Vec<OrderDraft>,
    active: usize,
    opened: usize,
}

impl Default for Register {
    fn default() -> Self {
        Self::new()
    }
}

impl Register {
    /// A register always starts with one empty draft.
    pub fn new() -> Self {
        Self {
            drafts: vec![OrderDraft::new("Order 1".to_string())],
            active: 0,
            opened: 1,
        }
    }

    pub fn drafts(&self) -> &[OrderDraft] {
        &self.drafts
    }

    pub fn active(&self) -> &OrderDraft {
        // `active` is kept in bounds by every mutation below.
        &self.drafts[self.active]
    }

    fn active_mut(&mut self) -> &mut OrderDraft {
        &mut self.drafts[self.active]
    }

    pub fn active_id(&self) -> &str {
        &self.active().id
    }

    pub fn draft(&self, id: &str) -> Option<&OrderDraft> {
        self.drafts.iter().find(|d| d.id == id)
    }

    pub fn draft_mut(&mut self, id: &str) -> Option<&mut OrderDraft> {
        self.drafts.iter_mut().find(|d| d.id == id)
    }

    pub fn active_total(&self) -> Decimal {
        compute_order_total(self.active())
    }

    // -----------------------------------------------------------------------
    // Tabs
    // -----------------------------------------------------------------------

    /// Open a new empty draft and make it active. Returns its id.
    pub fn new_tab(&mut self, name: Option<&str>) -> String {
        self.opened += 1;
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Order {}", self.opened));
        let draft = OrderDraft::new(name);
        let id = draft.id.clone();
        self.drafts.push(draft);
        self.active = self.drafts.len() - 1;
        debug!(draft_id = %id, tabs = self.drafts.len(), "Opened order tab");
        id
    }

    /// Close a draft. The last remaining draft cannot be closed.
    pub fn close_tab(&mut self, id: &str) -> bool {
        if self.drafts.len() <= 1 {
            debug!(draft_id = %id, "Refusing to close the last order tab");
            return false;
        }
        let Some(pos) = self.drafts.iter().position(|d| d.id == id) else {
            return false;
        };
        let active_id = self.active().id.clone();
        self.drafts.remove(pos);
        self.active = if active_id == id {
            pos.min(self.drafts.len() - 1)
        } else {
            self.drafts
                .iter()
                .position(|d| d.id == active_id)
                .unwrap_or(0)
        };
        debug!(draft_id = %id, tabs = self.drafts.len(), "Closed order tab");
        true
    }

    pub fn switch_tab(&mut self, id: &str) -> bool {
        match self.drafts.iter().position(|d| d.id == id) {
            Some(pos) => {
                self.active = pos;
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Lines
    // -----------------------------------------------------------------------

    /// Merge into the line for the same product, or append a new line.
    pub fn add_product(&mut self, product: Product) {
        let draft = self.active_mut();
        if let Some(line) = draft.lines.iter_mut().find(|l| l.product.id == product.id) {
            line.quantity = line.quantity.saturating_add(1);
            return;
        }
        draft.lines.push(CartLine::new(product));
    }

    pub fn update_quantity(&mut self, index: usize, quantity: i64) {
        if quantity <= 0 {
            self.remove_line(index);
            return;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        match self.active_mut().lines.get_mut(index) {
            Some(line) => line.quantity = quantity,
            None => warn!(index, "update_quantity: line index out of range"),
        }
    }

    pub fn remove_line(&mut self, index: usize) {
        let draft = self.active_mut();
        if index >= draft.lines.len() {
            warn!(index, "remove_line: line index out of range");
            return;
        }
        draft.lines.remove(index);
        draft.selected_line = match draft.selected_line {
            Some(sel) if sel == index => None,
            Some(sel) if sel > index => Some(sel - 1),
            other => other,
        };
    }

    /// Replace discount and kind. Values are stored as given; totals clamp.
    pub fn update_discount(&mut self, index: usize, value: Decimal, kind: DiscountKind) {
        match self.active_mut().lines.get_mut(index) {
            Some(line) => {
                line.discount = value;
                line.discount_kind = kind;
            }
            None => warn!(index, "update_discount: line index out of range"),
        }
    }

    pub fn select_line(&mut self, index: usize) -> bool {
        let draft = self.active_mut();
        if index < draft.lines.len() {
            draft.selected_line = Some(index);
            true
        } else {
            false
        }
    }

    pub fn clear_selection(&mut self) {
        self.active_mut().selected_line = None;
    }

    pub fn attach_customer(&mut self, customer: Customer) {
        self.active_mut().customer = Some(customer);
    }

    pub fn detach_customer(&mut self) {
        self.active_mut().customer = None;
    }

    /// Apply a numeric-pad value to the selected line of the active draft.
    ///
    /// Returns `true` when the cart changed. Unparsable input, a missing
    /// selection or a negative price leave everything untouched.
    pub fn apply_numeric_entry(&mut self, mode: NumpadMode, raw: &str) -> bool {
        let Some(index) = self.active().selected_line else {
            return false;
        };
        if index >= self.active().lines.len() {
            self.clear_selection();
            return false;
        }
        let Some(value) = parse_amount(raw) else {
            debug!(raw, "Ignoring unparsable numeric entry");
            return false;
        };

        match mode {
            NumpadMode::Quantity => {
                let floored = value.floor();
                if floored <= Decimal::ZERO {
                    self.remove_line(index);
                } else {
                    self.active_mut().lines[index].quantity = floored.to_u32().unwrap_or(u32::MAX);
                }
            }
            NumpadMode::UnitPrice => {
                if value < Decimal::ZERO || value > MAX_UNIT_PRICE {
                    debug!(raw, "Ignoring out-of-range unit price");
                    return false;
                }
                self.active_mut().lines[index].product.price = value;
            }
            NumpadMode::DiscountPercent => {
                let line = &mut self.active_mut().lines[index];
                line.discount_kind = DiscountKind::Percentage;
                line.discount = value.max(Decimal::ZERO).min(HUNDRED);
            }
        }
        true
    }

    /// Empty the given draft after a successful checkout.
    pub fn clear_draft(&mut self, id: &str) {
        if let Some(draft) = self.draft_mut(id) {
            draft.clear();
        }
    }
}
