//! Register data model: catalog rows, cart lines, tenders, committed orders
//! and offline queue entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{round_cents, saturating_sum, HUNDRED};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            category: String::new(),
            stock: 0,
            sku: None,
            barcode: None,
            image_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

// ---------------------------------------------------------------------------
// Cart lines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    #[default]
    Percentage,
    Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Snapshot taken when the product was added; the price may be overridden
    /// from the numeric pad afterwards.
    pub product: Product,
    pub quantity: u32,
    pub discount: Decimal,
    pub discount_kind: DiscountKind,
}

impl CartLine {
    pub fn new(product: Product) -> Self {
        Self {
            product,
            quantity: 1,
            discount: Decimal::ZERO,
            discount_kind: DiscountKind::Percentage,
        }
    }

    /// Unit price times quantity, saturating at `Decimal::MAX`.
    pub fn subtotal(&self) -> Decimal {
        self.product
            .price
            .max(Decimal::ZERO)
            .checked_mul(Decimal::from(self.quantity))
            .unwrap_or(Decimal::MAX)
    }

    /// Discount value in money terms, rounded to cents. Negative discounts
    /// count as zero and percentages are bounded to 100.
    pub fn discount_value(&self) -> Decimal {
        let discount = self.discount.max(Decimal::ZERO);
        match self.discount_kind {
            DiscountKind::Percentage => {
                let pct = discount.min(HUNDRED);
                let subtotal = self.subtotal();
                let value = subtotal
                    .checked_mul(pct)
                    .map(|v| v / HUNDRED)
                    .unwrap_or_else(|| subtotal / HUNDRED * pct);
                round_cents(value)
            }
            DiscountKind::Amount => round_cents(discount),
        }
    }

    /// Line total in whole cents, floored at zero.
    pub fn total(&self) -> Decimal {
        round_cents(self.subtotal() - self.discount_value()).max(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    EvcPlus,
    Zaad,
    Waffi,
    Edahab,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Cash,
        PaymentMethod::EvcPlus,
        PaymentMethod::Zaad,
        PaymentMethod::Waffi,
        PaymentMethod::Edahab,
    ];

    pub fn is_cash(self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }

    /// Wire tag used by the remote `payments.payment_method` column.
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::EvcPlus => "evc_plus",
            PaymentMethod::Zaad => "zaad",
            PaymentMethod::Waffi => "waffi",
            PaymentMethod::Edahab => "edahab",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::EvcPlus => "EVC Plus",
            PaymentMethod::Zaad => "ZAAD",
            PaymentMethod::Waffi => "WAFFI",
            PaymentMethod::Edahab => "E-DAHAB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub amount: Decimal,
}

// ---------------------------------------------------------------------------
// Committed orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Completed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    pub discount_percentage: Decimal,
    pub total: Decimal,
}

impl From<&CartLine> for LineSnapshot {
    fn from(line: &CartLine) -> Self {
        let (discount_amount, discount_percentage) = match line.discount_kind {
            DiscountKind::Amount => (line.discount, Decimal::ZERO),
            DiscountKind::Percentage => (Decimal::ZERO, line.discount),
        };
        Self {
            product_id: line.product.id.clone(),
            name: line.product.name.clone(),
            quantity: line.quantity,
            unit_price: line.product.price,
            discount_amount,
            discount_percentage,
            total: line.total(),
        }
    }
}

/// Immutable snapshot of a finalized draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedOrder {
    pub order_number: String,
    pub seller_id: String,
    pub cashier: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub lines: Vec<LineSnapshot>,
    pub payments: Vec<Payment>,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl CommittedOrder {
    pub fn total_paid(&self) -> Decimal {
        saturating_sum(self.payments.iter().map(|p| p.amount))
    }

    pub fn change(&self) -> Decimal {
        (self.total_paid() - self.total).max(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Offline queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(SyncAction::Create),
            "update" => Some(SyncAction::Update),
            "delete" => Some(SyncAction::Delete),
            _ => None,
        }
    }
}

/// A mutation to enqueue; the store assigns id, timestamps and the synced flag.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub action: SyncAction,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncQueueEntry {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub action: SyncAction,
    pub payload: serde_json::Value,
    pub synced: bool,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: String,
    pub synced_at: Option<String>,
}
