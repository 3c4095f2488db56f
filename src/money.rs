//! Decimal money helpers shared by the cart, payment and receipt code.

use rust_decimal::{Decimal, RoundingStrategy};

/// Tolerance used when comparing tendered amounts against order totals.
pub const MONEY_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Largest unit price accepted from the numeric pad.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Round half-up (away from zero) to cents.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Two-decimal display string, e.g. `27.00`.
pub fn money(value: Decimal) -> String {
    format!("{:.2}", round_cents(value))
}

/// `a >= b` with [`MONEY_EPSILON`] slack.
pub fn gte_with_tolerance(a: Decimal, b: Decimal) -> bool {
    a >= b - MONEY_EPSILON
}

/// `a > b` by more than [`MONEY_EPSILON`].
pub fn exceeds(a: Decimal, b: Decimal) -> bool {
    a - b > MONEY_EPSILON
}

/// Sum of non-negative amounts that saturates at `Decimal::MAX` instead of
/// overflowing.
pub fn saturating_sum(values: impl IntoIterator<Item = Decimal>) -> Decimal {
    values
        .into_iter()
        .fold(Decimal::ZERO, |acc, v| acc.checked_add(v).unwrap_or(Decimal::MAX))
}

/// Parse a user-entered number. Rejects empty, non-numeric and exponent forms.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<Decimal>().ok()
}
