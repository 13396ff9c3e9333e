//! Amount validation using rust_decimal for precision
//!
//! The charge for a checkout is always recomputed here from line items and the
//! delivery surcharge. A client-declared total is only ever compared against
//! the recomputed one, never trusted.

use rust_decimal::prelude::*;
use shared::checkout::{LineItem, OrderType};

/// Rounding precision for monetary values (2 decimal places)
const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Maximum allowed price per item (1,000,000)
const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
/// Maximum allowed quantity per item
const MAX_QUANTITY: i32 = 9999;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid line item {item}: {reason}")]
    InvalidLineItem { item: String, reason: String },

    #[error("Declared total {declared} does not match expected total {expected}")]
    AmountMismatch { expected: Decimal, declared: Decimal },

    #[error("Amount must be a positive number of minor units, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("Amount {0} cannot be represented in minor units")]
    OutOfRange(Decimal),
}

fn invalid(item: &impl LineItem, reason: impl Into<String>) -> AmountError {
    AmountError::InvalidLineItem {
        item: item.label().to_string(),
        reason: reason.into(),
    }
}

/// Round to 2 decimal places, half away from zero
#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Compare two monetary values within [`MONEY_TOLERANCE`]
#[inline]
pub fn money_eq(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= MONEY_TOLERANCE
}

/// Delivery orders pay the fixed surcharge, collection orders pay nothing
pub fn delivery_fee(order_type: OrderType, surcharge: Decimal) -> Decimal {
    match order_type {
        OrderType::Delivery => surcharge,
        OrderType::Collection => Decimal::ZERO,
    }
}

/// Validate a single line before it contributes to a total
pub fn validate_line_item(item: &impl LineItem) -> Result<(), AmountError> {
    let price = item.unit_price();
    if price <= Decimal::ZERO {
        return Err(invalid(item, format!("price must be positive, got {price}")));
    }
    if price > MAX_PRICE {
        return Err(invalid(
            item,
            format!("price exceeds maximum allowed ({MAX_PRICE}), got {price}"),
        ));
    }
    if price.normalize().scale() > DECIMAL_PLACES {
        return Err(invalid(
            item,
            format!("price has more than {DECIMAL_PLACES} decimal places, got {price}"),
        ));
    }

    let quantity = item.quantity();
    if quantity <= 0 {
        return Err(invalid(item, format!("quantity must be positive, got {quantity}")));
    }
    if quantity > MAX_QUANTITY {
        return Err(invalid(
            item,
            format!("quantity exceeds maximum allowed ({MAX_QUANTITY}), got {quantity}"),
        ));
    }

    Ok(())
}

/// `Σ(price × qty) + delivery_fee(order_type)`, rounded to 2 decimal places
pub fn expected_total<L: LineItem>(
    items: &[L],
    order_type: OrderType,
    surcharge: Decimal,
) -> Result<Decimal, AmountError> {
    if items.is_empty() {
        return Err(AmountError::EmptyCart);
    }

    let mut subtotal = Decimal::ZERO;
    for item in items {
        validate_line_item(item)?;
        subtotal += item.line_total();
    }

    Ok(round_money(subtotal + delivery_fee(order_type, surcharge)))
}

/// Recompute the total and compare it with what the client declared.
///
/// Returns the recomputed total, which is what gets charged.
pub fn verify_amount<L: LineItem>(
    items: &[L],
    order_type: OrderType,
    surcharge: Decimal,
    declared: Decimal,
) -> Result<Decimal, AmountError> {
    let expected = expected_total(items, order_type, surcharge)?;
    if !money_eq(expected, declared) {
        return Err(AmountError::AmountMismatch { expected, declared });
    }
    Ok(expected)
}

/// Convert a major-unit amount to integer minor units (×100, rounded half away from zero)
pub fn to_minor_units(amount: Decimal) -> Result<i64, AmountError> {
    let minor = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let minor = minor.to_i64().ok_or(AmountError::OutOfRange(amount))?;
    if minor <= 0 {
        return Err(AmountError::NonPositiveAmount(amount));
    }
    Ok(minor)
}

/// Convert integer minor units back to a major-unit amount
#[inline]
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, DECIMAL_PLACES)
}
