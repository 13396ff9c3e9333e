//! Checkout domain types
//!
//! Cart lines arrive from the browser as [`CartItem`]s. At intent creation they
//! are priced against the catalog and frozen into [`FrozenLineItem`]s, which
//! travel inside a [`CheckoutSnapshot`] until the order is written as an
//! [`Order`] header plus a batch of [`OrderItem`] rows.
//!
//! Money is carried as `Decimal` and serialized as a JSON number.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Enums
// ============================================================================

/// How the customer receives the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Collection,
    Delivery,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Delivery => "delivery",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised order type string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order type: {0}")]
pub struct UnknownOrderType(pub String);

impl FromStr for OrderType {
    type Err = UnknownOrderType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection" => Ok(Self::Collection),
            "delivery" => Ok(Self::Delivery),
            other => Err(UnknownOrderType(other.to_string())),
        }
    }
}

/// Order lifecycle status
///
/// Under normal flow an order only moves forward: `pending -> confirmed`.
/// A `pending` row is an order whose items are not yet known to be complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Cart and line items
// ============================================================================

/// Anything that can be priced as `unit_price * quantity`
pub trait LineItem {
    /// Identifier used in validation messages
    fn label(&self) -> &str;
    fn unit_price(&self) -> Decimal;
    fn quantity(&self) -> i32;

    fn line_total(&self) -> Decimal {
        self.unit_price() * Decimal::from(self.quantity())
    }
}

/// Client-held cart line, never persisted directly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Menu item id
    pub id: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_requests: Option<String>,
}

impl LineItem for CartItem {
    fn label(&self) -> &str {
        &self.id
    }

    fn unit_price(&self) -> Decimal {
        self.price
    }

    fn quantity(&self) -> i32 {
        self.quantity
    }
}

/// A cart line priced from the catalog at intent creation
///
/// `price_at_time` is the price the charge was computed from. It is copied
/// verbatim into the order item and never re-read from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenLineItem {
    pub menu_item_id: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_at_time: Decimal,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_requests: Option<String>,
}

impl FrozenLineItem {
    pub fn to_order_item(&self, order_id: i64) -> NewOrderItem {
        NewOrderItem {
            order_id,
            menu_item_id: self.menu_item_id.clone(),
            quantity: self.quantity,
            price_at_time: self.price_at_time,
            special_requests: self.special_requests.clone(),
        }
    }
}

impl LineItem for FrozenLineItem {
    fn label(&self) -> &str {
        &self.menu_item_id
    }

    fn unit_price(&self) -> Decimal {
        self.price_at_time
    }

    fn quantity(&self) -> i32 {
        self.quantity
    }
}

// ============================================================================
// Customer and snapshot
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Billing details forwarded to the payment processor on confirmation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// Everything needed to write the order once the charge succeeds
///
/// Captured server-side when the payment intent is created, so the order
/// is always written from the same data the charge was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSnapshot {
    pub customer: CustomerDetails,
    pub order_type: OrderType,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    pub items: Vec<FrozenLineItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    /// `total_amount` in minor units, as sent to the processor
    pub amount_minor: i64,
    pub currency: String,
}

impl CheckoutSnapshot {
    /// Order header for this snapshot, written `pending` until its items land
    pub fn to_new_order(&self, payment_reference: &str) -> NewOrder {
        NewOrder {
            customer_email: self.customer.email.clone(),
            customer_name: self.customer.name.clone(),
            customer_phone: self.customer.phone.clone(),
            order_type: self.order_type,
            total_amount: self.total_amount,
            status: OrderStatus::Pending,
            payment_reference: payment_reference.to_string(),
            special_instructions: self.special_instructions.clone(),
            delivery_address: self.delivery_address.clone(),
        }
    }

    /// Total number of units across all lines
    pub fn unit_count(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

// ============================================================================
// Persisted rows
// ============================================================================

/// Order header as inserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_email: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub order_type: OrderType,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_reference: String,
    pub special_instructions: Option<String>,
    pub delivery_address: Option<String>,
}

/// Order header as stored (id and timestamps assigned by the store)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer_email: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub order_type: OrderType,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub order_id: i64,
    pub menu_item_id: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_at_time: Decimal,
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub menu_item_id: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_at_time: Decimal,
    #[serde(default)]
    pub special_requests: Option<String>,
}

// ============================================================================
// API contract
// ============================================================================

/// Cart submission used to open a checkout attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRequest {
    pub customer: CustomerDetails,
    pub order_type: OrderType,
    pub items: Vec<CartItem>,
    /// Total the client displayed; recomputed and compared server-side
    #[serde(with = "rust_decimal::serde::float")]
    pub declared_total: Decimal,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

/// Single-request checkout: cart plus the tokenised card to charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub order: IntentRequest,
    /// Processor payment method id (e.g. `pm_...`) created client-side
    pub payment_method: String,
    #[serde(default)]
    pub billing: Option<BillingDetails>,
}

/// Returned when an intent is created for the two-step flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentTicket {
    pub attempt_id: String,
    pub payment_intent_id: String,
    pub client_secret: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
}

/// Second half of the two-step flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmOrderRequest {
    pub attempt_id: String,
}

/// Successful checkout result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    pub success: bool,
    pub order_id: i64,
    pub attempt_id: String,
    pub payment_reference: String,
}
