//! Intent creation: catalog price snapshot, amount verification and the
//! processor call that reserves the charge

use std::collections::HashMap;

use rust_decimal::Decimal;
use shared::checkout::{CheckoutSnapshot, FrozenLineItem, IntentRequest, OrderType};
use shared::util::truncate_chars;

use super::CheckoutError;
use crate::money;
use crate::store::{CatalogSource, MenuItem};
use crate::stripe::{CreateIntent, GatewayError, PaymentGateway, PaymentIntent};

/// Metadata key linking a processor intent back to its ledger entry
pub const ATTEMPT_ID_KEY: &str = "attempt_id";

/// Processor limit on metadata value length
const MAX_METADATA_VALUE_CHARS: usize = 500;

/// Typed metadata attached to every intent
///
/// Built from the server-side snapshot, so it never carries client-supplied
/// free-form keys.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutMetadata {
    pub attempt_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub order_type: OrderType,
    pub delivery_address: Option<String>,
    pub line_count: usize,
    pub unit_count: i32,
}

impl CheckoutMetadata {
    pub fn from_snapshot(attempt_id: &str, snapshot: &CheckoutSnapshot) -> Self {
        Self {
            attempt_id: attempt_id.to_string(),
            customer_email: snapshot.customer.email.clone(),
            customer_name: snapshot.customer.name.clone(),
            customer_phone: snapshot.customer.phone.clone(),
            order_type: snapshot.order_type,
            delivery_address: snapshot.delivery_address.clone(),
            line_count: snapshot.items.len(),
            unit_count: snapshot.unit_count(),
        }
    }

    /// Flatten into string pairs for the processor
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            (ATTEMPT_ID_KEY, self.attempt_id.clone()),
            ("customer_email", self.customer_email.clone()),
            ("customer_name", self.customer_name.clone()),
            ("order_type", self.order_type.as_str().to_string()),
            ("line_count", self.line_count.to_string()),
            ("unit_count", self.unit_count.to_string()),
        ];
        if let Some(phone) = &self.customer_phone {
            pairs.push(("customer_phone", phone.clone()));
        }
        if let Some(address) = &self.delivery_address {
            pairs.push(("delivery_address", address.clone()));
        }

        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), truncate_chars(&v, MAX_METADATA_VALUE_CHARS)))
            .collect()
    }
}

/// Ledger attempt id recorded on an intent, if any
pub fn attempt_id_of(intent: &PaymentIntent) -> Option<&str> {
    intent.metadata.get(ATTEMPT_ID_KEY).map(String::as_str)
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Customer and fulfilment checks done at the trust boundary
pub fn validate_customer(request: &IntentRequest) -> Result<(), CheckoutError> {
    let customer = &request.customer;
    if blank(&customer.name) {
        return Err(CheckoutError::InvalidCustomer("name is required".into()));
    }
    let email = customer.email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(CheckoutError::InvalidCustomer(format!(
            "invalid email address: {email}"
        )));
    }
    if request.order_type == OrderType::Delivery
        && request.delivery_address.as_deref().is_none_or(blank)
    {
        return Err(CheckoutError::DeliveryAddressRequired);
    }
    Ok(())
}

/// Replace client prices with catalog prices, line by line
pub fn freeze_line_items(
    request: &IntentRequest,
    catalog: &[MenuItem],
) -> Result<Vec<FrozenLineItem>, CheckoutError> {
    let by_id: HashMap<&str, &MenuItem> = catalog.iter().map(|m| (m.id.as_str(), m)).collect();

    request
        .items
        .iter()
        .map(|line| {
            let Some(menu_item) = by_id.get(line.id.as_str()) else {
                return Err(CheckoutError::InvalidLineItem {
                    item: line.id.clone(),
                    reason: "not on the menu".into(),
                });
            };
            if !menu_item.is_available {
                return Err(CheckoutError::InvalidLineItem {
                    item: line.id.clone(),
                    reason: "currently unavailable".into(),
                });
            }
            Ok(FrozenLineItem {
                menu_item_id: menu_item.id.clone(),
                name: menu_item.name.clone(),
                price_at_time: menu_item.price,
                quantity: line.quantity,
                special_requests: line
                    .special_requests
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            })
        })
        .collect()
}

/// Validate the request and freeze it into a priced snapshot.
///
/// Runs entirely before the processor is contacted: a tampered or stale total
/// fails here with `AmountMismatch` and nothing is charged.
pub async fn price_snapshot(
    catalog: &dyn CatalogSource,
    request: &IntentRequest,
    delivery_fee: Decimal,
    currency: &str,
) -> Result<CheckoutSnapshot, CheckoutError> {
    validate_customer(request)?;

    if request.items.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    for line in &request.items {
        money::validate_line_item(line)?;
    }

    let mut ids: Vec<String> = request.items.iter().map(|i| i.id.clone()).collect();
    ids.sort();
    ids.dedup();
    let menu = catalog
        .menu_items(&ids)
        .await
        .map_err(CheckoutError::Catalog)?;

    let items = freeze_line_items(request, &menu)?;
    let total_amount = money::verify_amount(
        &items,
        request.order_type,
        delivery_fee,
        request.declared_total,
    )?;
    let amount_minor = money::to_minor_units(total_amount)?;

    Ok(CheckoutSnapshot {
        customer: request.customer.clone(),
        order_type: request.order_type,
        delivery_address: match request.order_type {
            OrderType::Delivery => request.delivery_address.clone(),
            OrderType::Collection => None,
        },
        special_instructions: request.special_instructions.clone(),
        items,
        total_amount,
        amount_minor,
        currency: currency.to_string(),
    })
}

/// Reserve the charge with the processor.
///
/// The attempt id doubles as the idempotency key, so replaying this call for
/// the same attempt returns the original intent.
pub async fn create_payment_intent(
    gateway: &dyn PaymentGateway,
    attempt_id: &str,
    snapshot: &CheckoutSnapshot,
) -> Result<PaymentIntent, CheckoutError> {
    let request = CreateIntent {
        amount_minor: snapshot.amount_minor,
        currency: snapshot.currency.clone(),
        metadata: CheckoutMetadata::from_snapshot(attempt_id, snapshot).to_pairs(),
        receipt_email: Some(snapshot.customer.email.clone()),
        description: Some(format!(
            "Café {} order, {} item(s)",
            snapshot.order_type,
            snapshot.unit_count()
        )),
    };

    let intent = gateway.create_intent(&request, attempt_id).await?;

    if intent.amount != snapshot.amount_minor {
        return Err(GatewayError::InvalidResponse(format!(
            "intent {} reserved {} minor units, expected {}",
            intent.id, intent.amount, snapshot.amount_minor
        ))
        .into());
    }
    if intent.client_secret.is_none() {
        return Err(GatewayError::InvalidResponse(format!(
            "intent {} returned without a client secret",
            intent.id
        ))
        .into());
    }

    tracing::info!(
        attempt_id,
        payment_intent = %intent.id,
        amount_minor = intent.amount,
        "Payment intent created"
    );
    Ok(intent)
}
