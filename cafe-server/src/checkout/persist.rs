//! Order recording after a successful charge
//!
//! Header and items cannot be written in one transaction over the REST
//! interface, so the header goes in as `pending`, the items follow as a single
//! batch, and only then is the header promoted to `confirmed`. A `pending`
//! order therefore always means "recording not finished".
//!
//! Recording is idempotent on `payment_reference`: calling it again for the
//! same charge resumes a half-written order instead of creating a second one.

use shared::checkout::{CheckoutSnapshot, NewOrderItem, Order, OrderStatus};

use super::CheckoutError;
use crate::store::{OrderStore, StoreError};

fn header_failed(payment_reference: &str, reason: impl ToString) -> CheckoutError {
    CheckoutError::Persistence {
        payment_reference: payment_reference.to_string(),
        reason: reason.to_string(),
    }
}

fn partially_recorded(payment_reference: &str, order_id: i64, reason: impl ToString) -> CheckoutError {
    CheckoutError::PartialPersistence {
        payment_reference: payment_reference.to_string(),
        order_id,
        reason: reason.to_string(),
    }
}

/// Existing order for this charge, or a freshly inserted `pending` header.
///
/// Returns `(order, resumed)`.
async fn header_for(
    store: &dyn OrderStore,
    payment_reference: &str,
    snapshot: &CheckoutSnapshot,
) -> Result<(Order, bool), CheckoutError> {
    let existing = store
        .find_by_payment_reference(payment_reference)
        .await
        .map_err(|e| header_failed(payment_reference, e))?;
    if let Some(order) = existing {
        return Ok((order, true));
    }

    match store
        .insert_order(&snapshot.to_new_order(payment_reference))
        .await
    {
        Ok(order) => Ok((order, false)),
        Err(StoreError::Conflict(_)) => {
            // Another writer got there first; continue from its header
            let order = store
                .find_by_payment_reference(payment_reference)
                .await
                .map_err(|e| header_failed(payment_reference, e))?
                .ok_or_else(|| {
                    header_failed(payment_reference, "conflict on insert but no order found")
                })?;
            Ok((order, true))
        }
        Err(e) => Err(header_failed(payment_reference, e)),
    }
}

/// Write the order header and its items for a confirmed charge
pub async fn persist_order(
    store: &dyn OrderStore,
    payment_reference: &str,
    snapshot: &CheckoutSnapshot,
) -> Result<Order, CheckoutError> {
    let (order, resumed) = header_for(store, payment_reference, snapshot).await?;

    if order.status != OrderStatus::Pending {
        tracing::info!(
            order_id = order.id,
            payment_reference,
            status = %order.status,
            "Order already recorded for this payment"
        );
        return Ok(order);
    }

    let items: Vec<NewOrderItem> = snapshot
        .items
        .iter()
        .map(|item| item.to_order_item(order.id))
        .collect();

    let written = if resumed {
        store
            .count_items(order.id)
            .await
            .map_err(|e| partially_recorded(payment_reference, order.id, e))?
    } else {
        0
    };

    if written == 0 {
        store
            .insert_items(&items)
            .await
            .map_err(|e| partially_recorded(payment_reference, order.id, e))?;
    } else if written != items.len() {
        return Err(partially_recorded(
            payment_reference,
            order.id,
            format!("order has {written} of {} items", items.len()),
        ));
    }

    let order = store
        .set_status(order.id, OrderStatus::Confirmed)
        .await
        .map_err(|e| partially_recorded(payment_reference, order.id, e))?;

    tracing::info!(
        order_id = order.id,
        payment_reference,
        items = items.len(),
        resumed,
        "Order recorded"
    );
    Ok(order)
}
