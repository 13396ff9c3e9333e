//! `orders` and `order_items` tables

use async_trait::async_trait;
use serde::Serialize;
use shared::checkout::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus};

use super::{RestClient, StoreResult, eq, single_row};

const ORDERS: &str = "orders";
const ORDER_ITEMS: &str = "order_items";

/// Durable order storage
///
/// `orders.payment_reference` carries a unique index, so a second insert for
/// the same charge fails with [`super::StoreError::Conflict`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &NewOrder) -> StoreResult<Order>;

    /// Insert all items in one request (one statement, all or nothing)
    async fn insert_items(&self, items: &[NewOrderItem]) -> StoreResult<Vec<OrderItem>>;

    async fn set_status(&self, order_id: i64, status: OrderStatus) -> StoreResult<Order>;

    async fn find_by_payment_reference(&self, reference: &str) -> StoreResult<Option<Order>>;

    async fn count_items(&self, order_id: i64) -> StoreResult<usize>;
}

#[derive(Debug, Clone)]
pub struct RestOrderStore {
    rest: RestClient,
}

impl RestOrderStore {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[derive(Serialize)]
struct StatusPatch {
    status: OrderStatus,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
impl OrderStore for RestOrderStore {
    async fn insert_order(&self, order: &NewOrder) -> StoreResult<Order> {
        let rows = self.rest.insert(ORDERS, order).await?;
        single_row(rows, ORDERS)
    }

    async fn insert_items(&self, items: &[NewOrderItem]) -> StoreResult<Vec<OrderItem>> {
        self.rest.insert(ORDER_ITEMS, items).await
    }

    async fn set_status(&self, order_id: i64, status: OrderStatus) -> StoreResult<Order> {
        let patch = StatusPatch {
            status,
            updated_at: chrono::Utc::now(),
        };
        let rows = self
            .rest
            .update(ORDERS, &[("id", eq(order_id))], &patch)
            .await?;
        single_row(rows, ORDERS)
    }

    async fn find_by_payment_reference(&self, reference: &str) -> StoreResult<Option<Order>> {
        let rows: Vec<Order> = self
            .rest
            .select(
                ORDERS,
                &[
                    ("select", "*".to_string()),
                    ("payment_reference", eq(reference)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn count_items(&self, order_id: i64) -> StoreResult<usize> {
        let rows: Vec<serde::de::IgnoredAny> = self
            .rest
            .select(
                ORDER_ITEMS,
                &[("select", "id".to_string()), ("order_id", eq(order_id))],
            )
            .await?;
        Ok(rows.len())
    }
}
