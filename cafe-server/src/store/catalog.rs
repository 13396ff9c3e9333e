//! Read-only `menu_items` catalog

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{RestClient, StoreResult, in_list};

const MENU_ITEMS: &str = "menu_items";

fn default_available() -> bool {
    true
}

/// Catalog row as seen by checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

/// Price source for intent creation
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the given items. Unknown ids are simply absent from the result.
    async fn menu_items(&self, ids: &[String]) -> StoreResult<Vec<MenuItem>>;
}

#[derive(Debug, Clone)]
pub struct RestCatalog {
    rest: RestClient,
}

impl RestCatalog {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl CatalogSource for RestCatalog {
    async fn menu_items(&self, ids: &[String]) -> StoreResult<Vec<MenuItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.rest
            .select(
                MENU_ITEMS,
                &[
                    ("select", "id,name,price,is_available".to_string()),
                    ("id", in_list(ids)),
                ],
            )
            .await
    }
}
