//! Data store access over its REST interface
//!
//! The hosted store exposes each table at `{STORE_URL}/rest/v1/{table}` with
//! `column=op.value` filters and `Prefer: return=representation` to get the
//! written rows back. Every request carries the service key both as `apikey`
//! and as a bearer token.

pub mod catalog;
pub mod ledger;
pub mod orders;

pub use catalog::{CatalogSource, MenuItem, RestCatalog};
pub use ledger::{
    AttemptPatch, AttemptState, CheckoutAttempt, NewAttempt, ReconciliationLedger, RestLedger,
};
pub use orders::{OrderStore, RestOrderStore};

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error body returned by the store: `{"code", "message", "details", "hint"}`
#[derive(serde::Deserialize)]
struct StoreErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Network failure or unreadable body
    #[error("Data store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Unique or foreign key violation (HTTP 409)
    #[error("Data store conflict: {0}")]
    Conflict(String),

    #[error("Data store returned {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Invalid data store response: {0}")]
    InvalidResponse(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thin REST client shared by the table-specific stores
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestClient {
    pub fn new(base_url: &str, service_key: &str) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        self.client
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> StoreResult<T> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let (code, message) = match serde_json::from_str::<StoreErrorBody>(&text) {
                Ok(body) => {
                    let message = match body.details {
                        Some(details) => format!("{} ({details})", body.message),
                        None => body.message,
                    };
                    (body.code, message)
                }
                Err(_) => (None, text),
            };
            return match status {
                StatusCode::CONFLICT => Err(StoreError::Conflict(message)),
                _ => Err(StoreError::Api {
                    status: status.as_u16(),
                    code,
                    message,
                }),
            };
        }

        serde_json::from_str(&text)
            .map_err(|e| StoreError::InvalidResponse(format!("{e}: {text}")))
    }

    /// `GET /{table}?{query}`
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> StoreResult<Vec<T>> {
        let response = self.request(Method::GET, table).query(query).send().await?;
        Self::handle_response(response).await
    }

    /// `POST /{table}` returning the inserted rows
    pub async fn insert<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> StoreResult<Vec<T>> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// `POST /{table}` without reading rows back
    pub async fn insert_minimal<B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> StoreResult<()> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await?;
        match status {
            StatusCode::CONFLICT => Err(StoreError::Conflict(message)),
            _ => Err(StoreError::Api {
                status: status.as_u16(),
                code: None,
                message,
            }),
        }
    }

    /// `PATCH /{table}?{filters}` returning the updated rows
    pub async fn update<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> StoreResult<Vec<T>> {
        let response = self
            .request(Method::PATCH, table)
            .query(filters)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }
}

/// `eq.` filter value
pub(crate) fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// `in.(...)` filter value with each element double-quoted
pub(crate) fn in_list<S: AsRef<str>>(values: &[S]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.as_ref().replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

/// Exactly one row expected back from a write
pub(crate) fn single_row<T>(rows: Vec<T>, table: &str) -> StoreResult<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| StoreError::InvalidResponse(format!("no row returned from {table}")))
}
