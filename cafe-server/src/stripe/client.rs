//! reqwest client for the Stripe payment intents API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{ConfirmIntent, CreateIntent, GatewayError, PaymentGateway, PaymentIntent};

/// Stripe error envelope: `{"error": {"type": ..., "code": ..., "message": ...}}`
#[derive(serde::Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(serde::Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Payment intents over the Stripe REST API
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(api_base: &str, secret_key: &str) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn handle_response(
        &self,
        response: reqwest::Response,
    ) -> Result<PaymentIntent, GatewayError> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let Ok(body) = serde_json::from_str::<StripeErrorBody>(&text) else {
                return Err(GatewayError::Api {
                    status: status.as_u16(),
                    kind: None,
                    code: None,
                    message: text,
                });
            };
            let detail = body.error;
            let message = detail.message.unwrap_or_else(|| text.clone());

            if status == StatusCode::PAYMENT_REQUIRED || detail.kind.as_deref() == Some("card_error")
            {
                return Err(GatewayError::CardDeclined {
                    code: detail.code,
                    decline_code: detail.decline_code,
                    message,
                });
            }
            return Err(GatewayError::Api {
                status: status.as_u16(),
                kind: detail.kind,
                code: detail.code,
                message,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| GatewayError::InvalidResponse(format!("{e}: {text}")))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        request: &CreateIntent,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), request.amount_minor.to_string()),
            ("currency".into(), request.currency.clone()),
            ("payment_method_types[0]".into(), "card".into()),
        ];
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }
        if let Some(email) = &request.receipt_email {
            form.push(("receipt_email".into(), email.clone()));
        }
        if let Some(description) = &request.description {
            form.push(("description".into(), description.clone()));
        }

        tracing::debug!(
            amount_minor = request.amount_minor,
            currency = %request.currency,
            idempotency_key,
            "Creating payment intent"
        );

        let response = self
            .client
            .post(self.url("payment_intents"))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", idempotency_key)
            .form(&form)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn confirm_intent(
        &self,
        intent_id: &str,
        request: &ConfirmIntent,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut form = vec![("payment_method", request.payment_method.as_str())];
        if let Some(email) = &request.receipt_email {
            form.push(("receipt_email", email.as_str()));
        }

        let response = self
            .client
            .post(self.url(&format!("payment_intents/{intent_id}/confirm")))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("payment_intents/{intent_id}")))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn cancel_intent(
        &self,
        intent_id: &str,
        reason: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let response = self
            .client
            .post(self.url(&format!("payment_intents/{intent_id}/cancel")))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[("cancellation_reason", reason)])
            .send()
            .await?;
        self.handle_response(response).await
    }
}
