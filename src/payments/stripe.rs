use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{
    CheckoutSession, CreateCheckoutSession, CreatePaymentIntent, CreateRefund, PaymentIntent,
    PaymentProcessor, ProcessorError, Refund,
};

/// Form-encoded HTTPS client for the Stripe REST API.
#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    base_url: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

type Form = Vec<(String, String)>;

fn push(form: &mut Form, key: impl Into<String>, value: impl ToString) {
    form.push((key.into(), value.to_string()));
}

impl StripeClient {
    pub fn new(
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProcessorError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            secret_key: secret_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProcessorError> {
        let response = request.bearer_auth(&self.secret_key).send().await?;
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(ProcessorError::from);
        }

        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ErrorEnvelope>(&body).ok();
        let message = parsed
            .as_ref()
            .and_then(|e| e.error.message.clone())
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        let kind = parsed.and_then(|e| e.error.kind);
        warn!(status = status.as_u16(), kind = ?kind, "payment processor returned an error");

        Err(match (status, kind.as_deref()) {
            (StatusCode::UNAUTHORIZED, _) | (_, Some("authentication_error")) => {
                ProcessorError::Authentication(message)
            }
            (_, Some("invalid_request_error")) | (_, Some("card_error")) => {
                ProcessorError::InvalidRequest(message)
            }
            (s, _) if s.is_client_error() => ProcessorError::InvalidRequest(message),
            (s, _) => ProcessorError::Api {
                status: s.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    fn provider_name(&self) -> &'static str {
        "stripe"
    }

    #[instrument(skip(self, request), fields(amount = request.amount_minor, currency = %request.currency))]
    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntent,
    ) -> Result<PaymentIntent, ProcessorError> {
        let mut form = Form::new();
        push(&mut form, "amount", request.amount_minor);
        push(&mut form, "currency", request.currency.to_lowercase());
        push(&mut form, "automatic_payment_methods[enabled]", "true");
        if let Some(description) = &request.description {
            push(&mut form, "description", description);
        }
        for (key, value) in &request.metadata {
            push(&mut form, format!("metadata[{}]", key), value);
        }

        let intent: PaymentIntent = self
            .send(self.http.post(self.url("payment_intents")).form(&form))
            .await?;
        debug!(intent_id = %intent.id, "payment intent created");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError> {
        self.send(self.http.get(self.url(&format!("payment_intents/{}", id))))
            .await
    }

    #[instrument(skip(self))]
    async fn cancel_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError> {
        let form = Form::new();
        self.send(
            self.http
                .post(self.url(&format!("payment_intents/{}/cancel", id)))
                .form(&form),
        )
        .await
    }

    #[instrument(skip(self, request), fields(payment_intent = %request.payment_intent_id))]
    async fn create_refund(&self, request: CreateRefund) -> Result<Refund, ProcessorError> {
        let mut form = Form::new();
        push(&mut form, "payment_intent", &request.payment_intent_id);
        if let Some(amount) = request.amount_minor {
            push(&mut form, "amount", amount);
        }
        if let Some(reason) = request.reason {
            push(&mut form, "reason", reason);
        }
        self.send(self.http.post(self.url("refunds")).form(&form))
            .await
    }

    #[instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSession,
    ) -> Result<CheckoutSession, ProcessorError> {
        let mut form = Form::new();
        push(&mut form, "mode", "payment");
        push(&mut form, "success_url", &request.success_url);
        push(&mut form, "cancel_url", &request.cancel_url);
        if let Some(reference) = &request.client_reference_id {
            push(&mut form, "client_reference_id", reference);
        }
        let currency = request.currency.to_lowercase();
        for (i, line) in request.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            push(&mut form, format!("{}[price_data][currency]", prefix), &currency);
            push(
                &mut form,
                format!("{}[price_data][product_data][name]", prefix),
                &line.name,
            );
            push(
                &mut form,
                format!("{}[price_data][unit_amount]", prefix),
                line.unit_amount_minor,
            );
            push(&mut form, format!("{}[quantity]", prefix), line.quantity);
        }
        for (key, value) in &request.metadata {
            push(&mut form, format!("metadata[{}]", key), value);
        }

        self.send(self.http.post(self.url("checkout/sessions")).form(&form))
            .await
    }
}
