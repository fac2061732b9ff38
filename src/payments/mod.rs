//! Payment processor boundary.
//!
//! Amounts cross this boundary as integer minor units (cents). Everything
//! on the order side stays in decimal major units.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use uuid::Uuid;

pub mod stripe;
pub mod webhook;

pub use stripe::StripeClient;

/// Metadata key carrying the order id on intents and sessions.
pub const METADATA_ORDER_ID: &str = "order_id";
pub const METADATA_ORDER_NUMBER: &str = "order_number";
pub const METADATA_USER_EMAIL: &str = "user_email";

#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The processor understood the request and refused it.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("payment processor rejected credentials: {0}")]
    Authentication(String),

    #[error("payment processor error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("payment processor transport error: {0}")]
    Transport(String),

    #[error("malformed payment processor response: {0}")]
    Decode(String),

    #[error("payment processor is not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for ProcessorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProcessorError::Decode(err.to_string())
        } else {
            ProcessorError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PaymentIntent {
    /// The order this intent was created for, if the metadata names one.
    pub fn order_id(&self) -> Option<Uuid> {
        self.metadata
            .get(METADATA_ORDER_ID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatePaymentIntent {
    pub amount_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RefundReason {
    Duplicate,
    Fraudulent,
    RequestedByCustomer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRefund {
    pub payment_intent_id: String,
    /// Partial refund in minor units; the full amount when `None`.
    pub amount_minor: Option<i64>,
    pub reason: Option<RefundReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutLineItem {
    pub name: String,
    pub unit_amount_minor: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCheckoutSession {
    pub currency: String,
    pub line_items: Vec<CheckoutLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Verified webhook notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// Converts a major-unit amount to minor units, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ProcessorError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ProcessorError::InvalidRequest(format!("Amount {} is out of range", amount)))
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Operations the workflow needs from a payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntent,
    ) -> Result<PaymentIntent, ProcessorError>;

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError>;

    async fn cancel_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError>;

    async fn create_refund(&self, request: CreateRefund) -> Result<Refund, ProcessorError>;

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSession,
    ) -> Result<CheckoutSession, ProcessorError>;

    /// Verifies `signature_header` against the raw payload and parses the event.
    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
        secret: &str,
        tolerance_secs: u64,
    ) -> Result<WebhookEvent, ProcessorError> {
        webhook::verify_signature(payload, signature_header, secret, tolerance_secs, Utc::now())?;
        serde_json::from_slice(payload).map_err(|e| ProcessorError::InvalidRequest(e.to_string()))
    }
}

/// Stand-in used when no processor credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledProcessor;

#[async_trait]
impl PaymentProcessor for DisabledProcessor {
    fn provider_name(&self) -> &'static str {
        "disabled"
    }

    async fn create_payment_intent(
        &self,
        _request: CreatePaymentIntent,
    ) -> Result<PaymentIntent, ProcessorError> {
        Err(ProcessorError::NotConfigured)
    }

    async fn retrieve_payment_intent(&self, _id: &str) -> Result<PaymentIntent, ProcessorError> {
        Err(ProcessorError::NotConfigured)
    }

    async fn cancel_payment_intent(&self, _id: &str) -> Result<PaymentIntent, ProcessorError> {
        Err(ProcessorError::NotConfigured)
    }

    async fn create_refund(&self, _request: CreateRefund) -> Result<Refund, ProcessorError> {
        Err(ProcessorError::NotConfigured)
    }

    async fn create_checkout_session(
        &self,
        _request: CreateCheckoutSession,
    ) -> Result<CheckoutSession, ProcessorError> {
        Err(ProcessorError::NotConfigured)
    }
}
