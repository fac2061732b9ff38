use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, success_response, ValidatedJson};
use super::payment_webhooks::payment_webhook;
use crate::{
    errors::ServiceError,
    models::Order,
    services::payment_service::{
        CheckoutSessionCreated, CheckoutSessionInput, CreatePaymentIntentInput,
        PaymentConfirmation, PaymentDetails, PaymentIntentCreated, RefundInput, RefundOutcome,
    },
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmPaymentRequest {
    #[validate(length(min = 1))]
    pub payment_intent_id: String,
}

/// Payment routes. The webhook handler lives in `payment_webhooks` because
/// it consumes the raw body.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(payment_webhook))
        .route("/intents", post(create_payment_intent))
        .route("/confirm", post(confirm_payment))
        .route("/checkout-session", post(create_checkout_session))
        .route("/refund", post(refund_payment))
        .route("/{order_id}/details", get(get_payment_details))
        .route("/{order_id}/cancel", post(cancel_payment))
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<CreatePaymentIntentInput>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentIntentCreated>>), ServiceError> {
    let created = state.services.payments.create_payment_intent(input).await?;
    Ok(created_response(created))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ConfirmPaymentRequest>,
) -> Result<Json<ApiResponse<PaymentConfirmation>>, ServiceError> {
    let confirmation = state
        .services
        .payments
        .confirm_payment(&body.payment_intent_id)
        .await?;
    Ok(success_response(confirmation))
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<CheckoutSessionInput>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutSessionCreated>>), ServiceError> {
    let session = state
        .services
        .payments
        .create_checkout_session(input)
        .await?;
    Ok(created_response(session))
}

pub async fn refund_payment(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<RefundInput>,
) -> Result<Json<ApiResponse<RefundOutcome>>, ServiceError> {
    Ok(success_response(
        state.services.payments.refund_payment(input).await?,
    ))
}

pub async fn get_payment_details(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentDetails>>, ServiceError> {
    Ok(success_response(
        state
            .services
            .payments
            .get_payment_details(order_id)
            .await?,
    ))
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Order>>, ServiceError> {
    Ok(success_response(
        state.services.payments.cancel_payment(order_id).await?,
    ))
}
