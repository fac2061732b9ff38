use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use tracing::warn;

use crate::{
    errors::ServiceError, payments::webhook::SIGNATURE_HEADER,
    services::payment_service::WebhookOutcome, ApiResponse, AppState,
};

// POST /api/v1/payments/webhook
//
// Signature verification needs the exact bytes the processor signed, so the
// body is taken raw and never re-serialized.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookOutcome>>, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .services
        .payments
        .handle_webhook(&body, signature)
        .await
        .inspect_err(|e| warn!(error = %e, "payment webhook rejected"))?;

    Ok(Json(ApiResponse::success(outcome)))
}
