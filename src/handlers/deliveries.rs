use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::common::{
    created_response, deleted_response, parse_optional, success_response, ValidatedJson,
};
use crate::{
    errors::ServiceError,
    models::{parse_enum, Delivery, DeliveryProof, DeliveryStatus},
    services::delivery_service::{CreateDeliveryInput, DeliveryFilter, DeliveryStats, NewIssue},
    ApiResponse, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryListQuery {
    pub rider_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub active_only: bool,
}

impl DeliveryListQuery {
    fn into_filter(self) -> Result<DeliveryFilter, ServiceError> {
        Ok(DeliveryFilter {
            rider_id: self.rider_id,
            user_email: self.user_email.filter(|e| !e.trim().is_empty()),
            status: parse_optional("status", self.status.as_deref())?,
            active_only: self.active_only,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryStatsQuery {
    pub rider_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDeliveryStatusRequest {
    #[validate(length(min = 1))]
    pub status: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub rider_notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTimesRequest {
    #[serde(default)]
    pub estimated_pickup_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeliveryProofRequest {
    #[serde(default)]
    #[validate(url)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub verification_code: Option<String>,
}

impl From<DeliveryProofRequest> for DeliveryProof {
    fn from(req: DeliveryProofRequest) -> Self {
        DeliveryProof {
            photo_url: req.photo_url,
            signature: req.signature,
            notes: req.notes,
            verification_code: req.verification_code,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RatingRequest {
    pub rating: i64,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelDeliveryRequest {
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

pub fn delivery_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_delivery).get(list_deliveries))
        .route("/stats", get(delivery_stats))
        .route("/order/{order_id}", get(get_delivery_for_order))
        .route("/{id}", get(get_delivery).delete(delete_delivery))
        .route("/{id}/status", patch(update_status))
        .route("/{id}/location", patch(update_location))
        .route("/{id}/times", patch(update_estimated_times))
        .route("/{id}/proof", patch(update_delivery_proof))
        .route("/{id}/rating", patch(add_customer_rating))
        .route("/{id}/cancel", patch(cancel_delivery))
        .route("/{id}/issues", post(add_issue))
}

pub async fn create_delivery(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<CreateDeliveryInput>,
) -> Result<(StatusCode, Json<ApiResponse<Delivery>>), ServiceError> {
    let delivery = state.services.deliveries.create_delivery(input).await?;
    Ok(created_response(delivery))
}

pub async fn list_deliveries(
    State(state): State<AppState>,
    Query(query): Query<DeliveryListQuery>,
) -> Result<Json<ApiResponse<Vec<Delivery>>>, ServiceError> {
    let filter = query.into_filter()?;
    Ok(success_response(
        state.services.deliveries.list_deliveries(&filter).await?,
    ))
}

pub async fn delivery_stats(
    State(state): State<AppState>,
    Query(query): Query<DeliveryStatsQuery>,
) -> Result<Json<ApiResponse<DeliveryStats>>, ServiceError> {
    Ok(success_response(
        state
            .services
            .deliveries
            .delivery_stats(query.rider_id)
            .await?,
    ))
}

pub async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Delivery>>, ServiceError> {
    Ok(success_response(
        state.services.deliveries.get_delivery(id).await?,
    ))
}

pub async fn get_delivery_for_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Delivery>>, ServiceError> {
    Ok(success_response(
        state
            .services
            .deliveries
            .get_delivery_for_order(order_id)
            .await?,
    ))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateDeliveryStatusRequest>,
) -> Result<Json<ApiResponse<Delivery>>, ServiceError> {
    let status: DeliveryStatus = parse_enum("delivery status", &body.status)?;
    let delivery = state
        .services
        .deliveries
        .update_status(id, status, body.rider_notes)
        .await?;
    Ok(success_response(delivery))
}

pub async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateLocationRequest>,
) -> Result<Json<ApiResponse<Delivery>>, ServiceError> {
    let delivery = state
        .services
        .deliveries
        .update_location(id, body.latitude, body.longitude)
        .await?;
    Ok(success_response(delivery))
}

pub async fn update_estimated_times(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateTimesRequest>,
) -> Result<Json<ApiResponse<Delivery>>, ServiceError> {
    let delivery = state
        .services
        .deliveries
        .update_estimated_times(id, body.estimated_pickup_time, body.estimated_delivery_time)
        .await?;
    Ok(success_response(delivery))
}

pub async fn update_delivery_proof(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<DeliveryProofRequest>,
) -> Result<Json<ApiResponse<Delivery>>, ServiceError> {
    let delivery = state
        .services
        .deliveries
        .update_delivery_proof(id, body.into())
        .await?;
    Ok(success_response(delivery))
}

pub async fn add_customer_rating(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<RatingRequest>,
) -> Result<Json<ApiResponse<Delivery>>, ServiceError> {
    let delivery = state
        .services
        .deliveries
        .add_customer_rating(id, body.rating, body.feedback)
        .await?;
    Ok(success_response(delivery))
}

pub async fn cancel_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<CancelDeliveryRequest>,
) -> Result<Json<ApiResponse<Delivery>>, ServiceError> {
    Ok(success_response(
        state
            .services
            .deliveries
            .cancel_delivery(id, body.reason)
            .await?,
    ))
}

pub async fn add_issue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(issue): ValidatedJson<NewIssue>,
) -> Result<(StatusCode, Json<ApiResponse<Delivery>>), ServiceError> {
    let delivery = state.services.deliveries.add_issue(id, issue).await?;
    Ok(created_response(delivery))
}

pub async fn delete_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state.services.deliveries.delete_delivery(id).await?;
    Ok(deleted_response("Delivery deleted"))
}
