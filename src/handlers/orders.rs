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
    models::{parse_enum, Order, OrderStatus, PaymentStatus},
    services::order_service::{CreateOrderInput, OrderFilter, OrderStats},
    ApiResponse, AppState,
};

/// Query parameters for `GET /orders`. Statuses arrive as raw strings so
/// unknown values are reported as 400 with the offending value.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub user_email: Option<String>,
    pub restaurant_id: Option<Uuid>,
    pub rider_id: Option<Uuid>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

impl OrderListQuery {
    fn into_filter(self) -> Result<OrderFilter, ServiceError> {
        Ok(OrderFilter {
            user_email: self.user_email.filter(|e| !e.trim().is_empty()),
            restaurant_id: self.restaurant_id,
            rider_id: self.rider_id,
            status: parse_optional("status", self.status.as_deref())?,
            payment_status: parse_optional("payment_status", self.payment_status.as_deref())?,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrderStatusRequest {
    #[validate(length(min = 1))]
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePaymentStatusRequest {
    #[validate(length(min = 1))]
    pub payment_status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRiderRequest {
    pub rider_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDeliveryTimeRequest {
    #[serde(default)]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_delivery_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelOrderRequest {
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/stats", get(order_stats))
        .route("/number/{order_number}", get(get_order_by_number))
        .route("/{id}", get(get_order).delete(delete_order))
        .route("/{id}/status", patch(update_order_status))
        .route("/{id}/payment", patch(update_payment_status))
        .route("/{id}/rider", patch(assign_rider))
        .route("/{id}/delivery-time", patch(update_delivery_time))
        .route("/{id}/cancel", patch(cancel_order))
}

/// Converts a cart into an order.
pub async fn create_order(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<CreateOrderInput>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), ServiceError> {
    let order = state.services.orders.create_order(input).await?;
    Ok(created_response(order))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ApiResponse<Vec<Order>>>, ServiceError> {
    let filter = query.into_filter()?;
    Ok(success_response(
        state.services.orders.list_orders(&filter).await?,
    ))
}

pub async fn order_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<OrderStats>>, ServiceError> {
    Ok(success_response(state.services.orders.order_stats().await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Order>>, ServiceError> {
    Ok(success_response(state.services.orders.get_order(id).await?))
}

pub async fn get_order_by_number(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<Order>>, ServiceError> {
    Ok(success_response(
        state
            .services
            .orders
            .get_order_by_number(&order_number)
            .await?,
    ))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<Order>>, ServiceError> {
    let status: OrderStatus = parse_enum("order status", &body.status)?;
    Ok(success_response(
        state.services.orders.update_status(id, status).await?,
    ))
}

pub async fn update_payment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdatePaymentStatusRequest>,
) -> Result<Json<ApiResponse<Order>>, ServiceError> {
    let status: PaymentStatus = parse_enum("payment status", &body.payment_status)?;
    Ok(success_response(
        state
            .services
            .orders
            .update_payment_status(id, status)
            .await?,
    ))
}

pub async fn assign_rider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<AssignRiderRequest>,
) -> Result<Json<ApiResponse<Order>>, ServiceError> {
    Ok(success_response(
        state.services.orders.assign_rider(id, body.rider_id).await?,
    ))
}

pub async fn update_delivery_time(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateDeliveryTimeRequest>,
) -> Result<Json<ApiResponse<Order>>, ServiceError> {
    let order = state
        .services
        .orders
        .update_delivery_time(id, body.estimated_delivery_time, body.actual_delivery_time)
        .await?;
    Ok(success_response(order))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<CancelOrderRequest>,
) -> Result<Json<ApiResponse<Order>>, ServiceError> {
    Ok(success_response(
        state.services.orders.cancel_order(id, body.reason).await?,
    ))
}

pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state.services.orders.delete_order(id).await?;
    Ok(deleted_response("Order deleted"))
}
